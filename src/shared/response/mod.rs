pub mod boundary;
pub mod encoder;
pub mod multipart;
pub mod sanitize;
pub mod streams;

pub use boundary::Boundary;
pub use encoder::{Emitted, ResponseEncoder};
pub use multipart::{MultipartWriter, PartHandle};
pub use sanitize::strip_private_keys;
pub use streams::{PartRelay, PartSink, StreamId};

/// Bytes a part buffers before it is pushed to the transport.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Random bytes behind a boundary token. A multiple of 3 keeps base64 free
/// of `=` padding, which would clash with header parameter syntax.
pub const BOUNDARY_RAND_BYTES: usize = 9;
const _: () = assert!(BOUNDARY_RAND_BYTES % 3 == 0);

pub const JSON_MIME: &str = "application/json";
pub const TEXT_MIME: &str = "text/plain";
