pub mod dispatcher;
pub mod errors;
pub mod parser;
pub mod resolver;
pub mod result;
pub mod runner;
pub mod types;

pub use dispatcher::BatchDispatcher;
pub use errors::{DispatchError, ErrorKind, OperationError, PROTOCOL_VERSION, RequestError, RoutingError};
pub use parser::parse_request;
pub use resolver::{OperationDescription, OperationListing, OperationResolver};
pub use result::{OperationResult, Payload};
pub use runner::{BatchRunner, BatchSummary};
pub use types::{Envelope, OperationCall, RequestMeta};

#[cfg(test)]
mod parser_tests;
#[cfg(test)]
mod runner_tests;
