use std::convert::Infallible;
use std::io;

use bytes::{Bytes, BytesMut};
use futures::stream;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use tokio::io::{AsyncRead, AsyncReadExt};

pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

/// Streams whatever is written to the other end of `reader` as response
/// frames of at most `chunk_size` bytes. The body ends at EOF or after the
/// first read error.
pub fn reader_body<R>(reader: R, chunk_size: usize) -> ResponseBody
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let chunk_size = chunk_size.max(1);
    let frames = stream::unfold(Some(reader), move |state| async move {
        let mut reader = state?;
        let mut buf = BytesMut::with_capacity(chunk_size);
        match reader.read_buf(&mut buf).await {
            Ok(0) => None,
            Ok(_) => Some((Ok(Frame::data(buf.freeze())), Some(reader))),
            Err(err) => Some((Err(err), None)),
        }
    });
    StreamBody::new(frames).boxed_unsync()
}

pub fn full_body(text: impl Into<Bytes>) -> ResponseBody {
    Full::new(text.into())
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}
