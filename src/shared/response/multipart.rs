use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::shared::response::Boundary;
use crate::shared::response::DEFAULT_CHUNK_SIZE;

/// Identifies an open part of a [`MultipartWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartHandle(u64);

#[derive(Debug)]
struct Part {
    handle: PartHandle,
    buf: BytesMut,
    closed: bool,
}

/// Multipart stream writer over an async transport.
///
/// Parts may be open concurrently but reach the transport strictly in the
/// order they were opened: only the oldest unfinished part (the head) is
/// written out and flushed, once it buffers `chunk_size` bytes or when it
/// closes. Later parts
/// buffer in memory until every part before them is closed.
///
/// The first transport error is logged and turns the writer into a sink;
/// callers keep writing and never see the error.
#[derive(Debug)]
pub struct MultipartWriter<W> {
    transport: W,
    boundary: Boundary,
    chunk_size: usize,
    parts: VecDeque<Part>,
    next_handle: u64,
    broken: bool,
    bytes_sent: u64,
}

impl<W> MultipartWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(transport: W, boundary: Boundary) -> Self {
        Self::with_chunk_size(transport, boundary, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(transport: W, boundary: Boundary, chunk_size: usize) -> Self {
        Self {
            transport,
            boundary,
            chunk_size: chunk_size.max(1),
            parts: VecDeque::new(),
            next_handle: 0,
            broken: false,
            bytes_sent: 0,
        }
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// True once a transport write has failed.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn open_parts(&self) -> usize {
        self.parts.len()
    }

    /// Starts a new part and writes its preamble.
    pub async fn open_part(&mut self, mime: &str) -> PartHandle {
        let handle = PartHandle(self.next_handle);
        self.next_handle += 1;

        let preamble = format!(
            "{}\r\nContent-Type: {}\r\n\r\n",
            self.boundary.delimiter(),
            mime
        );
        let mut buf = BytesMut::with_capacity(self.chunk_size.max(preamble.len()));
        buf.extend_from_slice(preamble.as_bytes());
        self.parts.push_back(Part {
            handle,
            buf,
            closed: false,
        });

        self.pump().await;
        handle
    }

    /// Appends bytes to an open part. Writes to an unknown or closed handle
    /// are dropped.
    pub async fn write(&mut self, handle: PartHandle, bytes: &[u8]) {
        match self.part_mut(handle) {
            Some(part) => part.buf.extend_from_slice(bytes),
            None => {
                warn!(target: "batch_rpc::response", ?handle, "Write to a part that is not open");
                return;
            }
        }
        self.pump().await;
    }

    /// Ends a part; its bytes are released as soon as it becomes the head.
    pub async fn close_part(&mut self, handle: PartHandle) {
        match self.part_mut(handle) {
            Some(part) => {
                part.buf.extend_from_slice(b"\r\n");
                part.closed = true;
            }
            None => {
                warn!(target: "batch_rpc::response", ?handle, "Close of a part that is not open");
                return;
            }
        }
        self.pump().await;
    }

    /// Closes any part still open, writes the terminator, flushes and shuts
    /// the transport down. Returns the transport.
    pub async fn finish(mut self) -> W {
        for part in self.parts.iter_mut().filter(|part| !part.closed) {
            part.buf.extend_from_slice(b"\r\n");
            part.closed = true;
        }
        self.pump().await;

        let terminator = self.boundary.terminator();
        self.send(Bytes::from(terminator)).await;

        self.flush().await;
        if !self.broken {
            if let Err(err) = self.transport.shutdown().await {
                debug!(target: "batch_rpc::response", error = %err, "Transport shutdown failed");
            }
        }

        debug!(
            target: "batch_rpc::response",
            bytes = self.bytes_sent,
            broken = self.broken,
            "Multipart response finished"
        );
        self.transport
    }

    fn part_mut(&mut self, handle: PartHandle) -> Option<&mut Part> {
        self.parts
            .iter_mut()
            .find(|part| part.handle == handle && !part.closed)
    }

    /// Releases finished parts from the front of the queue and flushes the
    /// head when it holds at least a chunk.
    ///
    /// Anything sent is flushed, so a buffered transport still delivers each
    /// part as it completes.
    async fn pump(&mut self) {
        let mut sent = false;
        while let Some(head) = self.parts.front_mut() {
            if head.closed {
                let bytes = head.buf.split().freeze();
                self.parts.pop_front();
                self.send(bytes).await;
                sent = true;
                continue;
            }
            if head.buf.len() >= self.chunk_size {
                let bytes = head.buf.split().freeze();
                self.send(bytes).await;
                sent = true;
            }
            break;
        }
        if sent {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        if self.broken {
            return;
        }
        if let Err(err) = self.transport.flush().await {
            warn!(
                target: "batch_rpc::response",
                error = %err,
                "Transport flush failed, discarding further output"
            );
            self.broken = true;
        }
    }

    async fn send(&mut self, bytes: Bytes) {
        if self.broken || bytes.is_empty() {
            return;
        }
        match self.transport.write_all(&bytes).await {
            Ok(()) => self.bytes_sent += bytes.len() as u64,
            Err(err) => {
                warn!(
                    target: "batch_rpc::response",
                    error = %err,
                    "Transport write failed, discarding further output"
                );
                self.broken = true;
            }
        }
    }
}
