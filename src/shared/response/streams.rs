use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use serde::Serialize;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::shared::response::{JSON_MIME, MultipartWriter, PartHandle, TEXT_MIME};

/// Names a part opened through a [`PartSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(u64);

#[derive(Debug)]
pub enum PartCommand {
    Open { stream: StreamId, mime: &'static str },
    Write { stream: StreamId, bytes: Bytes },
    Close { stream: StreamId },
}

/// Handle modules use to write parts of their own into the response.
///
/// Commands are queued in call order. A part opened while an entry runs goes
/// out ahead of that entry's result; if it is still open when the result is
/// written, the result waits behind it. Parts left open are closed when the
/// response ends.
#[derive(Clone)]
pub struct PartSink {
    tx: mpsc::UnboundedSender<PartCommand>,
    next_stream: Arc<AtomicU64>,
}

impl PartSink {
    /// A sink attached to no response. Everything written is discarded.
    pub fn detached() -> Self {
        let (tx, _) = mpsc::unbounded_channel();
        Self {
            tx,
            next_stream: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn open_text(&self) -> StreamId {
        self.open(TEXT_MIME)
    }

    pub fn open_json(&self) -> StreamId {
        self.open(JSON_MIME)
    }

    pub fn print(&self, stream: StreamId, bytes: impl Into<Bytes>) {
        self.send(PartCommand::Write {
            stream,
            bytes: bytes.into(),
        });
    }

    /// `printf`-style write, e.g. `sink.printf(id, format_args!("{n} rows"))`.
    pub fn printf(&self, stream: StreamId, args: fmt::Arguments<'_>) {
        self.print(stream, args.to_string());
    }

    pub fn print_json<T: Serialize>(&self, stream: StreamId, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.print(stream, bytes),
            Err(err) => {
                warn!(target: "batch_rpc::response", ?stream, error = %err, "Value dropped: not encodable");
            }
        }
    }

    pub fn close(&self, stream: StreamId) {
        self.send(PartCommand::Close { stream });
    }

    pub fn is_attached(&self) -> bool {
        !self.tx.is_closed()
    }

    fn open(&self, mime: &'static str) -> StreamId {
        let stream = StreamId(self.next_stream.fetch_add(1, Ordering::Relaxed));
        self.send(PartCommand::Open { stream, mime });
        stream
    }

    fn send(&self, command: PartCommand) {
        if self.tx.send(command).is_err() {
            debug!(target: "batch_rpc::response", "Part sink detached, output dropped");
        }
    }
}

impl fmt::Debug for PartSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartSink")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Receiving end of a [`PartSink`]; replays its commands on a writer.
#[derive(Debug)]
pub struct PartRelay {
    rx: mpsc::UnboundedReceiver<PartCommand>,
    open: HashMap<StreamId, PartHandle>,
}

impl PartRelay {
    pub fn channel() -> (PartSink, PartRelay) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = PartSink {
            tx,
            next_stream: Arc::new(AtomicU64::new(0)),
        };
        let relay = PartRelay {
            rx,
            open: HashMap::new(),
        };
        (sink, relay)
    }

    /// Waits for the next command. Pending for as long as a sink is alive
    /// and silent.
    pub async fn recv(&mut self) -> Option<PartCommand> {
        self.rx.recv().await
    }

    pub async fn apply<W>(&mut self, writer: &mut MultipartWriter<W>, command: PartCommand)
    where
        W: AsyncWrite + Unpin + Send,
    {
        match command {
            PartCommand::Open { stream, mime } => {
                let handle = writer.open_part(mime).await;
                self.open.insert(stream, handle);
            }
            PartCommand::Write { stream, bytes } => match self.open.get(&stream) {
                Some(handle) => writer.write(*handle, &bytes).await,
                None => {
                    warn!(target: "batch_rpc::response", ?stream, "Write to a stream that is not open");
                }
            },
            PartCommand::Close { stream } => match self.open.remove(&stream) {
                Some(handle) => writer.close_part(handle).await,
                None => {
                    warn!(target: "batch_rpc::response", ?stream, "Close of a stream that is not open");
                }
            },
        }
    }

    /// Drives `work` to completion, applying commands as they arrive, then
    /// applies whatever is still queued.
    pub async fn run_alongside<W, F>(&mut self, writer: &mut MultipartWriter<W>, work: F) -> F::Output
    where
        W: AsyncWrite + Unpin + Send,
        F: Future,
    {
        tokio::pin!(work);
        let output = loop {
            tokio::select! {
                biased;
                output = &mut work => break output,
                Some(command) = self.rx.recv() => self.apply(writer, command).await,
            }
        };
        self.drain(writer).await;
        output
    }

    /// Applies every command queued so far.
    pub async fn drain<W>(&mut self, writer: &mut MultipartWriter<W>)
    where
        W: AsyncWrite + Unpin + Send,
    {
        while let Ok(command) = self.rx.try_recv() {
            self.apply(writer, command).await;
        }
    }
}
