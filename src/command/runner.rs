use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::io::AsyncWrite;
use tracing::info;

use crate::command::dispatcher::BatchDispatcher;
use crate::command::errors::{DispatchError, OperationError, RequestError};
use crate::command::parser::parse_request;
use crate::command::types::RequestMeta;
use crate::registry::loader::{AppContext, ModuleLoader};
use crate::shared::config::DispatchConfig;
use crate::shared::response::{Boundary, Emitted, MultipartWriter, PartRelay, ResponseEncoder};

/// Counts reported once a batch has been written out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Set when the request was rejected or a loop-level fault ended the batch
    pub aborted: bool,
}

impl BatchSummary {
    pub fn entries(&self) -> usize {
        self.succeeded + self.failed
    }

    fn record(&mut self, emitted: Emitted) {
        match emitted {
            Emitted::Success => self.succeeded += 1,
            Emitted::Failure => self.failed += 1,
        }
    }
}

/// Drives one request end to end: parse, dispatch every entry in order,
/// encode each result and always terminate the multipart stream.
pub struct BatchRunner<'a> {
    loader: &'a dyn ModuleLoader,
    settings: &'a DispatchConfig,
    app: &'a AppContext,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        loader: &'a dyn ModuleLoader,
        settings: &'a DispatchConfig,
        app: &'a AppContext,
    ) -> Self {
        Self {
            loader,
            settings,
            app,
        }
    }

    /// Runs the batch in `body` and writes the response to `transport`.
    /// Returns the summary along with the transport, already shut down.
    pub async fn run<W>(
        &self,
        body: &[u8],
        meta: &RequestMeta,
        transport: W,
        boundary: Boundary,
    ) -> (BatchSummary, W)
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut encoder = self.encoder(transport, boundary);
        let mut summary = BatchSummary::default();

        let envelope = match parse_request(body, meta) {
            Ok(envelope) => envelope,
            Err(err) => {
                encoder.emit_fault(err).await;
                summary.aborted = true;
                return (summary, encoder.finish().await);
            }
        };

        let (streams, mut relay) = PartRelay::channel();
        let mut dispatcher = BatchDispatcher::new(envelope, self.loader, self.settings, self.app)
            .with_streams(streams);
        loop {
            let step = AssertUnwindSafe(async {
                let next = relay
                    .run_alongside(encoder.writer_mut(), dispatcher.next_entry())
                    .await;
                match next {
                    Some(Ok((id, result))) => {
                        summary.record(encoder.emit(&id, result).await);
                        Ok(true)
                    }
                    Some(Err(fault)) => Err(fault),
                    None => Ok(false),
                }
            })
            .catch_unwind()
            .await;

            let fault = match step {
                Ok(Ok(true)) => continue,
                Ok(Ok(false)) => break,
                Ok(Err(fault)) => fault,
                Err(panic) => DispatchError::from_panic(panic),
            };
            summary.aborted = true;
            encoder.emit_fault(fault.into_failure()).await;
            break;
        }
        // Handlers close before the terminator goes out
        drop(dispatcher);
        relay.drain(encoder.writer_mut()).await;

        info!(
            target: "batch_rpc::dispatch",
            succeeded = summary.succeeded,
            failed = summary.failed,
            aborted = summary.aborted,
            "Batch completed"
        );
        (summary, encoder.finish().await)
    }

    /// Answers a request that never reached the parser, such as a body that
    /// could not be read.
    pub async fn reject<W>(&self, err: RequestError, transport: W, boundary: Boundary) -> W
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut encoder = self.encoder(transport, boundary);
        encoder
            .emit_fault(OperationError::invalid_request(err))
            .await;
        encoder.finish().await
    }

    fn encoder<W>(&self, transport: W, boundary: Boundary) -> ResponseEncoder<W>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let writer = MultipartWriter::with_chunk_size(transport, boundary, self.settings.chunk_size);
        ResponseEncoder::new(writer, self.settings.debug)
    }
}
