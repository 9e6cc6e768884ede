//! One in-flight outbound request and the callback interface the owning
//! Request Stream implements to receive its results (see §4.E, "Request
//! task").

use std::rc::Weak;

use bytes::Bytes;
use stellite_core::{Error, RequestId, ResponseDescriptor};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Sink for `Fetcher::append_chunk` on a chunked-upload task.
pub type ChunkSender = UnboundedSender<std::io::Result<Bytes>>;

/// Callbacks a Fetcher delivers for one request, implemented by the owning
/// Request Stream.
///
/// Every method is keyed by `request_id` so a Stream can recognise and drop
/// a stale callback after a cancellation race (see §4.D, "Cancellation").
pub trait FetcherVisitor {
    /// Response headers are available; called at most once.
    fn on_task_header(&mut self, request_id: RequestId, response: ResponseDescriptor);
    /// One chunk of the response body; may be called any number of times
    /// after `on_task_header`.
    fn on_task_stream(&mut self, request_id: RequestId, chunk: Bytes);
    /// The response body is complete; called at most once, after zero or
    /// more `on_task_stream` calls.
    fn on_task_complete(&mut self, request_id: RequestId);
    /// The task failed before or during delivery; no further callbacks for
    /// this `request_id` follow.
    fn on_task_error(&mut self, request_id: RequestId, error: Error);
}

/// Lifecycle of one [`FetcherTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Minted but not yet dispatched to the HTTP client.
    Idle,
    /// Dispatched; awaiting or relaying the backend response.
    Started,
    /// Finished successfully; callbacks delivered.
    Complete,
    /// Cancelled by the caller or by the owning Fetcher's `cancel_all`.
    Cancelled,
}

/// Bookkeeping the Fetcher keeps per in-flight request.
///
/// The visitor handle is weak: if the owning Request Stream (and its
/// Session) is torn down while this task is in flight, upgrading `visitor`
/// fails and the task quietly drops its own results instead of touching
/// freed stream state.
pub struct FetcherTask {
    request_id: RequestId,
    visitor: Weak<std::cell::RefCell<dyn FetcherVisitor>>,
    state: TaskState,
    chunked_upload: bool,
    streaming: bool,
    handle: Option<JoinHandle<()>>,
    chunk_tx: Option<ChunkSender>,
}

impl std::fmt::Debug for FetcherTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetcherTask")
            .field("request_id", &self.request_id)
            .field("state", &self.state)
            .field("chunked_upload", &self.chunked_upload)
            .finish()
    }
}

impl FetcherTask {
    pub(crate) fn new(
        request_id: RequestId,
        visitor: Weak<std::cell::RefCell<dyn FetcherVisitor>>,
        chunked_upload: bool,
        streaming: bool,
    ) -> Self {
        Self {
            request_id,
            visitor,
            state: TaskState::Idle,
            chunked_upload,
            streaming,
            handle: None,
            chunk_tx: None,
        }
    }

    pub(crate) fn set_chunk_sender(&mut self, tx: ChunkSender) {
        self.chunk_tx = Some(tx);
    }

    /// Append a chunk to this task's upload body.
    ///
    /// Returns an error if this task is not a chunked-upload task, or if
    /// `data` is empty on a non-terminal call (see §4.E, "append_chunk").
    pub fn append_chunk(&mut self, data: Bytes, is_last: bool) -> Result<(), Error> {
        if !self.chunked_upload {
            return Err(Error::other("append_chunk called on a non-chunked task"));
        }
        if data.is_empty() && !is_last {
            return Err(Error::other("append_chunk called with an empty non-terminal chunk"));
        }
        let Some(tx) = &self.chunk_tx else {
            return Err(Error::other("chunked task has no open upload channel"));
        };
        if !data.is_empty() {
            let _ = tx.send(Ok(data));
        }
        if is_last {
            self.chunk_tx = None;
        }
        Ok(())
    }

    pub(crate) fn set_handle(&mut self, handle: JoinHandle<()>) {
        self.handle = Some(handle);
        self.state = TaskState::Started;
    }

    pub(crate) fn visitor(&self) -> Weak<std::cell::RefCell<dyn FetcherVisitor>> {
        self.visitor.clone()
    }

    /// The request id this task was minted with.
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Whether this task accepts `append_chunk` calls.
    pub fn is_chunked_upload(&self) -> bool {
        self.chunked_upload
    }

    /// Whether the caller asked for the response body streamed verbatim,
    /// skipping the Fetcher's own gzip/deflate decode (§4.E, "Response
    /// encoding").
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub(crate) fn mark_complete(&mut self) {
        self.state = TaskState::Complete;
    }

    /// Cancel the task: abort its driving future and mark it cancelled. The
    /// visitor is not invoked after this returns.
    pub(crate) fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.state = TaskState::Cancelled;
    }
}
