//! In-memory transport.
//!
//! [`MockTransport`] never touches the network. Every `execute` call creates
//! a [`MockTask`] that stays in flight until it is completed explicitly with
//! [`MockTask::complete`], cancelled, or answered by a responder closure
//! installed with [`MockTransport::with_responder`].
//!
//! # Example
//!
//! ```ignore
//! let transport = Arc::new(MockTransport::new());
//! let api = Api::builder("https://api.example.com").transport(transport.clone()).build()?;
//!
//! api.get("/users/42").on_response(|r| println!("{:?}", r.error)).build().send();
//! transport.last_task().unwrap().complete(TransportOutcome::status(404, None));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::{CompletionHandler, TaskHandle, TaskId, Transport, TransportOutcome, TransportTask};
use crate::error::{NetworkError, Result, TransportFailure};
use crate::request::RequestDescriptor;

type Responder = Arc<dyn Fn(&RequestDescriptor) -> Option<TransportOutcome> + Send + Sync>;

struct MockTaskInner {
    id: TaskId,
    request: RequestDescriptor,
    validate_response: bool,
    in_progress: AtomicBool,
    cancel_calls: AtomicUsize,
    handler: Mutex<Option<CompletionHandler>>,
}

/// A manually completed transport task.
#[derive(Clone)]
pub struct MockTask {
    inner: Arc<MockTaskInner>,
}

impl MockTask {
    fn new(request: RequestDescriptor, validate_response: bool, handler: CompletionHandler) -> Self {
        Self {
            inner: Arc::new(MockTaskInner {
                id: TaskId::next(),
                request,
                validate_response,
                in_progress: AtomicBool::new(true),
                cancel_calls: AtomicUsize::new(0),
                handler: Mutex::new(Some(handler)),
            }),
        }
    }

    /// The request this task was created for.
    pub fn request(&self) -> &RequestDescriptor {
        &self.inner.request
    }

    /// Whether the dispatcher asked for response validation.
    pub fn validate_response(&self) -> bool {
        self.inner.validate_response
    }

    /// How many times `cancel()` was called on this task.
    pub fn cancel_calls(&self) -> usize {
        self.inner.cancel_calls.load(Ordering::SeqCst)
    }

    /// Finish the task with `outcome`.
    ///
    /// Returns `false` if the task had already finished.
    pub fn complete(&self, outcome: TransportOutcome) -> bool {
        let handler = self.inner.handler.lock().take();
        match handler {
            Some(handler) => {
                self.inner.in_progress.store(false, Ordering::SeqCst);
                handler(self.inner.id, outcome);
                true
            }
            None => false,
        }
    }
}

impl TransportTask for MockTask {
    fn id(&self) -> TaskId {
        self.inner.id
    }

    fn is_in_progress(&self) -> bool {
        self.inner.in_progress.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.inner.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.complete(TransportOutcome::failure(TransportFailure::Cancelled));
    }
}

impl std::fmt::Debug for MockTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTask")
            .field("id", &self.inner.id)
            .field("request", &self.inner.request.summary())
            .field("in_progress", &self.is_in_progress())
            .finish()
    }
}

/// A transport whose tasks are completed by the host.
#[derive(Default)]
pub struct MockTransport {
    tasks: Mutex<Vec<MockTask>>,
    responder: Option<Responder>,
    reject_next: Mutex<Option<NetworkError>>,
}

impl MockTransport {
    /// Create a transport whose tasks stay in flight until completed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport that answers synchronously, before `execute`
    /// returns, whenever `responder` yields an outcome.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&RequestDescriptor) -> Option<TransportOutcome> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Arc::new(responder)),
            ..Self::default()
        }
    }

    /// Make the next `execute` call fail synchronously with `error`.
    pub fn reject_next(&self, error: NetworkError) {
        *self.reject_next.lock() = Some(error);
    }

    /// Every task created so far, oldest first.
    pub fn tasks(&self) -> Vec<MockTask> {
        self.tasks.lock().clone()
    }

    /// Number of `execute` calls that produced a task.
    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// The most recently created task.
    pub fn last_task(&self) -> Option<MockTask> {
        self.tasks.lock().last().cloned()
    }

    /// Tasks still in flight.
    pub fn pending_tasks(&self) -> Vec<MockTask> {
        self.tasks
            .lock()
            .iter()
            .filter(|task| task.is_in_progress())
            .cloned()
            .collect()
    }
}

impl Transport for MockTransport {
    fn execute(
        &self,
        request: RequestDescriptor,
        validate_response: bool,
        on_complete: CompletionHandler,
    ) -> Result<TaskHandle> {
        if let Some(error) = self.reject_next.lock().take() {
            return Err(error);
        }
        request.url()?;

        let immediate = self.responder.as_ref().and_then(|responder| responder(&request));
        let task = MockTask::new(request, validate_response, on_complete);
        self.tasks.lock().push(task.clone());

        if let Some(outcome) = immediate {
            task.complete(outcome);
        }
        Ok(Arc::new(task))
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("tasks", &self.task_count())
            .field("has_responder", &self.responder.is_some())
            .finish()
    }
}
