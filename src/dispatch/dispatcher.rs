use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Wake, Waker};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::tracker::{Barrier, CompletionTracker};
use crate::error::{IngestError, Result};

/// Number of declared priority levels.
pub const PRIORITY_LEVELS: usize = 3;

/// Priority lanes, lowest first. Workers service higher levels first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Background = 0,
    Analyze = 1,
    Upload = 2,
}

impl Priority {
    pub fn level(self) -> usize {
        self as usize
    }
}

/// Nesting depth of the caller, threaded explicitly through every submission.
///
/// Work submitted with a context obtained from inside a running item lands in
/// the nested lane of its priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchContext {
    depth: u32,
}

impl DispatchContext {
    pub fn root() -> Self {
        Self { depth: 0 }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_nested(&self) -> bool {
        self.depth > 0
    }

    pub fn child(&self) -> Self {
        Self {
            depth: self.depth.saturating_add(1),
        }
    }
}

fn lane_index(priority: Priority, ctx: &DispatchContext) -> usize {
    priority.level() * 2 + usize::from(ctx.is_nested())
}

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Task {
    lane: usize,
    future: Mutex<Option<BoxFuture>>,
    scheduled: AtomicBool,
    shared: Weak<Shared>,
}

impl Task {
    fn schedule(self: &Arc<Self>) {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.push(self.clone());
        }
    }

    fn run(self: Arc<Self>) {
        self.scheduled.store(false, Ordering::Release);
        let mut slot = self.future.lock();
        let Some(future) = slot.as_mut() else {
            return;
        };
        let waker = Waker::from(self.clone());
        let mut cx = Context::from_waker(&waker);
        if future.as_mut().poll(&mut cx).is_ready() {
            *slot = None;
        }
    }
}

impl Wake for Task {
    fn wake(self: Arc<Self>) {
        self.schedule();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.schedule();
    }
}

struct Shared {
    lanes: Mutex<Vec<VecDeque<Arc<Task>>>>,
    available: Condvar,
    shutdown: AtomicBool,
    tracker: Arc<CompletionTracker>,
}

impl Shared {
    fn push(&self, task: Arc<Task>) {
        if self.shutdown.load(Ordering::Acquire) {
            return;
        }
        let mut lanes = self.lanes.lock();
        lanes[task.lane].push_back(task);
        drop(lanes);
        self.available.notify_one();
    }

    /// Blocks until a task is available, scanning lanes from the highest index.
    fn next(&self) -> Option<Arc<Task>> {
        let mut lanes = self.lanes.lock();
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }
            if let Some(task) = lanes.iter_mut().rev().find_map(|lane| lane.pop_front()) {
                return Some(task);
            }
            self.available.wait(&mut lanes);
        }
    }
}

/// Reports completion to the tracker however the item ends, including when
/// its future is dropped without ever finishing.
struct CompletionGuard(Arc<CompletionTracker>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.0.on_complete();
    }
}

/// Polls the inner future, turning a panic into an error message.
struct CatchUnwind<F> {
    inner: Pin<Box<F>>,
}

impl<F: Future> Future for CatchUnwind<F> {
    type Output = std::result::Result<F::Output, String>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = self.inner.as_mut();
        match catch_unwind(AssertUnwindSafe(move || inner.poll(cx))) {
            Ok(Poll::Ready(value)) => Poll::Ready(Ok(value)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => Poll::Ready(Err(panic_message(payload))),
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Future for the result of a dispatched item.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    fn ready(result: Result<T>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(IngestError::DispatcherShutdown)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Bounded-parallelism executor with priority lanes.
///
/// Items are futures polled by a fixed pool of worker threads. An item that
/// awaits something yields its worker; when woken it is re-queued into its own
/// lane. Nested items are serviced before non-nested items of equal priority,
/// so an outer item waiting on work it spawned cannot starve that work.
pub struct TaskDispatcher {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskDispatcher {
    /// Host CPU count + 2.
    pub fn default_parallelism() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            + 2
    }

    pub fn new(max_parallelism: usize) -> Result<Self> {
        let shared = Arc::new(Shared {
            lanes: Mutex::new((0..PRIORITY_LEVELS * 2).map(|_| VecDeque::new()).collect()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            tracker: Arc::new(CompletionTracker::new()),
        });

        let runtime = tokio::runtime::Handle::try_current().ok();
        let worker_count = max_parallelism.max(1);
        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let shared = shared.clone();
            let runtime = runtime.clone();
            let handle = std::thread::Builder::new()
                .name(format!("ingest-dispatch-{}", index))
                .spawn(move || {
                    let _enter = runtime.as_ref().map(|rt| rt.enter());
                    worker_loop(shared, index);
                })?;
            workers.push(handle);
        }

        tracing::debug!(workers = worker_count, "TaskDispatcher started");
        Ok(Self { shared, workers })
    }

    pub fn with_default_parallelism() -> Result<Self> {
        Self::new(Self::default_parallelism())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Submits an asynchronous operation.
    ///
    /// `work` receives the context to use for anything it submits in turn.
    pub fn submit<F, Fut, T>(&self, ctx: &DispatchContext, priority: Priority, work: F) -> TaskHandle<T>
    where
        F: FnOnce(DispatchContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return TaskHandle::ready(Err(IngestError::DispatcherShutdown));
        }

        let child = ctx.child();
        let (tx, rx) = oneshot::channel();
        self.shared.tracker.on_start();
        let guard = CompletionGuard(self.shared.tracker.clone());

        let item = async move {
            let _guard = guard;
            let inner = CatchUnwind {
                inner: Box::pin(async move { work(child).await }),
            };
            let outcome = match inner.await {
                Ok(result) => result,
                Err(message) => {
                    tracing::error!(panic = %message, "dispatched item panicked");
                    Err(IngestError::TaskPanicked(message))
                }
            };
            let _ = tx.send(outcome);
        };

        let task = Arc::new(Task {
            lane: lane_index(priority, ctx),
            future: Mutex::new(Some(Box::pin(item))),
            scheduled: AtomicBool::new(false),
            shared: Arc::downgrade(&self.shared),
        });
        task.schedule();

        TaskHandle { rx }
    }

    /// Submits a synchronous action.
    pub fn run<F, T>(&self, ctx: &DispatchContext, priority: Priority, action: F) -> TaskHandle<T>
    where
        F: FnOnce(DispatchContext) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(ctx, priority, move |child| async move { action(child) })
    }

    /// Submits an operation that resolves as canceled once `token` fires.
    ///
    /// Only this item's handle observes the cancellation.
    pub fn submit_cancellable<F, Fut, T>(
        &self,
        ctx: &DispatchContext,
        priority: Priority,
        token: CancellationToken,
        work: F,
    ) -> TaskHandle<T>
    where
        F: FnOnce(DispatchContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(ctx, priority, move |child| async move {
            if token.is_cancelled() {
                return Err(IngestError::Canceled);
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(IngestError::Canceled),
                result = work(child) => result,
            }
        })
    }

    pub fn pending(&self) -> usize {
        self.shared.tracker.pending()
    }

    /// Drain future for everything submitted so far, including anything those
    /// submissions go on to submit.
    pub fn barrier(&self) -> Barrier {
        self.shared.tracker.barrier()
    }

    pub async fn drain(&self) {
        self.barrier().wait().await;
    }
}

fn worker_loop(shared: Arc<Shared>, index: usize) {
    tracing::debug!(worker = index, "dispatch worker started");
    while let Some(task) = shared.next() {
        task.run();
    }
    tracing::debug!(worker = index, "dispatch worker stopped");
}

impl Drop for TaskDispatcher {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        let abandoned: Vec<Arc<Task>> = {
            let mut lanes = self.shared.lanes.lock();
            lanes.iter_mut().flat_map(|lane| lane.drain(..)).collect()
        };
        self.shared.available.notify_all();
        for task in abandoned {
            task.future.lock().take();
        }

        let current = std::thread::current().id();
        for worker in self.workers.drain(..) {
            if worker.thread().id() != current {
                let _ = worker.join();
            }
        }
    }
}
