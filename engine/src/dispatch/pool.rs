use super::task::{
    Stage,
    Task,
    TaskResult,
};
use crate::{
    connection_pool::ConnectionPool,
    error::{
        EngineError,
        Result,
    },
    source::StatsSource,
};
use futures::{
    future::BoxFuture,
    FutureExt as _,
};
use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{
            AtomicBool,
            AtomicUsize,
            Ordering,
        },
        Arc,
    },
};
use tokio::sync::{
    mpsc::{
        self,
        error::TrySendError,
    },
    Mutex,
    Notify,
};
use tokio_util::{
    sync::CancellationToken,
    task::TaskTracker,
};
use tracing::Instrument as _;

/// Runs one stage of a task on a worker.
pub trait TaskHandler: Send + Sync + 'static {
    fn handle(&self, stage: Stage, ctx: TaskContext) -> BoxFuture<'_, TaskResult>;
}

/// What a handler gets next to the task itself.
#[derive(Clone)]
pub struct TaskContext {
    pub worker: usize,
    /// Whether a caller waits for this task's result.
    pub awaited: bool,
    /// The session owned by this worker for the duration of the task.
    pub session: Arc<dyn StatsSource>,
    /// For chaining follow-up stages. Handlers must use
    /// [`Submitter::try_submit`], never wait for queue capacity.
    pub submitter: Submitter,
}

#[derive(Debug, Default)]
struct PoolState {
    stopped: AtomicBool,
    /// Submitted tasks that have not finished yet, queued or running.
    pending: AtomicUsize,
    /// Tasks whose handler panicked.
    panicked: AtomicUsize,
    idle: Notify,
}

impl PoolState {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Registers a submission. Fails, without registering, once stopped.
    fn begin(&self) -> bool {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.is_stopped() {
            self.finish_one();
            return false;
        }
        true
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Cloneable handle for putting tasks on the queue.
#[derive(Clone)]
pub struct Submitter {
    queue: mpsc::Sender<Task>,
    state: Arc<PoolState>,
}

impl Submitter {
    /// Waits for queue capacity. Not for use from inside a handler.
    pub async fn submit(&self, task: Task) -> Result<()> {
        if !self.state.begin() {
            task.reject();
            return Err(EngineError::PoolStopped);
        }
        match self.queue.send(task).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(task)) => {
                self.state.finish_one();
                task.reject();
                Err(EngineError::PoolStopped)
            }
        }
    }

    /// Enqueues a follow-up stage without waiting. Meant for handlers: it is
    /// still accepted while a stopped pool drains, so records already in the
    /// pipeline finish their journey. A full queue rejects the task.
    pub fn try_submit(&self, task: Task) -> Result<()> {
        self.state.pending.fetch_add(1, Ordering::SeqCst);
        match self.queue.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(task)) => {
                self.state.finish_one();
                task.reject();
                Err(EngineError::QueueFull)
            }
            Err(TrySendError::Closed(task)) => {
                self.state.finish_one();
                task.reject();
                Err(EngineError::PoolStopped)
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state.is_stopped()
    }
}

/// Fixed set of workers, one per API session, draining a bounded queue.
pub struct DispatchPool {
    instance: String,
    submitter: Submitter,
    state: Arc<PoolState>,
    cancel: CancellationToken,
    workers: TaskTracker,
}

impl DispatchPool {
    pub fn start(
        instance: impl Into<String>,
        queue_size: usize,
        connections: &ConnectionPool,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        let instance = instance.into();
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let queue = Arc::new(Mutex::new(rx));
        let state = Arc::new(PoolState::default());
        let submitter = Submitter {
            queue: tx,
            state: state.clone(),
        };
        let cancel = CancellationToken::new();
        let workers = TaskTracker::new();

        for (worker, session) in connections.sessions().iter().enumerate() {
            let ctx = TaskContext {
                worker,
                awaited: false,
                session: session.clone(),
                submitter: submitter.clone(),
            };
            let span = info_span!("worker", instance = %instance, worker);
            workers.spawn(
                run_worker(queue.clone(), handler.clone(), ctx, state.clone(), cancel.clone()).instrument(span),
            );
        }
        workers.close();
        info!(%instance, workers = connections.len(), queue_size, "dispatch pool started");

        Self {
            instance,
            submitter,
            state,
            cancel,
            workers,
        }
    }

    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    pub async fn submit(&self, task: Task) -> Result<()> {
        self.submitter.submit(task).await
    }

    /// Rejects every further external submission. Queued and running tasks
    /// still finish, including the stages they chain.
    pub fn stop(&self) {
        if !self.state.stopped.swap(true, Ordering::SeqCst) {
            info!(instance = %self.instance, "dispatch pool stopping");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state.is_stopped()
    }

    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::SeqCst)
    }

    pub fn panicked(&self) -> usize {
        self.state.panicked.load(Ordering::SeqCst)
    }

    /// Resolves once no submitted task is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.state.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stops the pool, drains the queue and ends the workers. Sessions stay
    /// open; they belong to the connection pool.
    pub async fn shutdown(&self) {
        self.stop();
        self.wait_idle().await;
        self.cancel.cancel();
        self.workers.wait().await;
        info!(instance = %self.instance, "dispatch pool shut down");
    }
}

async fn run_worker(
    queue: Arc<Mutex<mpsc::Receiver<Task>>>,
    handler: Arc<dyn TaskHandler>,
    ctx: TaskContext,
    state: Arc<PoolState>,
    cancel: CancellationToken,
) {
    debug!("worker started");
    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            task = async { queue.lock().await.recv().await } => task,
        };
        let Some(task) = task else {
            break;
        };

        let pending = state.clone();
        defer! {
            pending.finish_one();
        }

        let kind = task.kind();
        let (stage, completion) = task.into_parts();
        let task_ctx = TaskContext {
            awaited: completion.is_awaited(),
            ..ctx.clone()
        };
        trace!(task = %kind, "task started");
        let result = match AssertUnwindSafe(handler.handle(stage, task_ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                state.panicked.fetch_add(1, Ordering::SeqCst);
                error!(task = %kind, panic = panic_message(panic.as_ref()), "task handler panicked");
                TaskResult::Failed
            }
        };
        trace!(task = %kind, success = result.is_success(), "task finished");
        completion.finish(result);
    }
    debug!("worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
