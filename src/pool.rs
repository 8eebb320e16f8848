//! Bounded-concurrency coding pool.
//!
//! [`CodingPool`] throttles concurrent invocations of the external
//! compression primitive: at most `capacity` tasks run at once, the overflow
//! queues in FIFO order, and every lifecycle transition (enqueue, dispatch,
//! success, failure, queue-clear) publishes a [`PoolMetrics`] snapshot to
//! subscribers, synchronously with the transition.
//!
//! Tasks are opaque futures; the pool holds nothing but its queue and
//! counters, all serialized under one mutex. Dispatch uses `tokio::spawn`,
//! so a pool must be used from within a tokio runtime.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot, watch};

use crate::transform::TransformError;

/// A deferred unit of work: the primitive invocation to run.
pub type TaskFuture<T> = Pin<Box<dyn Future<Output = Result<T, TransformError>> + Send>>;

/// Counts of task lifecycle states, snapshotted (copied, never referenced
/// live) whenever exposed to observers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Tasks currently running. Never exceeds the configured capacity.
    pub active: usize,
    /// Tasks waiting for a slot.
    pub queued: usize,
    /// Tasks that resolved successfully.
    pub completed: u64,
    /// Tasks that rejected. Failure is isolated per task.
    pub failed: u64,
}

/// Scheduler-level errors.
#[derive(Debug)]
pub enum PoolError {
    /// Pool capacity must be at least 1.
    InvalidCapacity,
    /// The wrapped operation failed; forwarded verbatim from the primitive.
    Task(TransformError),
    /// The task was discarded from the queue before it was dispatched.
    Discarded,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCapacity => write!(f, "Pool capacity must be at least 1"),
            Self::Task(e) => write!(f, "Task failed: {}", e),
            Self::Discarded => write!(f, "Task was discarded before dispatch"),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Task(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransformError> for PoolError {
    fn from(e: TransformError) -> Self {
        Self::Task(e)
    }
}

struct QueuedTask<T> {
    fut: TaskFuture<T>,
    tx: oneshot::Sender<Result<T, TransformError>>,
}

struct Shared<T> {
    capacity: usize,
    queue: VecDeque<QueuedTask<T>>,
    metrics: PoolMetrics,
    /// Tasks that have left the system: completed, failed, or discarded.
    /// Drives `drain` independently of later submissions.
    settled: u64,
    settled_tx: watch::Sender<u64>,
    subscribers: Vec<mpsc::UnboundedSender<PoolMetrics>>,
}

impl<T> Shared<T> {
    fn notify(&mut self) {
        let snapshot = self.metrics;
        self.subscribers.retain(|tx| tx.send(snapshot).is_ok());
    }

    fn settle(&mut self, count: u64) {
        self.settled += count;
        let _ = self.settled_tx.send(self.settled);
    }
}

/// Bounded FIFO scheduler for invocations of the compression primitive.
///
/// Cloning yields another handle to the same pool.
pub struct CodingPool<T> {
    shared: Arc<Mutex<Shared<T>>>,
    settled_rx: watch::Receiver<u64>,
}

impl<T> Clone for CodingPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            settled_rx: self.settled_rx.clone(),
        }
    }
}

impl<T: Send + 'static> CodingPool<T> {
    /// Create a pool running at most `capacity` tasks concurrently.
    pub fn new(capacity: usize) -> Result<Self, PoolError> {
        if capacity < 1 {
            return Err(PoolError::InvalidCapacity);
        }
        let (settled_tx, settled_rx) = watch::channel(0);
        Ok(Self {
            shared: Arc::new(Mutex::new(Shared {
                capacity,
                queue: VecDeque::new(),
                metrics: PoolMetrics::default(),
                settled: 0,
                settled_tx,
                subscribers: Vec::new(),
            })),
            settled_rx,
        })
    }

    /// Submit a task. Never fails synchronously; the returned handle
    /// resolves or rejects exactly once, matching the wrapped operation's
    /// outcome. Dispatch is immediate when a slot is free, otherwise the
    /// task queues in FIFO order. The queue is unbounded; backpressure is
    /// advisory via [`metrics`](Self::metrics).
    pub fn submit<F>(&self, task: F) -> TaskHandle<T>
    where
        F: Future<Output = Result<T, TransformError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let task = QueuedTask {
            fut: Box::pin(task),
            tx,
        };

        let dispatch_now = {
            let mut shared = self.shared.lock().unwrap();
            if shared.metrics.active < shared.capacity {
                shared.metrics.active += 1;
                shared.notify();
                Some(task)
            } else {
                shared.queue.push_back(task);
                shared.metrics.queued += 1;
                shared.notify();
                None
            }
        };
        if let Some(task) = dispatch_now {
            run_task(Arc::clone(&self.shared), task);
        }
        TaskHandle { rx }
    }

    /// Copied metrics snapshot.
    pub fn metrics(&self) -> PoolMetrics {
        self.shared.lock().unwrap().metrics
    }

    /// Discard every not-yet-dispatched task, returning how many were
    /// dropped. Their handles reject with [`PoolError::Discarded`]; active
    /// tasks are unaffected.
    pub fn clear_queue(&self) -> usize {
        let mut shared = self.shared.lock().unwrap();
        let discarded = shared.queue.len();
        if discarded > 0 {
            // dropping the queue drops each task's sender, rejecting its handle
            shared.queue.clear();
            shared.metrics.queued = 0;
            shared.settle(discarded as u64);
            shared.notify();
        }
        discarded
    }

    /// Wait until every task active or queued at the moment of the call has
    /// settled. Tasks submitted afterwards are not waited for.
    pub async fn drain(&self) {
        let target = {
            let shared = self.shared.lock().unwrap();
            shared.settled + (shared.metrics.active + shared.metrics.queued) as u64
        };
        let mut rx = self.settled_rx.clone();
        while *rx.borrow() < target {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Subscribe to lifecycle notifications: one [`PoolMetrics`] snapshot
    /// per state transition, in transition order. Dropped receivers are
    /// pruned on the next notification.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PoolMetrics> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.lock().unwrap().subscribers.push(tx);
        rx
    }
}

/// Run a dispatched task to completion, then keep draining the queue from
/// the same spawned task: whenever an active task finishes, the next queued
/// task (if any) takes its slot.
fn run_task<T: Send + 'static>(shared: Arc<Mutex<Shared<T>>>, task: QueuedTask<T>) {
    tokio::spawn(async move {
        let mut task = task;
        loop {
            let result = task.fut.await;
            let next = {
                let mut shared = shared.lock().unwrap();
                shared.metrics.active -= 1;
                match &result {
                    Ok(_) => shared.metrics.completed += 1,
                    Err(_) => shared.metrics.failed += 1,
                }
                shared.settle(1);
                shared.notify();

                let next = shared.queue.pop_front();
                if next.is_some() {
                    shared.metrics.queued -= 1;
                    shared.metrics.active += 1;
                    shared.notify();
                }
                next
            };
            // the caller may have dropped the handle; that is not an error
            let _ = task.tx.send(result);
            match next {
                Some(n) => task = n,
                None => break,
            }
        }
    });
}

/// Eventual result of a submitted task.
///
/// Resolves with the task's output, or rejects with the task's
/// [`TransformError`] (as [`PoolError::Task`]) or [`PoolError::Discarded`]
/// when the task was cleared from the queue before running.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, TransformError>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, PoolError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(Ok(value))) => Poll::Ready(Ok(value)),
            Poll::Ready(Ok(Err(e))) => Poll::Ready(Err(PoolError::Task(e))),
            Poll::Ready(Err(_)) => Poll::Ready(Err(PoolError::Discarded)),
            Poll::Pending => Poll::Pending,
        }
    }
}
