//! Bounded concurrent batch scheduler
//!
//! Batches of work items arrive over time and every item is handed to a
//! handler task, with at most `max_tasks` handlers running at once. A
//! single coordinator task owns the backlog, the outstanding count and the
//! lifecycle; producers, handlers and shutdown callers only talk to it
//! through channels.
//!
//! Two shutdown disciplines exist:
//! - [`BatchScheduler::drain`] finishes every item already submitted
//! - [`BatchScheduler::abandon`] discards the backlog and returns at once,
//!   while handlers that already started run to completion in the background
//!
//! Only the first shutdown request is honored.

use log::{debug, warn};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Order in which backlog items are promoted when a handler finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BacklogOrder {
    /// Oldest backlog item first
    #[default]
    Fifo,
    /// Most recently added backlog item first
    Lifo,
}

/// Coordinator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Running,
    Draining,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownMode {
    Drain,
    Abandon,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("scheduler is shut down, {rejected} items rejected")]
pub struct SubmitError {
    pub rejected: usize,
}

struct Submission<T> {
    batch: Vec<T>,
    accepted: oneshot::Sender<()>,
}

struct Shutdown {
    mode: ShutdownMode,
    done: oneshot::Sender<()>,
}

/// Handle used by producers and shutdown callers
///
/// Dropping the handle without shutting down behaves like
/// [`abandon`](BatchScheduler::abandon).
pub struct BatchScheduler<T> {
    batch_tx: mpsc::Sender<Submission<T>>,
    shutdown_tx: mpsc::Sender<Shutdown>,
    stopping: AtomicBool,
    coordinator: JoinHandle<()>,
}

impl<T: Send + 'static> BatchScheduler<T> {
    /// Starts a scheduler with a FIFO backlog
    pub fn new<F, Fut>(handler: F, max_tasks: usize) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::with_order(handler, max_tasks, BacklogOrder::default())
    }

    /// Starts a scheduler; `max_tasks` is clamped to at least one
    pub fn with_order<F, Fut>(handler: F, max_tasks: usize, order: BacklogOrder) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // A one-slot intake plus the acceptance handshake keeps at most one
        // batch in flight between producer and coordinator.
        let (batch_tx, batch_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let coordinator = Coordinator {
            handler: Arc::new(handler),
            max_tasks: max_tasks.max(1),
            order,
            backlog: VecDeque::new(),
            outstanding: 0,
            lifecycle: Lifecycle::Running,
            intake_open: true,
            drain_waiter: None,
            batch_rx,
            shutdown_rx,
            done_tx,
            done_rx,
        };

        Self {
            batch_tx,
            shutdown_tx,
            stopping: AtomicBool::new(false),
            coordinator: tokio::spawn(coordinator.run()),
        }
    }

    /// Hands a batch to the coordinator
    ///
    /// Returns once the coordinator has dispatched or queued every item.
    pub async fn submit(&self, batch: Vec<T>) -> Result<(), SubmitError> {
        let rejected = batch.len();
        if self.stopping.load(Ordering::Acquire) {
            return Err(SubmitError { rejected });
        }

        let (accepted, ack) = oneshot::channel();
        if self
            .batch_tx
            .send(Submission { batch, accepted })
            .await
            .is_err()
        {
            return Err(SubmitError { rejected });
        }
        ack.await.map_err(|_| SubmitError { rejected })
    }

    /// Waits until every submitted item has been handled
    pub async fn drain(&self) {
        self.shutdown(ShutdownMode::Drain).await;
    }

    /// Discards unstarted items and returns without waiting for running ones
    pub async fn abandon(&self) {
        self.shutdown(ShutdownMode::Abandon).await;
    }

    async fn shutdown(&self, mode: ShutdownMode) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return;
        }

        let (done, wait) = oneshot::channel();
        if self.shutdown_tx.send(Shutdown { mode, done }).await.is_err() {
            return;
        }
        let _ = wait.await;
    }

    /// True once the coordinator task has exited
    pub fn is_finished(&self) -> bool {
        self.coordinator.is_finished()
    }

    /// Waits for the coordinator task itself to exit
    pub async fn join(self) {
        if let Err(e) = self.coordinator.await {
            warn!("Batch coordinator failed: {}", e);
        }
    }
}

/// Notifies the coordinator when a handler task ends, including by panic
struct CompletionGuard(mpsc::UnboundedSender<()>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

struct Coordinator<T, F> {
    handler: Arc<F>,
    max_tasks: usize,
    order: BacklogOrder,

    // Only touched from `run`
    backlog: VecDeque<T>,
    outstanding: usize,
    lifecycle: Lifecycle,
    intake_open: bool,
    drain_waiter: Option<oneshot::Sender<()>>,

    batch_rx: mpsc::Receiver<Submission<T>>,
    shutdown_rx: mpsc::Receiver<Shutdown>,
    done_tx: mpsc::UnboundedSender<()>,
    done_rx: mpsc::UnboundedReceiver<()>,
}

impl<T, F, Fut> Coordinator<T, F>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn run(mut self) {
        while !self.finished() {
            tokio::select! {
                biased;

                Some(()) = self.done_rx.recv() => self.on_task_done(),

                submission = self.batch_rx.recv(), if self.intake_open => match submission {
                    Some(submission) => self.on_submission(submission),
                    None => self.intake_open = false,
                },

                command = self.shutdown_rx.recv(), if self.lifecycle == Lifecycle::Running => {
                    match command {
                        Some(Shutdown { mode, done }) => self.on_shutdown(mode, done),
                        None => {
                            debug!("Scheduler handle dropped, abandoning backlog");
                            self.abandon_backlog();
                        }
                    }
                }
            }
        }

        debug!("Batch coordinator exiting");
    }

    /// Settles a pending drain and reports whether the coordinator may exit
    fn finished(&mut self) -> bool {
        if self.lifecycle == Lifecycle::Draining && self.backlog.is_empty() && self.outstanding == 0
        {
            self.lifecycle = Lifecycle::Terminated;
            if let Some(waiter) = self.drain_waiter.take() {
                let _ = waiter.send(());
            }
        }

        self.lifecycle == Lifecycle::Terminated && self.outstanding == 0
    }

    fn on_submission(&mut self, submission: Submission<T>) {
        let Submission { batch, accepted } = submission;

        if self.lifecycle != Lifecycle::Running {
            warn!("Rejected batch of {} items after shutdown", batch.len());
            return;
        }

        let total = batch.len();
        let mut items = batch.into_iter();
        while self.outstanding < self.max_tasks {
            match items.next() {
                Some(item) => self.dispatch(item),
                None => break,
            }
        }
        self.backlog.extend(items);

        debug!(
            "Accepted batch of {} items: {} running, {} pending",
            total,
            self.outstanding,
            self.backlog.len()
        );
        let _ = accepted.send(());
    }

    fn on_task_done(&mut self) {
        self.outstanding -= 1;

        let next = match self.order {
            BacklogOrder::Fifo => self.backlog.pop_front(),
            BacklogOrder::Lifo => self.backlog.pop_back(),
        };
        if let Some(item) = next {
            self.dispatch(item);
        }
    }

    fn on_shutdown(&mut self, mode: ShutdownMode, done: oneshot::Sender<()>) {
        match mode {
            ShutdownMode::Drain => {
                debug!(
                    "Draining scheduler: {} running, {} pending",
                    self.outstanding,
                    self.backlog.len()
                );
                self.lifecycle = Lifecycle::Draining;
                self.drain_waiter = Some(done);
            }
            ShutdownMode::Abandon => {
                self.abandon_backlog();
                // Nothing left for the caller to wait on; running handlers
                // keep reporting to this task until they finish.
                let _ = done.send(());
            }
        }
    }

    fn abandon_backlog(&mut self) {
        let discarded = self.backlog.len();
        self.backlog.clear();
        self.lifecycle = Lifecycle::Terminated;
        debug!(
            "Abandoned scheduler: discarded {} pending, {} still running",
            discarded, self.outstanding
        );
    }

    fn dispatch(&mut self, item: T) {
        self.outstanding += 1;

        let handler = Arc::clone(&self.handler);
        let guard = CompletionGuard(self.done_tx.clone());
        tokio::spawn(async move {
            let _guard = guard;
            (*handler)(item).await;
        });
    }
}
