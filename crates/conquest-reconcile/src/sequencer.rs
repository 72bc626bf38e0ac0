//! Task sequencer - one animation timeline, strictly first in, first out.
//!
//! Several producers share the timeline; each gets its own [`TaskHandle`].
//! A task's handle resolves once its effect has finished *and* its planned
//! duration has elapsed since the effect started, so the next task never
//! overlaps the previous one on screen.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, warn};

use crate::error::TaskCancelled;

type Effect = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// A timed unit of presentation work.
pub struct AnimationTask {
    label: &'static str,
    planned: Duration,
    effect: Effect,
}

impl AnimationTask {
    pub fn new<F, Fut>(label: &'static str, planned: Duration, effect: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            label,
            planned,
            effect: Box::new(move || effect().boxed()),
        }
    }

    /// A task with no side effect that only occupies the timeline.
    pub fn pause(planned: Duration) -> Self {
        Self::new("pause", planned, || async { anyhow::Ok(()) })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn planned(&self) -> Duration {
        self.planned
    }
}

impl std::fmt::Debug for AnimationTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationTask")
            .field("label", &self.label)
            .field("planned", &self.planned)
            .finish_non_exhaustive()
    }
}

struct Queued {
    task: AnimationTask,
    generation: u64,
    done: oneshot::Sender<()>,
}

/// Completion of one enqueued task.
///
/// Resolves to `Err(TaskCancelled)` if the timeline was cleared before the
/// task started.
#[derive(Debug)]
pub struct TaskHandle {
    rx: oneshot::Receiver<()>,
}

impl Future for TaskHandle {
    type Output = Result<(), TaskCancelled>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|r| r.map_err(|_| TaskCancelled))
    }
}

/// Handle to the animation timeline. Cheap to clone; all clones feed the
/// same queue.
#[derive(Clone, Debug)]
pub struct TaskSequencer {
    tx: mpsc::UnboundedSender<Queued>,
    generation: Arc<AtomicU64>,
}

impl TaskSequencer {
    /// Start the timeline on the current tokio runtime.
    ///
    /// The drain task exits once every handle has been dropped.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = Arc::new(AtomicU64::new(0));
        tokio::spawn(drain(rx, Arc::clone(&generation)));
        Self { tx, generation }
    }

    /// Append a task to the timeline.
    pub fn enqueue(&self, task: AnimationTask) -> TaskHandle {
        let (done, rx) = oneshot::channel();
        let queued = Queued {
            task,
            generation: self.generation.load(Ordering::Acquire),
            done,
        };
        if self.tx.send(queued).is_err() {
            // Timeline is gone; the dropped sender resolves the handle as cancelled.
            debug!("animation timeline closed; task discarded");
        }
        TaskHandle { rx }
    }

    /// Drop every task that has not started yet. A running task finishes.
    ///
    /// Meant for teardown, not flow control.
    pub fn clear(&self) {
        let previous = self.generation.fetch_add(1, Ordering::AcqRel);
        debug!(generation = previous + 1, "animation timeline cleared");
    }
}

async fn drain(mut rx: mpsc::UnboundedReceiver<Queued>, generation: Arc<AtomicU64>) {
    while let Some(Queued {
        task,
        generation: queued_at,
        done,
    }) = rx.recv().await
    {
        if queued_at != generation.load(Ordering::Acquire) {
            debug!(task = task.label, "skipping cleared animation task");
            continue;
        }

        let started = Instant::now();
        let AnimationTask {
            label,
            planned,
            effect,
        } = task;

        match AssertUnwindSafe(async move { effect().await })
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(task = label, error = %err, "animation effect failed"),
            Err(_) => error!(task = label, "animation effect panicked"),
        }

        sleep_until(started + planned).await;
        let _ = done.send(());
    }
    debug!("animation timeline stopped");
}
