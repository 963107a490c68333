//! Per-output task queue.
//!
//! Every output id owns a record holding a cancellation token and the tail of its task chain.
//! Tasks for one id run strictly one after another and share the record's token until the
//! output is cancelled; cancelling drops the record so the next enqueue starts a fresh chain.
//! Work can also be deferred until the runtime goes idle.

use crate::lock;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

type Chain = Shared<BoxFuture<'static, ()>>;

struct OutputRecord {
    abort: CancellationToken,
    queue: Chain,
}

struct PendingIdle {
    seq: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct SchedulerState {
    outputs: HashMap<String, OutputRecord>,
    pending_idle: HashMap<String, PendingIdle>,
    next_seq: u64,
}

#[derive(Clone)]
pub struct OutputScheduler {
    state: Arc<Mutex<SchedulerState>>,
    idle: Arc<watch::Sender<u64>>,
    idle_timeout: Duration,
}

impl std::fmt::Debug for OutputScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("OutputScheduler")
            .field("outputs", &state.outputs.len())
            .field("pending_idle", &state.pending_idle.len())
            .finish()
    }
}

impl OutputScheduler {
    pub fn new(idle_timeout: Duration) -> Self {
        let (idle, _rx) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(SchedulerState::default())),
            idle: Arc::new(idle),
            idle_timeout,
        }
    }

    /// Queue `action` for output `id`.
    ///
    /// With no record for `id` the action starts right away. Otherwise it runs after the
    /// record's previous tasks, and only if the output has not been cancelled by then.
    /// Any idle-deferred request for `id` is dropped.
    pub fn enqueue<F, Fut>(&self, id: &str, action: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = lock(&self.state);
        if let Some(pending) = state.pending_idle.remove(id) {
            pending.cancel.cancel();
        }

        let chain = match state.outputs.get_mut(id) {
            None => {
                let abort = CancellationToken::new();
                let chain = action(abort.clone()).boxed().shared();
                state.outputs.insert(
                    id.to_string(),
                    OutputRecord {
                        abort,
                        queue: chain.clone(),
                    },
                );
                chain
            }
            Some(record) => {
                let previous = record.queue.clone();
                let abort = record.abort.clone();
                let chain = async move {
                    previous.await;
                    if !abort.is_cancelled() {
                        action(abort).await;
                    }
                }
                .boxed()
                .shared();
                record.queue = chain.clone();
                chain
            }
        };
        drop(state);

        tokio::spawn(chain);
    }

    /// Queue `action` for output `id` once the runtime is idle (or the idle timeout passes).
    /// A later request for the same id replaces this one.
    pub fn enqueue_idle<F, Fut>(&self, id: &str, action: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let seq = {
            let mut state = lock(&self.state);
            state.next_seq += 1;
            let seq = state.next_seq;
            if let Some(previous) = state.pending_idle.insert(
                id.to_string(),
                PendingIdle {
                    seq,
                    cancel: cancel.clone(),
                },
            ) {
                previous.cancel.cancel();
            }
            seq
        };

        let mut idle_rx = self.idle.subscribe();
        let timeout = self.idle_timeout;
        let scheduler = self.clone();
        let id = id.to_string();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = idle_rx.changed() => {}
                _ = tokio::time::sleep(timeout) => {}
            }

            {
                let mut state = lock(&scheduler.state);
                match state.pending_idle.get(&id) {
                    Some(pending) if pending.seq == seq => {
                        state.pending_idle.remove(&id);
                    }
                    _ => return,
                }
            }
            scheduler.enqueue(&id, action);
        });
    }

    /// Signal that the runtime has no more queued work.
    pub fn notify_idle(&self) {
        self.idle.send_modify(|n| *n = n.wrapping_add(1));
    }

    /// Abort the in-flight and queued work of output `id` and forget its record.
    pub fn cancel_output(&self, id: &str) {
        let mut state = lock(&self.state);
        if let Some(pending) = state.pending_idle.remove(id) {
            pending.cancel.cancel();
        }
        if let Some(record) = state.outputs.remove(id) {
            log::debug!("Output[{id}]: cancelled");
            record.abort.cancel();
        }
    }

    pub fn cancel_all(&self) {
        let mut state = lock(&self.state);
        for (_, pending) in state.pending_idle.drain() {
            pending.cancel.cancel();
        }
        for (_, record) in state.outputs.drain() {
            record.abort.cancel();
        }
    }

    pub fn has_record(&self, id: &str) -> bool {
        lock(&self.state).outputs.contains_key(id)
    }

    pub fn has_pending_idle(&self, id: &str) -> bool {
        lock(&self.state).pending_idle.contains_key(id)
    }
}

impl Default for OutputScheduler {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    type Log = Arc<Mutex<Vec<String>>>;

    fn push(log: &Log, s: impl Into<String>) {
        lock(log).push(s.into());
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn tasks_for_one_output_run_in_order() {
        let sched = OutputScheduler::default();
        let log: Log = Default::default();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let l = log.clone();
        sched.enqueue("o1", move |_| async move {
            push(&l, "first:start");
            let _ = release_rx.await;
            push(&l, "first:end");
        });
        let l = log.clone();
        sched.enqueue("o1", move |_| async move { push(&l, "second") });

        settle().await;
        assert_eq!(*lock(&log), vec!["first:start"]);

        release_tx.send(()).unwrap();
        settle().await;
        assert_eq!(*lock(&log), vec!["first:start", "first:end", "second"]);
    }

    #[tokio::test]
    async fn cancel_output_signals_and_skips_queued_work() {
        let sched = OutputScheduler::default();
        let log: Log = Default::default();
        let (seen_tx, seen_rx) = oneshot::channel::<bool>();

        sched.enqueue("o1", move |signal| async move {
            signal.cancelled().await;
            let _ = seen_tx.send(signal.is_cancelled());
        });
        let l = log.clone();
        sched.enqueue("o1", move |_| async move { push(&l, "queued") });

        settle().await;
        sched.cancel_output("o1");
        assert!(seen_rx.await.unwrap());
        settle().await;
        assert!(lock(&log).is_empty());
        assert!(!sched.has_record("o1"));

        let l = log.clone();
        sched.enqueue("o1", move |signal| async move {
            assert!(!signal.is_cancelled());
            push(&l, "fresh");
        });
        settle().await;
        assert_eq!(*lock(&log), vec!["fresh"]);
    }

    #[tokio::test]
    async fn cancelling_a_settled_output_leaves_the_next_task_alone() {
        let sched = OutputScheduler::default();
        let log: Log = Default::default();

        let l = log.clone();
        sched.enqueue("o1", move |_| async move { push(&l, "done") });
        settle().await;
        assert_eq!(*lock(&log), vec!["done"]);

        sched.cancel_output("o1");
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let l = log.clone();
        sched.enqueue("o1", move |signal| async move {
            let _ = release_rx.await;
            push(&l, if signal.is_cancelled() { "fresh:cancelled" } else { "fresh" });
        });
        settle().await;
        sched.cancel_output("other");
        release_tx.send(()).unwrap();
        settle().await;

        assert_eq!(*lock(&log), vec!["done", "fresh"]);
        assert!(sched.has_record("o1"));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_work_waits_for_idle_signal() {
        let sched = OutputScheduler::new(Duration::from_secs(10));
        let log: Log = Default::default();

        let l = log.clone();
        sched.enqueue_idle("o1", move |_| async move { push(&l, "idle") });
        settle().await;
        assert!(lock(&log).is_empty());
        assert!(sched.has_pending_idle("o1"));

        sched.notify_idle();
        settle().await;
        assert_eq!(*lock(&log), vec!["idle"]);
        assert!(!sched.has_pending_idle("o1"));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_work_runs_after_timeout() {
        let sched = OutputScheduler::new(Duration::from_millis(100));
        let log: Log = Default::default();

        let l = log.clone();
        sched.enqueue_idle("o1", move |_| async move { push(&l, "idle") });
        tokio::time::sleep(Duration::from_millis(150)).await;
        settle().await;
        assert_eq!(*lock(&log), vec!["idle"]);
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_supersedes_pending_idle_request() {
        let sched = OutputScheduler::default();
        let log: Log = Default::default();

        let l = log.clone();
        sched.enqueue_idle("o1", move |_| async move { push(&l, "idle") });
        let l = log.clone();
        sched.enqueue("o1", move |_| async move { push(&l, "now") });

        sched.notify_idle();
        tokio::time::sleep(Duration::from_millis(200)).await;
        settle().await;
        assert_eq!(*lock(&log), vec!["now"]);
    }

    #[tokio::test]
    async fn cancel_all_clears_everything() {
        let sched = OutputScheduler::default();
        let (tx, rx) = oneshot::channel::<()>();
        sched.enqueue("a", move |signal| async move {
            signal.cancelled().await;
            let _ = tx.send(());
        });
        sched.enqueue_idle("b", |_| async {});

        settle().await;
        sched.cancel_all();
        rx.await.unwrap();
        assert!(!sched.has_record("a"));
        assert!(!sched.has_pending_idle("b"));
    }
}
