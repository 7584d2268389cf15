//! Bounded task groups and run-level cancellation shared by the capture and
//! publication phases.

use std::{future::Future, num::NonZeroUsize};

use futures::{Stream, StreamExt, TryStreamExt, stream};
use tokio::sync::watch;

/// Runs work items with at most `limit` of them in flight.
#[derive(Debug, Clone, Copy)]
pub struct BoundedPool {
    limit: NonZeroUsize,
}

impl BoundedPool {
    pub fn new(limit: NonZeroUsize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit.get()
    }

    /// Fail-fast: resolves with the first error. In-flight items are dropped
    /// at that point and queued items never start.
    pub async fn try_run<I, F, Fut, T, E>(&self, items: I, work: F) -> Result<Vec<T>, E>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        stream::iter(items)
            .map(work)
            .buffer_unordered(self.limit.get())
            .try_collect()
            .await
    }

    /// Collect-all: every item runs to completion regardless of sibling
    /// outcomes. Outputs arrive in completion order.
    pub fn run_all<I, F, Fut>(&self, items: I, work: F) -> impl Stream<Item = Fut::Output>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future,
    {
        stream::iter(items).map(work).buffer_unordered(self.limit.get())
    }
}

/// Create a linked cancel handle and signal.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (sender, receiver) = watch::channel(false);
    (CancelHandle { sender }, CancelSignal { receiver })
}

#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::never()
    }
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_sender, receiver) = watch::channel(false);
        Self { receiver }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Run `work` unless cancellation wins the race, in which case `work` is
    /// dropped and `None` is returned.
    pub async fn guard<F: Future>(&self, work: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            () = self.cancelled() => None,
            output = work => Some(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
        started: AtomicUsize,
    }

    impl Gauge {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                started: AtomicUsize::new(0),
            })
        }

        async fn hold(&self, duration: Duration) {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(duration).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn pool(limit: usize) -> BoundedPool {
        BoundedPool::new(NonZeroUsize::new(limit).expect("non-zero"))
    }

    #[tokio::test]
    async fn collect_all_never_exceeds_the_limit() {
        let gauge = Gauge::new();
        let outputs: Vec<usize> = pool(3)
            .run_all(0..12, |n| {
                let gauge = gauge.clone();
                async move {
                    gauge.hold(Duration::from_millis(10)).await;
                    n
                }
            })
            .collect()
            .await;

        assert_eq!(outputs.len(), 12);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 3);
        assert!(gauge.peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn fail_fast_stops_queued_items() {
        let gauge = Gauge::new();
        let result: Result<Vec<usize>, String> = pool(1)
            .try_run(0..10, |n| {
                let gauge = gauge.clone();
                async move {
                    gauge.hold(Duration::from_millis(1)).await;
                    if n == 2 { Err(format!("item {n}")) } else { Ok(n) }
                }
            })
            .await;

        assert_eq!(result, Err("item 2".to_string()));
        assert_eq!(gauge.started.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fail_fast_returns_every_output_on_success() {
        let mut outputs = pool(4)
            .try_run(1..=5, |n| async move { Ok::<_, ()>(n * 10) })
            .await
            .expect("all succeed");
        outputs.sort_unstable();
        assert_eq!(outputs, vec![10, 20, 30, 40, 50]);
    }

    #[tokio::test]
    async fn guard_yields_none_after_cancel() {
        let (handle, signal) = cancellation();
        handle.cancel();

        let output = signal.guard(async { 42 }).await;
        assert_eq!(output, None);
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_interrupts_pending_work() {
        let (handle, signal) = cancellation();
        let task = tokio::spawn(async move {
            signal
                .guard(tokio::time::sleep(Duration::from_secs(60)))
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();

        let output = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("guard resolves promptly")
            .expect("task joins");
        assert!(output.is_none());
    }

    #[tokio::test]
    async fn never_signal_lets_work_finish() {
        let signal = CancelSignal::never();
        assert_eq!(signal.guard(async { "done" }).await, Some("done"));
    }
}
