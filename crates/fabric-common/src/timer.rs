//! One-shot, cancellable deferred actions (spec §9 "Deferred work /
//! timers"). The only scheduled future action in the core is the
//! 5-minute duplicate-link close; this is the "scheduled-tasks
//! abstraction" spec.md recommends instead of an ad-hoc
//! `tokio::spawn` + `sleep` at each call site, so a link that closes
//! for another reason first can cancel its pending close.

use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;

pub struct DelayQueue<K> {
    pending: DashMap<K, JoinHandle<()>>,
}

impl<K> Default for DelayQueue<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> DelayQueue<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Schedules `action` to run after `delay`. A prior pending action for
    /// the same key is cancelled first — at most one deferred action per
    /// key is ever outstanding.
    pub fn schedule<F>(&self, key: K, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel(&key);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        });
        self.pending.insert(key, handle);
    }

    /// Cancels a pending action for `key`, if any. Returns whether one was
    /// cancelled.
    pub fn cancel(&self, key: &K) -> bool {
        match self.pending.remove(key) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn scheduled_action_runs_after_delay() {
        let queue: DelayQueue<&'static str> = DelayQueue::new();
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        queue.schedule("a", Duration::from_millis(10), async move {
            ran2.store(true, Ordering::SeqCst);
        });
        assert!(!ran.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancel_prevents_action() {
        let queue: DelayQueue<&'static str> = DelayQueue::new();
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        queue.schedule("a", Duration::from_millis(20), async move {
            ran2.store(true, Ordering::SeqCst);
        });
        assert!(queue.cancel(&"a"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn rescheduling_cancels_prior_action() {
        let queue: DelayQueue<&'static str> = DelayQueue::new();
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        for _ in 0..3 {
            let count2 = count.clone();
            queue.schedule("a", Duration::from_millis(10), async move {
                count2.fetch_add(1, Ordering::SeqCst);
            });
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
