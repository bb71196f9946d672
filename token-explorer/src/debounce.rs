//! Keyed single-shot timers that coalesce bursts of edits
//!
//! Scheduling under a key aborts whatever was pending under that key, so only
//! the most recent action registered before the timer fires ever runs. Each
//! schedule is numbered so that a firing already queued by the time a newer
//! schedule replaces it can be recognised and ignored.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

struct Armed {
    seq: u64,
    handle: JoinHandle<()>,
}

pub struct Debouncer<K> {
    pending: HashMap<K, Armed>,
    next_seq: u64,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Copy + std::fmt::Debug,
{
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Cancel anything pending under `key` and run `action(seq)` after `delay`.
    ///
    /// The action receives the sequence number of this schedule; hand it back
    /// to `fire` when the firing is processed. Returns the same number.
    pub fn schedule<F, Fut>(&mut self, key: K, delay: Duration, action: F) -> u64
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if let Some(previous) = self.pending.remove(&key) {
            trace!(?key, seq = previous.seq, "Debounce superseded");
            previous.handle.abort();
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        let action = action(seq);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        });
        self.pending.insert(key, Armed { seq, handle });
        seq
    }

    /// Accept a firing. True only for the latest schedule under `key`, and only once.
    pub fn fire(&mut self, key: K, seq: u64) -> bool {
        match self.pending.get(&key) {
            Some(armed) if armed.seq == seq => {
                self.pending.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Drop the pending action for `key`. Returns false if nothing was armed.
    pub fn cancel(&mut self, key: K) -> bool {
        match self.pending.remove(&key) {
            Some(armed) => {
                armed.handle.abort();
                true
            }
            None => false,
        }
    }
}

impl<K> Default for Debouncer<K>
where
    K: Eq + Hash + Copy + std::fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        for (_, armed) in self.pending.drain() {
            armed.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Key {
        A,
        B,
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_last_action_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = Debouncer::new();

        let first = tx.clone();
        debouncer.schedule(Key::A, Duration::from_millis(500), move |_| async move {
            let _ = first.send("first");
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = tx.clone();
        debouncer.schedule(Key::A, Duration::from_millis(500), move |_| async move {
            let _ = second.send("second");
        });

        assert_eq!(rx.recv().await, Some("second"));
        let more = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(more.is_err(), "superseded action must not run");
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_do_not_interfere() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = Debouncer::new();

        let a = tx.clone();
        debouncer.schedule(Key::A, Duration::from_millis(500), move |_| async move {
            let _ = a.send(Key::A);
        });
        let b = tx.clone();
        debouncer.schedule(Key::B, Duration::from_millis(300), move |_| async move {
            let _ = b.send(Key::B);
        });

        assert_eq!(rx.recv().await, Some(Key::B));
        assert_eq!(rx.recv().await, Some(Key::A));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_accepts_latest_schedule_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = Debouncer::new();

        let first = tx.clone();
        let old = debouncer.schedule(Key::A, Duration::from_millis(10), move |seq| async move {
            let _ = first.send(seq);
        });
        // The firing is already queued when the key is rescheduled
        let queued = rx.recv().await.unwrap();
        assert_eq!(queued, old);

        let second = tx.clone();
        let latest = debouncer.schedule(Key::A, Duration::from_millis(10), move |seq| async move {
            let _ = second.send(seq);
        });
        assert!(!debouncer.fire(Key::A, queued));
        assert_eq!(rx.recv().await, Some(latest));
        assert!(debouncer.fire(Key::A, latest));
        assert!(!debouncer.fire(Key::A, latest));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let mut debouncer = Debouncer::new();

        let a = tx.clone();
        let seq = debouncer.schedule(Key::A, Duration::from_millis(500), move |_| async move {
            let _ = a.send(());
        });
        assert!(debouncer.cancel(Key::A));
        assert!(!debouncer.cancel(Key::A));
        assert!(!debouncer.fire(Key::A, seq));

        let fired = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(fired.is_err());
    }
}
