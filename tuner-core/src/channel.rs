//! # Analysis Result Channel
//!
//! Hands [`AnalysisResult`]s from the capture thread to the consumer. The
//! producer side never blocks: when the consumer falls behind a bounded
//! channel drops results according to its [`BacklogPolicy`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};

use crate::AnalysisResult;

/// What happens when results arrive faster than the consumer polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacklogPolicy {
    /// Never drop. Only safe when the consumer is known to outpace capture.
    Unbounded,
    /// Keep at most N results, evicting the oldest to admit a new one.
    DropOldest(usize),
    /// Keep at most N results, discarding new ones while full.
    DropNewest(usize),
}

impl Default for BacklogPolicy {
    fn default() -> Self {
        Self::DropOldest(32)
    }
}

impl BacklogPolicy {
    pub fn capacity(&self) -> Option<usize> {
        match *self {
            BacklogPolicy::Unbounded => None,
            BacklogPolicy::DropOldest(capacity) | BacklogPolicy::DropNewest(capacity) => {
                Some(capacity)
            }
        }
    }
}

/// Creates a connected producer/consumer pair.
pub fn result_channel(policy: BacklogPolicy) -> (ResultSender, ResultReceiver) {
    let (tx, rx) = match policy.capacity() {
        Some(capacity) => crossbeam_channel::bounded(capacity.max(1)),
        None => crossbeam_channel::unbounded(),
    };
    let dropped = Arc::new(AtomicU64::new(0));
    let sender = ResultSender {
        tx,
        evict: rx.clone(),
        policy,
        dropped: Arc::clone(&dropped),
    };
    let receiver = ResultReceiver { rx, dropped };
    (sender, receiver)
}

/// Producer side, owned by the capture callback.
#[derive(Debug, Clone)]
pub struct ResultSender {
    tx: Sender<AnalysisResult>,
    // Lets the producer evict the oldest entry under DropOldest
    evict: Receiver<AnalysisResult>,
    policy: BacklogPolicy,
    dropped: Arc<AtomicU64>,
}

impl ResultSender {
    /// Queues `result` without blocking.
    ///
    /// Returns `false` if a result was dropped to make this push fit the
    /// backlog policy (either `result` itself or the oldest queued one).
    pub fn push(&self, result: AnalysisResult) -> bool {
        match self.tx.try_send(result) {
            Ok(()) => true,
            Err(TrySendError::Disconnected(_)) => {
                // Unreachable while `evict` is alive; counted for completeness
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Full(result)) => match self.policy {
                BacklogPolicy::DropOldest(_) => {
                    // The consumer may drain concurrently, so the eviction
                    // can come up empty; retry once either way.
                    let evicted = self.evict.try_recv().is_ok();
                    let accepted = self.tx.try_send(result).is_ok();
                    let lost = u64::from(evicted) + u64::from(!accepted);
                    self.dropped.fetch_add(lost, Ordering::Relaxed);
                    lost == 0
                }
                _ => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    false
                }
            },
        }
    }
}

/// Consumer side, polled by the presentation layer.
#[derive(Debug, Clone)]
pub struct ResultReceiver {
    rx: Receiver<AnalysisResult>,
    dropped: Arc<AtomicU64>,
}

impl ResultReceiver {
    /// Takes the oldest queued result, if any. Never blocks.
    pub fn try_pop(&self) -> Option<AnalysisResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Takes every queued result in FIFO order.
    pub fn drain(&self) -> Vec<AnalysisResult> {
        self.rx.try_iter().collect()
    }

    /// Discards everything queued and returns how many results were dropped.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Results dropped by the backlog policy since the channel was created.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fft::Spectrum;
    use crate::pitch::PitchEstimate;

    fn result(block_index: u64) -> AnalysisResult {
        AnalysisResult {
            block_index,
            pitch: PitchEstimate::SILENT,
            spectrum: Spectrum::default(),
        }
    }

    fn indices(receiver: &ResultReceiver) -> Vec<u64> {
        receiver.drain().into_iter().map(|r| r.block_index).collect()
    }

    #[test]
    fn delivers_in_fifo_order() {
        let (tx, rx) = result_channel(BacklogPolicy::Unbounded);
        for i in 0..100 {
            assert!(tx.push(result(i)));
        }
        assert_eq!(rx.len(), 100);
        assert_eq!(indices(&rx), (0..100).collect::<Vec<_>>());
        assert!(rx.try_pop().is_none());
        assert_eq!(rx.dropped(), 0);
    }

    #[test]
    fn drop_oldest_keeps_the_newest_results() {
        let (tx, rx) = result_channel(BacklogPolicy::DropOldest(3));
        for i in 0..5 {
            tx.push(result(i));
        }
        assert_eq!(indices(&rx), vec![2, 3, 4]);
        assert_eq!(rx.dropped(), 2);
    }

    #[test]
    fn drop_newest_keeps_the_first_results() {
        let (tx, rx) = result_channel(BacklogPolicy::DropNewest(3));
        for i in 0..5 {
            let accepted = tx.push(result(i));
            assert_eq!(accepted, i < 3);
        }
        assert_eq!(indices(&rx), vec![0, 1, 2]);
        assert_eq!(rx.dropped(), 2);
    }

    #[test]
    fn push_never_blocks_when_consumer_is_gone() {
        let (tx, rx) = result_channel(BacklogPolicy::DropOldest(1));
        drop(rx);
        for i in 0..10 {
            tx.push(result(i));
        }
    }

    #[test]
    fn clear_discards_pending() {
        let (tx, rx) = result_channel(BacklogPolicy::default());
        tx.push(result(0));
        tx.push(result(1));
        assert_eq!(rx.clear(), 2);
        assert!(rx.is_empty());
    }

    #[test]
    fn concurrent_producer_and_consumer_preserve_order() {
        let (tx, rx) = result_channel(BacklogPolicy::DropOldest(8));
        let producer = std::thread::spawn(move || {
            for i in 0..2000 {
                tx.push(result(i));
            }
        });

        let mut seen = Vec::new();
        while !producer.is_finished() || !rx.is_empty() {
            if let Some(r) = rx.try_pop() {
                seen.push(r.block_index);
            } else {
                std::thread::yield_now();
            }
        }
        producer.join().expect("producer");

        assert!(seen.windows(2).all(|w| w[0] < w[1]), "results reordered");
        assert_eq!(seen.last().copied(), Some(1999));
    }
}
