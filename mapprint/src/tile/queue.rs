//! Per-job fetch queue and worker pool.
//!
//! Fetches are ordered by distance from the viewport center (closest
//! first), then by enqueue order (FIFO within the same distance). The queue
//! is shared, mutably, by every layer renderer of one job and never crosses
//! jobs; the coordinator owns it for the job's lifetime.
//!
//! A small pool of workers drains the queue, performs the HTTP requests and
//! replies to the enqueuing renderer over the fetch's reply channel.
//! Workers exit when the queue is closed and empty, or when the job's
//! cancellation token fires.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::provider::{AsyncHttpClient, ProviderError};
use crate::tile::PixelRect;

/// Global sequence counter for FIFO ordering within equal distance.
static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_sequence() -> u64 {
    SEQUENCE_COUNTER.fetch_add(1, AtomicOrdering::Relaxed)
}

/// Result of one fetch, delivered back to the renderer that planned it.
#[derive(Debug)]
pub struct FetchOutcome {
    /// Destination rectangle the renderer planned for this fetch.
    pub dest: PixelRect,
    /// Raw response bytes or the fetch error.
    pub result: Result<Bytes, ProviderError>,
}

/// A fetch waiting in the queue.
pub struct QueuedFetch {
    /// Fully expanded request URL.
    pub url: String,
    /// Destination rectangle on the planning layer's canvas.
    pub dest: PixelRect,
    /// Reply channel back to the planning renderer.
    pub reply: mpsc::Sender<FetchOutcome>,
    /// Distance from the viewport center in canvas pixels.
    distance: f64,
    /// Sequence number for FIFO ordering within equal distance.
    sequence: u64,
}

impl QueuedFetch {
    /// Creates a queued fetch; the sequence number is assigned
    /// automatically.
    pub fn new(
        url: String,
        dest: PixelRect,
        distance: f64,
        reply: mpsc::Sender<FetchOutcome>,
    ) -> Self {
        Self {
            url,
            dest,
            reply,
            distance,
            sequence: next_sequence(),
        }
    }
}

impl std::fmt::Debug for QueuedFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedFetch")
            .field("url", &self.url)
            .field("distance", &self.distance)
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl PartialEq for QueuedFetch {
    fn eq(&self, other: &Self) -> bool {
        self.distance.total_cmp(&other.distance) == Ordering::Equal
            && self.sequence == other.sequence
    }
}

impl Eq for QueuedFetch {}

impl PartialOrd for QueuedFetch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap is a max-heap: the greatest fetch pops first, so "greater"
// means closer to the center, and older within equal distance.
impl Ord for QueuedFetch {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.distance.total_cmp(&self.distance) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ordering => ordering,
        }
    }
}

/// Center-first fetch queue shared by all layer renderers of one job.
pub struct TileQueue {
    heap: Mutex<BinaryHeap<QueuedFetch>>,
    notify: Notify,
    closed: AtomicBool,
}

impl TileQueue {
    /// Creates an empty open queue.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Adds a fetch to the queue and wakes waiting workers.
    pub fn enqueue(&self, fetch: QueuedFetch) {
        self.heap.lock().push(fetch);
        self.notify.notify_waiters();
    }

    /// Removes and returns the highest-priority fetch, waiting for one to
    /// arrive if the queue is empty. Returns `None` once the queue is
    /// closed and drained.
    pub async fn next(&self) -> Option<QueuedFetch> {
        loop {
            // Register interest before checking the heap so an enqueue
            // between the check and the await still wakes this waiter.
            let notified = self.notify.notified();
            if let Some(fetch) = self.heap.lock().pop() {
                return Some(fetch);
            }
            if self.closed.load(AtomicOrdering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Discards every pending fetch. Returns the number removed.
    ///
    /// Dropping a fetch drops its reply sender, which the planning renderer
    /// observes as its outcome channel closing.
    pub fn clear(&self) -> usize {
        let mut heap = self.heap.lock();
        let removed = heap.len();
        heap.clear();
        removed
    }

    /// Closes the queue: workers drain what is left, then exit.
    pub fn close(&self) {
        self.closed.store(true, AtomicOrdering::Release);
        self.notify.notify_waiters();
    }

    /// Number of pending fetches.
    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    /// Whether the queue has no pending fetches.
    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }
}

impl std::fmt::Debug for TileQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileQueue")
            .field("len", &self.len())
            .field("closed", &self.closed.load(AtomicOrdering::Relaxed))
            .finish()
    }
}

/// Spawns `count` workers draining the queue through `client`.
///
/// Each worker pops the closest pending fetch, performs the request and
/// replies to the renderer that planned it. Cancellation aborts in-flight
/// requests and stops the pool.
pub fn spawn_fetch_workers(
    queue: Arc<TileQueue>,
    client: Arc<dyn AsyncHttpClient>,
    count: usize,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|worker| {
            let queue = Arc::clone(&queue);
            let client = Arc::clone(&client);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;

                        _ = cancel.cancelled() => {
                            trace!(worker, "fetch worker cancelled");
                            break;
                        }

                        fetch = queue.next() => {
                            let Some(fetch) = fetch else {
                                trace!(worker, "fetch queue drained");
                                break;
                            };
                            tokio::select! {
                                biased;

                                _ = cancel.cancelled() => {
                                    trace!(worker, url = %fetch.url, "in-flight fetch aborted");
                                    break;
                                }

                                result = client.get(&fetch.url) => {
                                    let outcome = FetchOutcome {
                                        dest: fetch.dest,
                                        result,
                                    };
                                    if fetch.reply.send(outcome).await.is_err() {
                                        trace!(worker, url = %fetch.url, "renderer gone, outcome dropped");
                                    }
                                }
                            }
                        }
                    }
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetch(url: &str, distance: f64, reply: &mpsc::Sender<FetchOutcome>) -> QueuedFetch {
        QueuedFetch::new(
            url.to_string(),
            PixelRect {
                x: 0,
                y: 0,
                width: 256,
                height: 256,
            },
            distance,
            reply.clone(),
        )
    }

    #[tokio::test]
    async fn test_closest_fetch_pops_first() {
        let queue = TileQueue::new();
        let (tx, _rx) = mpsc::channel(8);

        queue.enqueue(fetch("far", 500.0, &tx));
        queue.enqueue(fetch("near", 10.0, &tx));
        queue.enqueue(fetch("middle", 100.0, &tx));

        assert_eq!(queue.next().await.unwrap().url, "near");
        assert_eq!(queue.next().await.unwrap().url, "middle");
        assert_eq!(queue.next().await.unwrap().url, "far");
    }

    #[tokio::test]
    async fn test_fifo_within_equal_distance() {
        let queue = TileQueue::new();
        let (tx, _rx) = mpsc::channel(8);

        queue.enqueue(fetch("first", 50.0, &tx));
        queue.enqueue(fetch("second", 50.0, &tx));
        queue.enqueue(fetch("third", 50.0, &tx));

        assert_eq!(queue.next().await.unwrap().url, "first");
        assert_eq!(queue.next().await.unwrap().url, "second");
        assert_eq!(queue.next().await.unwrap().url, "third");
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = TileQueue::new();
        let (tx, _rx) = mpsc::channel(8);

        queue.enqueue(fetch("only", 1.0, &tx));
        queue.close();

        assert_eq!(queue.next().await.unwrap().url, "only");
        assert!(queue.next().await.is_none());
    }

    #[tokio::test]
    async fn test_next_wakes_on_enqueue() {
        let queue = TileQueue::new();
        let (tx, _rx) = mpsc::channel(8);

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next().await.map(|f| f.url) })
        };
        tokio::task::yield_now().await;
        queue.enqueue(fetch("late", 1.0, &tx));

        assert_eq!(waiter.await.unwrap().unwrap(), "late");
    }

    #[tokio::test]
    async fn test_clear_discards_pending() {
        let queue = TileQueue::new();
        let (tx, mut rx) = mpsc::channel(8);

        queue.enqueue(fetch("a", 1.0, &tx));
        queue.enqueue(fetch("b", 2.0, &tx));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());

        // The reply sender inside the dropped fetches is gone; once the
        // local sender drops too, the receiver closes.
        drop(tx);
        assert!(rx.recv().await.is_none());
    }
}
