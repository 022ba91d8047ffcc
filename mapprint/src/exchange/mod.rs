//! The status channel between requester and print daemon.
//!
//! Two message shapes cross the execution-context boundary:
//!
//! - [`JobRequest`] travels into the daemon's control loop over an ordered
//!   mpsc channel; its oneshot reply resolves with the new job's id or the
//!   rejection error.
//! - [`JobStatusSnapshot`]s travel out per job over a `watch` channel
//!   wrapped as a [`JobStatusStream`]: hot, replay-latest semantics, so a
//!   subscriber attaching after job creation immediately observes the
//!   latest snapshot and then every subsequent one through the terminal
//!   snapshot.
//!
//! Serialization of specs and snapshots is serde-derived on the types
//! themselves; framing and raster transfer belong to whatever transport
//! carries the channels across a process boundary.

use tokio::sync::{oneshot, watch};

use crate::error::PrintError;
use crate::job::{JobId, JobStatusSnapshot};
use crate::spec::PrintSpec;

/// A print request submitted to the daemon.
#[derive(Debug)]
pub struct JobRequest {
    /// The spec to print.
    pub spec: PrintSpec,
    /// Resolves with the created job's id, or the rejection error.
    pub reply: oneshot::Sender<Result<JobId, PrintError>>,
}

/// Ordered stream of one job's status snapshots.
///
/// The first `next()` yields the latest snapshot immediately (replay);
/// subsequent calls yield each newer snapshot. The stream ends after the
/// terminal snapshot: `next()` then returns `None`. Progress values are
/// non-decreasing and only the terminal finished snapshot carries
/// `progress == 1`.
#[derive(Debug)]
pub struct JobStatusStream {
    rx: watch::Receiver<JobStatusSnapshot>,
    yielded_current: bool,
    done: bool,
}

impl JobStatusStream {
    /// Wraps a job's status channel.
    pub(crate) fn new(rx: watch::Receiver<JobStatusSnapshot>) -> Self {
        Self {
            rx,
            yielded_current: false,
            done: false,
        }
    }

    /// Returns the next snapshot, or `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<JobStatusSnapshot> {
        if self.done {
            return None;
        }
        if !self.yielded_current {
            self.yielded_current = true;
            let snapshot = self.rx.borrow_and_update().clone();
            if snapshot.is_terminal() {
                self.done = true;
            }
            return Some(snapshot);
        }
        match self.rx.changed().await {
            Ok(()) => {
                let snapshot = self.rx.borrow_and_update().clone();
                if snapshot.is_terminal() {
                    self.done = true;
                }
                Some(snapshot)
            }
            Err(_) => {
                // Producer gone without a terminal snapshot.
                self.done = true;
                None
            }
        }
    }

    /// Drains the stream and returns its terminal snapshot, or `None` if
    /// the stream ended without one.
    pub async fn wait_terminal(mut self) -> Option<JobStatusSnapshot> {
        let mut terminal = None;
        while let Some(snapshot) = self.next().await {
            if snapshot.is_terminal() {
                terminal = Some(snapshot);
            }
        }
        terminal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobStatus, JobStatusSnapshot};
    use crate::spec::{Layer, OutputSize};

    fn snapshot(progress: f64, status: JobStatus) -> JobStatusSnapshot {
        JobStatusSnapshot {
            id: JobId::new(0),
            spec: PrintSpec {
                layers: vec![Layer::Xyz {
                    url: "https://tiles.example.com/{z}/{x}/{y}.png".to_string(),
                    opacity: 1.0,
                }],
                size: OutputSize::pixels(8.0, 8.0),
                center: [0.0, 0.0],
                dpi: 96.0,
                scale: 1_000_000.0,
                projection: "EPSG:3857".to_string(),
                projection_definition: None,
            },
            progress,
            status,
            stalled: false,
            artifact: None,
        }
    }

    #[tokio::test]
    async fn test_replays_latest_then_follows() {
        let (tx, rx) = watch::channel(snapshot(0.0, JobStatus::Pending));
        tx.send_replace(snapshot(0.5, JobStatus::Ongoing));

        let mut stream = JobStatusStream::new(rx);
        // Late subscriber: first value is the latest, not the initial.
        let first = stream.next().await.unwrap();
        assert_eq!(first.progress, 0.5);

        tx.send_replace(snapshot(1.0, JobStatus::Finished));
        let second = stream.next().await.unwrap();
        assert_eq!(second.progress, 1.0);
        assert!(second.is_terminal());

        // Stream has ended.
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_ends_after_terminal_even_with_live_sender() {
        let (tx, rx) = watch::channel(snapshot(1.0, JobStatus::Finished));
        let mut stream = JobStatusStream::new(rx);
        assert!(stream.next().await.unwrap().is_terminal());
        assert!(stream.next().await.is_none());
        drop(tx);
    }

    #[tokio::test]
    async fn test_ends_when_sender_dropped_without_terminal() {
        let (tx, rx) = watch::channel(snapshot(0.3, JobStatus::Ongoing));
        let mut stream = JobStatusStream::new(rx);
        assert_eq!(stream.next().await.unwrap().progress, 0.3);
        drop(tx);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_wait_terminal() {
        let (tx, rx) = watch::channel(snapshot(0.0, JobStatus::Pending));
        let stream = JobStatusStream::new(rx);

        tokio::spawn(async move {
            tx.send_replace(snapshot(0.5, JobStatus::Ongoing));
            tx.send_replace(snapshot(1.0, JobStatus::Finished));
        });

        let terminal = stream.wait_terminal().await.unwrap();
        assert_eq!(terminal.status, JobStatus::Finished);
    }
}
