//! Buffered, batch-flushing event delivery.
//!
//! Producers hand events to a consumer one at a time; committing each event
//! individually to durable storage would be dominated by per-transaction
//! cost. [`BufferedSink`] smooths the rate: events accumulate in a
//! mutex-guarded queue and are drained into one all-or-nothing batch when
//! either the capacity bound is reached or the heartbeat interval expires
//! since the last flush, so low-traffic captures still commit promptly.
//!
//! The queue lock is held only to enqueue and to drain; the triggering
//! thread moves the pending events out, releases the lock and only then
//! runs the durable write, so other producers keep enqueuing into the
//! fresh queue while a batch commits.

use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::model::WorkloadEvent;

/// Anything that can receive the captured event stream.
pub trait Consumer {
    type Error: std::error::Error;

    /// Hands one event to the consumer. Must not block the producer beyond
    /// short internal locking, except when this call itself triggers a
    /// flush.
    fn consume_buffered(&self, event: WorkloadEvent) -> Result<(), Self::Error>;

    /// Whether undelivered events remain; checked at shutdown to decide if
    /// a final flush is needed.
    fn has_more_events(&self) -> bool;
}

/// Destination of a drained batch.
pub trait BatchWriter {
    type Error: std::error::Error;

    /// Writes the whole batch as one all-or-nothing unit. On failure no
    /// event of the batch may be visible in the destination.
    fn write_batch(&mut self, events: Vec<WorkloadEvent>) -> Result<(), Self::Error>;

    /// Releases writer resources. Must not fail the shutdown path.
    fn close(&mut self) {}
}

/// When a pending queue is drained into a batch.
#[derive(Debug, Clone)]
pub struct FlushPolicy {
    /// Queue length that forces a flush.
    pub capacity: usize,
    /// Maximum time events may wait before a flush is forced regardless of
    /// fill level.
    pub heartbeat: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            capacity: 1000,
            heartbeat: Duration::from_secs(60),
        }
    }
}

impl FlushPolicy {
    pub fn new(capacity: usize, heartbeat: Duration) -> Self {
        Self {
            capacity,
            heartbeat,
        }
    }
}

struct Pending {
    events: VecDeque<WorkloadEvent>,
    last_flush: Instant,
}

/// Thread-safe bounded queue plus flush policy in front of a [`BatchWriter`].
///
/// `submit` never blocks beyond the queue lock unless it is the call that
/// trips the flush condition; that caller runs the batch write on its own
/// thread. A second lock serialises in-flight batches, so one flush runs to
/// completion before the next begins. After [`BufferedSink::shutdown`]
/// further submissions are silently dropped.
pub struct BufferedSink<W: BatchWriter> {
    policy: FlushPolicy,
    pending: Mutex<Pending>,
    writer: Mutex<W>,
    stopped: AtomicBool,
    written: AtomicU64,
}

impl<W: BatchWriter> BufferedSink<W> {
    pub fn new(writer: W) -> Self {
        Self::with_policy(writer, FlushPolicy::default())
    }

    pub fn with_policy(writer: W, policy: FlushPolicy) -> Self {
        Self {
            policy,
            pending: Mutex::new(Pending {
                events: VecDeque::new(),
                last_flush: Instant::now(),
            }),
            writer: Mutex::new(writer),
            stopped: AtomicBool::new(false),
            written: AtomicU64::new(0),
        }
    }

    /// Enqueues one event and flushes when the policy says so.
    ///
    /// A write failure is returned to the submitting producer, which should
    /// stop feeding this sink; the failed batch is not re-enqueued
    /// (at-most-once delivery into the store).
    pub fn submit(&self, event: WorkloadEvent) -> Result<(), W::Error> {
        if self.stopped.load(Ordering::Acquire) {
            return Ok(());
        }

        let batch = {
            let mut pending = lock(&self.pending);
            pending.events.push_back(event);
            if pending.events.len() < self.policy.capacity
                && pending.last_flush.elapsed() < self.policy.heartbeat
            {
                return Ok(());
            }
            pending.last_flush = Instant::now();
            mem::take(&mut pending.events)
        };
        self.write(batch)
    }

    /// Whether unflushed events remain in the queue.
    pub fn has_pending(&self) -> bool {
        !lock(&self.pending).events.is_empty()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Drains and commits whatever is queued, regardless of the policy.
    pub fn flush(&self) -> Result<(), W::Error> {
        let batch = {
            let mut pending = lock(&self.pending);
            pending.last_flush = Instant::now();
            mem::take(&mut pending.events)
        };
        self.write(batch)
    }

    /// One final forced flush, then writer release.
    ///
    /// Write failures during the final drain are suppressed with a warning;
    /// an already-stopping pipeline should not crash on drain. Safe to call
    /// more than once; submissions arriving afterwards are dropped.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        let _ = self.flush();
        lock(&self.writer).close();
    }

    fn write(&self, batch: VecDeque<WorkloadEvent>) -> Result<(), W::Error> {
        if batch.is_empty() {
            return Ok(());
        }
        let count = batch.len() as u64;

        // The pending-queue lock is released by now; only the writer lock
        // is held across the durable write.
        let result = lock(&self.writer).write_batch(batch.into());
        match result {
            Ok(()) => {
                let total = self.written.fetch_add(count, Ordering::Relaxed) + count;
                info!("{} events saved", total);
                Ok(())
            }
            Err(err) => {
                if self.stopped.load(Ordering::Acquire) {
                    warn!("batch write failed while stopping, suppressed: {err}");
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }
}

impl<W: BatchWriter> Consumer for BufferedSink<W> {
    type Error = W::Error;

    fn consume_buffered(&self, event: WorkloadEvent) -> Result<(), W::Error> {
        self.submit(event)
    }

    fn has_more_events(&self) -> bool {
        self.has_pending()
    }
}

/// A poisoned lock only means another producer panicked mid-enqueue; the
/// queue itself stays consistent, so keep draining.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventType, ExecutionEvent, WorkloadEvent};
    use chrono::Utc;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;

    fn starting_event(session_id: i64, sequence: i64) -> WorkloadEvent {
        WorkloadEvent::Execution(ExecutionEvent {
            event_sequence: sequence,
            event_type: EventType::RpcStarting,
            start_time: Utc::now(),
            session_id,
            application_name: Some("app".into()),
            host_name: Some("host".into()),
            database_name: Some("db".into()),
            login_name: Some("login".into()),
            text: Some("SELECT 1".into()),
            cpu: None,
            duration: None,
            reads: None,
            writes: None,
        })
    }

    #[derive(Debug)]
    struct MockError;

    impl std::fmt::Display for MockError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "mock write failure")
        }
    }

    impl std::error::Error for MockError {}

    /// Records batches; optionally fails every write.
    struct MockWriter {
        batches: Arc<Mutex<Vec<Vec<WorkloadEvent>>>>,
        fail: bool,
        closed: Arc<AtomicBool>,
    }

    impl MockWriter {
        fn new() -> (Self, Arc<Mutex<Vec<Vec<WorkloadEvent>>>>, Arc<AtomicBool>) {
            let batches = Arc::new(Mutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            (
                Self {
                    batches: Arc::clone(&batches),
                    fail: false,
                    closed: Arc::clone(&closed),
                },
                batches,
                closed,
            )
        }

        fn failing() -> Self {
            let (mut writer, _, _) = Self::new();
            writer.fail = true;
            writer
        }
    }

    impl BatchWriter for MockWriter {
        type Error = MockError;

        fn write_batch(&mut self, events: Vec<WorkloadEvent>) -> Result<(), MockError> {
            if self.fail {
                return Err(MockError);
            }
            lock(&self.batches).push(events);
            Ok(())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::Release);
        }
    }

    fn test_policy(capacity: usize) -> FlushPolicy {
        // long heartbeat so only the capacity bound triggers
        FlushPolicy::new(capacity, Duration::from_secs(3600))
    }

    #[test]
    fn test_capacity_triggers_flush_and_empties_queue() {
        let (writer, batches, _) = MockWriter::new();
        let sink = BufferedSink::with_policy(writer, test_policy(3));

        sink.submit(starting_event(1, 1)).unwrap();
        sink.submit(starting_event(1, 2)).unwrap();
        assert!(sink.has_pending());
        assert!(lock(&batches).is_empty());

        sink.submit(starting_event(1, 3)).unwrap();
        assert!(!sink.has_pending());
        let batches = lock(&batches);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
    }

    #[test]
    fn test_heartbeat_triggers_flush_below_capacity() {
        let (writer, batches, _) = MockWriter::new();
        let sink = BufferedSink::with_policy(writer, FlushPolicy::new(1000, Duration::ZERO));

        sink.submit(starting_event(1, 1)).unwrap();
        assert_eq!(lock(&batches).len(), 1);
    }

    #[test]
    fn test_explicit_flush_drains_remainder() {
        let (writer, batches, _) = MockWriter::new();
        let sink = BufferedSink::with_policy(writer, test_policy(100));

        sink.submit(starting_event(1, 1)).unwrap();
        sink.submit(starting_event(2, 1)).unwrap();
        sink.flush().unwrap();

        assert!(!sink.has_pending());
        let batches = lock(&batches);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }

    #[test]
    fn test_shutdown_flushes_closes_and_drops_later_submissions() {
        let (writer, batches, closed) = MockWriter::new();
        let sink = BufferedSink::with_policy(writer, test_policy(100));

        sink.submit(starting_event(1, 1)).unwrap();
        sink.shutdown();

        assert!(sink.is_stopped());
        assert!(closed.load(Ordering::Acquire));
        assert_eq!(lock(&batches).len(), 1);

        sink.submit(starting_event(1, 2)).unwrap();
        assert!(!sink.has_pending());
        assert_eq!(lock(&batches).len(), 1);
    }

    #[test]
    fn test_write_failure_propagates_and_is_not_reenqueued() {
        let sink = BufferedSink::with_policy(MockWriter::failing(), test_policy(1));

        assert!(sink.submit(starting_event(1, 1)).is_err());
        // at-most-once: the failed batch is gone
        assert!(!sink.has_pending());
    }

    #[test]
    fn test_write_failure_suppressed_while_stopping() {
        let sink = BufferedSink::with_policy(MockWriter::failing(), test_policy(100));

        sink.submit(starting_event(1, 1)).unwrap();
        // must not panic or surface the failure
        sink.shutdown();
    }

    /// Writer that parks until released, proving producers can enqueue
    /// while a batch is in flight (the queue lock is not held across the
    /// durable write).
    struct ParkingWriter {
        release: Mutex<mpsc::Receiver<()>>,
        batch_sizes: Arc<Mutex<Vec<usize>>>,
    }

    impl BatchWriter for ParkingWriter {
        type Error = MockError;

        fn write_batch(&mut self, events: Vec<WorkloadEvent>) -> Result<(), MockError> {
            lock(&self.batch_sizes).push(events.len());
            lock(&self.release)
                .recv_timeout(Duration::from_secs(5))
                .map_err(|_| MockError)
        }
    }

    #[test]
    fn test_enqueue_proceeds_while_batch_commits() {
        let (release_tx, release_rx) = mpsc::channel();
        let batch_sizes = Arc::new(Mutex::new(Vec::new()));
        let writer = ParkingWriter {
            release: Mutex::new(release_rx),
            batch_sizes: Arc::clone(&batch_sizes),
        };
        let sink = Arc::new(BufferedSink::with_policy(writer, test_policy(2)));

        let flusher = {
            let sink = Arc::clone(&sink);
            thread::spawn(move || {
                sink.submit(starting_event(1, 1)).unwrap();
                sink.submit(starting_event(1, 2)).unwrap(); // blocks in write_batch
            })
        };

        // wait until the batch is in flight
        while lock(&batch_sizes).is_empty() {
            thread::yield_now();
        }

        // the queue accepts new events and reports them without blocking
        sink.submit(starting_event(2, 1)).unwrap();
        assert!(sink.has_pending());

        release_tx.send(()).unwrap();
        flusher.join().unwrap();

        assert_eq!(lock(&batch_sizes).as_slice(), &[2]);
    }
}
