// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared, bounded transcription worker pool.
//!
//! A single scheduler task owns per-stream FIFO queues and dispatches to a
//! bounded set of workers, at most one in-flight job per stream, so a
//! stream's results complete in `seq` order. Streams are served
//! round-robin. A per-stream semaphore caps pending jobs; acquiring it is
//! where backpressure reaches the VAD stage.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use echothread_core::{EchoError, SpeechEngine, StreamId, Utterance};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{debug, warn};

/// Pending jobs allowed per stream before `submit` blocks.
pub const DEFAULT_QUEUE_CAP: usize = 8;

/// Worker count: one when an exclusive accelerator is configured, else
/// bounded CPU parallelism.
pub fn worker_count(exclusive_device: bool) -> usize {
    if exclusive_device {
        1
    } else {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        cores.min(4)
    }
}

/// Completion future for one submitted segment.
pub type TranscriptionFuture = oneshot::Receiver<Result<Utterance, EchoError>>;

struct Job {
    stream: StreamId,
    pcm: Vec<i16>,
    language_hint: Option<String>,
    respond: oneshot::Sender<Result<Utterance, EchoError>>,
    /// Released when the job finishes, reopening the stream's queue slot.
    _permit: tokio::sync::OwnedSemaphorePermit,
}

enum PoolMsg {
    Job(Job),
    /// Drop all queued jobs for a stream (its controller is stopping).
    Purge(StreamId),
    Done(StreamId),
}

struct PoolShared {
    tx: mpsc::UnboundedSender<PoolMsg>,
    engine: Arc<dyn SpeechEngine>,
    queue_cap: usize,
    stream_slots: std::sync::Mutex<HashMap<StreamId, Arc<Semaphore>>>,
}

/// Handle to the shared pool. Cheap to clone.
#[derive(Clone)]
pub struct TranscriptionPool {
    shared: Arc<PoolShared>,
}

impl TranscriptionPool {
    /// Spawns the scheduler with `workers` parallel transcriptions.
    pub fn new(engine: Arc<dyn SpeechEngine>, workers: usize, queue_cap: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(PoolShared {
            tx: tx.clone(),
            engine,
            queue_cap,
            stream_slots: std::sync::Mutex::new(HashMap::new()),
        });
        tokio::spawn(scheduler(shared.clone(), rx, tx, workers.max(1)));
        Self { shared }
    }

    pub fn with_defaults(engine: Arc<dyn SpeechEngine>) -> Self {
        let workers = worker_count(engine.exclusive_device());
        Self::new(engine, workers, DEFAULT_QUEUE_CAP)
    }

    fn slots_for(&self, stream: &StreamId) -> Arc<Semaphore> {
        let mut slots = self
            .shared
            .stream_slots
            .lock()
            .expect("stream slot map poisoned");
        slots
            .entry(stream.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(self.shared.queue_cap)))
            .clone()
    }

    /// Submits a segment, blocking while the stream's queue is full.
    pub async fn submit(
        &self,
        stream: &StreamId,
        pcm: Vec<i16>,
        language_hint: Option<String>,
    ) -> Result<TranscriptionFuture, EchoError> {
        let permit = self
            .slots_for(stream)
            .acquire_owned()
            .await
            .map_err(|_| EchoError::Internal("transcription pool closed".into()))?;
        self.enqueue(stream, pcm, language_hint, permit)
    }

    /// Like [`submit`](Self::submit) but gives up after `timeout`.
    ///
    /// `Ok(None)` means the queue stayed saturated: the caller drops the
    /// segment rather than stall a live source.
    pub async fn submit_timeout(
        &self,
        stream: &StreamId,
        pcm: Vec<i16>,
        language_hint: Option<String>,
        timeout: Duration,
    ) -> Result<Option<TranscriptionFuture>, EchoError> {
        let slots = self.slots_for(stream);
        let permit = match tokio::time::timeout(timeout, slots.acquire_owned()).await {
            Err(_) => return Ok(None),
            Ok(Err(_)) => return Err(EchoError::Internal("transcription pool closed".into())),
            Ok(Ok(permit)) => permit,
        };
        self.enqueue(stream, pcm, language_hint, permit).map(Some)
    }

    fn enqueue(
        &self,
        stream: &StreamId,
        pcm: Vec<i16>,
        language_hint: Option<String>,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) -> Result<TranscriptionFuture, EchoError> {
        let (respond, rx) = oneshot::channel();
        let job = Job {
            stream: stream.clone(),
            pcm,
            language_hint,
            respond,
            _permit: permit,
        };
        self.shared
            .tx
            .send(PoolMsg::Job(job))
            .map_err(|_| EchoError::Internal("transcription pool closed".into()))?;
        Ok(rx)
    }

    /// Rejects queued jobs for a stream and forgets its queue slot.
    /// In-flight work finishes on its own; the caller decides how long to
    /// wait for it.
    pub fn purge_stream(&self, stream: &StreamId) {
        self.shared
            .stream_slots
            .lock()
            .expect("stream slot map poisoned")
            .remove(stream);
        let _ = self.shared.tx.send(PoolMsg::Purge(stream.clone()));
    }
}

async fn scheduler(
    shared: Arc<PoolShared>,
    mut rx: mpsc::UnboundedReceiver<PoolMsg>,
    tx: mpsc::UnboundedSender<PoolMsg>,
    workers: usize,
) {
    let worker_slots = Arc::new(Semaphore::new(workers));
    let mut queues: HashMap<StreamId, VecDeque<Job>> = HashMap::new();
    let mut order: VecDeque<StreamId> = VecDeque::new();
    let mut in_flight: HashSet<StreamId> = HashSet::new();

    while let Some(msg) = rx.recv().await {
        match msg {
            PoolMsg::Job(job) => {
                if !queues.contains_key(&job.stream) {
                    order.push_back(job.stream.clone());
                }
                queues.entry(job.stream.clone()).or_default().push_back(job);
            }
            PoolMsg::Purge(stream) => {
                if queues.remove(&stream).is_some() {
                    debug!(stream_id = %stream, "purged queued transcription jobs");
                }
                order.retain(|s| *s != stream);
            }
            PoolMsg::Done(stream) => {
                in_flight.remove(&stream);
            }
        }

        // Round-robin dispatch: rotate through streams, one in-flight job
        // each, while worker slots remain.
        let mut rotations = order.len();
        while rotations > 0 && worker_slots.available_permits() > 0 {
            rotations -= 1;
            let Some(stream) = order.pop_front() else {
                break;
            };
            let dispatchable = !in_flight.contains(&stream)
                && queues.get(&stream).is_some_and(|q| !q.is_empty());
            if dispatchable {
                let job = queues
                    .get_mut(&stream)
                    .and_then(|q| q.pop_front())
                    .expect("checked nonempty");
                let permit = worker_slots
                    .clone()
                    .try_acquire_owned()
                    .expect("checked available");
                in_flight.insert(stream.clone());
                let engine = shared.engine.clone();
                let done_tx = tx.clone();
                tokio::spawn(async move {
                    let hint = job.language_hint.clone();
                    let pcm = job.pcm;
                    let result = tokio::task::spawn_blocking(move || {
                        engine.transcribe(&pcm, hint.as_deref())
                    })
                    .await
                    .unwrap_or_else(|e| {
                        Err(EchoError::Transcription {
                            message: format!("transcription task panicked: {e}"),
                            source: None,
                        })
                    });
                    if job.respond.send(result).is_err() {
                        // Controller stopped waiting; the result is abandoned.
                        warn!(stream_id = %job.stream, "transcription result dropped");
                    }
                    drop(permit);
                    let _ = done_tx.send(PoolMsg::Done(job.stream));
                });
            }
            let queue_empty = queues.get(&stream).map_or(true, |q| q.is_empty());
            if queue_empty && !in_flight.contains(&stream) {
                queues.remove(&stream);
            } else {
                order.push_back(stream);
            }
        }
    }
    debug!("transcription scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use echothread_test_utils::MockSpeechEngine;

    fn stream(name: &str) -> StreamId {
        StreamId(name.to_string())
    }

    #[tokio::test]
    async fn results_complete_in_submission_order_per_stream() {
        let engine = Arc::new(MockSpeechEngine::with_responses([
            "first", "second", "third", "fourth",
        ]));
        let pool = TranscriptionPool::new(engine, 2, 8);
        let s = stream("s1");

        let mut futures = Vec::new();
        for _ in 0..4 {
            futures.push(pool.submit(&s, vec![0i16; 480], None).await.unwrap());
        }
        let mut texts = Vec::new();
        for f in futures {
            texts.push(f.await.unwrap().unwrap().text);
        }
        // One in-flight job per stream means scripted responses map back
        // in seq order even with two workers.
        assert_eq!(texts, vec!["first", "second", "third", "fourth"]);
    }

    #[tokio::test]
    async fn streams_share_workers_concurrently() {
        let engine = Arc::new(
            MockSpeechEngine::new().with_delay(Duration::from_millis(50)),
        );
        let pool = TranscriptionPool::new(engine, 2, 8);

        let start = std::time::Instant::now();
        let a = pool.submit(&stream("a"), vec![0i16; 480], None).await.unwrap();
        let b = pool.submit(&stream("b"), vec![0i16; 480], None).await.unwrap();
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();
        // Two streams, two workers: roughly one delay, not two.
        assert!(start.elapsed() < Duration::from_millis(95));
    }

    #[tokio::test]
    async fn queue_cap_blocks_then_timeout_drops() {
        let engine = Arc::new(
            MockSpeechEngine::new().with_delay(Duration::from_millis(200)),
        );
        let pool = TranscriptionPool::new(engine, 1, 2);
        let s = stream("s1");

        // Fill the per-stream queue (cap 2).
        let _f1 = pool.submit(&s, vec![0i16; 480], None).await.unwrap();
        let _f2 = pool.submit(&s, vec![0i16; 480], None).await.unwrap();

        // Third submission cannot get a slot within the timeout.
        let dropped = pool
            .submit_timeout(&s, vec![0i16; 480], None, Duration::from_millis(30))
            .await
            .unwrap();
        assert!(dropped.is_none());
    }

    #[tokio::test]
    async fn slot_frees_after_completion() {
        let engine = Arc::new(MockSpeechEngine::new());
        let pool = TranscriptionPool::new(engine, 1, 1);
        let s = stream("s1");

        let f1 = pool.submit(&s, vec![0i16; 480], None).await.unwrap();
        f1.await.unwrap().unwrap();
        // The queue slot came back; this must not hang.
        let f2 = tokio::time::timeout(
            Duration::from_secs(1),
            pool.submit(&s, vec![0i16; 480], None),
        )
        .await
        .expect("submit should not block after completion")
        .unwrap();
        f2.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn purge_rejects_queued_jobs() {
        let engine = Arc::new(
            MockSpeechEngine::new().with_delay(Duration::from_millis(150)),
        );
        let pool = TranscriptionPool::new(engine, 1, 4);
        let s = stream("s1");

        let _running = pool.submit(&s, vec![0i16; 480], None).await.unwrap();
        let queued = pool.submit(&s, vec![0i16; 480], None).await.unwrap();

        pool.purge_stream(&s);

        // The queued (not yet dispatched) job is dropped: its sender is
        // discarded, so the future resolves to a RecvError.
        assert!(queued.await.is_err());
    }

    #[tokio::test]
    async fn transcription_errors_propagate() {
        let engine = Arc::new(MockSpeechEngine::new().with_failures(1));
        let pool = TranscriptionPool::new(engine, 1, 2);
        let s = stream("s1");

        let f = pool.submit(&s, vec![0i16; 480], None).await.unwrap();
        let result = f.await.unwrap();
        assert!(matches!(result, Err(EchoError::Transcription { .. })));
    }
}
