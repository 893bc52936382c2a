//! Background detection worker.
//!
//! A dedicated thread owns the detector and its [`DetectorContext`]. The render
//! thread submits frames and gets back a [`DetectionTicket`], a future that
//! resolves once the detector replies. The worker itself does not limit how
//! many requests are queued; the submitter keeps at most one in flight (see
//! [`super::scheduler::DetectionScheduler`]).

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use futures::channel::oneshot;
use log::{debug, error, info, trace, warn};

use super::detector::{Detector, DetectorContext, Frame};
use super::types::DetectionBatch;
use super::DetectorError;

#[derive(Debug, Clone)]
pub enum DetectionOutcome {
    Detections(DetectionBatch),
    /// The detector failed this cycle; treated as a cycle without detections.
    Failed(DetectorError),
    /// The worker went away before answering.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct DetectionReply {
    pub seq: u64,
    pub outcome: DetectionOutcome,
    /// Time spent inside the detector.
    pub elapsed: Duration,
}

struct Request {
    seq: u64,
    frame: Frame,
    captured_at: Instant,
    reply: oneshot::Sender<DetectionReply>,
}

/// Pending result of one submitted frame.
pub struct DetectionTicket {
    seq: u64,
    receiver: oneshot::Receiver<DetectionReply>,
}

impl DetectionTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    fn cancelled(seq: u64) -> Self {
        // Dropping the sender resolves the ticket to `Cancelled` immediately
        let (_, receiver) = oneshot::channel();
        Self { seq, receiver }
    }
}

impl Future for DetectionTicket {
    type Output = DetectionReply;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let seq = this.seq;
        Pin::new(&mut this.receiver).poll(cx).map(|result| {
            result.unwrap_or(DetectionReply {
                seq,
                outcome: DetectionOutcome::Cancelled,
                elapsed: Duration::ZERO,
            })
        })
    }
}

pub struct DetectionWorker {
    requests: Option<Sender<Request>>,
    cancelled: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    next_seq: u64,
    name: String,
}

impl DetectionWorker {
    pub fn spawn(detector: Box<dyn Detector>) -> Result<Self, DetectorError> {
        let name = detector.name().to_string();
        let (tx, rx) = mpsc::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let thread_cancelled = Arc::clone(&cancelled);

        let handle = thread::Builder::new()
            .name("arhud-detector".to_string())
            .spawn(move || run_worker(detector, rx, thread_cancelled))
            .map_err(|e| DetectorError::Init(format!("failed to spawn detection thread: {e}")))?;

        info!("Detection worker started with detector '{}'", name);
        Ok(Self {
            requests: Some(tx),
            cancelled,
            handle: Some(handle),
            next_seq: 1,
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.requests.is_some() && !self.cancelled.load(Ordering::Acquire)
    }

    /// Hand a frame to the detector. The frame is moved; the worker drops it
    /// as soon as the detector returns.
    pub fn submit(&mut self, frame: Frame, captured_at: Instant) -> DetectionTicket {
        let seq = self.next_seq;
        self.next_seq += 1;

        let Some(requests) = self.requests.as_ref() else {
            return DetectionTicket::cancelled(seq);
        };

        let (reply, receiver) = oneshot::channel();
        let request = Request { seq, frame, captured_at, reply };
        if requests.send(request).is_err() {
            warn!("Detection worker is gone, dropping frame #{}", seq);
            self.requests = None;
            return DetectionTicket::cancelled(seq);
        }
        trace!("Submitted frame #{} for detection", seq);
        DetectionTicket { seq, receiver }
    }

    /// Stop the worker. Any in-flight request resolves to `Cancelled` and no
    /// further replies are sent. Does not block on the detector.
    pub fn dispose(&mut self) {
        if self.requests.is_none() && self.handle.is_none() {
            return;
        }
        self.cancelled.store(true, Ordering::Release);
        self.requests = None;
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
        info!("Detection worker '{}' disposed", self.name);
    }
}

impl Drop for DetectionWorker {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn run_worker(mut detector: Box<dyn Detector>, requests: Receiver<Request>, cancelled: Arc<AtomicBool>) {
    let mut ctx = DetectorContext::default();
    let init_error = match detector.init(&mut ctx) {
        Ok(()) => {
            ctx.mark_initialized();
            None
        }
        Err(e) => {
            error!("Detector '{}' failed to initialize: {}", detector.name(), e);
            Some(e)
        }
    };

    while let Ok(request) = requests.recv() {
        if cancelled.load(Ordering::Acquire) {
            break;
        }

        let Request { seq, frame, captured_at, reply } = request;
        ctx.frame_width = frame.width();
        ctx.frame_height = frame.height();

        let start = Instant::now();
        let outcome = match &init_error {
            Some(e) => DetectionOutcome::Failed(e.clone()),
            None => match detector.detect(&mut ctx, &frame) {
                Ok(detections) => {
                    ctx.cycles += 1;
                    DetectionOutcome::Detections(DetectionBatch::new(ctx.frame_width, ctx.frame_height, detections, captured_at))
                }
                Err(e) => {
                    warn!("Detector '{}' failed on frame #{}: {}", detector.name(), seq, e);
                    DetectionOutcome::Failed(e)
                }
            },
        };
        drop(frame);
        let elapsed = start.elapsed();

        if cancelled.load(Ordering::Acquire) {
            break;
        }
        if reply.send(DetectionReply { seq, outcome, elapsed }).is_err() {
            debug!("Reply for frame #{} was not awaited", seq);
        }
    }

    detector.dispose(&mut ctx);
    ctx.release();
    debug!("Detection thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::RawDetection;

    struct CountingDetector {
        fail_every: u64,
    }

    impl Detector for CountingDetector {
        fn name(&self) -> &str {
            "counting"
        }

        fn detect(&mut self, ctx: &mut DetectorContext, _frame: &Frame) -> Result<Vec<RawDetection>, DetectorError> {
            if self.fail_every > 0 && (ctx.cycles + 1) % self.fail_every == 0 {
                ctx.cycles += 1;
                return Err(DetectorError::Failed("model hiccup".into()));
            }
            let x = 0.1 * (ctx.cycles + 1) as f32;
            Ok(vec![RawDetection::boxed("person", x, 0.5, 0.1, 0.2, 0.9)])
        }
    }

    struct BrokenDetector;

    impl Detector for BrokenDetector {
        fn name(&self) -> &str {
            "broken"
        }

        fn init(&mut self, _ctx: &mut DetectorContext) -> Result<(), DetectorError> {
            Err(DetectorError::Init("no weights".into()))
        }

        fn detect(&mut self, _ctx: &mut DetectorContext, _frame: &Frame) -> Result<Vec<RawDetection>, DetectorError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_submit_returns_detections() {
        let mut worker = DetectionWorker::spawn(Box::new(CountingDetector { fail_every: 0 })).unwrap();
        let reply = worker.submit(Frame::new(64, 48), Instant::now()).await;
        assert_eq!(reply.seq, 1);
        match reply.outcome {
            DetectionOutcome::Detections(batch) => {
                assert_eq!(batch.frame_width, 64);
                assert_eq!(batch.frame_height, 48);
                assert_eq!(batch.detections.len(), 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        worker.dispose();
    }

    #[tokio::test]
    async fn test_detector_failure_is_a_reply_not_a_panic() {
        let mut worker = DetectionWorker::spawn(Box::new(CountingDetector { fail_every: 2 })).unwrap();
        let first = worker.submit(Frame::new(8, 8), Instant::now()).await;
        let second = worker.submit(Frame::new(8, 8), Instant::now()).await;
        assert!(matches!(first.outcome, DetectionOutcome::Detections(_)));
        assert!(matches!(second.outcome, DetectionOutcome::Failed(DetectorError::Failed(_))));
    }

    #[test]
    fn test_init_failure_reported_per_request() {
        let mut worker = DetectionWorker::spawn(Box::new(BrokenDetector)).unwrap();
        let reply = futures::executor::block_on(worker.submit(Frame::new(8, 8), Instant::now()));
        assert!(matches!(reply.outcome, DetectionOutcome::Failed(DetectorError::Init(_))));
    }

    #[test]
    fn test_submit_after_dispose_is_cancelled() {
        let mut worker = DetectionWorker::spawn(Box::new(CountingDetector { fail_every: 0 })).unwrap();
        worker.dispose();
        assert!(!worker.is_running());
        let reply = futures::executor::block_on(worker.submit(Frame::new(8, 8), Instant::now()));
        assert!(matches!(reply.outcome, DetectionOutcome::Cancelled));
    }
}
