//! Capture session state machine

use crate::capture::{
    DetectionResult, FrameOrientation, FrameSource, ScanOptions, ScanOutcome, ScanPhase,
};
use crate::error::{Error, Result};
use crate::qr::QrDecoder;
use image::DynamicImage;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Delay before retrying after a failed frame capture
const FRAME_RETRY_DELAY: Duration = Duration::from_millis(90);

/// Remote control for a running [`ScanSession`].
///
/// Dropping the handle dismisses the session, same as calling
/// [`ScanHandle::cancel`].
pub struct ScanHandle {
    cancel_tx: watch::Sender<bool>,
    orientation_tx: watch::Sender<FrameOrientation>,
}

impl ScanHandle {
    /// Dismiss the session before completion
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Remap subsequent frames to the given interface orientation
    pub fn set_orientation(&self, orientation: FrameOrientation) {
        let _ = self.orientation_tx.send(orientation);
    }
}

/// A single QR capture session.
///
/// Consumes frames from its source until the first text symbol is detected
/// or the session is dismissed, then stops the source and resolves. Exactly
/// one [`ScanOutcome`] is produced per session.
pub struct ScanSession<S> {
    id: Uuid,
    source: S,
    decoder: QrDecoder,
    options: ScanOptions,
    phase: ScanPhase,
    latched: Option<String>,
    cancel_rx: watch::Receiver<bool>,
    orientation_rx: watch::Receiver<FrameOrientation>,
}

impl<S: FrameSource> ScanSession<S> {
    /// Create a session over an arbitrary frame source.
    pub fn new(source: S, options: ScanOptions) -> (Self, ScanHandle) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (orientation_tx, orientation_rx) = watch::channel(FrameOrientation::default());

        let session = Self {
            id: Uuid::new_v4(),
            source,
            decoder: QrDecoder::new(),
            options,
            phase: ScanPhase::Idle,
            latched: None,
            cancel_rx,
            orientation_rx,
        };

        (
            session,
            ScanHandle {
                cancel_tx,
                orientation_tx,
            },
        )
    }

    /// Session identifier used in log correlation
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current phase of the session
    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    /// Run the session to its single outcome.
    ///
    /// The frame source is stopped before this returns, on success, failure
    /// and cancellation alike.
    pub async fn run(mut self) -> Result<ScanOutcome> {
        self.phase = ScanPhase::CameraActive;
        info!(session = %self.id, capture_image = self.options.capture_image, "capture session started");

        let outcome = self.drive().await;
        self.source.stop().await;

        match &outcome {
            Ok(ScanOutcome::Detected(_)) => {
                self.phase = ScanPhase::Completed;
                info!(session = %self.id, "capture session completed");
            }
            Ok(ScanOutcome::Cancelled) => {
                self.phase = ScanPhase::Cancelled;
                info!(session = %self.id, "capture session cancelled");
            }
            Err(err) => {
                warn!(session = %self.id, error = %err, "capture session failed");
            }
        }

        outcome
    }

    async fn drive(&mut self) -> Result<ScanOutcome> {
        // A cancel issued before the session started still wins.
        if *self.cancel_rx.borrow() {
            return Ok(ScanOutcome::Cancelled);
        }

        enum Step {
            Cancel(std::result::Result<(), watch::error::RecvError>),
            Frame(Result<DynamicImage>),
        }

        loop {
            let step = tokio::select! {
                changed = self.cancel_rx.changed() => Step::Cancel(changed),
                frame = self.source.next_frame() => Step::Frame(frame),
            };

            match step {
                // A closed handle is treated as dismissal: nobody can ever
                // cancel or receive interactively once the controller is gone.
                Step::Cancel(Err(_)) => return Ok(ScanOutcome::Cancelled),
                Step::Cancel(Ok(())) => {
                    if *self.cancel_rx.borrow() {
                        return Ok(ScanOutcome::Cancelled);
                    }
                }
                Step::Frame(Ok(frame)) => {
                    if let Some(outcome) = self.on_frame(frame).await? {
                        return Ok(outcome);
                    }
                }
                Step::Frame(Err(err)) => {
                    // Camera unavailable or a bad frame: stay in the session
                    // without a feed, only detection or dismissal ends it.
                    warn!(session = %self.id, error = %err, "frame capture failed, continuing degraded");
                    sleep(FRAME_RETRY_DELAY).await;
                }
            }
        }
    }

    async fn on_frame(&mut self, frame: DynamicImage) -> Result<Option<ScanOutcome>> {
        let orientation = *self.orientation_rx.borrow();
        let frame = orientation.remap(frame);

        if self.latched.is_some() {
            return Ok(None);
        }

        let symbol = match self.decoder.decode(&frame) {
            Ok(symbol) => symbol,
            Err(Error::NoQrCodeFound) => return Ok(None),
            Err(err) => {
                debug!(session = %self.id, error = %err, "frame decode failed");
                return Ok(None);
            }
        };

        let Some(code) = symbol.as_str().map(str::to_string) else {
            debug!(session = %self.id, "ignoring non-text symbol");
            return Ok(None);
        };

        self.latched = Some(code.clone());
        info!(session = %self.id, "QR code detected");

        if !self.options.capture_image {
            return Ok(Some(ScanOutcome::Detected(DetectionResult {
                code,
                image: None,
            })));
        }

        self.phase = ScanPhase::PhotoCapturing;
        let image = self.capture_still().await?;

        Ok(Some(ScanOutcome::Detected(DetectionResult {
            code,
            image: Some(image),
        })))
    }

    async fn capture_still(&mut self) -> Result<DynamicImage> {
        match self.source.next_frame().await {
            Ok(frame) => {
                let orientation = *self.orientation_rx.borrow();
                Ok(orientation.remap(frame))
            }
            Err(err) => Err(Error::StillCapture(err.to_string())),
        }
    }
}

#[cfg(feature = "camera")]
impl ScanSession<crate::capture::CameraFrameSource> {
    /// Open the configured camera and start a session over it.
    pub async fn with_camera(
        config: crate::camera::CameraConfig,
        options: ScanOptions,
    ) -> Result<(Self, ScanHandle)> {
        let source = crate::capture::CameraFrameSource::open(config).await?;
        Ok(Self::new(source, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr::QrEncoder;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn qr_frame(code: &str) -> DynamicImage {
        QrEncoder::new().encode_string(code).unwrap()
    }

    fn blank_frame() -> DynamicImage {
        DynamicImage::new_luma8(400, 400)
    }

    /// Source that replays a script, then stays pending forever.
    struct ScriptedFrames {
        script: VecDeque<Result<DynamicImage>>,
        stopped: Arc<AtomicBool>,
    }

    impl ScriptedFrames {
        fn new(script: Vec<Result<DynamicImage>>) -> (Self, Arc<AtomicBool>) {
            let stopped = Arc::new(AtomicBool::new(false));
            (
                Self {
                    script: script.into(),
                    stopped: Arc::clone(&stopped),
                },
                stopped,
            )
        }
    }

    #[async_trait]
    impl FrameSource for ScriptedFrames {
        async fn next_frame(&mut self) -> Result<DynamicImage> {
            match self.script.pop_front() {
                Some(frame) => frame,
                None => std::future::pending().await,
            }
        }

        async fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn first_detection_wins() {
        let (source, stopped) = ScriptedFrames::new(vec![
            Ok(blank_frame()),
            Ok(qr_frame("first")),
            Ok(qr_frame("second")),
        ]);
        let (session, _handle) = ScanSession::new(source, ScanOptions::default());

        let outcome = session.run().await.unwrap();
        let detection = outcome.detection().expect("detected");
        assert_eq!(detection.code, "first");
        assert!(detection.image.is_none());
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancellation_before_detection_yields_no_result() {
        let (source, stopped) = ScriptedFrames::new(vec![Ok(blank_frame())]);
        let (session, handle) = ScanSession::new(source, ScanOptions::default());

        let task = tokio::spawn(session.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let outcome = task.await.unwrap().unwrap();
        assert!(outcome.detection().is_none());
        assert!(matches!(outcome, ScanOutcome::Cancelled));
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancel_issued_before_run_wins() {
        let (source, _stopped) = ScriptedFrames::new(vec![Ok(qr_frame("late"))]);
        let (session, handle) = ScanSession::new(source, ScanOptions::default());
        handle.cancel();

        let outcome = session.run().await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Cancelled));
    }

    #[tokio::test]
    async fn dropping_the_handle_dismisses_the_session() {
        let (source, stopped) = ScriptedFrames::new(vec![]);
        let (session, handle) = ScanSession::new(source, ScanOptions::default());
        drop(handle);

        let outcome = session.run().await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Cancelled));
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn requested_still_is_bound_to_the_detection() {
        let (source, stopped) = ScriptedFrames::new(vec![
            Ok(qr_frame("with-photo")),
            Ok(DynamicImage::new_rgb8(64, 48)),
        ]);
        let (session, _handle) =
            ScanSession::new(source, ScanOptions { capture_image: true });

        let outcome = session.run().await.unwrap();
        let detection = outcome.detection().expect("detected");
        assert_eq!(detection.code, "with-photo");
        let image = detection.image.as_ref().expect("still captured");
        assert_eq!((image.width(), image.height()), (64, 48));
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn still_capture_failure_fails_the_session() {
        let (source, stopped) = ScriptedFrames::new(vec![
            Ok(qr_frame("doomed")),
            Err(Error::FrameCapture("sensor wedged".to_string())),
        ]);
        let (session, _handle) =
            ScanSession::new(source, ScanOptions { capture_image: true });

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, Error::StillCapture(_)));
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn frame_errors_leave_the_session_degraded_but_alive() {
        let (source, _stopped) = ScriptedFrames::new(vec![
            Err(Error::Camera("device unavailable".to_string())),
            Ok(qr_frame("recovered")),
        ]);
        let (session, _handle) = ScanSession::new(source, ScanOptions::default());

        let outcome = session.run().await.unwrap();
        assert_eq!(outcome.detection().unwrap().code, "recovered");
    }

    #[tokio::test]
    async fn orientation_remap_applies_to_the_still() {
        let (source, _stopped) = ScriptedFrames::new(vec![
            Ok(qr_frame("sideways")),
            Ok(DynamicImage::new_rgb8(64, 48)),
        ]);
        let (session, handle) =
            ScanSession::new(source, ScanOptions { capture_image: true });
        handle.set_orientation(FrameOrientation::LandscapeLeft);

        let outcome = session.run().await.unwrap();
        let detection = outcome.detection().expect("detected");
        let image = detection.image.as_ref().expect("still captured");
        assert_eq!((image.width(), image.height()), (48, 64));
    }
}
