//! End-to-end capture flow: synthetic frames in, logbook submission URL out.

use async_trait::async_trait;
use fieldscan::{
    DecodedSymbol, FrameSource, QrEncoder, Result, ScanOptions, ScanOutcome, ScanSession,
    SolutionLogger, SolutionPayload, json_stringify,
};
use image::DynamicImage;
use std::collections::VecDeque;

struct ReplayFrames {
    frames: VecDeque<DynamicImage>,
}

impl ReplayFrames {
    fn new(frames: Vec<DynamicImage>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

#[async_trait]
impl FrameSource for ReplayFrames {
    async fn next_frame(&mut self) -> Result<DynamicImage> {
        match self.frames.pop_front() {
            Some(frame) => Ok(frame),
            None => std::future::pending().await,
        }
    }

    async fn stop(&mut self) {
        self.frames.clear();
    }
}

fn qr_frame(code: &str) -> DynamicImage {
    QrEncoder::new().encode_string(code).unwrap()
}

#[tokio::test]
async fn scanned_code_flows_into_a_submission_url() {
    let source = ReplayFrames::new(vec![
        DynamicImage::new_luma8(400, 400),
        qr_frame("AB CD"),
    ]);
    let (session, _handle) = ScanSession::new(source, ScanOptions::default());

    let outcome = session.run().await.unwrap();
    let detection = outcome.detection().expect("code detected");
    assert_eq!(detection.code, "AB CD");

    let logger = SolutionLogger::new();
    assert_eq!(
        logger.submit_url(&detection.code),
        "appquest://submit/AB%20CD"
    );
}

#[tokio::test]
async fn scanned_code_flows_into_a_json_payload() {
    let source = ReplayFrames::new(vec![qr_frame("X")]);
    let (session, _handle) = ScanSession::new(source, ScanOptions::default());

    let outcome = session.run().await.unwrap();
    let detection = outcome.detection().expect("code detected");

    let payload = SolutionPayload::new("Metalldetektor", detection.code.clone());
    let json = json_stringify(&payload);
    assert_eq!(json, r#"{"task":"Metalldetektor","solution":"X"}"#);

    // The submission URL carries the percent-encoded JSON blob.
    let url = SolutionLogger::new().submit_url(&json);
    assert!(url.starts_with("appquest://submit/%7B%22task%22"));
}

#[tokio::test]
async fn two_codes_in_one_session_yield_only_the_first() {
    let source = ReplayFrames::new(vec![qr_frame("one"), qr_frame("two")]);
    let (session, _handle) = ScanSession::new(source, ScanOptions::default());

    let outcome = session.run().await.unwrap();
    assert_eq!(outcome.detection().unwrap().code, "one");
}

#[tokio::test]
async fn cancelled_session_produces_no_detection() {
    let source = ReplayFrames::new(vec![]);
    let (session, handle) = ScanSession::new(source, ScanOptions::default());

    let task = tokio::spawn(session.run());
    handle.cancel();

    let outcome = task.await.unwrap().unwrap();
    assert!(matches!(outcome, ScanOutcome::Cancelled));
}

#[tokio::test]
async fn still_frame_accompanies_the_detection_when_requested() {
    let source = ReplayFrames::new(vec![qr_frame("photo"), DynamicImage::new_rgb8(80, 60)]);
    let (session, _handle) = ScanSession::new(source, ScanOptions { capture_image: true });

    let outcome = session.run().await.unwrap();
    let detection = outcome.detection().expect("code detected");
    let image = detection.image.as_ref().expect("still frame present");
    assert_eq!((image.width(), image.height()), (80, 60));
}

#[test]
fn binary_symbols_keep_their_bytes() {
    let symbol = DecodedSymbol::from_bytes(vec![0x00, 0xFF]);
    assert!(symbol.as_str().is_none());
    assert_eq!(symbol.as_bytes(), &[0x00, 0xFF]);
}
