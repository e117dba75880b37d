#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use facelink::camera::FrameSource;
use facelink::protocol::{RecognitionResult, RosterEntry};
use facelink::{EncodedImage, FaceLinkError, Frame, RecognitionService, Result};
use image::{Rgba, RgbaImage};

#[derive(Clone)]
pub enum Answer {
    Result(RecognitionResult),
    Unreachable,
    /// The request never completes.
    Hang,
}

/// In-process stand-in for the remote service that records every call.
pub struct FakeService {
    pub enrolls: Mutex<Vec<(String, Vec<EncodedImage>)>>,
    pub enroll_failures: AtomicUsize,
    pub enroll_hangs: AtomicBool,
    pub answer: Mutex<Answer>,
    pub recognize_calls: AtomicUsize,
    pub users: Mutex<Vec<RosterEntry>>,
    pub users_calls: AtomicUsize,
    pub users_fail: AtomicBool,
    pub train_calls: AtomicUsize,
}

impl FakeService {
    pub fn new() -> Self {
        Self {
            enrolls: Mutex::new(Vec::new()),
            enroll_failures: AtomicUsize::new(0),
            enroll_hangs: AtomicBool::new(false),
            answer: Mutex::new(Answer::Unreachable),
            recognize_calls: AtomicUsize::new(0),
            users: Mutex::new(Vec::new()),
            users_calls: AtomicUsize::new(0),
            users_fail: AtomicBool::new(false),
            train_calls: AtomicUsize::new(0),
        }
    }

    pub fn answering(self, answer: Answer) -> Self {
        *self.answer.lock().unwrap() = answer;
        self
    }

    pub fn with_users(self, users: Vec<RosterEntry>) -> Self {
        *self.users.lock().unwrap() = users;
        self
    }

    pub fn set_users(&self, users: Vec<RosterEntry>) {
        *self.users.lock().unwrap() = users;
    }

    pub fn recognize_count(&self) -> usize {
        self.recognize_calls.load(Ordering::SeqCst)
    }

    pub fn users_count(&self) -> usize {
        self.users_calls.load(Ordering::SeqCst)
    }
}

impl RecognitionService for FakeService {
    async fn enroll(&self, name: &str, images: &[EncodedImage]) -> Result<()> {
        self.enrolls.lock().unwrap().push((name.to_string(), images.to_vec()));
        if self.enroll_hangs.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        let remaining = self.enroll_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.enroll_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(FaceLinkError::Transport("enroll endpoint unreachable".into()));
        }
        Ok(())
    }

    async fn train(&self) -> Result<()> {
        self.train_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn recognize(&self, _image: &EncodedImage) -> Result<RecognitionResult> {
        self.recognize_calls.fetch_add(1, Ordering::SeqCst);
        let answer = self.answer.lock().unwrap().clone();
        match answer {
            Answer::Result(result) => Ok(result),
            Answer::Unreachable => Err(FaceLinkError::Transport("connection refused".into())),
            Answer::Hang => std::future::pending().await,
        }
    }

    async fn users(&self) -> Result<Vec<RosterEntry>> {
        self.users_calls.fetch_add(1, Ordering::SeqCst);
        if self.users_fail.load(Ordering::SeqCst) {
            return Err(FaceLinkError::Transport("users endpoint unreachable".into()));
        }
        Ok(self.users.lock().unwrap().clone())
    }
}

pub fn matched(name: &str, confidence: u8) -> Answer {
    Answer::Result(RecognitionResult {
        matched: true,
        subject_label: name.to_string(),
        confidence,
        model_ready: true,
    })
}

pub fn model_not_ready() -> Answer {
    Answer::Result(RecognitionResult {
        matched: false,
        subject_label: facelink::protocol::MODEL_NOT_READY.to_string(),
        confidence: 62,
        model_ready: false,
    })
}

pub fn entry(id: i64, name: &str, thumbnail: Option<EncodedImage>) -> RosterEntry {
    RosterEntry {
        id,
        name: name.to_string(),
        thumbnail,
        sample_count: 5,
        last_updated: "2024-05-01T12:00:00Z".to_string(),
    }
}

pub fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let v = ((x + y) * 255 / (width + height).max(1)) as u8;
        Rgba([v, v, v, 255])
    })
}

/// Frame source whose readiness and release are observable from the test.
pub struct GatedSource {
    pub ready: Arc<AtomicBool>,
    pub released: Arc<AtomicBool>,
    frame: RgbaImage,
}

impl GatedSource {
    pub fn new(ready: bool) -> (Self, Arc<AtomicBool>, Arc<AtomicBool>) {
        let ready = Arc::new(AtomicBool::new(ready));
        let released = Arc::new(AtomicBool::new(false));
        let source = Self { ready: ready.clone(), released: released.clone(), frame: gradient(640, 480) };
        (source, ready, released)
    }
}

impl FrameSource for GatedSource {
    fn dimensions(&self) -> (u32, u32) {
        if self.ready.load(Ordering::SeqCst) && !self.released.load(Ordering::SeqCst) {
            self.frame.dimensions()
        } else {
            (0, 0)
        }
    }

    fn current_frame(&mut self) -> Result<Frame> {
        Ok(self.frame.clone())
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        "gated".into()
    }
}

pub struct Flags {
    pub ready: Arc<AtomicBool>,
    pub released: Arc<AtomicBool>,
}

/// Streams with real dimensions but fails every frame with `error`.
pub struct FailingSource {
    pub released: Arc<AtomicBool>,
    error: fn() -> FaceLinkError,
}

impl FailingSource {
    pub fn new(error: fn() -> FaceLinkError) -> (Self, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        (Self { released: released.clone(), error }, released)
    }
}

impl FrameSource for FailingSource {
    fn dimensions(&self) -> (u32, u32) {
        (640, 480)
    }

    fn current_frame(&mut self) -> Result<Frame> {
        Err((self.error)())
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        "failing".into()
    }
}
