#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use photobooth::camera::Camera;
use photobooth::clock::Clock;
use photobooth::config::Configuration;
use photobooth::display::Display;
use photobooth::error::CameraError;
use photobooth::events::{Event, EventQueue, EventSender};
use photobooth::gpio::{Gpio, InputCallback};
use photobooth::printer::Printer;
use photobooth::Photobooth;

pub const RETRY_DELAY: Duration = Duration::from_secs(5);
pub const MIN_SHOT_TIME: Duration = Duration::from_millis(700);
pub const POSE_MESSAGE_TIME: Duration = Duration::from_secs(2);
pub const REVIEW_DELAY: Duration = Duration::from_secs(3);
pub const FAILURE_DISPLAY_TIME: Duration = Duration::from_secs(4);

/// Small sizes keep the image work fast; every delay is distinct so tests
/// can count them in the clock's sleep log.
pub fn test_config(root: &Path) -> Configuration {
    let mut cfg = Configuration::default();
    cfg.display.size = (400, 300);
    cfg.pictures.output_dir = root.join("out");
    cfg.pictures.capture_dir = root.join("capture");
    cfg.pictures.image_size = (600, 400);
    cfg.slideshow.enabled = false;
    cfg.timing.pose_time_first = -1;
    cfg.timing.pose_time = -1;
    cfg.timing.retry_delay = RETRY_DELAY;
    cfg.timing.min_shot_time = MIN_SHOT_TIME;
    cfg.timing.pose_message_time = POSE_MESSAGE_TIME;
    cfg.timing.review_delay = REVIEW_DELAY;
    cfg.timing.failure_display_time = FAILURE_DISPLAY_TIME;
    fs::create_dir_all(&cfg.pictures.capture_dir).unwrap();
    cfg
}

#[derive(Debug, Default)]
pub struct DisplayLog {
    pub messages: Vec<String>,
    pub pictures: Vec<(u32, u32)>,
    pub applied: usize,
    pub cancels: usize,
    pub torn_down: bool,
}

/// Records what is drawn. `wait_for_event` hands out queued events first,
/// then the script; an exhausted script reads as a shutdown request.
pub struct FakeDisplay {
    size: (u32, u32),
    queue: EventQueue,
    script: VecDeque<Event>,
    log: Arc<Mutex<DisplayLog>>,
}

impl FakeDisplay {
    pub fn new(size: (u32, u32), script: Vec<Event>) -> (Self, Arc<Mutex<DisplayLog>>) {
        let log = Arc::new(Mutex::new(DisplayLog::default()));
        let display = Self {
            size,
            queue: EventQueue::new(),
            script: script.into(),
            log: log.clone(),
        };
        (display, log)
    }
}

impl Display for FakeDisplay {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn clear(&mut self) {}

    fn show_message(&mut self, text: &str) {
        self.log.lock().unwrap().messages.push(text.to_string());
    }

    fn show_picture(&mut self, picture: &DynamicImage) {
        self.log
            .lock()
            .unwrap()
            .pictures
            .push((picture.width(), picture.height()));
    }

    fn apply(&mut self) -> Result<()> {
        self.log.lock().unwrap().applied += 1;
        Ok(())
    }

    fn check_for_event(&mut self) -> Result<Option<Event>> {
        Ok(self.queue.try_next())
    }

    fn wait_for_event(&mut self) -> Result<Event> {
        Ok(self
            .queue
            .try_next()
            .or_else(|| self.script.pop_front())
            .unwrap_or(Event::Shutdown))
    }

    fn event_sender(&self) -> EventSender {
        self.queue.sender()
    }

    fn cancel_events(&mut self) {
        self.log.lock().unwrap().cancels += 1;
        self.queue.cancel();
    }

    fn teardown(&mut self) {
        self.log.lock().unwrap().torn_down = true;
    }
}

#[derive(Debug, Default)]
pub struct CameraLog {
    pub attempts: Vec<PathBuf>,
    pub previews: usize,
    pub idles: usize,
}

/// Plays back a list of capture outcomes; once it runs out every capture
/// succeeds. Successful captures write a small JPEG to the target.
pub struct ScriptedCamera {
    outcomes: VecDeque<Result<(), CameraError>>,
    preview: bool,
    log: Arc<Mutex<CameraLog>>,
}

impl ScriptedCamera {
    pub fn new(outcomes: Vec<Result<(), CameraError>>) -> (Self, Arc<Mutex<CameraLog>>) {
        let log = Arc::new(Mutex::new(CameraLog::default()));
        let camera = Self {
            outcomes: outcomes.into(),
            preview: false,
            log: log.clone(),
        };
        (camera, log)
    }

    pub fn with_preview(mut self) -> Self {
        self.preview = true;
        self
    }
}

impl Camera for ScriptedCamera {
    fn take_picture(&mut self, path: &Path) -> Result<PathBuf, CameraError> {
        self.log.lock().unwrap().attempts.push(path.to_path_buf());
        self.outcomes.pop_front().unwrap_or(Ok(()))?;
        RgbImage::from_pixel(60, 40, Rgb([200, 120, 40]))
            .save(path)
            .unwrap();
        Ok(path.to_path_buf())
    }

    fn has_preview(&self) -> bool {
        self.preview
    }

    fn take_preview(&mut self) -> Result<Vec<u8>, CameraError> {
        self.log.lock().unwrap().previews += 1;
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 12, Rgb([1, 2, 3])))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        Ok(buf.into_inner())
    }

    fn set_idle(&mut self) {
        self.log.lock().unwrap().idles += 1;
    }
}

#[derive(Default)]
pub struct GpioLog {
    pub outputs: Vec<(u8, bool)>,
    pub watched: Vec<u8>,
    pub callback: Option<InputCallback>,
    pub torn_down: bool,
}

impl GpioLog {
    /// Simulate a press on `channel` as the interrupt thread would.
    pub fn press(&self, channel: u8) {
        if let Some(callback) = &self.callback {
            callback(channel);
        }
    }
}

pub struct RecordingGpio {
    log: Arc<Mutex<GpioLog>>,
}

impl RecordingGpio {
    pub fn new() -> (Self, Arc<Mutex<GpioLog>>) {
        let log = Arc::new(Mutex::new(GpioLog::default()));
        (Self { log: log.clone() }, log)
    }
}

impl Gpio for RecordingGpio {
    fn set_output(&mut self, channel: u8, high: bool) -> Result<()> {
        self.log.lock().unwrap().outputs.push((channel, high));
        Ok(())
    }

    fn read_input(&mut self, _channel: u8) -> Result<bool> {
        Ok(true)
    }

    fn watch_inputs(&mut self, channels: &[u8], callback: InputCallback) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.watched.extend_from_slice(channels);
        log.callback = Some(callback);
        Ok(())
    }

    fn teardown(&mut self) {
        self.log.lock().unwrap().torn_down = true;
    }
}

pub struct RecordingPrinter {
    jobs: Arc<Mutex<Vec<PathBuf>>>,
}

impl RecordingPrinter {
    pub fn new() -> (Self, Arc<Mutex<Vec<PathBuf>>>) {
        let jobs = Arc::new(Mutex::new(Vec::new()));
        (Self { jobs: jobs.clone() }, jobs)
    }
}

impl Printer for RecordingPrinter {
    fn print(&mut self, path: &Path) -> Result<()> {
        self.jobs.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

/// Time only moves when someone sleeps.
#[derive(Clone)]
pub struct VirtualClock {
    base: Instant,
    state: Arc<Mutex<(Duration, Vec<Duration>)>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            state: Arc::new(Mutex::new((Duration::ZERO, Vec::new()))),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().unwrap().1.clone()
    }

    pub fn count(&self, duration: Duration) -> usize {
        self.sleeps().iter().filter(|d| **d == duration).count()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        self.base + self.state.lock().unwrap().0
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap();
        state.0 += duration;
        state.1.push(duration);
    }
}

/// A booth wired to fakes, with handles on everything they record.
pub struct Rig {
    pub booth: Photobooth,
    pub display: Arc<Mutex<DisplayLog>>,
    pub sender: EventSender,
    pub camera: Arc<Mutex<CameraLog>>,
    pub gpio: Arc<Mutex<GpioLog>>,
    pub printer: Arc<Mutex<Vec<PathBuf>>>,
    pub clock: VirtualClock,
}

impl Rig {
    pub fn new(cfg: Configuration, camera: ScriptedCamera, script: Vec<Event>) -> Self {
        let camera_log = camera.log.clone();
        let (display, display_log) = FakeDisplay::new(cfg.display.size, script);
        let sender = display.event_sender();
        let (gpio, gpio_log) = RecordingGpio::new();
        let (printer, jobs) = RecordingPrinter::new();
        let clock = VirtualClock::new();
        let booth = Photobooth::new(
            cfg,
            Box::new(display),
            Box::new(camera),
            Box::new(gpio),
            Box::new(printer),
            Box::new(clock.clone()),
        )
        .unwrap();
        Self {
            booth,
            display: display_log,
            sender,
            camera: camera_log,
            gpio: gpio_log,
            printer: jobs,
            clock,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.display.lock().unwrap().messages.clone()
    }

    pub fn attempts(&self) -> Vec<PathBuf> {
        self.camera.lock().unwrap().attempts.clone()
    }

    pub fn lamp(&self, channel: u8) -> Vec<bool> {
        self.gpio
            .lock()
            .unwrap()
            .outputs
            .iter()
            .filter(|(ch, _)| *ch == channel)
            .map(|(_, high)| *high)
            .collect()
    }
}
