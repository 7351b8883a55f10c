//! The booth itself: idle screen, posing, capture, review and printing.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Local;
use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::camera::Camera;
use crate::clock::Clock;
use crate::collage::{self, PICTURES_PER_COLLAGE};
use crate::config::Configuration;
use crate::display::Display;
use crate::error::CameraError;
use crate::events::{Event, MouseButton};
use crate::gpio::Gpio;
use crate::pictures::PictureList;
use crate::printer::Printer;
use crate::slideshow::Slideshow;

/// Tries per shot before the session is abandoned.
pub const ATTEMPTS_PER_SHOT: usize = 3;

const COUNTDOWN_STEP: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const FRAME_INTERVAL: Duration = Duration::from_millis(50);
/// The preview cancel hint is only shown this long.
const CANCEL_HINT: Duration = Duration::from_secs(10);

/// Whether the caller should keep going or unwind to shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

pub struct Photobooth {
    config: Configuration,
    display: Box<dyn Display>,
    camera: Box<dyn Camera>,
    gpio: Box<dyn Gpio>,
    printer: Box<dyn Printer>,
    clock: Box<dyn Clock>,
    pictures: PictureList,
    prints: PictureList,
    slideshow: Option<Slideshow>,
}

impl Photobooth {
    /// Pictures go to `<output-dir>/<today>/` and print sheets to
    /// `<output-dir>/<today><print-suffix>/`.
    pub fn new(
        config: Configuration,
        display: Box<dyn Display>,
        camera: Box<dyn Camera>,
        mut gpio: Box<dyn Gpio>,
        printer: Box<dyn Printer>,
        clock: Box<dyn Clock>,
    ) -> Result<Self> {
        let date = Local::now().format("%Y-%m-%d").to_string();
        let pics = &config.pictures;
        let pictures = PictureList::new(pics.picture_dir(&date), pics.basename.clone())?;
        let prints = PictureList::new(pics.print_dir(&date), pics.basename.clone())?;

        let trigger = config.gpio.trigger_channel;
        let shutdown = config.gpio.shutdown_channel;
        let sender = display.event_sender();
        gpio.watch_inputs(
            &[trigger, shutdown],
            Arc::new(move |channel| {
                if channel == trigger || channel == shutdown {
                    sender.trigger(Event::Gpio(channel));
                }
            }),
        )
        .context("failed to watch gpio inputs")?;

        let slideshow = config
            .slideshow
            .enabled
            .then(|| Slideshow::new(pictures.dir(), config.slideshow.shuffle));

        Ok(Self {
            config,
            display,
            camera,
            gpio,
            printer,
            clock,
            pictures,
            prints,
            slideshow,
        })
    }

    pub fn pictures(&self) -> &PictureList {
        &self.pictures
    }

    pub fn prints(&self) -> &PictureList {
        &self.prints
    }

    /// Idle until a shutdown is requested. Errors abort the loop.
    pub fn run(&mut self) -> Result<()> {
        self.set_lamp(true)?;
        if self.slideshow.is_some() {
            self.run_slideshow()
        } else {
            self.run_plain()
        }
    }

    fn run_plain(&mut self) -> Result<()> {
        loop {
            self.camera.set_idle();
            show_text(self.display.as_mut(), &self.config.messages.idle)?;
            let event = self.display.wait_for_event()?;
            if self.handle_event(event)? == Flow::Shutdown {
                return Ok(());
            }
        }
    }

    fn run_slideshow(&mut self) -> Result<()> {
        let dwell = self.config.slideshow.display_time;
        loop {
            self.camera.set_idle();
            if let Some(slideshow) = self.slideshow.as_mut() {
                slideshow.display_next(self.display.as_mut(), &self.config.messages.idle)?;
            }
            let shown = self.clock.now();
            while self.clock.now().duration_since(shown) < dwell {
                if self.check_and_handle_events()? == Flow::Shutdown {
                    return Ok(());
                }
                self.clock.sleep(POLL_INTERVAL);
            }
        }
    }

    /// Drain and handle everything that is pending.
    pub fn check_and_handle_events(&mut self) -> Result<Flow> {
        while let Some(event) = self.display.check_for_event()? {
            if self.handle_event(event)? == Flow::Shutdown {
                return Ok(Flow::Shutdown);
            }
        }
        Ok(Flow::Continue)
    }

    pub fn handle_event(&mut self, event: Event) -> Result<Flow> {
        debug!(?event, "event");
        match event {
            Event::Shutdown => Ok(Flow::Shutdown),
            Event::Keypress(key) => self.handle_keypress(key),
            Event::MouseClick { button, position } => self.handle_mouse(button, position),
            Event::Gpio(channel) => self.handle_gpio_event(channel),
        }
    }

    pub fn handle_keypress(&mut self, key: char) -> Result<Flow> {
        match key {
            'q' => Ok(Flow::Shutdown),
            'c' => {
                let flow = self.take_picture()?;
                self.display.cancel_events();
                Ok(flow)
            }
            'u' => {
                let flow = self.show_preview(self.config.timing.preview_time, false)?;
                self.display.cancel_events();
                Ok(flow)
            }
            _ => Ok(Flow::Continue),
        }
    }

    pub fn handle_mouse(&mut self, button: MouseButton, position: (f64, f64)) -> Result<Flow> {
        if button != MouseButton::Left {
            return Ok(Flow::Continue);
        }
        debug!(x = position.0, y = position.1, "screen touched");
        self.take_picture()
    }

    pub fn handle_gpio_event(&mut self, channel: u8) -> Result<Flow> {
        if channel == self.config.gpio.trigger_channel {
            self.take_picture()
        } else if channel == self.config.gpio.shutdown_channel {
            info!(channel, "shutdown switch pressed");
            Ok(Flow::Shutdown)
        } else {
            Ok(Flow::Continue)
        }
    }

    /// One full session: pose, four shots, collage, review.
    pub fn take_picture(&mut self) -> Result<Flow> {
        info!("photo session started");
        self.set_lamp(false)?;
        show_text(self.display.as_mut(), &self.config.messages.pose)?;
        self.clock.sleep(self.config.timing.pose_message_time);

        let mut shots = Vec::with_capacity(PICTURES_PER_COLLAGE);
        for shot in 0..PICTURES_PER_COLLAGE {
            let pose_time = if shot == 0 {
                self.config.timing.pose_time_first
            } else {
                self.config.timing.pose_time
            };
            if self.show_preview(pose_time, true)? == Flow::Shutdown {
                return Ok(Flow::Shutdown);
            }
            shots.push(self.capture_shot(shot)?);
        }

        show_text(self.display.as_mut(), &self.config.messages.wait)?;
        self.camera.set_idle();

        let (_, collage) = self.assemble_pictures(&shots, self.display.size())?;
        self.display.clear();
        self.display.show_picture(&collage);
        self.display.apply()?;
        self.clock.sleep(self.config.timing.review_delay);

        self.display.clear();
        self.display.show_picture(&collage);
        self.display.show_message(&self.config.messages.review);
        self.display.apply()?;
        let flow = self.review(&shots)?;

        if flow == Flow::Continue {
            self.set_lamp(true)?;
        }
        Ok(flow)
    }

    /// Capture shot `shot` (zero based), retrying recoverable failures.
    ///
    /// Every attempt takes at least `min-shot-time`. When the last attempt
    /// fails the session is given up with a fatal error.
    pub fn capture_shot(&mut self, shot: usize) -> Result<PathBuf> {
        let target = self.config.pictures.capture_path(shot);
        let message = self.config.messages.shot(shot + 1, PICTURES_PER_COLLAGE);

        for attempt in 1..=ATTEMPTS_PER_SHOT {
            show_text(self.display.as_mut(), &message)?;
            let started = self.clock.now();

            match self.camera.take_picture(&target) {
                Ok(path) => {
                    self.pad_shot(started);
                    debug!(shot, attempt, path = %path.display(), "shot taken");
                    return Ok(path);
                }
                Err(err) if !err.is_recoverable() => return Err(err.into()),
                Err(err) => {
                    warn!(shot, attempt, error = %err, "shot failed");
                    if attempt < ATTEMPTS_PER_SHOT {
                        show_text(self.display.as_mut(), err.message())?;
                        self.clock.sleep(self.config.timing.retry_delay);
                        self.pad_shot(started);
                    }
                }
            }
        }

        warn!(shot, attempts = ATTEMPTS_PER_SHOT, "giving up on session");
        Err(CameraError::fatal(self.config.messages.giving_up.clone()).into())
    }

    fn pad_shot(&self, started: Instant) {
        let elapsed = self.clock.now().duration_since(started);
        if let Some(rest) = self.config.timing.min_shot_time.checked_sub(elapsed)
            && !rest.is_zero()
        {
            self.clock.sleep(rest);
        }
    }

    /// Count down `seconds`.
    ///
    /// A magnitude of one is a plain one second pause. With a preview-capable
    /// camera and a non-negative value the live view is shown under the
    /// countdown; otherwise the numbers are shown on black. A preview that
    /// is not counting towards a shot can be cancelled with `u`.
    pub fn show_preview(&mut self, seconds: i32, should_count: bool) -> Result<Flow> {
        let secs = seconds.unsigned_abs();
        if secs == 1 {
            self.clock.sleep(COUNTDOWN_STEP);
            self.display.cancel_events();
            return Ok(Flow::Continue);
        }
        if seconds >= 0 && self.camera.has_preview() {
            return self.live_preview(secs, should_count);
        }
        for remaining in (1..=secs).rev() {
            show_text(self.display.as_mut(), &remaining.to_string())?;
            self.clock.sleep(COUNTDOWN_STEP);
        }
        Ok(Flow::Continue)
    }

    fn live_preview(&mut self, secs: u32, should_count: bool) -> Result<Flow> {
        let total = Duration::from_secs(u64::from(secs));
        let started = self.clock.now();
        let mut progress = Duration::ZERO;

        while progress < total {
            self.display.clear();
            match self.camera.take_preview() {
                Ok(bytes) => match image::load_from_memory(&bytes) {
                    Ok(frame) => {
                        let mode = self.config.pictures.color_mode;
                        let frame = collage::apply_color_mode(frame.to_rgb8(), mode);
                        self.display.show_picture(&frame);
                    }
                    Err(err) => warn!(error = %err, "undecodable preview frame"),
                },
                Err(err) if err.is_recoverable() => warn!(error = %err, "preview frame dropped"),
                Err(err) => return Err(err.into()),
            }

            let remaining = secs.saturating_sub(progress.as_secs() as u32);
            let mut text = remaining.to_string();
            if !should_count && progress < CANCEL_HINT {
                text.push_str("\n\n");
                text.push_str(&self.config.messages.preview_cancel);
            }
            self.display.show_message(&text);
            self.display.apply()?;
            self.clock.sleep(FRAME_INTERVAL);

            // Slow frames must not make the countdown skip numbers.
            progress = (progress + COUNTDOWN_STEP).min(self.clock.now().duration_since(started));

            if !should_count {
                match self.display.check_for_event()? {
                    Some(Event::Keypress('u')) => {
                        self.display.cancel_events();
                        return Ok(Flow::Continue);
                    }
                    Some(Event::Shutdown) => return Ok(Flow::Shutdown),
                    Some(event) => debug!(?event, "ignored during preview"),
                    None => {}
                }
            }
        }
        Ok(Flow::Continue)
    }

    /// Compose the screen collage from the shots, save it as the next
    /// picture and return its path together with the image.
    pub fn assemble_pictures(
        &mut self,
        shots: &[PathBuf],
        size: (u32, u32),
    ) -> Result<(PathBuf, DynamicImage)> {
        let images = load_shots(shots)?;
        let grid = collage::compose_grid(&images, size)?;
        let image = collage::apply_color_mode(grid, self.config.pictures.color_mode);
        let path = self.pictures.get_next();
        collage::save_jpeg(&image, &path, self.config.pictures.jpeg_quality)?;
        info!(path = %path.display(), "collage saved");
        Ok((path, image))
    }

    /// Compose the print sheet (each shot twice side by side) at the
    /// camera's resolution turned to portrait.
    pub fn assemble_print(&mut self, shots: &[PathBuf]) -> Result<(PathBuf, DynamicImage)> {
        let images = load_shots(shots)?;
        let sheet = collage::compose_print(&images, self.config.pictures.print_size())?;
        let image = collage::apply_color_mode(sheet, self.config.pictures.color_mode);
        let path = self.prints.get_next();
        collage::save_jpeg(&image, &path, self.config.pictures.jpeg_quality)?;
        info!(path = %path.display(), "print sheet saved");
        Ok((path, image))
    }

    /// Wait for the verdict on a finished session: `c` prints, `u` discards.
    pub fn review(&mut self, shots: &[PathBuf]) -> Result<Flow> {
        loop {
            match self.display.wait_for_event()? {
                Event::Shutdown | Event::Keypress('q') => return Ok(Flow::Shutdown),
                Event::Gpio(channel) if channel == self.config.gpio.shutdown_channel => {
                    return Ok(Flow::Shutdown);
                }
                Event::Keypress('u') => {
                    debug!("session dismissed");
                    self.display.cancel_events();
                    return Ok(Flow::Continue);
                }
                Event::Keypress('c') => {
                    self.print_out(shots)?;
                    self.display.cancel_events();
                    return Ok(Flow::Continue);
                }
                event => debug!(?event, "ignored during review"),
            }
        }
    }

    pub fn print_out(&mut self, shots: &[PathBuf]) -> Result<()> {
        show_text(self.display.as_mut(), &self.config.messages.wait)?;
        let (path, sheet) = self.assemble_print(shots)?;
        self.display.clear();
        self.display.show_picture(&sheet);
        self.display.show_message(&self.config.messages.printing);
        self.display.apply()?;
        self.printer.print(&path)
    }

    /// Put `err` on screen for a while. Camera errors show their own text,
    /// anything else the generic message.
    pub fn show_failure(&mut self, err: &anyhow::Error) {
        let message = match err.downcast_ref::<CameraError>() {
            Some(camera) => camera.message(),
            None => self.config.messages.serious_error.as_str(),
        };
        let text = format!("{}{message}", self.config.messages.failure_prefix);
        self.display.clear();
        self.display.show_message(&text);
        if let Err(err) = self.display.apply() {
            warn!(error = %format!("{err:#}"), "failed to show failure");
        }
        self.display.cancel_events();
        self.clock.sleep(self.config.timing.failure_display_time);
    }

    pub fn teardown(&mut self) {
        info!("shutting down");
        if let Err(err) = show_text(self.display.as_mut(), &self.config.messages.shutdown) {
            warn!(error = %format!("{err:#}"), "failed to show shutdown message");
        }
        if let Err(err) = self.set_lamp(false) {
            warn!(error = %format!("{err:#}"), "failed to switch lamp off");
        }
        self.display.cancel_events();
        self.display.teardown();
        self.gpio.teardown();
    }

    fn set_lamp(&mut self, on: bool) -> Result<()> {
        self.gpio
            .set_output(self.config.gpio.lamp_channel, on)
            .context("failed to switch lamp")
    }
}

fn show_text(display: &mut dyn Display, text: &str) -> Result<()> {
    display.clear();
    display.show_message(text);
    display.apply()
}

fn load_shots(shots: &[PathBuf]) -> Result<Vec<DynamicImage>> {
    shots.iter().map(|path| load_shot(path)).collect()
}

fn load_shot(path: &Path) -> Result<DynamicImage> {
    image::open(path).with_context(|| format!("failed to open shot {}", path.display()))
}
