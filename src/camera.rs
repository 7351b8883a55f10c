//! Camera facade and its backends.

use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tracing::{debug, info, warn};

use crate::command::{CommandOutput, CommandRunner, fill_template, shell_runner};
use crate::config::{CameraBackend, Configuration};
use crate::error::CameraError;

pub trait Camera {
    /// Capture a still into `path` and return where it ended up.
    fn take_picture(&mut self, path: &Path) -> Result<PathBuf, CameraError>;

    fn has_preview(&self) -> bool;

    /// One encoded preview frame (JPEG or PNG).
    fn take_preview(&mut self) -> Result<Vec<u8>, CameraError>;

    /// Let the camera rest between sessions.
    fn set_idle(&mut self);
}

pub fn from_config(cfg: &Configuration) -> Box<dyn Camera> {
    match cfg.camera.backend {
        CameraBackend::Command => Box::new(CommandCamera::new(
            cfg.camera.capture_command.clone(),
            cfg.camera.preview_command.clone(),
            cfg.camera.idle_command.clone(),
        )),
        CameraBackend::Placeholder => Box::new(PlaceholderCamera::new(cfg.pictures.image_size)),
    }
}

/// Drives a command line tool such as `gphoto2`.
pub struct CommandCamera {
    capture: String,
    preview: Option<String>,
    idle: Option<String>,
    runner: CommandRunner,
}

impl CommandCamera {
    pub fn new(capture: String, preview: Option<String>, idle: Option<String>) -> Self {
        Self::with_runner(capture, preview, idle, shell_runner())
    }

    pub fn with_runner(
        capture: String,
        preview: Option<String>,
        idle: Option<String>,
        runner: CommandRunner,
    ) -> Self {
        Self {
            capture,
            preview,
            idle,
            runner,
        }
    }

    fn run(&self, command: &str) -> Result<CommandOutput, CameraError> {
        debug!(command, "running camera command");
        (self.runner)(command).map_err(|err| {
            CameraError::fatal(format!("Camera command could not be started: {err}"))
        })
    }
}

impl Camera for CommandCamera {
    fn take_picture(&mut self, path: &Path) -> Result<PathBuf, CameraError> {
        // A stale file from an earlier session must not pass for a new shot.
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to remove stale capture")
            }
        }

        let output = self.run(&fill_template(&self.capture, path))?;
        if !output.success {
            return Err(classify_failure(&output, "Cannot capture picture!"));
        }
        if !path.exists() {
            return Err(CameraError::recoverable(
                "Camera did not deliver a picture!",
            ));
        }
        info!(path = %path.display(), "captured picture");
        Ok(path.to_path_buf())
    }

    fn has_preview(&self) -> bool {
        self.preview.is_some()
    }

    fn take_preview(&mut self) -> Result<Vec<u8>, CameraError> {
        let Some(command) = self.preview.as_deref() else {
            return Err(CameraError::fatal("Camera has no preview!"));
        };
        let output = self.run(command)?;
        if !output.success {
            return Err(classify_failure(&output, "Cannot capture preview!"));
        }
        if output.stdout.is_empty() {
            return Err(CameraError::recoverable("Camera returned an empty preview!"));
        }
        Ok(output.stdout)
    }

    fn set_idle(&mut self) {
        let Some(command) = self.idle.as_deref() else {
            return;
        };
        match self.run(command) {
            Ok(output) if output.success => debug!("camera idle"),
            Ok(output) => warn!(
                exit_code = ?output.exit_code,
                stderr = output.error_line().unwrap_or_default(),
                "camera idle command failed"
            ),
            Err(err) => warn!(error = %err, "camera idle command failed"),
        }
    }
}

/// A missing camera is fatal; anything else the tool reports is worth a retry.
fn classify_failure(output: &CommandOutput, fallback: &str) -> CameraError {
    if output.stderr.to_ascii_lowercase().contains("no camera found") {
        return CameraError::fatal("No camera found!");
    }
    let message = output.error_line().unwrap_or(fallback).to_string();
    warn!(exit_code = ?output.exit_code, reason = %message, "camera command failed");
    CameraError::recoverable(message)
}

/// Renders flat grey frames so the booth runs without hardware.
pub struct PlaceholderCamera {
    size: (u32, u32),
    shots: u32,
}

impl PlaceholderCamera {
    pub fn new(size: (u32, u32)) -> Self {
        Self { size, shots: 0 }
    }

    fn frame(&self, size: (u32, u32)) -> RgbImage {
        let shade = 64 + ((self.shots * 48) % 160) as u8;
        RgbImage::from_pixel(size.0.max(1), size.1.max(1), Rgb([shade, shade, shade]))
    }
}

impl Camera for PlaceholderCamera {
    fn take_picture(&mut self, path: &Path) -> Result<PathBuf, CameraError> {
        self.shots += 1;
        self.frame(self.size)
            .save_with_format(path, ImageFormat::Jpeg)
            .map_err(|err| CameraError::fatal(format!("Cannot write picture: {err}")))?;
        Ok(path.to_path_buf())
    }

    fn has_preview(&self) -> bool {
        true
    }

    fn take_preview(&mut self) -> Result<Vec<u8>, CameraError> {
        let (w, h) = self.size;
        let preview = DynamicImage::ImageRgb8(self.frame((w / 4, h / 4)));
        let mut buf = Cursor::new(Vec::new());
        preview
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(|err| CameraError::recoverable(format!("Cannot encode preview: {err}")))?;
        Ok(buf.into_inner())
    }

    fn set_idle(&mut self) {}
}
