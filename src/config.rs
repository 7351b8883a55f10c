use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::collage::{GridLayout, PrintLayout};

/// Replaced by the target file in camera and printer command templates.
pub const FILE_PLACEHOLDER: &str = "@FILE@";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    pub display: DisplayConfig,
    pub pictures: PicturesConfig,
    pub gpio: GpioConfig,
    pub timing: TimingConfig,
    pub slideshow: SlideshowConfig,
    pub camera: CameraConfig,
    pub printer: PrinterConfig,
    pub bluetooth: BluetoothConfig,
    pub messages: Messages,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DisplayConfig {
    /// Window size in pixels; ignored for the collage when fullscreen reports
    /// the real output size.
    pub size: (u32, u32),
    pub fullscreen: bool,
    pub title: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            size: (1366, 768),
            fullscreen: true,
            title: "Photobooth".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorMode {
    Grayscale,
    Color,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PicturesConfig {
    /// Root under which the date-stamped picture directories are created.
    pub output_dir: PathBuf,
    /// File name prefix in front of the five digit counter.
    pub basename: String,
    /// Appended to the date directory name for print layouts.
    pub print_suffix: String,
    /// Camera image size; the print layout uses it rotated to portrait.
    pub image_size: (u32, u32),
    pub color_mode: ColorMode,
    pub jpeg_quality: u8,
    /// Scratch directory for the raw shots of the current session.
    pub capture_dir: PathBuf,
}

impl Default for PicturesConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            basename: "pic".to_string(),
            print_suffix: "-print".to_string(),
            image_size: (2352, 1568),
            color_mode: ColorMode::Grayscale,
            jpeg_quality: 90,
            capture_dir: PathBuf::from("/tmp"),
        }
    }
}

impl PicturesConfig {
    pub fn picture_dir(&self, date: &str) -> PathBuf {
        self.output_dir.join(date)
    }

    pub fn print_dir(&self, date: &str) -> PathBuf {
        self.output_dir.join(format!("{date}{}", self.print_suffix))
    }

    pub fn print_size(&self) -> (u32, u32) {
        (self.image_size.1, self.image_size.0)
    }

    pub fn capture_path(&self, shot: usize) -> PathBuf {
        self.capture_dir.join(format!("photobooth_{shot:02}.jpg"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct GpioConfig {
    pub enabled: bool,
    /// BCM channel of the take-pictures switch.
    pub trigger_channel: u8,
    /// BCM channel of the shutdown switch.
    pub shutdown_channel: u8,
    /// BCM channel driving the lamp.
    pub lamp_channel: u8,
    #[serde(with = "humantime_serde")]
    pub debounce: Duration,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_channel: 23,
            shutdown_channel: 24,
            lamp_channel: 4,
            debounce: Duration::from_millis(50),
        }
    }
}

/// Countdowns are signed seconds: `1` or `-1` is a plain one second pause,
/// negative values suppress the live camera preview.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct TimingConfig {
    pub pose_time_first: i32,
    pub pose_time: i32,
    pub preview_time: i32,
    #[serde(with = "humantime_serde")]
    pub pose_message_time: Duration,
    #[serde(with = "humantime_serde")]
    pub review_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub min_shot_time: Duration,
    #[serde(with = "humantime_serde")]
    pub failure_display_time: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pose_time_first: 10,
            pose_time: -1,
            preview_time: 20,
            pose_message_time: Duration::from_secs(2),
            review_delay: Duration::from_secs(2),
            retry_delay: Duration::from_secs(5),
            min_shot_time: Duration::from_secs(1),
            failure_display_time: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SlideshowConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub display_time: Duration,
    pub shuffle: bool,
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            display_time: Duration::from_secs(5),
            shuffle: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CameraBackend {
    Command,
    Placeholder,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct CameraConfig {
    pub backend: CameraBackend,
    pub capture_command: String,
    /// Writes one encoded preview frame to stdout.
    pub preview_command: Option<String>,
    pub idle_command: Option<String>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            backend: CameraBackend::Command,
            capture_command:
                "gphoto2 --capture-image-and-download --force-overwrite --filename @FILE@"
                    .to_string(),
            preview_command: None,
            idle_command: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PrinterConfig {
    pub enabled: bool,
    pub command: String,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "lp -o fit-to-page @FILE@".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct BluetoothConfig {
    pub peripherals: Vec<RemoteButton>,
    pub program: PathBuf,
    #[serde(with = "humantime_serde")]
    pub restart_delay: Duration,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            peripherals: Vec::new(),
            program: PathBuf::from("gatttool"),
            restart_delay: Duration::from_secs(5),
        }
    }
}

/// A Bluetooth LE button that acts like a key on the keyboard.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RemoteButton {
    pub address: String,
    pub key: char,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Messages {
    pub idle: String,
    pub pose: String,
    /// `@N@` and `@TOTAL@` are replaced by the shot number and count.
    pub shot: String,
    pub wait: String,
    pub printing: String,
    pub review: String,
    pub preview_cancel: String,
    pub failure_prefix: String,
    pub serious_error: String,
    pub giving_up: String,
    pub shutdown: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            idle: "Take picture     Preview\n     |             |\n     v             v"
                .to_string(),
            pose: "POSE!\n\nTaking four pictures...".to_string(),
            shot: "CHEESE!\n\n@N@ of @TOTAL@".to_string(),
            wait: "Please wait!\n\nLoading...".to_string(),
            printing: "Please wait!\n\nPrinting...".to_string(),
            review: "Print        Cancel\n  |            |\n  v            v".to_string(),
            preview_cancel: "Cancel\n  |\n  v".to_string(),
            failure_prefix: "ERROR:\n\n".to_string(),
            serious_error: "SERIOUS ERROR!".to_string(),
            giving_up: "Giving up! Please start over!".to_string(),
            shutdown: "Shutting down...".to_string(),
        }
    }
}

impl Messages {
    pub fn shot(&self, number: usize, total: usize) -> String {
        self.shot
            .replace("@N@", &number.to_string())
            .replace("@TOTAL@", &total.to_string())
    }
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        let (w, h) = self.display.size;
        ensure!(w > 0 && h > 0, "display.size must be non-zero");
        GridLayout::default()
            .cells(self.display.size)
            .context("display.size is too small for the collage")?;

        let (iw, ih) = self.pictures.image_size;
        ensure!(iw > 0 && ih > 0, "pictures.image-size must be non-zero");
        PrintLayout::default()
            .cells(self.pictures.print_size())
            .context("pictures.image-size is too small for the print layout")?;
        ensure!(
            (1..=100).contains(&self.pictures.jpeg_quality),
            "pictures.jpeg-quality must be between 1 and 100"
        );
        ensure!(
            !self.pictures.basename.is_empty() && !self.pictures.basename.contains('/'),
            "pictures.basename must be a plain file name prefix"
        );

        if self.gpio.enabled {
            let channels: HashSet<u8> = [
                self.gpio.trigger_channel,
                self.gpio.shutdown_channel,
                self.gpio.lamp_channel,
            ]
            .into_iter()
            .collect();
            ensure!(channels.len() == 3, "gpio channels must be distinct");
        }

        ensure!(
            !self.slideshow.display_time.is_zero(),
            "slideshow.display-time must be greater than zero"
        );

        if self.camera.backend == CameraBackend::Command {
            ensure_file_template(&self.camera.capture_command, "camera.capture-command")?;
            if let Some(preview) = &self.camera.preview_command {
                ensure!(
                    !preview.trim().is_empty(),
                    "camera.preview-command must not be blank"
                );
            }
        }
        if self.printer.enabled {
            ensure_file_template(&self.printer.command, "printer.command")?;
        }

        for remote in &self.bluetooth.peripherals {
            ensure!(
                !remote.address.trim().is_empty(),
                "bluetooth.peripherals entries need an address"
            );
        }
        Ok(self)
    }
}

fn ensure_file_template(template: &str, label: &str) -> Result<()> {
    ensure!(!template.trim().is_empty(), "{label} must not be blank");
    ensure!(
        template.contains(FILE_PLACEHOLDER),
        "{label} must contain the {FILE_PLACEHOLDER} placeholder"
    );
    Ok(())
}
