use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use photobooth::config::{CameraBackend, ColorMode, Configuration, RemoteButton};

#[test]
fn empty_document_uses_defaults() {
    let cfg: Configuration = serde_yaml::from_str("{}").unwrap();
    assert_eq!(cfg.display.size, (1366, 768));
    assert_eq!(cfg.pictures.basename, "pic");
    assert_eq!(cfg.pictures.color_mode, ColorMode::Grayscale);
    assert_eq!(cfg.gpio.trigger_channel, 23);
    assert_eq!(cfg.gpio.shutdown_channel, 24);
    assert_eq!(cfg.gpio.lamp_channel, 4);
    assert_eq!(cfg.timing.pose_time_first, 10);
    assert_eq!(cfg.timing.pose_time, -1);
    assert_eq!(cfg.timing.retry_delay, Duration::from_secs(5));
    assert_eq!(cfg.camera.backend, CameraBackend::Command);
    assert_eq!(cfg.printer.command, "lp -o fit-to-page @FILE@");
    assert!(cfg.bluetooth.peripherals.is_empty());
    cfg.validated().unwrap();
}

#[test]
fn parse_kebab_case_config() {
    let yaml = r#"
display:
  size: [800, 480]
  fullscreen: false
pictures:
  output-dir: "/srv/booth"
  image-size: [3000, 2000]
  color-mode: color
  jpeg-quality: 80
timing:
  pose-time-first: 5
  pose-time: 3
  retry-delay: 2s
  min-shot-time: 500ms
slideshow:
  display-time: 8s
  shuffle: true
camera:
  backend: placeholder
bluetooth:
  peripherals:
    - address: "AA:BB:CC:DD:EE:FF"
      key: c
messages:
  pose: "POSERA!"
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.display.size, (800, 480));
    assert!(!cfg.display.fullscreen);
    assert_eq!(cfg.pictures.output_dir, PathBuf::from("/srv/booth"));
    assert_eq!(cfg.pictures.print_size(), (2000, 3000));
    assert_eq!(cfg.pictures.color_mode, ColorMode::Color);
    assert_eq!(cfg.timing.pose_time, 3);
    assert_eq!(cfg.timing.min_shot_time, Duration::from_millis(500));
    assert_eq!(cfg.slideshow.display_time, Duration::from_secs(8));
    assert_eq!(cfg.camera.backend, CameraBackend::Placeholder);
    assert_eq!(
        cfg.bluetooth.peripherals,
        vec![RemoteButton {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            key: 'c'
        }]
    );
    assert_eq!(cfg.messages.pose, "POSERA!");
    assert_eq!(cfg.messages.wait, "Please wait!\n\nLoading...");
    cfg.validated().unwrap();
}

#[test]
fn unknown_keys_are_rejected() {
    assert!(serde_yaml::from_str::<Configuration>("pictures:\n  base-name: x\n").is_err());
    assert!(serde_yaml::from_str::<Configuration>("colour: true\n").is_err());
}

#[test]
fn remote_key_must_be_one_character() {
    let yaml = "bluetooth:\n  peripherals:\n    - address: \"AA\"\n      key: cc\n";
    assert!(serde_yaml::from_str::<Configuration>(yaml).is_err());
}

#[test]
fn shot_message_fills_counter() {
    let cfg = Configuration::default();
    assert_eq!(cfg.messages.shot(2, 4), "CHEESE!\n\n2 of 4");
}

#[test]
fn output_paths_are_dated() {
    let cfg = Configuration::default();
    assert_eq!(
        cfg.pictures.picture_dir("2024-06-01"),
        PathBuf::from("./2024-06-01")
    );
    assert_eq!(
        cfg.pictures.print_dir("2024-06-01"),
        PathBuf::from("./2024-06-01-print")
    );
    assert_eq!(
        cfg.pictures.capture_path(3),
        PathBuf::from("/tmp/photobooth_03.jpg")
    );
}

fn rejects(mutate: impl FnOnce(&mut Configuration)) -> String {
    let mut cfg = Configuration::default();
    mutate(&mut cfg);
    format!("{:#}", cfg.validated().unwrap_err())
}

#[test]
fn validation_catches_bad_values() {
    assert!(rejects(|c| c.display.size = (0, 768)).contains("display.size"));
    assert!(rejects(|c| c.display.size = (120, 100)).contains("too small for the collage"));
    assert!(rejects(|c| c.pictures.image_size = (200, 40)).contains("print layout"));
    assert!(rejects(|c| c.pictures.jpeg_quality = 0).contains("jpeg-quality"));
    assert!(rejects(|c| c.pictures.basename = "a/b".into()).contains("basename"));
    assert!(rejects(|c| c.gpio.lamp_channel = 23).contains("distinct"));
    assert!(rejects(|c| c.slideshow.display_time = Duration::ZERO).contains("display-time"));
    assert!(rejects(|c| c.printer.command = "lp".into()).contains("@FILE@"));
    assert!(rejects(|c| c.camera.capture_command = " ".into()).contains("blank"));
    assert!(
        rejects(|c| c.bluetooth.peripherals.push(RemoteButton {
            address: String::new(),
            key: 'c'
        }))
        .contains("address")
    );
}

#[test]
fn disabled_features_skip_their_checks() {
    let mut cfg = Configuration::default();
    cfg.gpio.enabled = false;
    cfg.gpio.lamp_channel = cfg.gpio.trigger_channel;
    cfg.printer.enabled = false;
    cfg.printer.command = String::new();
    cfg.camera.backend = CameraBackend::Placeholder;
    cfg.camera.capture_command = String::new();
    cfg.validated().unwrap();
}

#[test]
fn from_yaml_file_reads_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.yaml");
    fs::write(&path, "gpio:\n  enabled: false\n").unwrap();
    let cfg = Configuration::from_yaml_file(&path).unwrap();
    assert!(!cfg.gpio.enabled);
    assert!(Configuration::from_yaml_file(tmp.path().join("missing.yaml")).is_err());
}

#[test]
fn shipped_sample_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.yaml");
    let cfg = Configuration::from_yaml_file(path)
        .unwrap()
        .validated()
        .unwrap();
    assert_eq!(cfg.bluetooth.peripherals.len(), 2);
    assert_eq!(cfg.messages.shot(1, 4), "CHEESE!\n\n1 av 4");
    assert!(cfg.camera.preview_command.is_some());
}
