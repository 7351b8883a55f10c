//! Raspberry Pi photobooth: pose, four shots, a collage on screen and an
//! optional print, with a slideshow of earlier sessions while idle.

pub mod booth;
pub mod camera;
pub mod clock;
pub mod collage;
pub mod command;
pub mod config;
pub mod display;
pub mod error;
pub mod events;
pub mod gpio;
pub mod pictures;
pub mod printer;
pub mod remote;
pub mod slideshow;

pub use booth::{Flow, Photobooth};
pub use config::Configuration;
