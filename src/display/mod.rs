//! Screen and input facade used by the booth.

use anyhow::Result;
use image::DynamicImage;

use crate::events::{Event, EventSender};

mod canvas;
mod kiosk;

pub use canvas::{Canvas, load_font};
pub use kiosk::KioskDisplay;

/// Drawing calls compose an off-screen frame; nothing is visible before
/// [`Display::apply`].
pub trait Display {
    /// Frame size in pixels.
    fn size(&self) -> (u32, u32);

    fn clear(&mut self);

    /// Draw `text` centred on the frame, one line per `\n`.
    fn show_message(&mut self, text: &str);

    /// Draw `picture` scaled to fit and centred.
    fn show_picture(&mut self, picture: &DynamicImage);

    fn apply(&mut self) -> Result<()>;

    /// Next pending event, without blocking.
    fn check_for_event(&mut self) -> Result<Option<Event>>;

    fn wait_for_event(&mut self) -> Result<Event>;

    /// Handle for pushing events from other threads (GPIO, remotes, signals).
    fn event_sender(&self) -> EventSender;

    fn cancel_events(&mut self);

    fn teardown(&mut self);
}
