use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use softbuffer::{Context as SoftContext, Surface};
use tracing::{debug, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Fullscreen, Window, WindowId};

use super::{Canvas, Display, load_font};
use crate::config::DisplayConfig;
use crate::events::{Event, EventQueue, EventSender, MouseButton};

/// How long a blocking wait sleeps in the window system before looking at
/// events pushed from other threads.
const WAIT_SLICE: Duration = Duration::from_millis(50);

type WindowHandle = Arc<Window>;

/// Fullscreen (or fixed-size) window driven from the booth's own thread.
pub struct KioskDisplay {
    event_loop: EventLoop<()>,
    app: KioskApp,
    queue: EventQueue,
}

impl KioskDisplay {
    pub fn new(cfg: &DisplayConfig) -> Result<Self> {
        let font = match load_font() {
            Ok(font) => Some(font),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "messages will not be rendered");
                None
            }
        };
        let queue = EventQueue::new();
        let event_loop = EventLoop::new().context("failed to open the window system")?;
        let mut display = Self {
            event_loop,
            app: KioskApp {
                title: cfg.title.clone(),
                fullscreen: cfg.fullscreen,
                requested: cfg.size,
                window: None,
                context: None,
                surface: None,
                canvas: Canvas::new(cfg.size, font),
                frame: None,
                cursor: (0.0, 0.0),
                sender: queue.sender(),
                error: None,
            },
            queue,
        };
        // Let the window system deliver `resumed` so the window exists and
        // the real output size is known before anything is drawn.
        display.pump(Duration::ZERO)?;
        let size = display.size();
        info!(size = ?size, fullscreen = cfg.fullscreen, "display ready");
        Ok(display)
    }

    fn pump(&mut self, timeout: Duration) -> Result<()> {
        let status = self.event_loop.pump_app_events(Some(timeout), &mut self.app);
        if let PumpStatus::Exit(code) = status {
            debug!(code, "event loop exited");
            self.queue.push(Event::Shutdown);
        }
        match self.app.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Display for KioskDisplay {
    fn size(&self) -> (u32, u32) {
        self.app.canvas.size()
    }

    fn clear(&mut self) {
        self.app.canvas.clear();
    }

    fn show_message(&mut self, text: &str) {
        self.app.canvas.draw_message(text);
    }

    fn show_picture(&mut self, picture: &DynamicImage) {
        self.app.canvas.draw_picture(picture);
    }

    fn apply(&mut self) -> Result<()> {
        self.app.frame = Some(self.app.canvas.to_argb());
        self.app.present()?;
        self.pump(Duration::ZERO)
    }

    fn check_for_event(&mut self) -> Result<Option<Event>> {
        self.pump(Duration::ZERO)?;
        Ok(self.queue.try_next())
    }

    fn wait_for_event(&mut self) -> Result<Event> {
        loop {
            if let Some(event) = self.queue.try_next() {
                return Ok(event);
            }
            self.pump(WAIT_SLICE)?;
        }
    }

    fn event_sender(&self) -> EventSender {
        self.queue.sender()
    }

    fn cancel_events(&mut self) {
        if let Err(err) = self.pump(Duration::ZERO) {
            warn!(error = %format!("{err:#}"), "failed to flush window events");
        }
        self.queue.cancel();
    }

    fn teardown(&mut self) {
        self.app.surface = None;
        self.app.context = None;
        if let Some(window) = self.app.window.take() {
            window.set_visible(false);
        }
        info!("display closed");
    }
}

struct KioskApp {
    title: String,
    fullscreen: bool,
    requested: (u32, u32),
    window: Option<WindowHandle>,
    context: Option<SoftContext<WindowHandle>>,
    surface: Option<Surface<WindowHandle, WindowHandle>>,
    canvas: Canvas,
    /// Last applied frame, presented again after expose events.
    frame: Option<Vec<u32>>,
    cursor: (f64, f64),
    sender: EventSender,
    error: Option<anyhow::Error>,
}

impl KioskApp {
    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.window.is_some() {
            return Ok(());
        }

        let mut attrs = Window::default_attributes()
            .with_title(self.title.clone())
            .with_active(true);
        if self.fullscreen {
            attrs = attrs
                .with_decorations(false)
                .with_fullscreen(Some(Fullscreen::Borderless(None)));
        } else {
            attrs = attrs
                .with_resizable(false)
                .with_inner_size(PhysicalSize::new(self.requested.0, self.requested.1));
        }
        let window = WindowHandle::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );
        if self.fullscreen {
            window.set_cursor_visible(false);
        }

        let context = SoftContext::new(window.clone())
            .map_err(|err| anyhow!("failed to create softbuffer context: {err}"))?;
        let surface = Surface::new(&context, window.clone())
            .map_err(|err| anyhow!("failed to create softbuffer surface: {err}"))?;

        self.context = Some(context);
        self.surface = Some(surface);
        let size = window.inner_size();
        self.window = Some(window);
        self.handle_resize(size);
        Ok(())
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        let size = (size.width.max(1), size.height.max(1));
        if size != self.canvas.size() {
            debug!(?size, "display resized");
            self.canvas.resize(size);
            self.frame = None;
        }
    }

    fn present(&mut self) -> Result<()> {
        let (Some(surface), Some(frame)) = (self.surface.as_mut(), self.frame.as_ref()) else {
            return Ok(());
        };
        let (w, h) = self.canvas.size();
        let (Some(width), Some(height)) = (NonZeroU32::new(w), NonZeroU32::new(h)) else {
            return Ok(());
        };
        surface
            .resize(width, height)
            .map_err(|err| anyhow!("failed to resize surface: {err}"))?;
        let mut buffer = surface
            .buffer_mut()
            .map_err(|err| anyhow!("failed to map surface: {err}"))?;
        buffer.copy_from_slice(frame);
        buffer
            .present()
            .map_err(|err| anyhow!("failed to present frame: {err}"))?;
        Ok(())
    }

    fn handle_key(&self, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        if event.logical_key == Key::Named(NamedKey::Escape) {
            self.sender.trigger(Event::Shutdown);
            return;
        }
        if let Some(ch) = event.text.as_ref().and_then(|text| text.chars().next())
            && !ch.is_control()
        {
            self.sender.trigger(Event::Keypress(ch));
        }
    }
}

impl ApplicationHandler for KioskApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.ensure_window(event_loop) {
            self.error = Some(err);
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.id() != window_id {
            return;
        }
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                self.sender.trigger(Event::Shutdown);
            }
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.present() {
                    warn!(error = %format!("{err:#}"), "failed to redraw");
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(&event),
            WindowEvent::CursorMoved { position, .. } => {
                let PhysicalPosition { x, y } = position;
                self.cursor = (x, y);
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button,
                ..
            } => {
                self.sender.trigger(Event::MouseClick {
                    button: map_button(button),
                    position: self.cursor,
                });
            }
            _ => {}
        }
    }
}

fn map_button(button: winit::event::MouseButton) -> MouseButton {
    use winit::event::MouseButton as W;
    match button {
        W::Left => MouseButton::Left,
        W::Right => MouseButton::Right,
        W::Middle => MouseButton::Middle,
        W::Back => MouseButton::Other(8),
        W::Forward => MouseButton::Other(9),
        W::Other(n) => MouseButton::Other(n),
    }
}
