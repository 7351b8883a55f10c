//! GPIO facade: lamp output and the trigger/shutdown switches.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rppal::gpio::{InputPin, OutputPin, Trigger};
use tracing::{debug, info, warn};

/// Invoked from the interrupt thread with the channel that fired.
pub type InputCallback = Arc<dyn Fn(u8) + Send + Sync>;

pub trait Gpio {
    fn set_output(&mut self, channel: u8, high: bool) -> Result<()>;

    fn read_input(&mut self, channel: u8) -> Result<bool>;

    /// Fire `callback` on every press (falling edge) of the given channels.
    fn watch_inputs(&mut self, channels: &[u8], callback: InputCallback) -> Result<()>;

    /// Drive outputs low and release every pin.
    fn teardown(&mut self);
}

/// Raspberry Pi GPIO through `/dev/gpiomem`. Channels are BCM numbers.
pub struct RpiGpio {
    gpio: rppal::gpio::Gpio,
    debounce: Duration,
    inputs: HashMap<u8, InputPin>,
    outputs: HashMap<u8, OutputPin>,
}

impl RpiGpio {
    pub fn new(debounce: Duration) -> Result<Self> {
        let gpio = rppal::gpio::Gpio::new().context("Failed to initialize GPIO")?;
        Ok(Self {
            gpio,
            debounce,
            inputs: HashMap::new(),
            outputs: HashMap::new(),
        })
    }

    fn input(&mut self, channel: u8) -> Result<&mut InputPin> {
        if !self.inputs.contains_key(&channel) {
            let pin = self
                .gpio
                .get(channel)
                .with_context(|| format!("Failed to obtain input pin {channel}"))?
                .into_input_pullup();
            self.inputs.insert(channel, pin);
        }
        self.inputs
            .get_mut(&channel)
            .ok_or_else(|| anyhow!("input pin {channel} vanished"))
    }
}

impl Gpio for RpiGpio {
    fn set_output(&mut self, channel: u8, high: bool) -> Result<()> {
        if !self.outputs.contains_key(&channel) {
            let pin = self
                .gpio
                .get(channel)
                .with_context(|| format!("Failed to obtain output pin {channel}"))?
                .into_output_low();
            self.outputs.insert(channel, pin);
        }
        let pin = self
            .outputs
            .get_mut(&channel)
            .ok_or_else(|| anyhow!("output pin {channel} vanished"))?;
        if high {
            pin.set_high();
        } else {
            pin.set_low();
        }
        debug!(channel, high, "gpio output");
        Ok(())
    }

    fn read_input(&mut self, channel: u8) -> Result<bool> {
        Ok(self.input(channel)?.is_high())
    }

    fn watch_inputs(&mut self, channels: &[u8], callback: InputCallback) -> Result<()> {
        let debounce = self.debounce;
        for &channel in channels {
            let callback = callback.clone();
            self.input(channel)?
                .set_async_interrupt(
                    Trigger::FallingEdge,
                    Some(debounce),
                    move |_event: rppal::gpio::Event| callback(channel),
                )
                .with_context(|| format!("Failed to watch input pin {channel}"))?;
            info!(channel, ?debounce, "watching gpio input");
        }
        Ok(())
    }

    fn teardown(&mut self) {
        for (channel, pin) in self.outputs.iter_mut() {
            pin.set_low();
            debug!(channel = *channel, "gpio output released");
        }
        for (channel, pin) in self.inputs.iter_mut() {
            if let Err(err) = pin.clear_async_interrupt() {
                warn!(channel = *channel, error = %err, "failed to clear interrupt");
            }
        }
        self.outputs.clear();
        self.inputs.clear();
    }
}

/// Stand-in for machines without GPIO. Inputs read high (not pressed).
#[derive(Debug, Default)]
pub struct NoopGpio;

impl Gpio for NoopGpio {
    fn set_output(&mut self, channel: u8, high: bool) -> Result<()> {
        debug!(channel, high, "gpio output ignored");
        Ok(())
    }

    fn read_input(&mut self, _channel: u8) -> Result<bool> {
        Ok(true)
    }

    fn watch_inputs(&mut self, channels: &[u8], _callback: InputCallback) -> Result<()> {
        debug!(?channels, "gpio disabled; inputs never fire");
        Ok(())
    }

    fn teardown(&mut self) {}
}

/// Real GPIO when enabled, falling back to [`NoopGpio`] if the pins cannot be
/// opened (e.g. when developing off the Pi).
pub fn from_config(cfg: &crate::config::GpioConfig) -> Box<dyn Gpio> {
    if !cfg.enabled {
        return Box::new(NoopGpio);
    }
    match RpiGpio::new(cfg.debounce) {
        Ok(gpio) => Box::new(gpio),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "gpio unavailable; continuing without it");
            Box::new(NoopGpio)
        }
    }
}
