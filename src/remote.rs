//! Bluetooth LE buttons acting as extra keys.

use anyhow::{Context, Result};
use btmon::{ListenCommand, MonitorHandle, MonitorOptions, Peripheral};
use tracing::info;

use crate::config::BluetoothConfig;
use crate::events::{Event, EventSender};

/// Start one monitor per configured button. Each notification becomes a
/// keypress of the button's key.
pub fn spawn_remotes(cfg: &BluetoothConfig, sender: &EventSender) -> Result<Vec<MonitorHandle>> {
    let options = MonitorOptions {
        command: ListenCommand::gatttool(cfg.program.clone()),
        restart_delay: cfg.restart_delay,
        ..MonitorOptions::default()
    };

    let mut handles = Vec::with_capacity(cfg.peripherals.len());
    for (index, remote) in cfg.peripherals.iter().enumerate() {
        let peripheral = Peripheral {
            address: remote.address.clone(),
            channel: index as u32 + 1,
        };
        let key = remote.key;
        let sender = sender.clone();
        let handle = btmon::spawn(peripheral, options.clone(), move |_channel| {
            sender.trigger(Event::Keypress(key));
        })
        .with_context(|| format!("failed to start monitor for {}", remote.address))?;
        info!(address = %remote.address, %key, "remote button registered");
        handles.push(handle);
    }
    Ok(handles)
}
