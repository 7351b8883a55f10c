//! Bluetooth LE notification monitor.
//!
//! Each monitored peripheral gets a background thread that keeps a listener
//! subprocess (by default `gatttool --listen`) alive and invokes a callback
//! with the peripheral's channel number for every notification line. When
//! the listener exits or fails, the thread logs the condition, bumps an
//! error counter and starts a new listener after a fixed delay. There is no
//! cap on restarts and the delay never grows.

use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

/// Replaced by the peripheral address in listener arguments.
pub const ADDRESS_PLACEHOLDER: &str = "@ADDRESS@";

/// Substring that marks a notification in the listener output.
pub const DEFAULT_NOTIFICATION_MARKER: &str = "Notification";

pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Program and argument template used to listen to one peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ListenCommand {
    /// `gatttool` enabling notifications on handle 0x000e and listening.
    pub fn gatttool(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec![
                format!("--device={ADDRESS_PLACEHOLDER}"),
                "--char-write-req".to_string(),
                "--handle=0x000e".to_string(),
                "--value=0000".to_string(),
                "--listen".to_string(),
            ],
        }
    }

    pub fn arguments(&self, address: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(ADDRESS_PLACEHOLDER, address))
            .collect()
    }

    fn spawn(&self, address: &str) -> io::Result<Child> {
        Command::new(&self.program)
            .args(self.arguments(address))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
    }
}

impl Default for ListenCommand {
    fn default() -> Self {
        Self::gatttool("gatttool")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peripheral {
    pub address: String,
    pub channel: u32,
}

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub command: ListenCommand,
    pub restart_delay: Duration,
    pub marker: String,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            command: ListenCommand::default(),
            restart_delay: DEFAULT_RESTART_DELAY,
            marker: DEFAULT_NOTIFICATION_MARKER.to_string(),
        }
    }
}

/// Why a listener session ended.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read listener output: {0}")]
    Read(#[source] io::Error),
    #[error("listener output ended unexpectedly")]
    EndOfStream,
}

/// Handle to a running monitor thread.
#[derive(Debug)]
pub struct MonitorHandle {
    channel: u32,
    errors: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn channel(&self) -> u32 {
        self.channel
    }

    /// Number of listener sessions that ended so far. Diagnostic only.
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::SeqCst)
    }

    /// Ask the monitor to stop after the current session or delay.
    ///
    /// A session blocked on a silent listener only notices this after its
    /// next output line.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn join(self) -> thread::Result<()> {
        self.thread.join()
    }
}

/// Start monitoring `peripheral` on a dedicated background thread.
///
/// The callback runs on that thread; callers monitoring several peripherals
/// with one callback must make it safe to call concurrently.
pub fn spawn<F>(
    peripheral: Peripheral,
    options: MonitorOptions,
    on_notification: F,
) -> io::Result<MonitorHandle>
where
    F: Fn(u32) + Send + 'static,
{
    let errors = Arc::new(AtomicU64::new(0));
    let stop = Arc::new(AtomicBool::new(false));
    let channel = peripheral.channel;

    let thread = thread::Builder::new()
        .name(format!("btmon-{channel}"))
        .spawn({
            let errors = errors.clone();
            let stop = stop.clone();
            move || supervise(&peripheral, &options, &on_notification, &errors, &stop)
        })?;

    Ok(MonitorHandle {
        channel,
        errors,
        stop,
        thread,
    })
}

fn supervise<F>(
    peripheral: &Peripheral,
    options: &MonitorOptions,
    on_notification: &F,
    errors: &AtomicU64,
    stop: &AtomicBool,
) where
    F: Fn(u32),
{
    info!(
        channel = peripheral.channel,
        address = %peripheral.address,
        "starting bluetooth monitor"
    );
    while !stop.load(Ordering::SeqCst) {
        match run_session(peripheral, options, on_notification, stop) {
            Ok(()) => break,
            Err(err) => {
                let count = errors.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(
                    channel = peripheral.channel,
                    errors = count,
                    error = %err,
                    delay = ?options.restart_delay,
                    "listener stopped; restarting after delay"
                );
            }
        }
        if stop.load(Ordering::SeqCst) {
            break;
        }
        thread::sleep(options.restart_delay);
    }
    info!(channel = peripheral.channel, "bluetooth monitor stopped");
}

/// Run one listener until its output ends. `Ok` only when a stop was requested.
fn run_session<F>(
    peripheral: &Peripheral,
    options: &MonitorOptions,
    on_notification: &F,
    stop: &AtomicBool,
) -> Result<(), SessionError>
where
    F: Fn(u32),
{
    let mut child = options
        .command
        .spawn(&peripheral.address)
        .map_err(|source| SessionError::Spawn {
            program: options.command.program.display().to_string(),
            source,
        })?;
    debug!(channel = peripheral.channel, pid = child.id(), "listener started");

    let result = match child.stdout.take() {
        Some(stdout) => read_lines(
            BufReader::new(stdout),
            peripheral,
            options,
            on_notification,
            stop,
        ),
        None => Err(SessionError::EndOfStream),
    };

    // The listener never exits on its own; reaping it without a kill would
    // block this thread for good after a read error.
    if let Err(err) = child.kill() {
        debug!(channel = peripheral.channel, error = %err, "listener already gone");
    }
    match child.wait() {
        Ok(status) => debug!(channel = peripheral.channel, %status, "listener exited"),
        Err(err) => debug!(channel = peripheral.channel, error = %err, "failed to reap listener"),
    }
    result
}

fn read_lines<R, F>(
    mut reader: R,
    peripheral: &Peripheral,
    options: &MonitorOptions,
    on_notification: &F,
    stop: &AtomicBool,
) -> Result<(), SessionError>
where
    R: BufRead,
    F: Fn(u32),
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).map_err(SessionError::Read)? == 0 {
            return Err(SessionError::EndOfStream);
        }
        // Tool output is not guaranteed to be UTF-8.
        let line = String::from_utf8_lossy(&buf);
        debug!(channel = peripheral.channel, line = line.trim_end(), "listener output");
        if line.contains(&options.marker) {
            on_notification(peripheral.channel);
        }
        if stop.load(Ordering::SeqCst) {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Cursor;

    fn peripheral() -> Peripheral {
        Peripheral {
            address: "FF:FF:80:00:76:85".to_string(),
            channel: 2,
        }
    }

    #[test]
    fn gatttool_arguments_substitute_address() {
        let args = ListenCommand::default().arguments("FF:FF:C3:0D:93:BB");
        assert_eq!(
            args,
            vec![
                "--device=FF:FF:C3:0D:93:BB",
                "--char-write-req",
                "--handle=0x000e",
                "--value=0000",
                "--listen",
            ]
        );
    }

    #[test]
    fn only_marked_lines_trigger_callback() {
        let seen = RefCell::new(Vec::new());
        let output = "Characteristic value was written successfully\n\
                      Notification handle = 0x000e value: 01\n\
                      something else\n\
                      Notification handle = 0x000e value: 00\n";
        let stop = AtomicBool::new(false);
        let result = read_lines(
            Cursor::new(output),
            &peripheral(),
            &MonitorOptions::default(),
            &|channel| seen.borrow_mut().push(channel),
            &stop,
        );
        assert!(matches!(result, Err(SessionError::EndOfStream)));
        assert_eq!(*seen.borrow(), vec![2, 2]);
    }

    #[test]
    fn stop_request_ends_session_cleanly() {
        let stop = AtomicBool::new(true);
        let result = read_lines(
            Cursor::new("line\nline\n"),
            &peripheral(),
            &MonitorOptions::default(),
            &|_| {},
            &stop,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn undecodable_output_is_still_scanned() {
        let seen = RefCell::new(Vec::new());
        let mut output = b"\xff\xfe garbage\n".to_vec();
        output.extend_from_slice(b"Notification handle = 0x000e value: \xff\n");
        let stop = AtomicBool::new(false);
        let result = read_lines(
            Cursor::new(output),
            &peripheral(),
            &MonitorOptions::default(),
            &|channel| seen.borrow_mut().push(channel),
            &stop,
        );
        assert!(matches!(result, Err(SessionError::EndOfStream)));
        assert_eq!(*seen.borrow(), vec![2]);
    }

    struct BrokenPipe;

    impl io::Read for BrokenPipe {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn read_failure_ends_session_with_error() {
        let stop = AtomicBool::new(false);
        let result = read_lines(
            BufReader::new(BrokenPipe),
            &peripheral(),
            &MonitorOptions::default(),
            &|_| {},
            &stop,
        );
        assert!(matches!(result, Err(SessionError::Read(_))));
    }
}
