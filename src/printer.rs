use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};

use crate::command::{CommandRunner, fill_template, shell_runner};
use crate::config::PrinterConfig;

pub trait Printer {
    fn print(&mut self, path: &Path) -> Result<()>;
}

/// Hands the file to the print spooler. The job status is only logged.
pub struct CommandPrinter {
    template: String,
    runner: CommandRunner,
}

impl CommandPrinter {
    pub fn new(template: impl Into<String>) -> Self {
        Self::with_runner(template, shell_runner())
    }

    pub fn with_runner(template: impl Into<String>, runner: CommandRunner) -> Self {
        Self {
            template: template.into(),
            runner,
        }
    }
}

impl Printer for CommandPrinter {
    fn print(&mut self, path: &Path) -> Result<()> {
        let command = fill_template(&self.template, path);
        match (self.runner)(&command) {
            Ok(output) if output.success => {
                info!(command, "print job submitted");
            }
            Ok(output) => warn!(
                command,
                exit_code = ?output.exit_code,
                stderr = output.error_line().unwrap_or_default(),
                "print command failed"
            ),
            Err(err) => warn!(command, error = %err, "print command could not be started"),
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NoopPrinter;

impl Printer for NoopPrinter {
    fn print(&mut self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "printing disabled; skipping");
        Ok(())
    }
}

pub fn from_config(cfg: &PrinterConfig) -> Box<dyn Printer> {
    if cfg.enabled {
        Box::new(CommandPrinter::new(cfg.command.clone()))
    } else {
        Box::new(NoopPrinter)
    }
}
