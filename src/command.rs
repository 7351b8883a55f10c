//! Shell command templates shared by the camera and printer backends.

use std::io;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use crate::config::FILE_PLACEHOLDER;

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl CommandOutput {
    /// Last non-empty stderr line, which is where CLI tools put the reason.
    pub fn error_line(&self) -> Option<&str> {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
    }
}

/// Runs a complete shell command line. Swapped out in tests.
pub type CommandRunner = Arc<dyn Fn(&str) -> io::Result<CommandOutput> + Send + Sync>;

pub fn shell_runner() -> CommandRunner {
    Arc::new(run_shell)
}

/// Run `command` through `sh -c`, waiting for it to finish.
pub fn run_shell(command: &str) -> io::Result<CommandOutput> {
    let output = Command::new("sh").arg("-c").arg(command).output()?;
    Ok(CommandOutput {
        success: output.status.success(),
        exit_code: output.status.code(),
        stdout: output.stdout,
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Substitute the file path into a template. The path is not quoted.
pub fn fill_template(template: &str, path: &Path) -> String {
    template.replace(FILE_PLACEHOLDER, &path.display().to_string())
}
