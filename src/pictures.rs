//! Sequence-numbered output file names (`pic00001.jpg`, `pic00002.jpg`, ...).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

const COUNT_WIDTH: usize = 5;
const SUFFIX: &str = ".jpg";

/// Hands out fresh file names in one directory.
///
/// The counter starts at the highest number already on disk so existing
/// pictures are never overwritten; `get_next` increments before returning.
#[derive(Debug, Clone)]
pub struct PictureList {
    dir: PathBuf,
    prefix: String,
    counter: u32,
}

impl PictureList {
    /// Create `dir` if needed and resume from the last numbered file in it.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        let prefix = prefix.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create picture directory {}", dir.display()))?;

        let mut counter = 0;
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("failed to read picture directory {}", dir.display()))?
        {
            let entry = entry?;
            if let Some(n) = entry
                .file_name()
                .to_str()
                .and_then(|name| parse_sequence(name, &prefix))
            {
                counter = counter.max(n);
            }
        }

        info!(
            dir = %dir.display(),
            last = counter,
            pattern = %format!("{prefix}{}{SUFFIX}", "X".repeat(COUNT_WIDTH)),
            "picture list ready"
        );
        Ok(Self {
            dir,
            prefix,
            counter,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn get(&self, count: u32) -> PathBuf {
        self.dir.join(format!(
            "{}{count:0width$}{SUFFIX}",
            self.prefix,
            width = COUNT_WIDTH
        ))
    }

    pub fn get_last(&self) -> PathBuf {
        self.get(self.counter)
    }

    pub fn get_next(&mut self) -> PathBuf {
        self.counter += 1;
        self.get(self.counter)
    }
}

/// Sequence number of `name` if it is `<prefix><digits>.jpg` with at least
/// five digits; the padding only widens once the counter outgrows it.
fn parse_sequence(name: &str, prefix: &str) -> Option<u32> {
    let digits = name.strip_prefix(prefix)?.strip_suffix(SUFFIX)?;
    if digits.len() < COUNT_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
