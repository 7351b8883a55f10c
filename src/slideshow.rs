//! Idle-screen slideshow over the assembled collages.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::Result;
use image::DynamicImage;
use rand::seq::SliceRandom;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::display::Display;

const EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Cycles through the pictures in one directory.
///
/// The directory is rescanned every time a cycle is used up, so collages
/// taken since the last pass join the rotation.
pub struct Slideshow {
    dir: PathBuf,
    shuffle: bool,
    pending: VecDeque<PathBuf>,
}

impl Slideshow {
    pub fn new(dir: impl Into<PathBuf>, shuffle: bool) -> Self {
        Self {
            dir: dir.into(),
            shuffle,
            pending: VecDeque::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn rescan(&mut self) {
        let mut found: Vec<PathBuf> = WalkDir::new(&self.dir)
            .into_iter()
            .filter_entry(|e| !is_hidden_dir(e))
            .flatten()
            .filter(|e| e.file_type().is_file() && is_supported_image(e.path()))
            .map(DirEntry::into_path)
            .collect();
        found.sort();
        if self.shuffle {
            found.shuffle(&mut rand::rng());
        }
        debug!(dir = %self.dir.display(), count = found.len(), "slideshow rescanned");
        self.pending = found.into();
    }

    /// Next decodable picture. Unreadable files are skipped; `None` once a
    /// fresh scan yields nothing usable.
    pub fn next_picture(&mut self) -> Option<(PathBuf, DynamicImage)> {
        let mut rescanned = false;
        loop {
            let Some(path) = self.pending.pop_front() else {
                if rescanned {
                    return None;
                }
                self.rescan();
                rescanned = true;
                continue;
            };
            match image::open(&path) {
                Ok(img) => return Some((path, img)),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable picture")
                }
            }
        }
    }

    /// Show the next picture with `message` drawn on top, or just the message
    /// when there is nothing to show yet.
    pub fn display_next(&mut self, display: &mut dyn Display, message: &str) -> Result<()> {
        display.clear();
        if let Some((path, picture)) = self.next_picture() {
            debug!(path = %path.display(), "slideshow picture");
            display.show_picture(&picture);
        }
        display.show_message(message);
        display.apply()
    }
}

fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_str().is_some_and(|n| n.starts_with('.'))
}
