//! Persisted best score
//!
//! One scalar, read at startup and rewritten in full (never appended)
//! whenever it improves.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// The persisted best rescue-game score
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HighScore {
    pub best: i32,
}

impl HighScore {
    /// Load from disk; missing or corrupt files start fresh
    pub fn load(path: impl AsRef<Path>) -> Self {
        match fs::read_to_string(path.as_ref()) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(score) => {
                    log::info!("loaded high score: {:?}", score);
                    score
                }
                Err(e) => {
                    log::warn!("high score file corrupt ({}), starting fresh", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("no high score file, starting fresh");
                Self::default()
            }
        }
    }

    /// Full overwrite of the score file
    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let json = serde_json::to_string(self).expect("high score serializes");
        fs::write(path.as_ref(), json)?;
        log::info!("high score saved: {}", self.best);
        Ok(())
    }

    /// Record a score; returns true (and should be re-saved) when it improves
    pub fn submit(&mut self, score: i32) -> bool {
        if score > self.best {
            self.best = score;
            true
        } else {
            false
        }
    }
}
