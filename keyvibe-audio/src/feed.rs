//! Input event feed
//!
//! The capture process writes one JSON object per line:
//! `{"key_code": 30, "state_code": 1}`. Extra fields are ignored and any
//! non-zero `state_code` is a press.

use crate::error::{Error, Result};
use keyvibe_common::KeyCode;
use serde::Deserialize;

/// One input edge to play
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackRequest {
    pub code: KeyCode,
    pub pressed: bool,
}

#[derive(Debug, Deserialize)]
struct InputEvent {
    key_code: KeyCode,
    state_code: i64,
}

impl PlaybackRequest {
    pub fn press(code: KeyCode) -> Self {
        Self {
            code,
            pressed: true,
        }
    }

    pub fn release(code: KeyCode) -> Self {
        Self {
            code,
            pressed: false,
        }
    }

    /// Parse one feed line.
    ///
    /// # Errors
    /// `Error::InvalidEvent` when the line is not an event object.
    pub fn from_line(line: &str) -> Result<Self> {
        let event: InputEvent = serde_json::from_str(line.trim())
            .map_err(|e| Error::InvalidEvent(format!("{}: {}", e, line.trim())))?;
        Ok(Self {
            code: event.key_code,
            pressed: event.state_code != 0,
        })
    }
}
