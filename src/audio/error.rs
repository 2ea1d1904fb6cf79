// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use symphonia::core::errors::Error as SymphoniaError;

/// Errors surfaced to the control context by the audio engine.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt audio data: {0}")]
    CorruptData(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Resampling failed: {0}Hz -> {1}Hz")]
    ResamplingFailed(u32, u32),
}

impl From<SymphoniaError> for AudioError {
    fn from(e: SymphoniaError) -> Self {
        match e {
            SymphoniaError::IoError(e) => AudioError::Io(e),
            SymphoniaError::Unsupported(what) => AudioError::UnsupportedFormat(what.to_string()),
            other => AudioError::Codec(other.to_string()),
        }
    }
}
