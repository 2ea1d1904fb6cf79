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
use std::fmt;

use crate::config;

pub mod clip;
pub mod cpal;
pub mod decoder;
pub mod error;
pub mod format;
pub mod mixer;
pub mod mock;
pub mod sample_buffer;
pub mod source;
pub(crate) mod streamer;
mod thread_priority;

pub use clip::Clip;
pub use error::AudioError;
pub use format::{BitDepth, SampleFormat, TargetFormat};
pub use mixer::SharedMixer;
pub use sample_buffer::SampleBuffer;
pub use source::{Source, SourceKind, SourceState, MAX_PITCH, MIN_PITCH};

/// An output device the engine can drive.
pub trait Device: fmt::Display + Send + Sync {
    /// The format the device is driven at. The mixer renders at this rate and channel count.
    fn format(&self) -> TargetFormat;

    /// Frames rendered per mixer period.
    fn period_frames(&self) -> usize;

    /// Opens the output stream. From here on the device pulls periods from the mixer.
    ///
    /// Failures are reported synchronously. The stream closes when the returned value is dropped.
    fn open(&self, mixer: SharedMixer) -> Result<Box<dyn OutputStream>, AudioError>;
}

/// A running output stream.
pub trait OutputStream: Send {
    /// Err once the device has been lost and could not be reopened.
    fn status(&self) -> Result<(), AudioError>;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, AudioError> {
    cpal::Device::list()
}

/// Gets the device named by the configuration. Names starting with "mock" give a mock device.
pub fn get_device(config: &config::Audio) -> Result<Box<dyn Device>, AudioError> {
    let name = config.device();
    if name.starts_with("mock") {
        let format = config
            .target_format()
            .map_err(|e| AudioError::Device(e.to_string()))?;
        return Ok(Box::new(mock::Device::new(name, format, config.period_frames())));
    }

    Ok(Box::new(cpal::Device::get(config)?))
}
