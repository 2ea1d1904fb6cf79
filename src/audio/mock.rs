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
use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::info;

use super::{error::AudioError, format::TargetFormat, mixer::SharedMixer, OutputStream};

/// A mock device. Nothing is played; tests pump periods through the mixer by hand.
#[derive(Clone)]
pub struct Device {
    name: String,
    format: TargetFormat,
    period_frames: usize,
    mixer: Arc<Mutex<Option<SharedMixer>>>,
    fault: Arc<Mutex<Option<String>>>,
    open_error: Arc<Mutex<Option<String>>>,
}

impl Device {
    /// Creates a mock device with the given format.
    pub fn new(name: &str, format: TargetFormat, period_frames: usize) -> Device {
        Device {
            name: name.to_string(),
            format,
            period_frames: period_frames.max(1),
            mixer: Arc::new(Mutex::new(None)),
            fault: Arc::new(Mutex::new(None)),
            open_error: Arc::new(Mutex::new(None)),
        }
    }

    /// True while an output stream is open.
    pub fn is_open(&self) -> bool {
        self.mixer.lock().is_some()
    }

    /// Renders one period and returns the interleaved samples. Empty if no stream is open.
    pub fn render_period(&self) -> Vec<f32> {
        self.render(self.period_frames)
    }

    /// Renders `frames` frames the way a device callback of that size would.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let Some(mixer) = self.mixer.lock().clone() else {
            return Vec::new();
        };
        let mut out = vec![0.0; frames * self.format.channels as usize];
        mixer.lock().render_into(&mut out);
        out
    }

    /// Simulates losing the device mid-session.
    pub fn fail(&self, message: &str) {
        *self.fault.lock() = Some(message.to_string());
    }

    /// Makes the next `open()` fail.
    pub fn fail_open(&self, message: &str) {
        *self.open_error.lock() = Some(message.to_string());
    }
}

impl super::Device for Device {
    fn format(&self) -> TargetFormat {
        self.format.clone()
    }

    fn period_frames(&self) -> usize {
        self.period_frames
    }

    fn open(&self, mixer: SharedMixer) -> Result<Box<dyn OutputStream>, AudioError> {
        if let Some(message) = self.open_error.lock().take() {
            return Err(AudioError::Device(message));
        }
        info!(device = self.name, format = %self.format, "Opened mock output stream");
        *self.mixer.lock() = Some(mixer);
        *self.fault.lock() = None;
        Ok(Box::new(Stream {
            mixer: self.mixer.clone(),
            fault: self.fault.clone(),
        }))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

struct Stream {
    mixer: Arc<Mutex<Option<SharedMixer>>>,
    fault: Arc<Mutex<Option<String>>>,
}

impl OutputStream for Stream {
    fn status(&self) -> Result<(), AudioError> {
        match self.fault.lock().as_ref() {
            Some(message) => Err(AudioError::Device(message.clone())),
            None => Ok(()),
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        *self.mixer.lock() = None;
    }
}
