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
use std::{fmt, str::FromStr, time::Duration};

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::{SampleFormat, TargetFormat};

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNELS: u16 = 2;
const DEFAULT_BITS_PER_SAMPLE: u16 = 32;
const DEFAULT_PERIOD_FRAMES: usize = 512;
const DEFAULT_STREAM_CHUNK_FRAMES: usize = 4096;
const DEFAULT_STREAM_LOOKAHEAD_CHUNKS: usize = 1;
const DEFAULT_STREAM_THREADS: usize = 2;
const DEFAULT_MAX_SOURCES: usize = 256;
const DEFAULT_REOPEN_ATTEMPTS: u32 = 3;
const DEFAULT_REOPEN_DELAY: Duration = Duration::from_millis(250);

/// How to choose the cpal stream buffer size. Affects latency vs underrun tolerance.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(try_from = "StreamBufferSizeRepr")]
pub enum StreamBufferSize {
    /// Use the backend's default (may be high latency on some systems).
    Default,
    /// Use the device's minimum supported period size (lowest latency, most jitter-sensitive).
    Min,
    /// Use a fixed size in frames.
    Fixed(u32),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StreamBufferSizeRepr {
    Frames(u32),
    Name(String),
}

impl TryFrom<StreamBufferSizeRepr> for StreamBufferSize {
    type Error = String;

    fn try_from(repr: StreamBufferSizeRepr) -> Result<Self, Self::Error> {
        match repr {
            StreamBufferSizeRepr::Frames(0) => Err("stream buffer size must be > 0".to_string()),
            StreamBufferSizeRepr::Frames(frames) => Ok(StreamBufferSize::Fixed(frames)),
            StreamBufferSizeRepr::Name(name) => name.parse(),
        }
    }
}

impl FromStr for StreamBufferSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(StreamBufferSize::Default),
            "min" => Ok(StreamBufferSize::Min),
            other => match other.parse::<u32>() {
                Ok(frames) if frames > 0 => Ok(StreamBufferSize::Fixed(frames)),
                _ => Err(format!(
                    "invalid stream buffer size {}: expected default, min, or a frame count",
                    s
                )),
            },
        }
    }
}

impl fmt::Display for StreamBufferSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamBufferSize::Default => write!(f, "default"),
            StreamBufferSize::Min => write!(f, "min"),
            StreamBufferSize::Fixed(frames) => write!(f, "{}", frames),
        }
    }
}

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Audio {
    /// The output device name, "default" for the host default, or "mock..." for the mock device.
    device: Option<String>,

    /// Device sample rate in Hz (default: 44100)
    sample_rate: Option<u32>,

    /// Output channel count (default: 2)
    channels: Option<u16>,

    /// Device sample format (default: "float")
    sample_format: Option<String>,

    /// Device bits per sample (default: 32)
    bits_per_sample: Option<u16>,

    /// Mixer period in frames (default: 512)
    period_frames: Option<usize>,

    /// cpal stream buffer: "default", "min", or a number of frames.
    /// When unset, period_frames is requested as a fixed size.
    stream_buffer_size: Option<StreamBufferSize>,

    /// Frames decoded per chunk for stream sources (default: 4096)
    stream_chunk_frames: Option<usize>,

    /// Decoded chunks kept ahead of the playing chunk for stream sources (default: 1)
    stream_lookahead_chunks: Option<usize>,

    /// Decode-ahead worker threads (default: 2, minimum 1)
    stream_threads: Option<usize>,

    /// Maximum number of live sources (default: 256)
    max_sources: Option<usize>,

    /// Reopen attempts after the device is lost (default: 3)
    reopen_attempts: Option<u32>,

    /// Delay between reopen attempts, e.g. "250ms"
    reopen_delay: Option<String>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: Some(device.to_string()),
            ..Audio::default()
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Returns the device sample rate (default: 44100)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the output channel count (default: 2)
    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS)
    }

    /// Returns the device sample format (default: Float)
    pub fn sample_format(&self) -> Result<SampleFormat, ConfigError> {
        match self.sample_format.as_deref() {
            Some(format) => {
                SampleFormat::from_str(format).map_err(|e| ConfigError::Invalid(e.to_string()))
            }
            None => Ok(SampleFormat::Float),
        }
    }

    /// Returns the device bits per sample (default: 32)
    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample.unwrap_or(DEFAULT_BITS_PER_SAMPLE)
    }

    /// The full device format described by this configuration.
    pub fn target_format(&self) -> Result<TargetFormat, ConfigError> {
        let sample_format = self.sample_format()?;
        let bits = self.bits_per_sample();
        let supported = match sample_format {
            SampleFormat::Float => bits == 32,
            SampleFormat::Int => bits == 16 || bits == 32,
        };
        if !supported {
            return Err(ConfigError::Invalid(format!(
                "{}-bit {} output is not supported",
                bits, sample_format
            )));
        }
        TargetFormat::new(self.sample_rate(), self.channels(), sample_format, bits)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Returns the mixer period in frames (default: 512, minimum 1)
    pub fn period_frames(&self) -> usize {
        self.period_frames.unwrap_or(DEFAULT_PERIOD_FRAMES).max(1)
    }

    /// Returns the cpal stream buffer choice, falling back to a fixed period_frames.
    pub fn stream_buffer_size(&self) -> StreamBufferSize {
        self.stream_buffer_size
            .unwrap_or(StreamBufferSize::Fixed(self.period_frames() as u32))
    }

    /// Returns the stream decode chunk size in frames (default: 4096)
    pub fn stream_chunk_frames(&self) -> usize {
        self.stream_chunk_frames
            .unwrap_or(DEFAULT_STREAM_CHUNK_FRAMES)
            .max(1)
    }

    /// Returns how many chunks stream sources decode ahead (default: 1)
    pub fn stream_lookahead_chunks(&self) -> usize {
        self.stream_lookahead_chunks
            .unwrap_or(DEFAULT_STREAM_LOOKAHEAD_CHUNKS)
            .max(1)
    }

    /// Returns the number of decode-ahead worker threads.
    pub fn stream_threads(&self) -> usize {
        self.stream_threads.unwrap_or(DEFAULT_STREAM_THREADS).max(1)
    }

    /// Returns the maximum number of live sources (default: 256)
    pub fn max_sources(&self) -> usize {
        self.max_sources.unwrap_or(DEFAULT_MAX_SOURCES).max(1)
    }

    /// Returns the number of reopen attempts after device loss (default: 3)
    pub fn reopen_attempts(&self) -> u32 {
        self.reopen_attempts.unwrap_or(DEFAULT_REOPEN_ATTEMPTS)
    }

    /// Returns the delay between reopen attempts (default: 250ms)
    pub fn reopen_delay(&self) -> Result<Duration, ConfigError> {
        match &self.reopen_delay {
            Some(delay) => Ok(DurationString::from_string(delay.clone())
                .map_err(|e| ConfigError::Invalid(format!("reopen_delay: {}", e)))?
                .into()),
            None => Ok(DEFAULT_REOPEN_DELAY),
        }
    }

    /// Overrides the device name.
    pub fn with_device(mut self, device: &str) -> Audio {
        self.device = Some(device.to_string());
        self
    }

    /// Overrides the mixer period.
    pub fn with_period_frames(mut self, frames: usize) -> Audio {
        self.period_frames = Some(frames);
        self
    }

    /// Overrides the device sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Audio {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Overrides the output channel count.
    pub fn with_channels(mut self, channels: u16) -> Audio {
        self.channels = Some(channels);
        self
    }

    /// Overrides the maximum number of live sources.
    pub fn with_max_sources(mut self, max_sources: usize) -> Audio {
        self.max_sources = Some(max_sources);
        self
    }

    /// Overrides the stream decode chunk size.
    pub fn with_stream_chunk_frames(mut self, frames: usize) -> Audio {
        self.stream_chunk_frames = Some(frames);
        self
    }
}
