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

use std::{fmt, str::FromStr};

use super::error::AudioError;

/// Sample format enumeration for audio processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Integer samples (e.g., 8-bit, 16-bit, 24-bit)
    Int,
    /// Floating point samples (32-bit float)
    Float,
}

impl FromStr for SampleFormat {
    type Err = AudioError;

    /// Convert from string representation
    fn from_str(s: &str) -> Result<Self, AudioError> {
        match s {
            "float" | "Float" => Ok(SampleFormat::Float),
            "int" | "Int" => Ok(SampleFormat::Int),
            _ => Err(AudioError::UnsupportedFormat(format!(
                "unsupported sample format: {}",
                s
            ))),
        }
    }
}

impl SampleFormat {
    /// Convert to string representation
    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::Float => "float",
            SampleFormat::Int => "int",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The storage width of a single PCM sample inside a SampleBuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitDepth {
    /// Unsigned 8-bit, silence at 128.
    Eight,
    /// Signed little-endian 16-bit.
    Sixteen,
    /// Signed little-endian 24-bit, packed in 3 bytes.
    TwentyFour,
    /// Little-endian IEEE 754 32-bit float.
    ThirtyTwoFloat,
}

impl BitDepth {
    /// Resolves a bit depth from a bit count and sample format, as found in a WAV header.
    pub fn from_bits(bits: u16, format: SampleFormat) -> Result<Self, AudioError> {
        match (bits, format) {
            (8, SampleFormat::Int) => Ok(BitDepth::Eight),
            (16, SampleFormat::Int) => Ok(BitDepth::Sixteen),
            (24, SampleFormat::Int) => Ok(BitDepth::TwentyFour),
            (32, SampleFormat::Float) => Ok(BitDepth::ThirtyTwoFloat),
            _ => Err(AudioError::UnsupportedFormat(format!(
                "{}-bit {} samples are not supported",
                bits, format
            ))),
        }
    }

    /// Number of bits per sample.
    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
            BitDepth::TwentyFour => 24,
            BitDepth::ThirtyTwoFloat => 32,
        }
    }

    /// Number of bytes a single sample occupies.
    pub fn bytes_per_sample(self) -> usize {
        self.bits() as usize / 8
    }

    /// Whether samples are stored as integers or floats.
    pub fn sample_format(self) -> SampleFormat {
        match self {
            BitDepth::ThirtyTwoFloat => SampleFormat::Float,
            _ => SampleFormat::Int,
        }
    }
}

impl FromStr for BitDepth {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self, AudioError> {
        match s {
            "8" => Ok(BitDepth::Eight),
            "16" => Ok(BitDepth::Sixteen),
            "24" => Ok(BitDepth::TwentyFour),
            "32" | "32f" | "float" => Ok(BitDepth::ThirtyTwoFloat),
            _ => Err(AudioError::UnsupportedFormat(format!(
                "unsupported bit depth: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for BitDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitDepth::ThirtyTwoFloat => write!(f, "32-bit float"),
            depth => write!(f, "{}-bit", depth.bits()),
        }
    }
}

/// Output format the device stream is driven at.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved output channels
    pub channels: u16,
    /// Sample format (integer or float)
    pub sample_format: SampleFormat,
    /// Bits per sample
    pub bits_per_sample: u16,
}

impl TargetFormat {
    /// Creates a new TargetFormat
    pub fn new(
        sample_rate: u32,
        channels: u16,
        sample_format: SampleFormat,
        bits_per_sample: u16,
    ) -> Result<Self, AudioError> {
        // Basic sanity check - let the audio interface decide what's actually supported
        if sample_rate == 0 {
            return Err(AudioError::InvalidOperation(
                "sample rate must be greater than 0".to_string(),
            ));
        }
        if channels == 0 {
            return Err(AudioError::InvalidOperation(
                "channel count must be greater than 0".to_string(),
            ));
        }

        Ok(TargetFormat {
            sample_rate,
            channels,
            sample_format,
            bits_per_sample,
        })
    }
}

impl Default for TargetFormat {
    /// Creates a default target format (44.1kHz stereo, 32-bit float)
    fn default() -> Self {
        TargetFormat {
            sample_rate: 44100,
            channels: 2,
            sample_format: SampleFormat::Float,
            bits_per_sample: 32,
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz, {}ch, {}-bit {}",
            self.sample_rate, self.channels, self.bits_per_sample, self.sample_format
        )
    }
}
