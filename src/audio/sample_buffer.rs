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
use std::{fmt, time::Duration};

use super::{error::AudioError, format::BitDepth};

/// Block of interleaved little-endian PCM with a fixed rate, depth and channel layout.
///
/// Samples are stored in their native width. 8-bit samples are unsigned with
/// silence at 128, 16 and 24-bit samples are signed, and 32-bit samples are
/// IEEE floats. The byte length is always a whole number of frames.
#[derive(Clone, PartialEq)]
pub struct SampleBuffer {
    sample_rate: u32,
    bit_depth: BitDepth,
    channels: u16,
    bytes: Vec<u8>,
}

impl SampleBuffer {
    /// Creates a silent buffer with the given number of frames.
    pub fn new(
        frames: usize,
        sample_rate: u32,
        bit_depth: BitDepth,
        channels: u16,
    ) -> Result<Self, AudioError> {
        validate_layout(sample_rate, channels)?;
        let silence = match bit_depth {
            BitDepth::Eight => 128u8,
            _ => 0u8,
        };
        let len = frames * channels as usize * bit_depth.bytes_per_sample();
        Ok(SampleBuffer {
            sample_rate,
            bit_depth,
            channels,
            bytes: vec![silence; len],
        })
    }

    /// Wraps raw interleaved little-endian bytes.
    pub fn from_bytes(
        bytes: Vec<u8>,
        sample_rate: u32,
        bit_depth: BitDepth,
        channels: u16,
    ) -> Result<Self, AudioError> {
        validate_layout(sample_rate, channels)?;
        let frame_size = channels as usize * bit_depth.bytes_per_sample();
        if bytes.len() % frame_size != 0 {
            return Err(AudioError::CorruptData(format!(
                "{} bytes is not a whole number of {}-byte frames",
                bytes.len(),
                frame_size
            )));
        }
        Ok(SampleBuffer {
            sample_rate,
            bit_depth,
            channels,
            bytes,
        })
    }

    /// Encodes interleaved float samples in [-1, 1] at the given bit depth.
    pub fn from_f32(
        samples: &[f32],
        sample_rate: u32,
        bit_depth: BitDepth,
        channels: u16,
    ) -> Result<Self, AudioError> {
        validate_layout(sample_rate, channels)?;
        if samples.len() % channels as usize != 0 {
            return Err(AudioError::InvalidOperation(format!(
                "{} samples cannot be split into {}-channel frames",
                samples.len(),
                channels
            )));
        }
        let width = bit_depth.bytes_per_sample();
        let mut bytes = vec![0u8; samples.len() * width];
        for (sample, out) in samples.iter().zip(bytes.chunks_exact_mut(width)) {
            encode_sample(*sample, bit_depth, out);
        }
        Ok(SampleBuffer {
            sample_rate,
            bit_depth,
            channels,
            bytes,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of bytes in one interleaved frame.
    pub fn frame_size(&self) -> usize {
        self.channels as usize * self.bit_depth.bytes_per_sample()
    }

    pub fn frame_count(&self) -> usize {
        self.bytes.len() / self.frame_size()
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Raw interleaved little-endian sample bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable access to the raw bytes. The length cannot change.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Playback length at the buffer's own sample rate.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate as f64)
    }

    /// Whether the buffer has the given rate, depth and channel count.
    pub fn has_format(&self, sample_rate: u32, bit_depth: BitDepth, channels: u16) -> bool {
        self.sample_rate == sample_rate && self.bit_depth == bit_depth && self.channels == channels
    }

    /// Reads one sample as a float. Out of range reads are silent.
    #[inline]
    pub fn sample(&self, frame: usize, channel: u16) -> f32 {
        if channel >= self.channels {
            return 0.0;
        }
        let width = self.bit_depth.bytes_per_sample();
        let offset = (frame * self.channels as usize + channel as usize) * width;
        match self.bytes.get(offset..offset + width) {
            Some(raw) => decode_sample(raw, self.bit_depth),
            None => 0.0,
        }
    }

    /// Writes one sample, clamping it to [-1, 1].
    pub fn set_sample(&mut self, frame: usize, channel: u16, value: f32) -> Result<(), AudioError> {
        let frames = self.frame_count();
        if frame >= frames || channel >= self.channels {
            return Err(AudioError::InvalidOperation(format!(
                "sample ({}, {}) is outside a {}-frame {}-channel buffer",
                frame, channel, frames, self.channels
            )));
        }
        let width = self.bit_depth.bytes_per_sample();
        let offset = (frame * self.channels as usize + channel as usize) * width;
        encode_sample(value, self.bit_depth, &mut self.bytes[offset..offset + width]);
        Ok(())
    }

    /// Reads a frame as a stereo pair. Mono frames are duplicated to both sides.
    #[inline]
    pub fn frame(&self, index: usize) -> [f32; 2] {
        let left = self.sample(index, 0);
        if self.channels == 1 {
            [left, left]
        } else {
            [left, self.sample(index, 1)]
        }
    }

    /// Copies every sample out as interleaved floats.
    pub fn to_f32(&self) -> Vec<f32> {
        let width = self.bit_depth.bytes_per_sample();
        self.bytes
            .chunks_exact(width)
            .map(|raw| decode_sample(raw, self.bit_depth))
            .collect()
    }
}

impl fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("sample_rate", &self.sample_rate)
            .field("bit_depth", &self.bit_depth)
            .field("channels", &self.channels)
            .field("frames", &self.frame_count())
            .finish()
    }
}

fn validate_layout(sample_rate: u32, channels: u16) -> Result<(), AudioError> {
    if sample_rate == 0 {
        return Err(AudioError::InvalidOperation(
            "sample rate must be greater than 0".to_string(),
        ));
    }
    if channels != 1 && channels != 2 {
        return Err(AudioError::UnsupportedFormat(format!(
            "{} channels (only mono and stereo are supported)",
            channels
        )));
    }
    Ok(())
}

#[inline]
fn decode_sample(raw: &[u8], depth: BitDepth) -> f32 {
    match depth {
        BitDepth::Eight => (raw[0] as f32 - 128.0) / 128.0,
        BitDepth::Sixteen => i16::from_le_bytes([raw[0], raw[1]]) as f32 / 32768.0,
        BitDepth::TwentyFour => {
            // Sign-extend by placing the 3 bytes in the top of an i32.
            let value = i32::from_le_bytes([0, raw[0], raw[1], raw[2]]) >> 8;
            value as f32 / 8_388_608.0
        }
        BitDepth::ThirtyTwoFloat => f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
    }
}

#[inline]
fn encode_sample(value: f32, depth: BitDepth, out: &mut [u8]) {
    let value = if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    };
    match depth {
        BitDepth::Eight => {
            out[0] = ((value * 128.0).round().clamp(-128.0, 127.0) as i16 + 128) as u8;
        }
        BitDepth::Sixteen => {
            let v = (value * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
            out.copy_from_slice(&v.to_le_bytes());
        }
        BitDepth::TwentyFour => {
            let v = (value * 8_388_608.0).round().clamp(-8_388_608.0, 8_388_607.0) as i32;
            out.copy_from_slice(&v.to_le_bytes()[..3]);
        }
        BitDepth::ThirtyTwoFloat => out.copy_from_slice(&value.to_le_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_silent() {
        let buffer = SampleBuffer::new(16, 22050, BitDepth::Eight, 1).unwrap();
        assert_eq!(buffer.byte_len(), 16);
        assert!(buffer.bytes().iter().all(|b| *b == 128));
        assert_eq!(buffer.sample(3, 0), 0.0);

        let buffer = SampleBuffer::new(16, 44100, BitDepth::TwentyFour, 2).unwrap();
        assert_eq!(buffer.frame_count(), 16);
        assert_eq!(buffer.byte_len(), 16 * 2 * 3);
        assert_eq!(buffer.frame(15), [0.0, 0.0]);
    }

    #[test]
    fn test_layout_validation() {
        assert!(SampleBuffer::new(4, 0, BitDepth::Sixteen, 1).is_err());
        assert!(matches!(
            SampleBuffer::new(4, 44100, BitDepth::Sixteen, 3),
            Err(AudioError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            SampleBuffer::from_bytes(vec![0; 5], 44100, BitDepth::Sixteen, 1),
            Err(AudioError::CorruptData(_))
        ));
        assert!(SampleBuffer::from_f32(&[0.0; 3], 44100, BitDepth::Sixteen, 2).is_err());
    }

    #[test]
    fn test_sample_values_per_depth() {
        // 8-bit: 0 -> -1.0, 128 -> 0.0, 192 -> 0.5
        let buffer = SampleBuffer::from_bytes(vec![0, 128, 192], 8000, BitDepth::Eight, 1).unwrap();
        assert_eq!(buffer.sample(0, 0), -1.0);
        assert_eq!(buffer.sample(1, 0), 0.0);
        assert_eq!(buffer.sample(2, 0), 0.5);

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&16384i16.to_le_bytes());
        bytes.extend_from_slice(&(-32768i16).to_le_bytes());
        let buffer = SampleBuffer::from_bytes(bytes, 8000, BitDepth::Sixteen, 2).unwrap();
        assert_eq!(buffer.frame(0), [0.5, -1.0]);

        // -4194304 in 24-bit two's complement is 0xC00000.
        let buffer =
            SampleBuffer::from_bytes(vec![0x00, 0x00, 0xC0], 8000, BitDepth::TwentyFour, 1)
                .unwrap();
        assert_eq!(buffer.sample(0, 0), -0.5);

        let buffer = SampleBuffer::from_bytes(
            0.25f32.to_le_bytes().to_vec(),
            8000,
            BitDepth::ThirtyTwoFloat,
            1,
        )
        .unwrap();
        assert_eq!(buffer.frame(0), [0.25, 0.25]);
    }

    #[test]
    fn test_set_sample_clamps_and_bounds() {
        let mut buffer = SampleBuffer::new(2, 44100, BitDepth::Sixteen, 2).unwrap();
        buffer.set_sample(1, 1, 2.0).unwrap();
        assert!((buffer.sample(1, 1) - 32767.0 / 32768.0).abs() < 1e-6);
        buffer.set_sample(0, 0, -0.5).unwrap();
        assert_eq!(buffer.sample(0, 0), -0.5);

        assert!(buffer.set_sample(2, 0, 0.0).is_err());
        assert!(buffer.set_sample(0, 2, 0.0).is_err());
        assert_eq!(buffer.sample(5, 0), 0.0);
    }

    #[test]
    fn test_from_f32_preserves_values() {
        let samples = [0.0, 0.5, -0.5, -1.0];
        for depth in [
            BitDepth::Eight,
            BitDepth::Sixteen,
            BitDepth::TwentyFour,
            BitDepth::ThirtyTwoFloat,
        ] {
            let buffer = SampleBuffer::from_f32(&samples, 48000, depth, 1).unwrap();
            assert_eq!(buffer.frame_count(), 4);
            assert_eq!(buffer.to_f32(), samples.to_vec(), "depth {}", depth);
        }
    }

    #[test]
    fn test_duration_and_format() {
        let a = SampleBuffer::new(22050, 44100, BitDepth::Sixteen, 2).unwrap();
        assert_eq!(a.duration(), Duration::from_millis(500));
        assert!(a.has_format(44100, BitDepth::Sixteen, 2));
        assert!(!a.has_format(48000, BitDepth::Sixteen, 2));
        assert!(!a.has_format(44100, BitDepth::TwentyFour, 2));
        assert!(!a.has_format(44100, BitDepth::Sixteen, 1));
    }
}
