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

//! Decoded, shareable audio assets.
//!
//! Static clips hold the whole decoded buffer, converted to the device rate
//! once at load. Stream clips keep the encoded bytes and are decoded chunk by
//! chunk while they play.

use std::fmt;
use std::sync::Arc;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::info;

use super::decoder::{self, StreamDecoder};
use super::error::AudioError;
use super::format::BitDepth;
use super::sample_buffer::SampleBuffer;

/// Input block size for the sinc resampler.
const RESAMPLE_BLOCK_FRAMES: usize = 1024;

/// What a clip holds.
pub enum ClipData {
    /// Fully decoded samples.
    Static(SampleBuffer),
    /// Encoded bytes decoded incrementally during playback.
    Stream {
        bytes: Arc<[u8]>,
        chunk_frames: usize,
    },
}

/// A read-only audio asset shared by every source that plays it.
pub struct Clip {
    data: ClipData,
    sample_rate: u32,
    channels: u16,
    bit_depth: BitDepth,
    total_frames: u64,
}

impl Clip {
    /// Wraps a decoded buffer, resampling it to `device_rate` when the rates differ.
    pub fn from_buffer(buffer: SampleBuffer, device_rate: u32) -> Result<Clip, AudioError> {
        let buffer = if buffer.sample_rate() != device_rate && !buffer.is_empty() {
            info!(
                source_rate = buffer.sample_rate(),
                target_rate = device_rate,
                frames = buffer.frame_count(),
                "Resampling clip"
            );
            resample(&buffer, device_rate)?
        } else {
            buffer
        };
        Ok(Clip {
            sample_rate: buffer.sample_rate(),
            channels: buffer.channels(),
            bit_depth: buffer.bit_depth(),
            total_frames: buffer.frame_count() as u64,
            data: ClipData::Static(buffer),
        })
    }

    /// Decodes encoded bytes fully into a static clip.
    pub fn decode(bytes: &[u8], device_rate: u32) -> Result<Clip, AudioError> {
        Clip::from_buffer(decoder::decode_all(bytes)?, device_rate)
    }

    /// Creates a streaming clip. The bytes are probed up front so format errors surface here.
    pub fn streaming(bytes: Arc<[u8]>, chunk_frames: usize) -> Result<Clip, AudioError> {
        if chunk_frames == 0 {
            return Err(AudioError::InvalidOperation(
                "stream chunk size must be greater than 0".to_string(),
            ));
        }
        let mut probe = decoder::open_stream(bytes.clone())?;
        let total_frames = decoder::count_frames(probe.as_mut())?;
        Ok(Clip {
            sample_rate: probe.sample_rate(),
            channels: probe.channels(),
            bit_depth: probe.bit_depth(),
            total_frames,
            data: ClipData::Stream {
                bytes,
                chunk_frames,
            },
        })
    }

    pub fn data(&self) -> &ClipData {
        &self.data
    }

    /// The decoded buffer of a static clip.
    pub fn buffer(&self) -> Option<&SampleBuffer> {
        match &self.data {
            ClipData::Static(buffer) => Some(buffer),
            ClipData::Stream { .. } => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.data, ClipData::Stream { .. })
    }

    /// Opens a fresh decoder over a stream clip's bytes.
    pub(crate) fn open_decoder(&self) -> Result<Box<dyn StreamDecoder>, AudioError> {
        match &self.data {
            ClipData::Stream { bytes, .. } => decoder::open_stream(bytes.clone()),
            ClipData::Static(_) => Err(AudioError::InvalidOperation(
                "static clips have no stream decoder".to_string(),
            )),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Unpitched duration in seconds.
    pub fn duration(&self) -> f64 {
        self.total_frames as f64 / self.sample_rate as f64
    }
}

impl fmt::Debug for Clip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clip")
            .field("streaming", &self.is_streaming())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("bit_depth", &self.bit_depth)
            .field("total_frames", &self.total_frames)
            .finish()
    }
}

/// Converts a buffer to `target_rate` with a windowed-sinc resampler. The result is 32-bit float.
pub fn resample(buffer: &SampleBuffer, target_rate: u32) -> Result<SampleBuffer, AudioError> {
    let source_rate = buffer.sample_rate();
    let channels = buffer.channels() as usize;
    let frames = buffer.frame_count();
    let ratio = target_rate as f64 / source_rate as f64;
    let failed = || AudioError::ResamplingFailed(source_rate, target_rate);

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_BLOCK_FRAMES, channels)
            .map_err(|_| failed())?;

    let planar: Vec<Vec<f32>> = (0..channels)
        .map(|ch| (0..frames).map(|f| buffer.sample(f, ch as u16)).collect())
        .collect();

    let delay = resampler.output_delay();
    let expected = (frames as f64 * ratio).round() as usize;
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];
    let mut block: Vec<Vec<f32>> = vec![Vec::with_capacity(RESAMPLE_BLOCK_FRAMES); channels];
    let mut consumed = 0;

    // Feed zero padding past the end until the delayed tail has been flushed.
    while output[0].len() < expected + delay {
        let needed = resampler.input_frames_next();
        for (ch, input) in block.iter_mut().enumerate() {
            input.clear();
            let start = consumed.min(frames);
            let end = (consumed + needed).min(frames);
            input.extend_from_slice(&planar[ch][start..end]);
            input.resize(needed, 0.0);
        }
        consumed += needed;

        let produced = resampler.process(&block, None).map_err(|_| failed())?;
        for (out, produced) in output.iter_mut().zip(produced.iter()) {
            out.extend_from_slice(produced);
        }
    }

    let mut interleaved = Vec::with_capacity(expected * channels);
    for frame in delay..delay + expected {
        for out in output.iter() {
            interleaved.push(out[frame]);
        }
    }
    SampleBuffer::from_f32(
        &interleaved,
        target_rate,
        BitDepth::ThirtyTwoFloat,
        channels as u16,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decoder::wav;
    use crate::testutil::{audio_test_utils::calculate_rms, sine};

    #[test]
    fn test_static_clip_same_rate_is_untouched() {
        let buffer =
            SampleBuffer::from_f32(&[0.5, -0.5, 0.25], 44100, BitDepth::Sixteen, 1).unwrap();
        let clip = Clip::from_buffer(buffer.clone(), 44100).unwrap();
        assert!(!clip.is_streaming());
        assert_eq!(clip.buffer(), Some(&buffer));
        assert_eq!(clip.bit_depth(), BitDepth::Sixteen);
        assert_eq!(clip.total_frames(), 3);
    }

    #[test]
    fn test_static_clip_resamples_to_device_rate() {
        let samples = sine(440.0, 48000, 4800, 0.5);
        let buffer = SampleBuffer::from_f32(&samples, 48000, BitDepth::Sixteen, 1).unwrap();
        let clip = Clip::from_buffer(buffer, 44100).unwrap();

        assert_eq!(clip.sample_rate(), 44100);
        assert_eq!(clip.bit_depth(), BitDepth::ThirtyTwoFloat);
        assert_eq!(clip.total_frames(), 4410);
        assert!((clip.duration() - 0.1).abs() < 1e-9);

        // A 0.5 amplitude sine has an RMS of ~0.354; the middle should survive intact.
        let resampled = clip.buffer().unwrap().to_f32();
        let rms = calculate_rms(&resampled[500..3900]);
        assert!((rms - 0.3536).abs() < 0.01, "rms was {}", rms);
    }

    #[test]
    fn test_resample_stereo_keeps_channels_apart() {
        let left = sine(220.0, 22050, 2205, 0.8);
        let interleaved: Vec<f32> = left.iter().flat_map(|l| [*l, 0.0]).collect();
        let buffer =
            SampleBuffer::from_f32(&interleaved, 22050, BitDepth::ThirtyTwoFloat, 2).unwrap();
        let resampled = resample(&buffer, 44100).unwrap();
        assert_eq!(resampled.frame_count(), 4410);

        let right: Vec<f32> = (0..resampled.frame_count())
            .map(|f| resampled.sample(f, 1))
            .collect();
        assert!(calculate_rms(&right) < 1e-4);
    }

    #[test]
    fn test_streaming_clip_probes_bytes() {
        let buffer = SampleBuffer::new(1234, 32000, BitDepth::Sixteen, 2).unwrap();
        let bytes: Arc<[u8]> = Arc::from(wav::encode(&buffer));
        let clip = Clip::streaming(bytes, 512).unwrap();
        assert!(clip.is_streaming());
        assert!(clip.buffer().is_none());
        assert_eq!(clip.total_frames(), 1234);
        assert_eq!(clip.sample_rate(), 32000);
        assert!(clip.open_decoder().is_ok());

        let bytes: Arc<[u8]> = Arc::from(b"not audio at all".to_vec());
        assert!(matches!(
            Clip::streaming(bytes, 512),
            Err(AudioError::UnsupportedFormat(_))
        ));
    }
}
