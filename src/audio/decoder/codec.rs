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
use std::io::Cursor;
use std::sync::Arc;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use crate::audio::{error::AudioError, format::BitDepth, sample_buffer::SampleBuffer};

use super::StreamDecoder;

/// Compressed-format decoder backed by symphonia.
///
/// Every format is normalised to interleaved signed 16-bit output.
pub struct CodecStream {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    sample_rate: u32,
    channels: u16,
    total_frames: Option<u64>,
    /// Decoded samples that did not fit in the last chunk.
    leftover: Vec<i16>,
    leftover_pos: usize,
    /// Frames to drop after an accurate seek landed early.
    skip_frames: u64,
    finished: bool,
}

impl CodecStream {
    /// Probes the bytes and opens the first audio track.
    pub fn new(bytes: Arc<[u8]>, extension: Option<&str>) -> Result<Self, AudioError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = extension {
            hint.with_extension(extension);
        }

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();
        let probed = get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::UnsupportedFormat("no audio track found".to_string()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| AudioError::CorruptData("sample rate not specified".to_string()))?;
        let decoder = get_codecs().make(&params, &DecoderOptions::default())?;

        let mut stream = CodecStream {
            format_reader,
            decoder,
            track_id,
            time_base: params.time_base,
            sample_rate,
            channels: params.channels.map(|c| c.count() as u16).unwrap_or(0),
            total_frames: params.n_frames,
            leftover: Vec::new(),
            leftover_pos: 0,
            skip_frames: 0,
            finished: false,
        };

        // Some containers only reveal the channel layout once audio is decoded.
        if stream.channels == 0 {
            match stream.decode_next_packet()? {
                Some((samples, channels)) => {
                    stream.channels = channels as u16;
                    stream.leftover = samples;
                }
                None => {
                    return Err(AudioError::CorruptData(
                        "channels not specified".to_string(),
                    ))
                }
            }
        }
        if stream.channels != 1 && stream.channels != 2 {
            return Err(AudioError::UnsupportedFormat(format!(
                "{} channel audio (only mono and stereo are supported)",
                stream.channels
            )));
        }

        debug!(
            sample_rate,
            channels = stream.channels,
            frames = ?stream.total_frames,
            "Opened codec stream"
        );
        Ok(stream)
    }

    fn read_next_packet(&mut self) -> Result<Option<Packet>, AudioError> {
        match self.format_reader.next_packet() {
            Ok(packet) => Ok(Some(packet)),
            Err(SymphoniaError::ResetRequired) => Err(AudioError::Codec(
                "track list changed mid-stream".to_string(),
            )),
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Decodes packets until one yields audio for our track. `None` at end of stream.
    fn decode_next_packet(&mut self) -> Result<Option<(Vec<i16>, usize)>, AudioError> {
        loop {
            let packet = match self.read_next_packet()? {
                Some(packet) => packet,
                None => return Ok(None),
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    self.decoder.decode(&packet)?
                }
                // A damaged packet is skipped rather than ending the stream.
                Err(SymphoniaError::DecodeError(e)) => {
                    debug!(error = e, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let (samples, channels) = interleave_to_i16(decoded);
            if channels > 0 && !samples.is_empty() {
                return Ok(Some((samples, channels)));
            }
        }
    }

    fn ts_to_frames(&self, ts: u64) -> u64 {
        match self.time_base {
            Some(time_base) => {
                let time = time_base.calc_time(ts);
                ((time.seconds as f64 + time.frac) * self.sample_rate as f64).round() as u64
            }
            None => ts,
        }
    }
}

impl StreamDecoder for CodecStream {
    fn next_chunk(&mut self, frames: usize) -> Result<Option<SampleBuffer>, AudioError> {
        let channels = self.channels as usize;
        let target = frames * channels;
        let mut out: Vec<i16> = Vec::with_capacity(target);

        while out.len() < target {
            if self.leftover_pos < self.leftover.len() {
                let available = &self.leftover[self.leftover_pos..];
                let skip = (self.skip_frames as usize * channels).min(available.len());
                self.skip_frames -= (skip / channels) as u64;
                let available = &available[skip..];
                let take = available.len().min(target - out.len());
                out.extend_from_slice(&available[..take]);
                self.leftover_pos += skip + take;
                continue;
            }
            if self.finished {
                break;
            }
            self.leftover.clear();
            self.leftover_pos = 0;
            match self.decode_next_packet()? {
                Some((samples, decoded_channels)) if decoded_channels == channels => {
                    self.leftover = samples;
                }
                Some((_, decoded_channels)) => {
                    return Err(AudioError::Codec(format!(
                        "channel count changed from {} to {} mid-stream",
                        channels, decoded_channels
                    )))
                }
                None => self.finished = true,
            }
        }

        if out.is_empty() {
            return Ok(None);
        }
        let bytes = out.iter().flat_map(|s| s.to_le_bytes()).collect();
        SampleBuffer::from_bytes(bytes, self.sample_rate, BitDepth::Sixteen, self.channels)
            .map(Some)
    }

    fn seek(&mut self, frame: u64) -> Result<(), AudioError> {
        let seconds = frame as f64 / self.sample_rate as f64;
        let seeked = self.format_reader.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: Time::new(seconds.trunc() as u64, seconds.fract()),
                track_id: Some(self.track_id),
            },
        )?;
        self.decoder.reset();
        self.leftover.clear();
        self.leftover_pos = 0;
        self.finished = false;
        self.skip_frames =
            self.ts_to_frames(seeked.required_ts.saturating_sub(seeked.actual_ts));
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn bit_depth(&self) -> BitDepth {
        BitDepth::Sixteen
    }

    fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }
}

/// Interleaves a decoded planar buffer as signed 16-bit samples.
fn interleave_to_i16(decoded: AudioBufferRef) -> (Vec<i16>, usize) {
    match decoded {
        AudioBufferRef::F32(buf) => interleave(&buf, |s| float_to_s16(s)),
        AudioBufferRef::F64(buf) => interleave(&buf, |s| float_to_s16(s as f32)),
        AudioBufferRef::S8(buf) => interleave(&buf, |s| (s as i16) << 8),
        AudioBufferRef::S16(buf) => interleave(&buf, |s| s),
        AudioBufferRef::S24(buf) => interleave(&buf, |s| (s.inner() >> 8) as i16),
        AudioBufferRef::S32(buf) => interleave(&buf, |s| (s >> 16) as i16),
        AudioBufferRef::U8(buf) => interleave(&buf, |s| ((s as i16) - 128) << 8),
        AudioBufferRef::U16(buf) => interleave(&buf, |s| (s as i32 - 32768) as i16),
        AudioBufferRef::U24(buf) => {
            interleave(&buf, |s| ((s.inner() as i32 - 0x80_0000) >> 8) as i16)
        }
        AudioBufferRef::U32(buf) => {
            interleave(&buf, |s| ((s as i64 - 0x8000_0000) >> 16) as i16)
        }
    }
}

fn interleave<T, F>(buf: &AudioBuffer<T>, convert: F) -> (Vec<i16>, usize)
where
    T: symphonia::core::sample::Sample,
    F: Fn(T) -> i16,
{
    let frames = buf.frames();
    let channels = buf.spec().channels.count();
    let planes = buf.planes();
    let planes = planes.planes();
    let mut samples = Vec::with_capacity(frames * channels);
    for frame in 0..frames {
        for plane in planes.iter().take(channels) {
            samples.push(convert(plane[frame]));
        }
    }
    (samples, channels)
}

#[inline]
fn float_to_s16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}
