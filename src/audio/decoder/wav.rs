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
use std::sync::Arc;

use crate::audio::{
    error::AudioError,
    format::{BitDepth, SampleFormat},
    sample_buffer::SampleBuffer,
};

use super::StreamDecoder;

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Layout of a parsed WAV file.
#[derive(Debug, Clone, PartialEq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: BitDepth,
    /// Byte offset of the first sample.
    pub data_offset: usize,
    /// Length of the sample data in bytes, truncated to whole frames.
    pub data_len: usize,
}

impl WavInfo {
    pub fn frame_size(&self) -> usize {
        self.channels as usize * self.bit_depth.bytes_per_sample()
    }

    pub fn frame_count(&self) -> usize {
        self.data_len / self.frame_size()
    }
}

struct Fmt {
    format_tag: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn parse_fmt(body: &[u8]) -> Result<Fmt, AudioError> {
    if body.len() < 16 {
        return Err(AudioError::CorruptData(format!(
            "fmt chunk is {} bytes, expected at least 16",
            body.len()
        )));
    }
    let mut format_tag = read_u16(body, 0);
    if format_tag == WAVE_FORMAT_EXTENSIBLE {
        // cbSize(2) + validBits(2) + channelMask(4) + SubFormat GUID(16)
        if body.len() < 40 {
            return Err(AudioError::CorruptData(
                "extensible fmt chunk is truncated".to_string(),
            ));
        }
        // The first two bytes of the SubFormat GUID carry the real format tag.
        format_tag = read_u16(body, 24);
    }
    Ok(Fmt {
        format_tag,
        channels: read_u16(body, 2),
        sample_rate: read_u32(body, 4),
        bits_per_sample: read_u16(body, 14),
    })
}

/// Walks the RIFF chunks and locates the format and sample data.
pub fn parse(bytes: &[u8]) -> Result<WavInfo, AudioError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        if bytes.starts_with(b"RIFF") && bytes.len() < 12 {
            return Err(AudioError::CorruptData("truncated RIFF header".to_string()));
        }
        return Err(AudioError::UnsupportedFormat("not a RIFF/WAVE file".to_string()));
    }

    let mut fmt: Option<Fmt> = None;
    let mut data: Option<(usize, usize)> = None;
    let mut pos = 12;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = read_u32(bytes, pos + 4) as usize;
        let body_start = pos + 8;
        let body_end = body_start.checked_add(size).ok_or_else(|| {
            AudioError::CorruptData("chunk size overflows".to_string())
        })?;
        if body_end > bytes.len() {
            return Err(AudioError::CorruptData(format!(
                "chunk '{}' declares {} bytes but only {} remain",
                String::from_utf8_lossy(id),
                size,
                bytes.len() - body_start
            )));
        }

        match id {
            b"fmt " => fmt = Some(parse_fmt(&bytes[body_start..body_end])?),
            b"data" => data = Some((body_start, size)),
            _ => {}
        }

        // Chunks are word aligned; odd sizes carry a pad byte.
        pos = body_end + (size & 1);
    }

    let fmt = fmt.ok_or_else(|| AudioError::CorruptData("missing fmt chunk".to_string()))?;
    let (data_offset, data_len) =
        data.ok_or_else(|| AudioError::CorruptData("missing data chunk".to_string()))?;

    let sample_format = match fmt.format_tag {
        WAVE_FORMAT_PCM => SampleFormat::Int,
        WAVE_FORMAT_IEEE_FLOAT => SampleFormat::Float,
        tag => {
            return Err(AudioError::UnsupportedFormat(format!(
                "WAV format tag {:#06x}",
                tag
            )))
        }
    };
    let bit_depth = BitDepth::from_bits(fmt.bits_per_sample, sample_format)?;
    if fmt.channels != 1 && fmt.channels != 2 {
        return Err(AudioError::UnsupportedFormat(format!(
            "{} channel WAV (only mono and stereo are supported)",
            fmt.channels
        )));
    }
    if fmt.sample_rate == 0 {
        return Err(AudioError::CorruptData("sample rate of 0".to_string()));
    }

    let frame_size = fmt.channels as usize * bit_depth.bytes_per_sample();
    Ok(WavInfo {
        sample_rate: fmt.sample_rate,
        channels: fmt.channels,
        bit_depth,
        data_offset,
        data_len: data_len - data_len % frame_size,
    })
}

/// Decodes a complete WAV file.
pub fn decode(bytes: &[u8]) -> Result<SampleBuffer, AudioError> {
    let info = parse(bytes)?;
    SampleBuffer::from_bytes(
        bytes[info.data_offset..info.data_offset + info.data_len].to_vec(),
        info.sample_rate,
        info.bit_depth,
        info.channels,
    )
}

/// Serialises a buffer as a canonical 44-byte-header WAV file.
pub fn encode(buffer: &SampleBuffer) -> Vec<u8> {
    let data_len = buffer.byte_len();
    let pad = data_len & 1;
    let bits = buffer.bit_depth().bits();
    let block_align = buffer.frame_size() as u16;
    let byte_rate = buffer.sample_rate() * block_align as u32;
    let format_tag = match buffer.bit_depth().sample_format() {
        SampleFormat::Float => WAVE_FORMAT_IEEE_FLOAT,
        SampleFormat::Int => WAVE_FORMAT_PCM,
    };

    let mut out = Vec::with_capacity(44 + data_len + pad);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&((36 + data_len + pad) as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&format_tag.to_le_bytes());
    out.extend_from_slice(&buffer.channels().to_le_bytes());
    out.extend_from_slice(&buffer.sample_rate().to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data_len as u32).to_le_bytes());
    out.extend_from_slice(buffer.bytes());
    if pad == 1 {
        out.push(0);
    }
    out
}

/// Streams chunks straight out of the shared WAV bytes.
pub struct WavStream {
    bytes: Arc<[u8]>,
    info: WavInfo,
    cursor: usize,
}

impl WavStream {
    pub fn new(bytes: Arc<[u8]>) -> Result<Self, AudioError> {
        let info = parse(&bytes)?;
        Ok(WavStream {
            bytes,
            info,
            cursor: 0,
        })
    }
}

impl StreamDecoder for WavStream {
    fn next_chunk(&mut self, frames: usize) -> Result<Option<SampleBuffer>, AudioError> {
        let total = self.info.frame_count();
        if self.cursor >= total || frames == 0 {
            return Ok(None);
        }
        let count = frames.min(total - self.cursor);
        let frame_size = self.info.frame_size();
        let start = self.info.data_offset + self.cursor * frame_size;
        let end = start + count * frame_size;
        self.cursor += count;
        SampleBuffer::from_bytes(
            self.bytes[start..end].to_vec(),
            self.info.sample_rate,
            self.info.bit_depth,
            self.info.channels,
        )
        .map(Some)
    }

    fn seek(&mut self, frame: u64) -> Result<(), AudioError> {
        self.cursor = (frame as usize).min(self.info.frame_count());
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    fn channels(&self) -> u16 {
        self.info.channels
    }

    fn bit_depth(&self) -> BitDepth {
        self.info.bit_depth
    }

    fn total_frames(&self) -> Option<u64> {
        Some(self.info.frame_count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(body);
        if body.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn fmt_body(tag: u16, channels: u16, rate: u32, bits: u16) -> Vec<u8> {
        let block_align = channels * bits / 8;
        let mut body = Vec::new();
        body.extend_from_slice(&tag.to_le_bytes());
        body.extend_from_slice(&channels.to_le_bytes());
        body.extend_from_slice(&rate.to_le_bytes());
        body.extend_from_slice(&(rate * block_align as u32).to_le_bytes());
        body.extend_from_slice(&block_align.to_le_bytes());
        body.extend_from_slice(&bits.to_le_bytes());
        body
    }

    fn riff(chunks: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = chunks.concat();
        let mut out = b"RIFF".to_vec();
        out.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn test_round_trip_all_depths() {
        let samples = [0.0, 0.5, -0.5, 0.25, -1.0, 0.75];
        for depth in [
            BitDepth::Eight,
            BitDepth::Sixteen,
            BitDepth::TwentyFour,
            BitDepth::ThirtyTwoFloat,
        ] {
            for channels in [1u16, 2] {
                let buffer = SampleBuffer::from_f32(&samples, 32000, depth, channels).unwrap();
                let encoded = encode(&buffer);
                let decoded = decode(&encoded).unwrap();
                assert_eq!(decoded.frame_count(), buffer.frame_count());
                assert_eq!(decoded.to_f32(), buffer.to_f32());

                let reencoded = encode(&decoded);
                assert_eq!(decode(&reencoded).unwrap(), decoded);
            }
        }
    }

    #[test]
    fn test_skips_unknown_chunks_with_padding() {
        let samples: Vec<u8> = [100i16, -100, 200, -200]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let bytes = riff(&[
            chunk(b"LIST", b"odd"),
            chunk(b"fmt ", &fmt_body(WAVE_FORMAT_PCM, 2, 44100, 16)),
            chunk(b"junk", &[1, 2, 3, 4, 5]),
            chunk(b"data", &samples),
        ]);
        let info = parse(&bytes).unwrap();
        assert_eq!(info.channels, 2);
        assert_eq!(info.bit_depth, BitDepth::Sixteen);
        assert_eq!(info.frame_count(), 2);

        let buffer = decode(&bytes).unwrap();
        assert_eq!(buffer.sample(1, 1), -200.0 / 32768.0);
    }

    #[test]
    fn test_extensible_float() {
        let mut body = fmt_body(WAVE_FORMAT_EXTENSIBLE, 1, 48000, 32);
        body.extend_from_slice(&22u16.to_le_bytes()); // cbSize
        body.extend_from_slice(&32u16.to_le_bytes()); // valid bits
        body.extend_from_slice(&4u32.to_le_bytes()); // channel mask
        body.extend_from_slice(&WAVE_FORMAT_IEEE_FLOAT.to_le_bytes());
        body.extend_from_slice(&[
            0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
        ]);
        let bytes = riff(&[
            chunk(b"fmt ", &body),
            chunk(b"data", &0.125f32.to_le_bytes()),
        ]);
        let buffer = decode(&bytes).unwrap();
        assert_eq!(buffer.bit_depth(), BitDepth::ThirtyTwoFloat);
        assert_eq!(buffer.sample(0, 0), 0.125);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            parse(b"RIFX\x00\x00\x00\x00WAVE"),
            Err(AudioError::UnsupportedFormat(_))
        ));

        // Declared data size exceeds the file.
        let mut bytes = riff(&[chunk(b"fmt ", &fmt_body(WAVE_FORMAT_PCM, 1, 8000, 16))]);
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&1000u32.to_le_bytes());
        bytes.extend_from_slice(&[0; 10]);
        assert!(matches!(parse(&bytes), Err(AudioError::CorruptData(_))));

        let bytes = riff(&[chunk(b"data", &[0; 4])]);
        assert!(matches!(parse(&bytes), Err(AudioError::CorruptData(_))));

        let bytes = riff(&[
            chunk(b"fmt ", &fmt_body(0x0055, 1, 8000, 16)),
            chunk(b"data", &[0; 4]),
        ]);
        assert!(matches!(parse(&bytes), Err(AudioError::UnsupportedFormat(_))));

        let bytes = riff(&[
            chunk(b"fmt ", &fmt_body(WAVE_FORMAT_PCM, 6, 8000, 16)),
            chunk(b"data", &[0; 12]),
        ]);
        assert!(matches!(parse(&bytes), Err(AudioError::UnsupportedFormat(_))));

        let bytes = riff(&[chunk(b"fmt ", &[1, 0, 1, 0])]);
        assert!(matches!(parse(&bytes), Err(AudioError::CorruptData(_))));
    }

    #[test]
    fn test_reads_hound_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hound.wav");
        write_wav(path.clone(), vec![vec![0.5f32, -0.25, 0.0]], 44100).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let buffer = decode(&bytes).unwrap();
        assert_eq!(buffer.sample_rate(), 44100);
        assert_eq!(buffer.channels(), 1);
        assert_eq!(buffer.to_f32(), vec![0.5, -0.25, 0.0]);
    }
}
