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

//! Turns encoded bytes into sample buffers.
//!
//! WAV is parsed directly. Ogg Vorbis, FLAC and MP3 go through symphonia and
//! come out as 16-bit interleaved buffers.

use std::sync::Arc;

use super::{error::AudioError, format::BitDepth, sample_buffer::SampleBuffer};

pub mod codec;
pub mod wav;

/// Container formats recognised from their leading magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Wav,
    Ogg,
    Flac,
    Mp3,
}

impl ContainerFormat {
    /// Sniffs the container from the first bytes of a file.
    pub fn detect(bytes: &[u8]) -> Result<Self, AudioError> {
        if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
            return Ok(ContainerFormat::Wav);
        }
        if bytes.starts_with(b"RIFF") && bytes.len() < 12 {
            return Err(AudioError::CorruptData("truncated RIFF header".to_string()));
        }
        if bytes.starts_with(b"OggS") {
            return Ok(ContainerFormat::Ogg);
        }
        if bytes.starts_with(b"fLaC") {
            return Ok(ContainerFormat::Flac);
        }
        // ID3v2 tag, or a bare MPEG audio frame sync.
        if bytes.starts_with(b"ID3")
            || (bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0)
        {
            return Ok(ContainerFormat::Mp3);
        }
        Err(AudioError::UnsupportedFormat(
            "unrecognised audio container".to_string(),
        ))
    }

    /// Extension hint handed to the codec probe.
    pub fn extension(self) -> &'static str {
        match self {
            ContainerFormat::Wav => "wav",
            ContainerFormat::Ogg => "ogg",
            ContainerFormat::Flac => "flac",
            ContainerFormat::Mp3 => "mp3",
        }
    }
}

/// Incremental decoder producing fixed-size chunks.
pub trait StreamDecoder: Send {
    /// Decodes up to `frames` frames. Returns `None` at the end of the stream.
    fn next_chunk(&mut self, frames: usize) -> Result<Option<SampleBuffer>, AudioError>;

    /// Repositions so the next chunk starts at `frame`.
    fn seek(&mut self, frame: u64) -> Result<(), AudioError>;

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    fn bit_depth(&self) -> BitDepth;

    /// Length of the stream in frames, when the container reports it.
    fn total_frames(&self) -> Option<u64>;
}

/// Decodes a whole file into a single buffer.
pub fn decode_all(bytes: &[u8]) -> Result<SampleBuffer, AudioError> {
    match ContainerFormat::detect(bytes)? {
        ContainerFormat::Wav => wav::decode(bytes),
        format => {
            let mut stream = codec::CodecStream::new(Arc::from(bytes), Some(format.extension()))?;
            read_to_end(&mut stream)
        }
    }
}

/// Opens an incremental decoder over shared encoded bytes.
pub fn open_stream(bytes: Arc<[u8]>) -> Result<Box<dyn StreamDecoder>, AudioError> {
    match ContainerFormat::detect(&bytes)? {
        ContainerFormat::Wav => Ok(Box::new(wav::WavStream::new(bytes)?)),
        format => Ok(Box::new(codec::CodecStream::new(
            bytes,
            Some(format.extension()),
        )?)),
    }
}

/// Drains a stream decoder into one contiguous buffer.
pub fn read_to_end(stream: &mut dyn StreamDecoder) -> Result<SampleBuffer, AudioError> {
    const CHUNK_FRAMES: usize = 16384;

    let mut bytes = Vec::new();
    while let Some(chunk) = stream.next_chunk(CHUNK_FRAMES)? {
        bytes.extend_from_slice(chunk.bytes());
    }
    SampleBuffer::from_bytes(
        bytes,
        stream.sample_rate(),
        stream.bit_depth(),
        stream.channels(),
    )
}

/// Counts the frames in a stream by decoding it, when the container did not say.
pub(crate) fn count_frames(stream: &mut dyn StreamDecoder) -> Result<u64, AudioError> {
    if let Some(total) = stream.total_frames() {
        return Ok(total);
    }
    let mut total = 0u64;
    while let Some(chunk) = stream.next_chunk(16384)? {
        total += chunk.frame_count() as u64;
    }
    stream.seek(0)?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        let mut wav = b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec();
        wav.extend_from_slice(&[0; 8]);
        assert_eq!(ContainerFormat::detect(&wav).unwrap(), ContainerFormat::Wav);
        assert_eq!(
            ContainerFormat::detect(b"OggS\x00\x02").unwrap(),
            ContainerFormat::Ogg
        );
        assert_eq!(
            ContainerFormat::detect(b"fLaC\x00\x00").unwrap(),
            ContainerFormat::Flac
        );
        assert_eq!(
            ContainerFormat::detect(b"ID3\x04\x00").unwrap(),
            ContainerFormat::Mp3
        );
        assert_eq!(
            ContainerFormat::detect(&[0xFF, 0xFB, 0x90, 0x64]).unwrap(),
            ContainerFormat::Mp3
        );
    }

    #[test]
    fn test_detect_rejects_unknown() {
        assert!(matches!(
            ContainerFormat::detect(b"MThd\x00\x00\x00\x06"),
            Err(AudioError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            ContainerFormat::detect(b""),
            Err(AudioError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            ContainerFormat::detect(b"RIFF\x00"),
            Err(AudioError::CorruptData(_))
        ));
    }

    #[test]
    fn test_decode_all_wav() {
        let buffer =
            SampleBuffer::from_f32(&[0.0, 0.25, 0.5, -0.5], 22050, BitDepth::Sixteen, 2).unwrap();
        let decoded = decode_all(&wav::encode(&buffer)).unwrap();
        assert_eq!(decoded, buffer);
    }

    #[test]
    fn test_open_stream_wav_chunks() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32 / 10.0).collect();
        let buffer = SampleBuffer::from_f32(&samples, 8000, BitDepth::ThirtyTwoFloat, 1).unwrap();
        let mut stream = open_stream(Arc::from(wav::encode(&buffer))).unwrap();
        assert_eq!(stream.total_frames(), Some(10));

        let first = stream.next_chunk(4).unwrap().unwrap();
        assert_eq!(first.frame_count(), 4);
        let second = stream.next_chunk(4).unwrap().unwrap();
        assert_eq!(second.sample(0, 0), 0.4);
        let third = stream.next_chunk(4).unwrap().unwrap();
        assert_eq!(third.frame_count(), 2);
        assert!(stream.next_chunk(4).unwrap().is_none());

        stream.seek(7).unwrap();
        let tail = read_to_end(stream.as_mut()).unwrap();
        assert_eq!(tail.frame_count(), 3);
        assert_eq!(tail.sample(0, 0), 0.7);
    }
}
