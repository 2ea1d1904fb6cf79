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

//! The engine ties a device, the mixer and the source registry together.
//!
//! The game loop owns one `Engine`. Sources created through it are handed to
//! the mixer immediately; transport calls on those sources take effect on the
//! next device period.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Weak};

use crossbeam_channel::bounded;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::audio::{
    self,
    clip::ClipData,
    decoder,
    mixer::{MasterVolume, Mixer},
    source::{
        next_source_id, queue::QueueShared, registry::SourceRegistry, stream::StreamFeed,
        SourceData, Transport,
    },
    streamer::Streamer,
    AudioError, BitDepth, Clip, Device, OutputStream, SampleBuffer, SharedMixer, Source,
    TargetFormat,
};
use crate::config;
use crate::filesystem::{Filesystem, OsFilesystem};

#[cfg(test)]
mod tests;

/// How `Engine::new_source` treats the file it loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMode {
    /// Decode the whole file up front.
    #[default]
    Static,
    /// Decode incrementally during playback.
    Stream,
}

impl FromStr for SourceMode {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "static" => Ok(SourceMode::Static),
            "stream" => Ok(SourceMode::Stream),
            other => Err(AudioError::InvalidOperation(format!(
                "unknown source mode: {other}"
            ))),
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceMode::Static => write!(f, "static"),
            SourceMode::Stream => write!(f, "stream"),
        }
    }
}

/// The audio engine.
pub struct Engine {
    config: config::Audio,
    device_name: String,
    format: TargetFormat,
    filesystem: Arc<dyn Filesystem>,
    registry: Arc<SourceRegistry>,
    master: Arc<MasterVolume>,
    mixer: SharedMixer,
    clip_cache: Mutex<HashMap<PathBuf, Weak<Clip>>>,
    streamer: Option<Streamer>,
    output: Option<Box<dyn OutputStream>>,
}

impl Engine {
    /// Opens the device named in the config and starts playback.
    pub fn new(config: config::Audio) -> Result<Engine, AudioError> {
        let device = audio::get_device(&config)?;
        Engine::with_device(config, device, Arc::new(OsFilesystem::default()))
    }

    /// Starts an engine on an already-resolved device and filesystem.
    pub fn with_device(
        config: config::Audio,
        device: Box<dyn Device>,
        filesystem: Arc<dyn Filesystem>,
    ) -> Result<Engine, AudioError> {
        let format = device.format();
        let period_frames = device.period_frames();
        let max_sources = config.max_sources();
        if max_sources == 0 {
            return Err(AudioError::InvalidOperation(
                "max_sources must be greater than 0".to_string(),
            ));
        }

        // Released voices linger until the mixer reaps them, so the mixer and
        // both channels get room for twice the live limit.
        let (voice_tx, voice_rx) = bounded(2 * max_sources);
        let (graveyard_tx, graveyard_rx) = bounded(2 * max_sources);
        let (refill_tx, refill_rx) = bounded(2 * max_sources);

        let master = Arc::new(MasterVolume::new(1.0));
        let mixer = Arc::new(Mutex::new(Mixer::new(
            format.channels,
            format.sample_rate,
            period_frames,
            2 * max_sources,
            voice_rx,
            graveyard_tx,
            master.clone(),
        )));
        let registry = SourceRegistry::new(max_sources, voice_tx, graveyard_rx, refill_tx);
        let streamer = Streamer::start(config.stream_threads(), refill_rx)?;
        let output = device.open(mixer.clone())?;

        info!(
            device = %device,
            format = %format,
            period_frames,
            max_sources,
            "Audio engine started"
        );

        Ok(Engine {
            config,
            device_name: device.to_string(),
            format,
            filesystem,
            registry,
            master,
            mixer,
            clip_cache: Mutex::new(HashMap::new()),
            streamer: Some(streamer),
            output: Some(output),
        })
    }

    /// Loads and fully decodes a clip at the device rate.
    ///
    /// Clips are cached by path for as long as something holds them.
    pub fn load_clip(&self, path: &Path) -> Result<Arc<Clip>, AudioError> {
        if let Some(clip) = self.clip_cache.lock().get(path).and_then(Weak::upgrade) {
            debug!(path = ?path, "Clip cache hit");
            return Ok(clip);
        }

        let bytes = self.filesystem.read_bytes(path)?;
        let clip = Arc::new(Clip::decode(&bytes, self.format.sample_rate)?);
        info!(
            path = ?path,
            channels = clip.channels(),
            sample_rate = clip.sample_rate(),
            frames = clip.total_frames(),
            "Clip loaded"
        );

        let mut cache = self.clip_cache.lock();
        cache.retain(|_, clip| clip.strong_count() > 0);
        cache.insert(path.to_path_buf(), Arc::downgrade(&clip));
        Ok(clip)
    }

    /// Creates a source playing the file at `path`.
    pub fn new_source(&self, path: &Path, mode: SourceMode) -> Result<Source, AudioError> {
        let clip = match mode {
            SourceMode::Static => self.load_clip(path)?,
            SourceMode::Stream => {
                let bytes = self.filesystem.read_bytes(path)?;
                let clip = Clip::streaming(Arc::from(bytes), self.config.stream_chunk_frames())?;
                info!(
                    path = ?path,
                    channels = clip.channels(),
                    sample_rate = clip.sample_rate(),
                    frames = clip.total_frames(),
                    "Stream opened"
                );
                Arc::new(clip)
            }
        };
        self.new_source_from_clip(clip)
    }

    /// Creates a source over an already-loaded clip.
    pub fn new_source_from_clip(&self, clip: Arc<Clip>) -> Result<Source, AudioError> {
        let id = next_source_id();
        let sample_rate = clip.sample_rate();
        let data = match clip.data() {
            ClipData::Static(_) => SourceData::Static(clip),
            ClipData::Stream { chunk_frames, .. } => {
                let feed = StreamFeed::new(
                    id,
                    clip.open_decoder()?,
                    *chunk_frames,
                    clip.total_frames(),
                    self.config.stream_lookahead_chunks(),
                );
                SourceData::Stream { clip, feed }
            }
        };
        self.registry
            .register(id, data, sample_rate, Transport::default())
    }

    /// Creates a source that plays buffers pushed with `Source::queue`.
    pub fn new_queueable_source(
        &self,
        sample_rate: u32,
        bit_depth: BitDepth,
        channels: u16,
        buffer_count: usize,
    ) -> Result<Source, AudioError> {
        let queue = QueueShared::new(sample_rate, bit_depth, channels, buffer_count)?;
        self.registry.register(
            next_source_id(),
            SourceData::Queue(queue),
            sample_rate,
            Transport::default(),
        )
    }

    /// A zeroed buffer for procedural audio.
    pub fn new_sound_data(
        &self,
        frames: usize,
        sample_rate: u32,
        bit_depth: BitDepth,
        channels: u16,
    ) -> Result<SampleBuffer, AudioError> {
        SampleBuffer::new(frames, sample_rate, bit_depth, channels)
    }

    /// Decodes a whole file at its native rate.
    pub fn decode_sound_data(&self, path: &Path) -> Result<SampleBuffer, AudioError> {
        decoder::decode_all(&self.filesystem.read_bytes(path)?)
    }

    /// Sets the master volume, clamped to [0, 1].
    pub fn set_volume(&self, volume: f32) {
        self.master.set(volume);
    }

    pub fn volume(&self) -> f32 {
        self.master.get()
    }

    /// Number of live sources that are currently playing.
    pub fn active_source_count(&self) -> usize {
        self.registry.playing_count()
    }

    /// Stops every live source.
    pub fn stop_all(&self) {
        let stopped = self.registry.stop_all();
        debug!(stopped, "Stopped all sources");
    }

    /// Pauses every playing source and returns how many were paused.
    pub fn pause_all(&self) -> usize {
        self.registry.pause_all()
    }

    /// Err when the output device was lost and could not be reopened, or the
    /// engine has been shut down.
    pub fn device_status(&self) -> Result<(), AudioError> {
        match &self.output {
            Some(output) => output.status(),
            None => Err(AudioError::Device("audio engine is shut down".to_string())),
        }
    }

    pub fn format(&self) -> &TargetFormat {
        &self.format
    }

    pub fn config(&self) -> &config::Audio {
        &self.config
    }

    /// The mixer the output stream pulls from.
    pub fn mixer(&self) -> SharedMixer {
        self.mixer.clone()
    }

    /// Closes the output stream and stops the stream workers. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(output) = self.output.take() else {
            return;
        };
        drop(output);
        self.streamer.take();
        self.registry.collect_garbage();
        info!(device = self.device_name, "Audio engine shut down");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("device", &self.device_name)
            .field("format", &self.format)
            .field("volume", &self.volume())
            .finish()
    }
}
