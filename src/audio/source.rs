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

//! Playback instances.
//!
//! A `Source` is the caller's handle. Its transport lives in a `SourceInner`
//! that the mixer voice for the same source also holds, so control calls take
//! effect on the next audio period without any other coordination.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::debug;

use super::clip::Clip;
use super::error::AudioError;
use super::sample_buffer::SampleBuffer;

pub(crate) mod queue;
pub(crate) mod registry;
pub(crate) mod stream;
mod transport;

use queue::QueueShared;
use registry::SourceRegistry;
use stream::StreamFeed;
pub(crate) use transport::{PlayAction, Transport};
pub use transport::{SourceState, MAX_PITCH, MIN_PITCH};

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_source_id() -> u64 {
    NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// The flavor of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Plays a fully decoded clip.
    Static,
    /// Decodes its clip incrementally while playing.
    Stream,
    /// Plays buffers pushed by the caller.
    Queueable,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Static => write!(f, "static"),
            SourceKind::Stream => write!(f, "stream"),
            SourceKind::Queueable => write!(f, "queue"),
        }
    }
}

/// Result of asking a payload for its next frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Pull {
    Frame([f32; 2]),
    /// No data right now. Playback should hold its position.
    Underrun,
    /// The data is exhausted.
    End,
}

pub(crate) enum SourceData {
    Static(Arc<Clip>),
    Stream { clip: Arc<Clip>, feed: Arc<StreamFeed> },
    Queue(Arc<QueueShared>),
}

/// State shared between a source handle and its mixer voice.
pub(crate) struct SourceInner {
    id: u64,
    transport: Mutex<Transport>,
    released: AtomicBool,
    sample_rate: u32,
    data: SourceData,
}

impl SourceInner {
    pub fn new(id: u64, data: SourceData, sample_rate: u32, transport: Transport) -> Self {
        SourceInner {
            id,
            transport: Mutex::new(transport),
            released: AtomicBool::new(false),
            sample_rate,
            data,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> SourceKind {
        match self.data {
            SourceData::Static(_) => SourceKind::Static,
            SourceData::Stream { .. } => SourceKind::Stream,
            SourceData::Queue(_) => SourceKind::Queueable,
        }
    }

    pub fn data(&self) -> &SourceData {
        &self.data
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frame count for clip-backed sources.
    pub fn total_frames(&self) -> Option<u64> {
        match &self.data {
            SourceData::Static(clip) | SourceData::Stream { clip, .. } => Some(clip.total_frames()),
            SourceData::Queue(_) => None,
        }
    }

    pub fn transport(&self) -> &Mutex<Transport> {
        &self.transport
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SourceState {
        self.transport.lock().state
    }

    pub fn play(&self, refill_tx: &Sender<Arc<StreamFeed>>) -> Result<(), AudioError> {
        let action = self.transport.lock().play();
        debug!(source = self.id, action = ?action, "Play");
        if let (PlayAction::Start { epoch, position }, SourceData::Stream { feed, .. }) =
            (action, &self.data)
        {
            if let Err(e) = feed.restart(epoch, position.floor() as u64) {
                let mut transport = self.transport.lock();
                if transport.epoch == epoch {
                    transport.state = SourceState::Stopped;
                    transport.position = 0.0;
                }
                return Err(e);
            }
            feed.request_fill(refill_tx);
        }
        Ok(())
    }

    pub fn pause(&self) -> bool {
        let mut transport = self.transport.lock();
        let was_playing = transport.state == SourceState::Playing;
        transport.pause();
        was_playing
    }

    pub fn stop(&self) -> bool {
        let was_active = self.transport.lock().stop();
        match &self.data {
            SourceData::Queue(queue) => queue.clear(),
            SourceData::Stream { feed, .. } => feed.flush(),
            SourceData::Static(_) => {}
        }
        was_active
    }

    pub fn release(&self) {
        self.released.store(true, Ordering::Release);
    }
}

/// A playable instance of a clip or a caller-fed queue.
///
/// Dropping the handle releases the source: it stops producing sound and its
/// resources are reclaimed by the engine.
pub struct Source {
    inner: Arc<SourceInner>,
    registry: Arc<SourceRegistry>,
}

impl Source {
    pub(crate) fn new(inner: Arc<SourceInner>, registry: Arc<SourceRegistry>) -> Source {
        Source { inner, registry }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn kind(&self) -> SourceKind {
        self.inner.kind()
    }

    /// Starts or resumes playback.
    pub fn play(&self) -> Result<(), AudioError> {
        self.inner.play(self.registry.refill_tx())
    }

    /// Freezes playback at the current position.
    pub fn pause(&self) {
        self.inner.pause();
    }

    /// Halts playback and rewinds to the start. Queued buffers are discarded.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn state(&self) -> SourceState {
        self.inner.state()
    }

    pub fn is_playing(&self) -> bool {
        self.state() == SourceState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state() == SourceState::Paused
    }

    /// True once playback has been stopped or has run off the end.
    pub fn is_stopped(&self) -> bool {
        self.state() == SourceState::Stopped
    }

    /// Sets the source gain, clamped to [0, 1].
    pub fn set_volume(&self, volume: f32) {
        self.inner.transport.lock().set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.inner.transport.lock().volume
    }

    /// Sets the playback rate multiplier, clamped to [MIN_PITCH, MAX_PITCH].
    pub fn set_pitch(&self, pitch: f32) {
        self.inner.transport.lock().set_pitch(pitch);
    }

    pub fn pitch(&self) -> f32 {
        self.inner.transport.lock().pitch
    }

    pub fn set_looping(&self, looping: bool) -> Result<(), AudioError> {
        self.inner.transport.lock().looping = looping;
        if let SourceData::Stream { feed, .. } = &self.inner.data {
            feed.set_looping(looping, self.registry.refill_tx())?;
        }
        Ok(())
    }

    pub fn is_looping(&self) -> bool {
        self.inner.transport.lock().looping
    }

    /// Moves the playback position to `seconds`, clamped to the clip's duration.
    ///
    /// Queueable sources have no fixed timeline and cannot seek.
    pub fn seek(&self, seconds: f64) -> Result<(), AudioError> {
        let total = self.inner.total_frames().ok_or_else(|| {
            AudioError::InvalidOperation("queueable sources cannot seek".to_string())
        })?;
        let seconds = if seconds.is_nan() { 0.0 } else { seconds };
        let frame = (seconds * self.inner.sample_rate as f64).clamp(0.0, total as f64);

        let (epoch, state) = {
            let mut transport = self.inner.transport.lock();
            let epoch = transport.seek(frame);
            (epoch, transport.state)
        };
        debug!(source = self.inner.id, frame, "Seek");

        if let SourceData::Stream { feed, .. } = &self.inner.data {
            if matches!(state, SourceState::Playing | SourceState::Paused) {
                feed.restart(epoch, frame.floor() as u64)?;
                feed.request_fill(self.registry.refill_tx());
            }
        }
        Ok(())
    }

    /// Current playback position in seconds.
    pub fn tell(&self) -> f64 {
        self.inner.transport.lock().position / self.inner.sample_rate as f64
    }

    /// Clip length in seconds, ignoring pitch. Zero for queueable sources.
    pub fn duration(&self) -> f64 {
        match &self.inner.data {
            SourceData::Static(clip) | SourceData::Stream { clip, .. } => clip.duration(),
            SourceData::Queue(_) => 0.0,
        }
    }

    /// Creates an independent source over the same clip, starting from the
    /// initial state with this source's volume, pitch and looping.
    pub fn try_clone(&self) -> Result<Source, AudioError> {
        let settings = self.inner.transport.lock().cloned_settings();
        let data = match &self.inner.data {
            SourceData::Static(clip) => SourceData::Static(clip.clone()),
            SourceData::Queue(queue) => SourceData::Queue(queue.empty_like()?),
            SourceData::Stream { .. } => {
                return Err(AudioError::InvalidOperation(
                    "stream sources cannot be cloned".to_string(),
                ))
            }
        };
        self.registry
            .register(next_source_id(), data, self.inner.sample_rate, settings)
    }

    /// Releases the source. Equivalent to dropping it.
    pub fn release(self) {}

    /// Appends a copy of `buffer` to a queueable source.
    ///
    /// Returns false when all buffer slots are in use.
    pub fn queue(&self, buffer: &SampleBuffer) -> Result<bool, AudioError> {
        match &self.inner.data {
            SourceData::Queue(queue) => queue.queue(buffer),
            _ => Err(AudioError::InvalidOperation(format!(
                "cannot queue buffers on a {} source",
                self.kind()
            ))),
        }
    }

    /// Number of buffers that can be queued right now.
    pub fn free_buffer_count(&self) -> u32 {
        match &self.inner.data {
            SourceData::Queue(queue) => queue.free_count() as u32,
            _ => 0,
        }
    }
}

impl Drop for Source {
    fn drop(&mut self) {
        debug!(source = self.inner.id, "Releasing source");
        self.inner.release();
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.inner.id)
            .field("kind", &self.kind())
            .field("state", &self.state())
            .finish()
    }
}
