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

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::audio::error::AudioError;
use crate::audio::mixer::Voice;

use super::stream::StreamFeed;
use super::{Source, SourceData, SourceInner, SourceState, Transport};

/// Control-side bookkeeping for live sources.
///
/// New voices are handed to the mixer over `voice_tx`. Voices the mixer has
/// retired come back over `graveyard_rx` and are dropped here, off the audio
/// thread.
pub(crate) struct SourceRegistry {
    sources: Mutex<Vec<Arc<SourceInner>>>,
    voice_tx: Sender<Voice>,
    graveyard_rx: Receiver<Voice>,
    refill_tx: Sender<Arc<StreamFeed>>,
    max_sources: usize,
}

impl SourceRegistry {
    pub fn new(
        max_sources: usize,
        voice_tx: Sender<Voice>,
        graveyard_rx: Receiver<Voice>,
        refill_tx: Sender<Arc<StreamFeed>>,
    ) -> Arc<SourceRegistry> {
        Arc::new(SourceRegistry {
            sources: Mutex::new(Vec::with_capacity(max_sources)),
            voice_tx,
            graveyard_rx,
            refill_tx,
            max_sources,
        })
    }

    pub fn refill_tx(&self) -> &Sender<Arc<StreamFeed>> {
        &self.refill_tx
    }

    /// Creates a source and hands its voice to the mixer.
    pub fn register(
        self: &Arc<Self>,
        id: u64,
        data: SourceData,
        sample_rate: u32,
        transport: Transport,
    ) -> Result<Source, AudioError> {
        self.collect_garbage();

        let mut sources = self.sources.lock();
        if sources.len() >= self.max_sources {
            warn!(
                max_sources = self.max_sources,
                "Source limit reached, refusing new source"
            );
            return Err(AudioError::InvalidOperation(format!(
                "source limit of {} reached",
                self.max_sources
            )));
        }

        let inner = Arc::new(SourceInner::new(id, data, sample_rate, transport));
        let voice = Voice::new(inner.clone(), self.refill_tx.clone());
        match self.voice_tx.try_send(voice) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                return Err(AudioError::InvalidOperation(
                    "mixer has too many pending sources".to_string(),
                ))
            }
            Err(TrySendError::Disconnected(_)) => {
                return Err(AudioError::Device("mixer is no longer running".to_string()))
            }
        }
        sources.push(inner.clone());
        debug!(source = id, kind = %inner.kind(), live = sources.len(), "Registered source");

        Ok(Source::new(inner, self.clone()))
    }

    /// Drops retired voices and forgets released sources.
    pub fn collect_garbage(&self) {
        let mut reclaimed = 0;
        while let Ok(voice) = self.graveyard_rx.try_recv() {
            drop(voice);
            reclaimed += 1;
        }
        let mut sources = self.sources.lock();
        sources.retain(|s| !s.is_released());
        if reclaimed > 0 {
            debug!(reclaimed, live = sources.len(), "Collected retired voices");
        }
    }

    pub fn live_count(&self) -> usize {
        self.collect_garbage();
        self.sources.lock().len()
    }

    /// Number of sources currently playing.
    pub fn playing_count(&self) -> usize {
        self.collect_garbage();
        self.sources
            .lock()
            .iter()
            .filter(|s| s.state() == SourceState::Playing)
            .count()
    }

    /// Stops every live source and returns how many were playing or paused.
    pub fn stop_all(&self) -> usize {
        self.collect_garbage();
        self.snapshot().iter().filter(|s| s.stop()).count()
    }

    /// Pauses every playing source and returns how many were affected.
    pub fn pause_all(&self) -> usize {
        self.collect_garbage();
        self.snapshot().iter().filter(|s| s.pause()).count()
    }

    fn snapshot(&self) -> Vec<Arc<SourceInner>> {
        self.sources.lock().clone()
    }
}
