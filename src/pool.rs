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

//! Polyphonic retriggering of a single sound.
//!
//! A pool holds clones of a template source. Triggering reuses an idle clone,
//! creates a new one while under the pool limit, and otherwise steals the
//! voice that has been playing the longest.

use std::fmt;
use std::time::Instant;

use tracing::{debug, warn};

use crate::audio::{AudioError, Source, SourceKind};

/// What happens to voices already sounding when the pool is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retrigger {
    /// Layer the new voice over the existing ones.
    #[default]
    Polyphonic,
    /// Stop every sounding voice first.
    Cut,
}

struct PooledVoice {
    source: Source,
    started: Instant,
}

impl PooledVoice {
    fn is_idle(&self) -> bool {
        !self.source.is_playing() && !self.source.is_paused()
    }
}

/// A clone-based voice pool built from a template source.
pub struct SourcePool {
    template: Source,
    voices: Vec<PooledVoice>,
    max_voices: usize,
    retrigger: Retrigger,
}

impl SourcePool {
    /// Creates a pool of at most `max_voices` clones of `template`.
    pub fn new(template: Source, max_voices: usize) -> Result<SourcePool, AudioError> {
        if template.kind() == SourceKind::Stream {
            return Err(AudioError::InvalidOperation(
                "stream sources cannot be pooled".to_string(),
            ));
        }
        if max_voices == 0 {
            return Err(AudioError::InvalidOperation(
                "a source pool needs at least one voice".to_string(),
            ));
        }
        Ok(SourcePool {
            template,
            voices: Vec::with_capacity(max_voices),
            max_voices,
            retrigger: Retrigger::default(),
        })
    }

    pub fn with_retrigger(mut self, retrigger: Retrigger) -> SourcePool {
        self.retrigger = retrigger;
        self
    }

    /// The source whose settings every triggered voice copies.
    pub fn template(&self) -> &Source {
        &self.template
    }

    /// Starts a voice from the beginning of the sound and returns it.
    pub fn trigger(&mut self) -> Result<&Source, AudioError> {
        if self.retrigger == Retrigger::Cut {
            for voice in &self.voices {
                voice.source.stop();
            }
        }

        let index = match self.voices.iter().position(PooledVoice::is_idle) {
            Some(index) => index,
            None if self.voices.len() < self.max_voices => {
                self.voices.push(PooledVoice {
                    source: self.template.try_clone()?,
                    started: Instant::now(),
                });
                debug!(
                    voices = self.voices.len(),
                    max_voices = self.max_voices,
                    "Added pool voice"
                );
                self.voices.len() - 1
            }
            None => {
                let (index, _) = self
                    .voices
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, v)| v.started)
                    .ok_or_else(|| AudioError::InvalidOperation("empty source pool".to_string()))?;
                warn!(
                    max_voices = self.max_voices,
                    "Pool voice limit reached, stealing oldest"
                );
                self.voices[index].source.stop();
                index
            }
        };

        let voice = &mut self.voices[index];
        voice.source.set_volume(self.template.volume());
        voice.source.set_pitch(self.template.pitch());
        voice.source.set_looping(self.template.is_looping())?;
        voice.source.play()?;
        voice.started = Instant::now();
        Ok(&voice.source)
    }

    /// Number of voices currently playing.
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.source.is_playing()).count()
    }

    /// Number of clones created so far.
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn stop_all(&self) {
        for voice in &self.voices {
            voice.source.stop();
        }
    }
}

impl fmt::Debug for SourcePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourcePool")
            .field("voices", &self.voices.len())
            .field("active", &self.active_count())
            .field("max_voices", &self.max_voices)
            .field("retrigger", &self.retrigger)
            .finish()
    }
}
