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
use std::fmt;

/// Lowest accepted pitch multiplier.
pub const MIN_PITCH: f32 = 0.125;
/// Highest accepted pitch multiplier.
pub const MAX_PITCH: f32 = 8.0;

/// Playback state of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Initial,
    Playing,
    Paused,
    Stopped,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceState::Initial => "initial",
            SourceState::Playing => "playing",
            SourceState::Paused => "paused",
            SourceState::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

/// What happens when `play()` is called.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum PlayAction {
    /// Already playing.
    None,
    /// Continue from the frozen position.
    Resume,
    /// Start from `position` under a new epoch.
    Start { epoch: u64, position: f64 },
}

/// Scalar transport fields shared between a source handle and its mixer voice.
///
/// Only control calls change `state`, `volume`, `pitch` and `looping`. The mixer
/// publishes `position` and the natural-end transition back, and only when
/// `epoch` still matches the snapshot it rendered from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Transport {
    pub state: SourceState,
    /// Position in source frames.
    pub position: f64,
    pub volume: f32,
    pub pitch: f32,
    pub looping: bool,
    /// Bumped whenever a control call relocates the cursor.
    pub epoch: u64,
    /// A seek landed while stopped and should be honoured by the next play.
    pub seek_pending: bool,
}

impl Default for Transport {
    fn default() -> Self {
        Transport {
            state: SourceState::Initial,
            position: 0.0,
            volume: 1.0,
            pitch: 1.0,
            looping: false,
            epoch: 0,
            seek_pending: false,
        }
    }
}

impl Transport {
    /// A fresh transport carrying over volume, pitch and looping.
    pub fn cloned_settings(&self) -> Transport {
        Transport {
            volume: self.volume,
            pitch: self.pitch,
            looping: self.looping,
            ..Transport::default()
        }
    }

    pub fn play(&mut self) -> PlayAction {
        match self.state {
            SourceState::Playing => PlayAction::None,
            SourceState::Paused => {
                self.state = SourceState::Playing;
                PlayAction::Resume
            }
            SourceState::Initial | SourceState::Stopped => {
                if !self.seek_pending {
                    self.position = 0.0;
                }
                self.seek_pending = false;
                self.epoch += 1;
                self.state = SourceState::Playing;
                PlayAction::Start {
                    epoch: self.epoch,
                    position: self.position,
                }
            }
        }
    }

    pub fn pause(&mut self) {
        if self.state == SourceState::Playing {
            self.state = SourceState::Paused;
        }
    }

    /// Returns false when there was nothing to stop.
    pub fn stop(&mut self) -> bool {
        let was_active = matches!(self.state, SourceState::Playing | SourceState::Paused);
        if self.state != SourceState::Initial {
            self.state = SourceState::Stopped;
        }
        self.position = 0.0;
        self.seek_pending = false;
        self.epoch += 1;
        was_active
    }

    /// Relocates the cursor and returns the new epoch.
    pub fn seek(&mut self, position: f64) -> u64 {
        self.position = position;
        self.seek_pending = matches!(self.state, SourceState::Initial | SourceState::Stopped);
        self.epoch += 1;
        self.epoch
    }

    pub fn set_volume(&mut self, volume: f32) {
        if !volume.is_nan() {
            self.volume = volume.clamp(0.0, 1.0);
        }
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        if !pitch.is_nan() {
            self.pitch = pitch.clamp(MIN_PITCH, MAX_PITCH);
        }
    }
}
