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

//! Real-time audio playback for the jove 2D game framework.
//!
//! An [`engine::Engine`] owns the output device and a mixer. Clips are loaded
//! through it and played by [`audio::Source`] handles, which can be static,
//! streamed from their encoded bytes, or fed buffer by buffer from game code.

pub mod audio;
pub mod config;
pub mod engine;
pub mod filesystem;
pub mod pool;
#[cfg(test)]
mod testutil;

pub use audio::{AudioError, Source, SourceKind, SourceState};
pub use engine::{Engine, SourceMode};
