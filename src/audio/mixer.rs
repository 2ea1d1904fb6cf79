// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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
// Core audio mixing logic shared by the cpal output and the mock device.
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::audio::clip::Clip;
use crate::audio::source::queue::QueueCursor;
use crate::audio::source::stream::{StreamCursor, StreamFeed};
use crate::audio::source::{Pull, SourceData, SourceInner, SourceState};

/// The mixer as shared with an output stream. The render callback only ever `try_lock`s it.
pub type SharedMixer = Arc<Mutex<Mixer>>;

/// Engine-wide gain, readable from the render thread without locking.
#[derive(Debug)]
pub struct MasterVolume(AtomicU32);

impl MasterVolume {
    pub fn new(volume: f32) -> Self {
        let master = MasterVolume(AtomicU32::new(1.0f32.to_bits()));
        master.set(volume);
        master
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Sets the gain, clamped to [0, 1]. NaN is ignored.
    pub fn set(&self, volume: f32) {
        if !volume.is_nan() {
            self.0.store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
        }
    }
}

/// Core audio mixing logic that's independent of any audio backend.
pub struct Mixer {
    voices: Vec<Voice>,
    incoming: Receiver<Voice>,
    graveyard: Sender<Voice>,
    /// One period of interleaved output. Never resized after construction.
    accum: Vec<f32>,
    period_frames: usize,
    channels: u16,
    device_rate: u32,
    master: Arc<MasterVolume>,
}

impl Mixer {
    pub(crate) fn new(
        channels: u16,
        device_rate: u32,
        period_frames: usize,
        max_voices: usize,
        incoming: Receiver<Voice>,
        graveyard: Sender<Voice>,
        master: Arc<MasterVolume>,
    ) -> Self {
        let period_frames = period_frames.max(1);
        Mixer {
            voices: Vec::with_capacity(max_voices.max(1)),
            incoming,
            graveyard,
            accum: vec![0.0; period_frames * channels as usize],
            period_frames,
            channels,
            device_rate,
            master,
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn period_frames(&self) -> usize {
        self.period_frames
    }

    /// Number of voices the mixer currently holds, playing or not.
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Renders `frames` frames (at most one period) and returns the interleaved result.
    pub fn render(&mut self, frames: usize) -> &[f32] {
        let frames = frames.min(self.period_frames);
        self.render_period(frames);
        &self.accum[..frames * self.channels as usize]
    }

    /// Fills an interleaved device buffer of any size, one period at a time.
    pub fn render_into(&mut self, out: &mut [f32]) {
        let channels = self.channels as usize;
        let step = self.period_frames * channels;
        for piece in out.chunks_mut(step) {
            let frames = piece.len() / channels;
            self.render_period(frames);
            piece.copy_from_slice(&self.accum[..piece.len()]);
        }
    }

    fn render_period(&mut self, frames: usize) {
        self.reap();
        self.accept();

        let samples = frames * self.channels as usize;
        let accum = &mut self.accum[..samples];
        accum.fill(0.0);

        let master = self.master.get();
        for voice in self.voices.iter_mut() {
            voice.render(accum, self.channels, self.device_rate, master);
        }
        for sample in accum.iter_mut() {
            *sample = if sample.is_finite() {
                sample.clamp(-1.0, 1.0)
            } else {
                0.0
            };
        }
    }

    /// Hands released voices back to the control side.
    fn reap(&mut self) {
        let mut i = 0;
        while i < self.voices.len() {
            if !self.voices[i].inner.is_released() {
                i += 1;
                continue;
            }
            let voice = self.voices.swap_remove(i);
            if let Err(e) = self.graveyard.try_send(voice) {
                // Graveyard is full; retry next period.
                self.voices.push(e.into_inner());
                return;
            }
        }
    }

    fn accept(&mut self) {
        while self.voices.len() < self.voices.capacity() {
            match self.incoming.try_recv() {
                Ok(voice) => self.voices.push(voice),
                Err(_) => break,
            }
        }
    }
}

enum Cursor {
    Static { clip: Arc<Clip>, read: u64 },
    Stream(StreamCursor),
    Queue(QueueCursor),
}

enum Settle {
    Ready,
    Stalled,
    Finished,
}

/// The mixer's per-source render state.
pub(crate) struct Voice {
    inner: Arc<SourceInner>,
    cursor: Cursor,
    /// Transport epoch the cursor was positioned for.
    epoch: u64,
    /// Source frame index of `cur`.
    base: u64,
    /// Fractional distance from `cur` towards `nxt`.
    frac: f64,
    cur: [f32; 2],
    nxt: [f32; 2],
    have_cur: bool,
    have_nxt: bool,
    /// `nxt` is the silent frame past the end of the data.
    nxt_end: bool,
    gain: Option<f32>,
}

impl Voice {
    pub fn new(inner: Arc<SourceInner>, refill_tx: Sender<Arc<StreamFeed>>) -> Self {
        let cursor = match inner.data() {
            SourceData::Static(clip) => Cursor::Static {
                clip: clip.clone(),
                read: 0,
            },
            SourceData::Stream { feed, .. } => {
                Cursor::Stream(StreamCursor::new(feed.clone(), refill_tx))
            }
            SourceData::Queue(queue) => Cursor::Queue(QueueCursor::new(queue.clone())),
        };
        Voice {
            inner,
            cursor,
            // Forces a relocation on the first period.
            epoch: u64::MAX,
            base: 0,
            frac: 0.0,
            cur: [0.0; 2],
            nxt: [0.0; 2],
            have_cur: false,
            have_nxt: false,
            nxt_end: false,
            gain: None,
        }
    }

    fn render(&mut self, out: &mut [f32], channels: u16, device_rate: u32, master: f32) {
        let snapshot = *self.inner.transport().lock();
        if snapshot.epoch != self.epoch {
            self.relocate(snapshot.epoch, snapshot.position, snapshot.looping);
        }
        if snapshot.state != SourceState::Playing {
            self.gain = None;
            return;
        }

        let total = self.inner.total_frames();
        let step = snapshot.pitch as f64 * self.inner.sample_rate() as f64 / device_rate as f64;
        let target = snapshot.volume * master;
        let start_gain = self.gain.unwrap_or(target);
        let channels = channels as usize;
        let frames = out.len() / channels;

        let mut finished = false;
        for (i, frame) in out.chunks_exact_mut(channels).enumerate() {
            match self.settle(snapshot.looping, total) {
                Settle::Ready => {}
                Settle::Stalled => break,
                Settle::Finished => {
                    finished = true;
                    break;
                }
            }
            let [l, r] = if self.have_nxt {
                let t = self.frac as f32;
                [
                    self.cur[0] + (self.nxt[0] - self.cur[0]) * t,
                    self.cur[1] + (self.nxt[1] - self.cur[1]) * t,
                ]
            } else {
                self.cur
            };
            let gain = start_gain + (target - start_gain) * (i + 1) as f32 / frames as f32;
            if channels == 1 {
                frame[0] += (l + r) * 0.5 * gain;
            } else {
                frame[0] += l * gain;
                frame[1] += r * gain;
            }
            self.frac += step;
        }
        if !finished && self.frac >= 1.0 && self.have_nxt && self.nxt_end {
            finished = true;
        }
        self.gain = Some(target);

        let mut transport = self.inner.transport().lock();
        if transport.epoch != self.epoch {
            return;
        }
        if finished {
            transport.state = SourceState::Stopped;
            transport.position = total.unwrap_or(self.base) as f64;
            self.gain = None;
        } else {
            let mut position = self.base as f64 + self.frac;
            if let Some(total) = total.filter(|t| *t > 0 && snapshot.looping) {
                if position >= total as f64 {
                    position -= total as f64;
                }
            }
            transport.position = position;
        }
    }

    fn relocate(&mut self, epoch: u64, position: f64, looping: bool) {
        let position = position.max(0.0);
        let mut base = position.floor() as u64;
        if let Some(total) = self.inner.total_frames().filter(|t| *t > 0 && looping) {
            base %= total;
        }
        self.epoch = epoch;
        self.base = base;
        self.frac = position - position.floor();
        self.have_cur = false;
        self.have_nxt = false;
        self.nxt_end = false;
        self.gain = None;
        match &mut self.cursor {
            Cursor::Static { read, .. } => *read = base,
            Cursor::Stream(cursor) => cursor.reset(),
            Cursor::Queue(cursor) => cursor.reset(),
        }
    }

    /// Makes `cur` the frame at the playback position, pulling data as needed.
    fn settle(&mut self, looping: bool, total: Option<u64>) -> Settle {
        if !self.have_cur {
            match self.pull(looping) {
                Pull::Frame(frame) => {
                    self.cur = frame;
                    self.have_cur = true;
                }
                Pull::Underrun => return Settle::Stalled,
                Pull::End => return Settle::Finished,
            }
        }
        loop {
            if !self.have_nxt {
                match self.pull(looping) {
                    Pull::Frame(frame) => {
                        self.nxt = frame;
                        self.have_nxt = true;
                    }
                    // Without a next frame `cur` is still playable; only advancing stalls.
                    Pull::Underrun if self.frac < 1.0 => return Settle::Ready,
                    Pull::Underrun => return Settle::Stalled,
                    Pull::End => {
                        self.nxt = [0.0; 2];
                        self.have_nxt = true;
                        self.nxt_end = true;
                    }
                }
            }
            if self.frac < 1.0 {
                return Settle::Ready;
            }
            if self.nxt_end {
                return Settle::Finished;
            }
            self.frac -= 1.0;
            self.cur = self.nxt;
            self.have_nxt = false;
            self.base += 1;
            if let Some(total) = total.filter(|t| *t > 0 && looping) {
                if self.base >= total {
                    self.base -= total;
                }
            }
        }
    }

    fn pull(&mut self, looping: bool) -> Pull {
        match &mut self.cursor {
            Cursor::Static { clip, read } => {
                let Some(buffer) = clip.buffer() else {
                    return Pull::End;
                };
                let total = buffer.frame_count() as u64;
                if *read >= total {
                    if looping && total > 0 {
                        *read = 0;
                    } else {
                        return Pull::End;
                    }
                }
                let frame = buffer.frame(*read as usize);
                *read += 1;
                Pull::Frame(frame)
            }
            Cursor::Stream(cursor) => cursor.pull(self.epoch, looping),
            Cursor::Queue(cursor) => cursor.pull(),
        }
    }
}
