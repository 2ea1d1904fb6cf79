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

//! Lookahead decoding for stream sources.
//!
//! A `StreamFeed` owns the decoder for one stream source. Streamer workers
//! call `fill()` to keep a bounded ring of decoded chunks ahead of playback,
//! and the mixer pulls from that ring through a `StreamCursor` without ever
//! touching the decoder itself. Every chunk is tagged with the transport epoch
//! it was decoded for so chunks from before a seek or restart are discarded,
//! and with the loop pass it came from so a voice that stops looping ends at
//! the wrap instead of playing data decoded past it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::audio::{decoder::StreamDecoder, error::AudioError, sample_buffer::SampleBuffer};

use super::Pull;

const NO_EPOCH: u64 = u64::MAX;

/// A decoded chunk tagged with the epoch and loop pass it belongs to.
pub(crate) struct Chunk {
    epoch: u64,
    pass: u64,
    buffer: SampleBuffer,
}

struct FeedState {
    decoder: Box<dyn StreamDecoder>,
    epoch: u64,
    /// Number of times the decoder has wrapped back to frame 0 in this epoch.
    pass: u64,
    finished: bool,
}

pub(crate) struct StreamFeed {
    source_id: u64,
    state: Mutex<FeedState>,
    chunk_frames: usize,
    total_frames: u64,
    looping: AtomicBool,
    ready_tx: Sender<Chunk>,
    ready_rx: Receiver<Chunk>,
    spent_tx: Sender<SampleBuffer>,
    spent_rx: Receiver<SampleBuffer>,
    /// Epoch whose decode reached the end of the data, or `NO_EPOCH`.
    finished_epoch: AtomicU64,
    refill_pending: AtomicBool,
}

impl StreamFeed {
    pub fn new(
        source_id: u64,
        decoder: Box<dyn StreamDecoder>,
        chunk_frames: usize,
        total_frames: u64,
        lookahead: usize,
    ) -> Arc<StreamFeed> {
        let lookahead = lookahead.max(1);
        let (ready_tx, ready_rx) = bounded(lookahead);
        // Room for every chunk in the ring plus the ones the mixer is holding.
        let (spent_tx, spent_rx) = bounded(2 * lookahead + 4);
        Arc::new(StreamFeed {
            source_id,
            state: Mutex::new(FeedState {
                decoder,
                epoch: NO_EPOCH,
                pass: 0,
                finished: false,
            }),
            chunk_frames: chunk_frames.max(1),
            total_frames,
            looping: AtomicBool::new(false),
            ready_tx,
            ready_rx,
            spent_tx,
            spent_rx,
            finished_epoch: AtomicU64::new(NO_EPOCH),
            refill_pending: AtomicBool::new(false),
        })
    }

    /// Repositions the decoder for a new epoch and decodes the first chunk
    /// synchronously so the mixer has data on its next period.
    pub fn restart(&self, epoch: u64, frame: u64) -> Result<(), AudioError> {
        let mut state = self.state.lock();
        state.epoch = epoch;
        state.pass = 0;
        state.finished = false;
        self.finished_epoch.store(NO_EPOCH, Ordering::Release);
        self.flush();

        if frame >= self.total_frames {
            if self.looping.load(Ordering::Acquire) && self.total_frames > 0 {
                state.decoder.seek(0)?;
            } else {
                self.mark_finished(&mut state);
                return Ok(());
            }
        } else {
            state.decoder.seek(frame)?;
        }
        self.decode_into(&mut state, 1)
    }

    /// Tops the lookahead ring up. Runs on a streamer worker.
    pub fn fill(&self) {
        self.refill_pending.store(false, Ordering::Release);
        let mut state = self.state.lock();
        if state.epoch == NO_EPOCH {
            return;
        }
        self.reclaim();
        let free = self.ready_tx.capacity().unwrap_or(1) - self.ready_tx.len();
        if let Err(e) = self.decode_into(&mut state, free) {
            warn!(
                source = self.source_id,
                err = %e,
                "Stream decode failed, ending playback"
            );
            self.mark_finished(&mut state);
        }
    }

    /// Discards every decoded chunk that has not reached the mixer.
    pub fn flush(&self) {
        while self.ready_rx.try_recv().is_ok() {}
        self.reclaim();
    }

    /// Toggles looping. A feed that already hit the end is rewound so playback continues.
    pub fn set_looping(
        self: &Arc<Self>,
        looping: bool,
        refill_tx: &Sender<Arc<StreamFeed>>,
    ) -> Result<(), AudioError> {
        self.looping.store(looping, Ordering::Release);
        if !looping {
            return Ok(());
        }
        {
            let mut state = self.state.lock();
            if state.finished && state.epoch != NO_EPOCH && self.total_frames > 0 {
                state.decoder.seek(0)?;
                state.pass += 1;
                state.finished = false;
                self.finished_epoch.store(NO_EPOCH, Ordering::Release);
            }
        }
        self.request_fill(refill_tx);
        Ok(())
    }

    /// Schedules a `fill()` unless one is already pending.
    pub fn request_fill(self: &Arc<Self>, refill_tx: &Sender<Arc<StreamFeed>>) {
        if self
            .refill_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        if let Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) =
            refill_tx.try_send(self.clone())
        {
            self.refill_pending.store(false, Ordering::Release);
        }
    }

    fn decode_into(&self, state: &mut FeedState, max_chunks: usize) -> Result<(), AudioError> {
        let mut produced = 0;
        while produced < max_chunks && !state.finished && !self.ready_tx.is_full() {
            match state.decoder.next_chunk(self.chunk_frames)? {
                Some(buffer) => {
                    let chunk = Chunk {
                        epoch: state.epoch,
                        pass: state.pass,
                        buffer,
                    };
                    if self.ready_tx.try_send(chunk).is_err() {
                        break;
                    }
                    produced += 1;
                }
                None if self.looping.load(Ordering::Acquire) && self.total_frames > 0 => {
                    debug!(source = self.source_id, "Stream wrapped");
                    state.decoder.seek(0)?;
                    state.pass += 1;
                }
                None => self.mark_finished(state),
            }
        }
        Ok(())
    }

    fn mark_finished(&self, state: &mut FeedState) {
        state.finished = true;
        self.finished_epoch.store(state.epoch, Ordering::Release);
    }

    fn reclaim(&self) {
        while self.spent_rx.try_recv().is_ok() {}
    }

    fn next_chunk(&self) -> Option<Chunk> {
        self.ready_rx.try_recv().ok()
    }

    fn finished_for(&self, epoch: u64) -> bool {
        self.finished_epoch.load(Ordering::Acquire) == epoch
    }

    fn retire(&self, buffer: SampleBuffer) {
        let _ = self.spent_tx.try_send(buffer);
    }
}

/// Render-side read cursor over a stream feed.
pub(crate) struct StreamCursor {
    feed: Arc<StreamFeed>,
    refill_tx: Sender<Arc<StreamFeed>>,
    current: Option<Chunk>,
    offset: usize,
    /// Loop pass of the chunks being played.
    pass: u64,
    /// A chunk the voice cannot play yet: it belongs to a newer epoch, or to
    /// the next loop pass after looping was turned off.
    held: Option<Chunk>,
}

impl StreamCursor {
    pub fn new(feed: Arc<StreamFeed>, refill_tx: Sender<Arc<StreamFeed>>) -> Self {
        StreamCursor {
            feed,
            refill_tx,
            current: None,
            offset: 0,
            pass: 0,
            held: None,
        }
    }

    /// Reads the next frame for `epoch`. With `looping` off, data from a later
    /// loop pass than the one playing counts as the end of the stream.
    pub fn pull(&mut self, epoch: u64, looping: bool) -> Pull {
        loop {
            if let Some(chunk) = &self.current {
                if chunk.epoch == epoch && self.offset < chunk.buffer.frame_count() {
                    let frame = chunk.buffer.frame(self.offset);
                    self.offset += 1;
                    return Pull::Frame(frame);
                }
            }
            if let Some(chunk) = self.current.take() {
                self.feed.retire(chunk.buffer);
                self.feed.request_fill(&self.refill_tx);
            }

            let next = match self.held.take() {
                Some(chunk) => Some(chunk),
                None => self.feed.next_chunk(),
            };
            match next {
                Some(chunk) if chunk.epoch == epoch => {
                    if chunk.pass != self.pass && !looping {
                        self.held = Some(chunk);
                        return Pull::End;
                    }
                    self.pass = chunk.pass;
                    self.current = Some(chunk);
                    self.offset = 0;
                }
                Some(chunk) if chunk.epoch != NO_EPOCH && chunk.epoch > epoch => {
                    self.held = Some(chunk);
                    return Pull::Underrun;
                }
                Some(stale) => self.feed.retire(stale.buffer),
                None => {
                    if self.feed.finished_for(epoch) {
                        return Pull::End;
                    }
                    self.feed.request_fill(&self.refill_tx);
                    return Pull::Underrun;
                }
            }
        }
    }

    /// Drops the chunk being played. The next epoch starts on pass 0.
    pub fn reset(&mut self) {
        if let Some(chunk) = self.current.take() {
            self.feed.retire(chunk.buffer);
        }
        self.offset = 0;
        self.pass = 0;
    }
}
