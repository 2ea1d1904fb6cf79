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
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::audio::{error::AudioError, format::BitDepth, sample_buffer::SampleBuffer};

use super::Pull;

/// Bounded FIFO of caller-fed buffers.
///
/// `in_flight` counts buffers that are queued or being played. It is reserved
/// by `queue()` before a buffer enters the channel and released by the mixer
/// once the buffer is fully consumed, so `queued + free == capacity` holds at
/// every point the control side can observe.
pub(crate) struct QueueShared {
    sample_rate: u32,
    bit_depth: BitDepth,
    channels: u16,
    capacity: usize,
    in_flight: AtomicUsize,
    pending_tx: Sender<SampleBuffer>,
    pending_rx: Receiver<SampleBuffer>,
    spent_tx: Sender<SampleBuffer>,
    spent_rx: Receiver<SampleBuffer>,
}

impl QueueShared {
    pub fn new(
        sample_rate: u32,
        bit_depth: BitDepth,
        channels: u16,
        capacity: usize,
    ) -> Result<Arc<Self>, AudioError> {
        if capacity == 0 {
            return Err(AudioError::InvalidOperation(
                "queueable sources need at least one buffer".to_string(),
            ));
        }
        // Validates rate and channel layout.
        SampleBuffer::new(0, sample_rate, bit_depth, channels)?;

        let (pending_tx, pending_rx) = bounded(capacity);
        let (spent_tx, spent_rx) = bounded(capacity + 1);
        Ok(Arc::new(QueueShared {
            sample_rate,
            bit_depth,
            channels,
            capacity,
            in_flight: AtomicUsize::new(0),
            pending_tx,
            pending_rx,
            spent_tx,
            spent_rx,
        }))
    }

    /// A new empty queue with the same format and capacity.
    pub fn empty_like(&self) -> Result<Arc<Self>, AudioError> {
        QueueShared::new(self.sample_rate, self.bit_depth, self.channels, self.capacity)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Copies `buffer` into the queue. Returns false when every slot is taken.
    pub fn queue(&self, buffer: &SampleBuffer) -> Result<bool, AudioError> {
        if !buffer.has_format(self.sample_rate, self.bit_depth, self.channels) {
            return Err(AudioError::InvalidOperation(format!(
                "buffer is {}Hz {} {}ch, queue expects {}Hz {} {}ch",
                buffer.sample_rate(),
                buffer.bit_depth(),
                buffer.channels(),
                self.sample_rate,
                self.bit_depth,
                self.channels
            )));
        }
        self.reclaim();

        let reserved = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok();
        if !reserved {
            return Ok(false);
        }
        if self.pending_tx.try_send(buffer.clone()).is_err() {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            return Ok(false);
        }
        Ok(true)
    }

    pub fn free_count(&self) -> usize {
        self.reclaim();
        self.capacity.saturating_sub(self.in_flight.load(Ordering::Acquire))
    }

    /// Discards every queued buffer that playback has not started on.
    pub fn clear(&self) {
        while let Ok(buffer) = self.pending_rx.try_recv() {
            drop(buffer);
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
        }
        self.reclaim();
    }

    /// Frees buffers the mixer has finished with.
    fn reclaim(&self) {
        while self.spent_rx.try_recv().is_ok() {}
    }

    fn take(&self) -> Option<SampleBuffer> {
        self.pending_rx.try_recv().ok()
    }

    fn retire(&self, buffer: SampleBuffer) {
        let _ = self.spent_tx.try_send(buffer);
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Render-side read cursor over a queue.
pub(crate) struct QueueCursor {
    queue: Arc<QueueShared>,
    current: Option<SampleBuffer>,
    offset: usize,
}

impl QueueCursor {
    pub fn new(queue: Arc<QueueShared>) -> Self {
        QueueCursor {
            queue,
            current: None,
            offset: 0,
        }
    }

    pub fn pull(&mut self) -> Pull {
        loop {
            if let Some(buffer) = &self.current {
                if self.offset < buffer.frame_count() {
                    let frame = buffer.frame(self.offset);
                    self.offset += 1;
                    return Pull::Frame(frame);
                }
            }
            if let Some(buffer) = self.current.take() {
                self.queue.retire(buffer);
            }
            match self.queue.take() {
                Some(buffer) => {
                    self.current = Some(buffer);
                    self.offset = 0;
                }
                None => return Pull::Underrun,
            }
        }
    }

    /// Drops the partially played buffer.
    pub fn reset(&mut self) {
        if let Some(buffer) = self.current.take() {
            self.queue.retire(buffer);
        }
        self.offset = 0;
    }
}
