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
// Decode-ahead workers for stream sources. The mixer posts refill requests
// with try_send; a dispatcher thread turns each request into a job on a
// dedicated Rayon pool so decoding never happens on the audio thread.
//
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use rayon::ThreadPoolBuilder;
use tracing::{debug, error, info};

use super::error::AudioError;
use super::source::stream::StreamFeed;

pub(crate) struct Streamer {
    shutdown_tx: Sender<()>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Streamer {
    /// Starts `threads` decode workers fed from `refill_rx`.
    pub fn start(
        threads: usize,
        refill_rx: Receiver<Arc<StreamFeed>>,
    ) -> Result<Streamer, AudioError> {
        let threads = threads.clamp(1, num_cpus::get().max(1));
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("jove-audio-stream-{i}"))
            .build()
            .map_err(|e| AudioError::Device(format!("unable to start stream workers: {e}")))?;
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let dispatcher = thread::Builder::new()
            .name("jove-audio-streamer".to_string())
            .spawn(move || loop {
                select! {
                    recv(refill_rx) -> feed => match feed {
                        Ok(feed) => pool.spawn(move || feed.fill()),
                        Err(_) => {
                            debug!("Refill channel closed");
                            return;
                        }
                    },
                    recv(shutdown_rx) -> _ => return,
                }
            })?;
        info!(threads, "Started stream workers");

        Ok(Streamer {
            shutdown_tx,
            dispatcher: Some(dispatcher),
        })
    }
}

impl Drop for Streamer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(dispatcher) = self.dispatcher.take() {
            if dispatcher.join().is_err() {
                error!("Stream dispatcher panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decoder::{self, wav};
    use crate::audio::format::BitDepth;
    use crate::audio::sample_buffer::SampleBuffer;
    use crate::audio::source::stream::StreamCursor;
    use crate::audio::source::Pull;
    use crate::testutil::eventually;

    #[test]
    fn test_refill_runs_on_worker() {
        let buffer = SampleBuffer::new(64, 8000, BitDepth::Sixteen, 1).unwrap();
        let bytes: Arc<[u8]> = Arc::from(wav::encode(&buffer));
        let feed = StreamFeed::new(7, decoder::open_stream(bytes).unwrap(), 16, 64, 2);
        feed.restart(1, 0).unwrap();

        let (refill_tx, refill_rx) = bounded(4);
        let streamer = Streamer::start(1, refill_rx).unwrap();
        let mut cursor = StreamCursor::new(feed.clone(), refill_tx);

        let mut frames = 0;
        eventually(
            || {
                loop {
                    match cursor.pull(1, false) {
                        Pull::Frame(_) => frames += 1,
                        Pull::Underrun => return false,
                        Pull::End => return true,
                    }
                }
            },
            "stream never reached its end",
        );
        assert_eq!(frames, 64);
        drop(streamer);
    }
}
