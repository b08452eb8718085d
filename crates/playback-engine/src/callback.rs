//! Real-time render callback.
//!
//! [`StreamCallback::render`] runs on the device's audio thread. Per invocation it:
//! - performs a deferred decoder seek if the foreground published one
//! - reads up to one buffer of frames from the decoder
//! - advances the shared frame offset
//! - on end-of-stream either rewinds (looping) or marks the stream `Ended`
//!
//! A failed deferred seek leaves the offset at the decoder's real position; a failed loop
//! rewind ends the stream.
//!
//! ## Real-time constraints
//! The callback never waits on a lock (the decoder slot is only `try_lock`ed), never
//! allocates, and has no error channel: anything unexpected degrades to silence.
//! It never stops the device itself; natural end is signalled through the shared state
//! and a bounded one-shot channel that the foreground drains.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crossbeam_channel::Sender;

use crate::decode::DecoderSlot;
use crate::state::{SeekCursor, SharedState, StreamState};

/// Data source handed to an [`crate::device::OutputDevice`].
pub struct StreamCallback {
    shared: Arc<SharedState>,
    decoder: DecoderSlot,
    channels: usize,
    ended_tx: Sender<()>,
}

impl StreamCallback {
    pub(crate) fn new(
        shared: Arc<SharedState>,
        decoder: DecoderSlot,
        channels: u16,
        ended_tx: Sender<()>,
    ) -> Self {
        Self {
            shared,
            decoder,
            channels: channels.max(1) as usize,
            ended_tx,
        }
    }

    /// Interleaved channel count of the buffers passed to [`Self::render`].
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Fill `out` (interleaved, `frames * channels` samples) and return the number of frames
    /// that carry decoded audio. The rest of `out` is silence.
    pub fn render(&self, out: &mut [f32]) -> usize {
        let channels = self.channels;
        let frame_count = out.len() / channels;
        self.shared.counters.callbacks.fetch_add(1, Ordering::Relaxed);

        if self.shared.state() != StreamState::Active {
            return self.finish(out, 0, frame_count);
        }

        let Ok(mut guard) = self.decoder.try_lock() else {
            return self.finish(out, 0, frame_count);
        };
        let Some(decoder) = guard.as_mut() else {
            return self.finish(out, 0, frame_count);
        };

        let mut cursor = self.shared.cursor();
        if cursor.pending {
            let landed = match decoder.seek(cursor.frame) {
                Ok(()) => cursor.frame,
                Err(_) => {
                    self.count_seek_failure();
                    // Keep reporting what is actually played.
                    decoder.position()
                }
            };
            let settled = SeekCursor::settled(landed);
            if self.shared.swap_cursor(cursor, settled) {
                cursor = settled;
            }
            // Otherwise a newer request landed; the advance below fails and the next
            // invocation seeks again.
        }

        let read = decoder.read_frames(out, frame_count).min(frame_count);
        let advanced = SeekCursor::settled(cursor.frame + read as u64);
        let mut produced = read;
        let cursor_owned = self.shared.swap_cursor(cursor, advanced);

        if read < frame_count {
            if self.shared.looping() {
                if cursor_owned && decoder.seek(0).is_err() {
                    self.count_seek_failure();
                    self.end_naturally();
                } else if cursor_owned {
                    let rewound = SeekCursor::settled(0);
                    if self.shared.swap_cursor(advanced, rewound) {
                        let tail = &mut out[read * channels..];
                        let topped = decoder.read_frames(tail, frame_count - read);
                        let topped = topped.min(frame_count - read);
                        self.shared
                            .swap_cursor(rewound, SeekCursor::settled(topped as u64));
                        produced += topped;
                        if read == 0 && topped == 0 {
                            // Nothing to loop over.
                            self.end_naturally();
                        }
                    }
                }
            } else {
                self.end_naturally();
            }
        }

        drop(guard);
        self.finish(out, produced, frame_count)
    }

    fn count_seek_failure(&self) {
        self.shared
            .counters
            .seek_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    fn end_naturally(&self) {
        if self
            .shared
            .transition(StreamState::Active, StreamState::Ended)
        {
            let _ = self.ended_tx.try_send(());
        }
    }

    /// Silence everything after `produced` frames.
    fn finish(&self, out: &mut [f32], produced: usize, frame_count: usize) -> usize {
        let start = (produced * self.channels).min(out.len());
        out[start..].fill(0.0);
        let silent = frame_count.saturating_sub(produced);
        if silent > 0 {
            self.shared
                .counters
                .silent_frames
                .fetch_add(silent as u64, Ordering::Relaxed);
        }
        produced
    }
}
