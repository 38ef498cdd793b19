//! WebSocket-fed audio capture buffer.
//!
//! The network handler calls [`ChunkQueue::put`] with whatever byte runs
//! the browser sends; the pipeline worker calls [`ChunkQueue::read_chunk`]
//! and gets exactly `chunk_size_bytes` back, assembled from the head of the
//! FIFO. When the client captures at a rate other than 16 kHz, incoming
//! runs are resampled before buffering.
//!
//! The queue is the only back-pressure point: a producer that outpaces the
//! consumer grows the buffer without bound, so upstream rate must be capped
//! by the operator.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::resample::resample_int16;

pub const TARGET_SAMPLE_RATE: u32 = 16000;

pub const MIN_SENSITIVITY: f32 = 0.1;
pub const MAX_SENSITIVITY: f32 = 10.0;

/// Upper bound on one wait cycle, so `stop` is observed promptly even when
/// no producer signal arrives.
const WAKE_INTERVAL: Duration = Duration::from_millis(300);

#[derive(Default)]
struct QueueState {
    runs: VecDeque<Vec<u8>>,
    /// Invariant: always the sum of lengths of `runs`.
    buffered_len: usize,
    started: bool,
    client_sample_rate: Option<u32>,
    sensitivity: f32,
}

/// Multi-producer, single-consumer chunk buffer.
///
/// All state sits under one mutex; the reader parks on a [`Notify`] with a
/// bounded wait per cycle.
pub struct ChunkQueue {
    chunk_size: usize,
    sample_rate: u32,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl ChunkQueue {
    pub fn new(chunk_size_bytes: usize, sample_rate: u32) -> Self {
        Self {
            chunk_size: chunk_size_bytes,
            sample_rate,
            state: Mutex::new(QueueState {
                sensitivity: 1.0,
                ..QueueState::default()
            }),
            notify: Notify::new(),
        }
    }

    pub fn chunk_size_bytes(&self) -> usize {
        self.chunk_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Clear buffered audio and begin accepting `put` calls.
    pub fn start(&self) {
        let mut state = self.state.lock();
        state.started = true;
        state.runs.clear();
        state.buffered_len = 0;
    }

    /// Stop accepting audio and wake any blocked reader, which then
    /// observes the closed state.
    pub fn stop(&self) {
        self.state.lock().started = false;
        self.notify.notify_waiters();
    }

    /// Declare the browser's actual capture rate (e.g. 48000). When set and
    /// not 16 kHz, every subsequent `put` is resampled before buffering.
    pub fn set_client_sample_rate(&self, rate: Option<u32>) {
        self.state.lock().client_sample_rate = rate;
    }

    /// Append a byte run from the producer. Ignored unless started.
    pub fn put(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let rate_in = self
            .state
            .lock()
            .client_sample_rate
            .unwrap_or(TARGET_SAMPLE_RATE);
        let data = if rate_in != TARGET_SAMPLE_RATE {
            resample_int16(data, rate_in, TARGET_SAMPLE_RATE)
        } else {
            data.to_vec()
        };
        if data.is_empty() {
            return;
        }
        {
            let mut state = self.state.lock();
            if !state.started {
                return;
            }
            state.buffered_len += data.len();
            state.runs.push_back(data);
        }
        self.notify.notify_waiters();
    }

    /// Block until `chunk_size_bytes` are buffered, then return them.
    ///
    /// Returns `None` once the queue is stopped. When `on_level` is given
    /// it is invoked with the RMS of the returned chunk before returning.
    pub async fn read_chunk(&self, on_level: Option<&(dyn Fn(f32) + Send + Sync)>) -> Option<Vec<u8>> {
        loop {
            {
                let mut state = self.state.lock();
                if !state.started {
                    return None;
                }
                if state.buffered_len >= self.chunk_size {
                    let chunk = Self::take_chunk(&mut state, self.chunk_size);
                    if let Some(cb) = on_level {
                        cb(crate::level::chunk_rms_level(&chunk));
                    }
                    return Some(chunk);
                }
            }
            let _ = tokio::time::timeout(WAKE_INTERVAL, self.notify.notified()).await;
        }
    }

    /// Assemble `size` bytes from the head of the FIFO, splitting the last
    /// run when it is only partially consumed.
    fn take_chunk(state: &mut QueueState, size: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(size);
        while out.len() < size {
            let Some(run) = state.runs.pop_front() else {
                break;
            };
            state.buffered_len -= run.len();
            let take = run.len().min(size - out.len());
            out.extend_from_slice(&run[..take]);
            if run.len() > take {
                let remainder = run[take..].to_vec();
                state.buffered_len += remainder.len();
                state.runs.push_front(remainder);
                break;
            }
        }
        out
    }

    pub fn get_sensitivity(&self) -> f32 {
        self.state.lock().sensitivity
    }

    /// Store the capture gain multiplier, clamped to [0.1, 10.0].
    pub fn set_sensitivity(&self, value: f32) {
        self.state.lock().sensitivity = value.clamp(MIN_SENSITIVITY, MAX_SENSITIVITY);
    }

    /// Bytes currently buffered (sum over queued runs).
    pub fn buffered_len(&self) -> usize {
        self.state.lock().buffered_len
    }
}
