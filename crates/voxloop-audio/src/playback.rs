use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use voxloop_core::AudioError;

use crate::pcm::DecodedBuffer;

/// Model speech is mono; the output stream is opened with one channel.
const PLAYBACK_CHANNELS: u16 = 1;

// ── RenderState ───────────────────────────────────────────────

struct ScheduledSource {
    start_sample: u64,
    samples: Vec<f32>,
}

/// The set of scheduled sources, shared between the control side and
/// the output callback.
struct RenderState {
    sources: Vec<ScheduledSource>,
}

impl RenderState {
    /// Mix every source overlapping [cursor, cursor + out.len()) into
    /// `out`, then drop sources the block has fully played past.
    fn render(&mut self, cursor: u64, out: &mut [f32]) {
        out.fill(0.0);
        let block_end = cursor + out.len() as u64;
        for source in &self.sources {
            let start = source.start_sample;
            let end = start + source.samples.len() as u64;
            let begin = start.max(cursor);
            let stop = end.min(block_end);
            for t in begin..stop {
                out[(t - cursor) as usize] += source.samples[(t - start) as usize];
            }
        }
        self.sources
            .retain(|s| s.start_sample + s.samples.len() as u64 > block_end);
    }
}

// ── RenderHandle ──────────────────────────────────────────────

/// Callback-side view of the scheduler: renders blocks and advances
/// the playback clock.
pub struct RenderHandle {
    state: Arc<Mutex<RenderState>>,
    samples_played: Arc<AtomicU64>,
}

impl RenderHandle {
    pub fn render(&self, out: &mut [f32]) {
        let cursor = self.samples_played.load(Ordering::Relaxed);
        if let Ok(mut state) = self.state.lock() {
            state.render(cursor, out);
        } else {
            // Mutex poisoned — fill with silence
            out.fill(0.0);
        }
        self.samples_played
            .store(cursor + out.len() as u64, Ordering::Relaxed);
    }
}

// ── PlaybackScheduler ─────────────────────────────────────────

/// Control-side scheduler. Buffers are placed back to back on the
/// playback clock so consecutive chunks play without gaps; an
/// interrupt clears everything and lets the next buffer start at the
/// current clock position.
pub struct PlaybackScheduler {
    state: Arc<Mutex<RenderState>>,
    samples_played: Arc<AtomicU64>,
    sample_rate: u32,
    next_start_time: f64,
}

impl PlaybackScheduler {
    /// Build a scheduler with no output device attached. The returned
    /// handle stands in for the audio callback.
    pub fn detached(sample_rate: u32) -> (Self, RenderHandle) {
        let state = Arc::new(Mutex::new(RenderState {
            sources: Vec::new(),
        }));
        let samples_played = Arc::new(AtomicU64::new(0));
        let handle = RenderHandle {
            state: Arc::clone(&state),
            samples_played: Arc::clone(&samples_played),
        };
        let scheduler = Self {
            state,
            samples_played,
            sample_rate,
            next_start_time: 0.0,
        };
        (scheduler, handle)
    }

    /// Seconds of audio the output stream has consumed.
    pub fn now(&self) -> f64 {
        self.samples_played.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    /// Schedule `buffer` at `max(next_start_time, now)` and return the
    /// chosen start time.
    pub fn enqueue(&mut self, buffer: DecodedBuffer) -> f64 {
        if buffer.sample_rate != self.sample_rate {
            tracing::warn!(
                "buffer sample rate {} does not match output rate {}",
                buffer.sample_rate,
                self.sample_rate
            );
        }

        let start = self.next_start_time.max(self.now());
        let duration = buffer.samples.len() as f64 / self.sample_rate as f64;
        let start_sample = (start * self.sample_rate as f64).round() as u64;

        if let Ok(mut state) = self.state.lock() {
            state.sources.push(ScheduledSource {
                start_sample,
                samples: buffer.samples,
            });
        }

        self.next_start_time = start + duration;
        start
    }

    /// Stop playback immediately: drop every scheduled source and reset
    /// the schedule so the next buffer starts at the current clock.
    pub fn interrupt(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.sources.clear();
        }
        self.next_start_time = 0.0;
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn active_sources(&self) -> usize {
        self.state.lock().map(|s| s.sources.len()).unwrap_or(0)
    }
}

// ── OutputNode ────────────────────────────────────────────────

/// Owns the output stream; playback stops when the node is dropped.
pub struct OutputNode {
    _stream: Stream,
}

impl OutputNode {
    pub fn new(device: &Device, sample_rate: u32) -> Result<(Self, PlaybackScheduler), AudioError> {
        let (scheduler, handle) = PlaybackScheduler::detached(sample_rate);

        let config = StreamConfig {
            channels: PLAYBACK_CHANNELS,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = move |err: cpal::StreamError| {
            tracing::error!("playback stream error: {}", err);
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    handle.render(data);
                },
                err_callback,
                None,
            )
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        Ok((Self { _stream: stream }, scheduler))
    }
}
