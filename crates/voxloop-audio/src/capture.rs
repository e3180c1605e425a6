use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;
use voxloop_core::{AudioError, EncodedAudioChunk};

use crate::pcm;

/// Microphone capture is always mono; the wire format has no other shape.
const CAPTURE_CHANNELS: u16 = 1;

// ── Frame re-blocking ─────────────────────────────────────────

/// Append `data` to `pending` and emit every complete `frame_size` run.
/// Devices do not always honor the requested buffer size, so frame
/// boundaries must not depend on the callback's actual length.
fn reblock(pending: &mut Vec<f32>, data: &[f32], frame_size: usize, emit: &mut dyn FnMut(&[f32])) {
    pending.extend_from_slice(data);
    let mut offset = 0;
    while pending.len() - offset >= frame_size {
        emit(&pending[offset..offset + frame_size]);
        offset += frame_size;
    }
    if offset > 0 {
        pending.drain(..offset);
    }
}

// ── CaptureNode ───────────────────────────────────────────────

/// Owns the input stream; capture stops when the node is dropped.
pub struct CaptureNode {
    _stream: Stream,
}

impl CaptureNode {
    pub fn new(
        device: &Device,
        sample_rate: u32,
        frame_size: usize,
        tap: mpsc::UnboundedSender<EncodedAudioChunk>,
    ) -> Result<Self, AudioError> {
        let config = StreamConfig {
            channels: CAPTURE_CHANNELS,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Fixed(frame_size as u32),
        };

        let err_callback = move |err: cpal::StreamError| {
            tracing::error!("capture stream error: {}", err);
        };

        let mut pending: Vec<f32> = Vec::with_capacity(frame_size * 2);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    reblock(&mut pending, data, frame_size, &mut |frame| {
                        let chunk = EncodedAudioChunk {
                            data: pcm::encode_frame(frame),
                            sample_rate,
                            channels: CAPTURE_CHANNELS,
                        };
                        // Receiver gone means the session is tearing down
                        let _ = tap.send(chunk);
                    });
                },
                err_callback,
                None,
            )
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        Ok(Self { _stream: stream })
    }
}
