use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use std::sync::Arc;
use voxloop_audio::{decode_chunk, device, CaptureNode, OutputNode, PlaybackScheduler};
use voxloop_core::config::AppConfig;
use voxloop_core::{InboundEvent, SessionError, SessionState};
use voxloop_transport::{LiveSender, LiveSession};

use crate::history::HistorySink;
use crate::transcript::TurnAccumulator;

#[derive(Debug)]
enum EventOutcome {
    Continue,
    Finished,
    Failed(SessionError),
}

// ── SessionController ─────────────────────────────────────────

/// Drives one conversation: connects the transport, arms the
/// microphone once the session is established, routes inbound events
/// to playback and transcripts, and tears everything down at the end.
pub struct SessionController {
    config: AppConfig,
    history: Arc<dyn HistorySink>,
    state: SessionState,
    accumulator: TurnAccumulator,
    capture: Option<CaptureNode>,
    output: Option<OutputNode>,
    scheduler: Option<PlaybackScheduler>,
    session: Option<LiveSession>,
    wire_task: Option<JoinHandle<()>>,
}

impl SessionController {
    pub fn new(config: AppConfig, history: Arc<dyn HistorySink>) -> Self {
        Self {
            config,
            history,
            state: SessionState::Idle,
            accumulator: TurnAccumulator::new(),
            capture: None,
            output: None,
            scheduler: None,
            session: None,
            wire_task: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run a conversation until the remote closes, an error occurs, or
    /// a stop signal arrives. Cleanup runs on every exit path; the
    /// final state is `Stopped` or `Error`. A later call starts over
    /// from `Connecting` regardless of how the last run ended.
    pub async fn run(
        &mut self,
        stop_rx: &mut mpsc::UnboundedReceiver<()>,
    ) -> Result<SessionState, SessionError> {
        self.state = SessionState::Connecting;
        tracing::info!("connecting");

        let outcome = self.drive(stop_rx).await;
        self.state = match outcome {
            Ok(()) => SessionState::Stopped,
            Err(_) => SessionState::Error,
        };
        self.teardown().await;
        tracing::info!(state = ?self.state, "session over");
        outcome.map(|_| self.state)
    }

    async fn drive(
        &mut self,
        stop_rx: &mut mpsc::UnboundedReceiver<()>,
    ) -> Result<(), SessionError> {
        let live = self
            .config
            .live
            .clone()
            .ok_or_else(|| SessionError::Connect("no [live] section in config".to_string()))?;

        // The speaker opens first: model audio can arrive right after
        // establishment, before the microphone is armed
        let output_device = device::output_device(&self.config.audio.output_device)?;
        let (output, scheduler) =
            OutputNode::new(&output_device, self.config.audio.playback_sample_rate)?;
        self.output = Some(output);
        self.scheduler = Some(scheduler);

        let mut session = LiveSession::open(live);
        let mut events = session
            .take_events()
            .ok_or_else(|| SessionError::Connect("event stream already taken".to_string()))?;
        self.session = Some(session);

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => match self.handle_event(event).await {
                            EventOutcome::Continue => {}
                            EventOutcome::Finished => return Ok(()),
                            EventOutcome::Failed(e) => return Err(e),
                        },
                        None => return Ok(()),
                    }
                }
                signal = stop_rx.recv() => {
                    // A closed channel counts as a stop: no handle is
                    // left that could request one later
                    match signal {
                        Some(()) => tracing::info!("stop requested"),
                        None => tracing::info!("stop channel closed"),
                    }
                    return Ok(());
                }
            }
        }
    }

    async fn handle_event(&mut self, event: InboundEvent) -> EventOutcome {
        match event {
            InboundEvent::Opened => {
                let sender = match self.session.as_ref() {
                    Some(session) => session.sender(),
                    None => {
                        return EventOutcome::Failed(SessionError::Connect(
                            "established without a session".to_string(),
                        ))
                    }
                };
                match self.arm_capture(sender) {
                    Ok(()) => {
                        self.state = SessionState::Active;
                        tracing::info!("session active, microphone live");
                        EventOutcome::Continue
                    }
                    Err(e) => EventOutcome::Failed(SessionError::Device(e)),
                }
            }
            InboundEvent::AudioChunk(data) => {
                match decode_chunk(&data, self.config.audio.playback_sample_rate) {
                    Ok(buffer) => {
                        if let Some(scheduler) = self.scheduler.as_mut() {
                            let start = scheduler.enqueue(buffer);
                            tracing::trace!(start, "scheduled model audio");
                        }
                    }
                    Err(e) => {
                        tracing::warn!("skipping malformed audio chunk: {}", e);
                    }
                }
                EventOutcome::Continue
            }
            InboundEvent::Interrupted => {
                if let Some(scheduler) = self.scheduler.as_mut() {
                    scheduler.interrupt();
                }
                tracing::debug!("barge-in, playback flushed");
                EventOutcome::Continue
            }
            InboundEvent::PartialInputTranscript(text) => {
                tracing::debug!(%text, "user transcript delta");
                self.accumulator.push_input(&text);
                EventOutcome::Continue
            }
            InboundEvent::PartialOutputTranscript(text) => {
                tracing::debug!(%text, "model transcript delta");
                self.accumulator.push_output(&text);
                EventOutcome::Continue
            }
            InboundEvent::TurnComplete => {
                if let Some(record) = self.accumulator.complete() {
                    tracing::info!(user = %record.user, model = %record.model, "turn complete");
                    if let Err(e) = self.history.append(&record).await {
                        // The conversation can go on without its log
                        tracing::error!("history append failed: {}", e);
                    }
                }
                EventOutcome::Continue
            }
            InboundEvent::Error(message) => {
                let error = if self.state == SessionState::Connecting {
                    SessionError::Connect(message)
                } else {
                    SessionError::Transport(message)
                };
                EventOutcome::Failed(error)
            }
            InboundEvent::Closed => EventOutcome::Finished,
        }
    }

    /// Acquire the microphone and wire captured frames into the
    /// transport. Called once, on establishment.
    fn arm_capture(&mut self, sender: LiveSender) -> Result<(), voxloop_core::AudioError> {
        let input = device::input_device(&self.config.audio.input_device)?;
        let (tap_tx, mut tap_rx) = mpsc::unbounded_channel();
        let capture = CaptureNode::new(
            &input,
            self.config.audio.capture_sample_rate,
            self.config.audio.frame_size as usize,
            tap_tx,
        )?;
        self.capture = Some(capture);

        // Frames flow mic → transport until the tap closes
        self.wire_task = Some(tokio::spawn(async move {
            while let Some(chunk) = tap_rx.recv().await {
                sender.send_audio(chunk);
            }
        }));
        Ok(())
    }

    /// Release everything a run holds. Steps are isolated so one
    /// failure cannot block the others, and running it again is a
    /// no-op.
    pub async fn teardown(&mut self) {
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.interrupt();
        }
        // A turn cut off mid-stream is dropped; the next run starts
        // with empty accumulators
        let _ = self.accumulator.complete();
        // Dropping the capture node releases the microphone and stops
        // the input clock
        self.capture = None;
        if let Some(task) = self.wire_task.take() {
            task.abort();
        }
        // Dropping the output node stops the playback clock
        self.output = None;
        self.scheduler = None;
        if let Some(mut session) = self.session.take() {
            session.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;
    use voxloop_audio::encode_frame;

    fn test_controller() -> (SessionController, Arc<MemoryHistory>) {
        let history = Arc::new(MemoryHistory::new());
        let config = AppConfig::from_toml_str("").unwrap();
        let controller = SessionController::new(config, Arc::clone(&history) as Arc<dyn HistorySink>);
        (controller, history)
    }

    /// Give the controller a scheduler with no device behind it.
    fn with_detached_scheduler(controller: &mut SessionController) {
        let (scheduler, _handle) = PlaybackScheduler::detached(24000);
        controller.scheduler = Some(scheduler);
    }

    #[test]
    fn test_new_controller_is_idle() {
        let (controller, _) = test_controller();
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_teardown_twice_is_idempotent() {
        let (mut controller, _) = test_controller();
        with_detached_scheduler(&mut controller);

        controller.teardown().await;
        controller.teardown().await;
        assert!(controller.scheduler.is_none());
        assert!(controller.session.is_none());
        assert!(controller.capture.is_none());
    }

    #[tokio::test]
    async fn test_teardown_drops_partial_transcript() {
        let (mut controller, history) = test_controller();

        controller
            .handle_event(InboundEvent::PartialInputTranscript("stale ".to_string()))
            .await;
        controller.teardown().await;

        // The next run's first turn carries only its own text
        controller
            .handle_event(InboundEvent::PartialInputTranscript("hello".to_string()))
            .await;
        controller.handle_event(InboundEvent::TurnComplete).await;

        let turns = history.turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].user, "hello");
    }

    #[tokio::test]
    async fn test_transcript_events_build_turn_record() {
        let (mut controller, history) = test_controller();

        controller
            .handle_event(InboundEvent::PartialInputTranscript("turn ".to_string()))
            .await;
        controller
            .handle_event(InboundEvent::PartialInputTranscript("it up".to_string()))
            .await;
        controller
            .handle_event(InboundEvent::PartialOutputTranscript("sure".to_string()))
            .await;
        controller.handle_event(InboundEvent::TurnComplete).await;

        let turns = history.turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].user, "turn it up");
        assert_eq!(turns[0].model, "sure");
    }

    #[tokio::test]
    async fn test_empty_turn_writes_no_record() {
        let (mut controller, history) = test_controller();
        controller.handle_event(InboundEvent::TurnComplete).await;
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_trailing_text_lands_in_same_turn() {
        // A message can carry its last transcript delta together with
        // the turn boundary; the delta is routed first
        let (mut controller, history) = test_controller();

        controller
            .handle_event(InboundEvent::PartialOutputTranscript(" bye".to_string()))
            .await;
        controller.handle_event(InboundEvent::TurnComplete).await;

        let turns = history.turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].model, " bye");
    }

    #[tokio::test]
    async fn test_audio_chunk_is_decoded_and_scheduled() {
        let (mut controller, _) = test_controller();
        with_detached_scheduler(&mut controller);

        // One second of silence at the playback rate
        let chunk = encode_frame(&vec![0.0f32; 24000]);
        let outcome = controller
            .handle_event(InboundEvent::AudioChunk(chunk))
            .await;
        assert!(matches!(outcome, EventOutcome::Continue));

        let scheduler = controller.scheduler.as_ref().unwrap();
        assert_eq!(scheduler.active_sources(), 1);
        assert_eq!(scheduler.next_start_time(), 1.0);
    }

    #[tokio::test]
    async fn test_malformed_audio_chunk_is_skipped() {
        let (mut controller, _) = test_controller();
        with_detached_scheduler(&mut controller);

        let outcome = controller
            .handle_event(InboundEvent::AudioChunk(vec![1, 2, 3]))
            .await;
        // Recoverable: the session keeps running
        assert!(matches!(outcome, EventOutcome::Continue));
        assert_eq!(controller.scheduler.as_ref().unwrap().active_sources(), 0);
    }

    #[tokio::test]
    async fn test_interrupted_flushes_playback() {
        let (mut controller, _) = test_controller();
        with_detached_scheduler(&mut controller);

        let chunk = encode_frame(&vec![0.0f32; 24000]);
        controller
            .handle_event(InboundEvent::AudioChunk(chunk))
            .await;
        controller.handle_event(InboundEvent::Interrupted).await;

        let scheduler = controller.scheduler.as_ref().unwrap();
        assert_eq!(scheduler.active_sources(), 0);
        assert_eq!(scheduler.next_start_time(), 0.0);
    }

    #[tokio::test]
    async fn test_error_while_connecting_maps_to_connect() {
        let (mut controller, _) = test_controller();
        controller.state = SessionState::Connecting;

        let outcome = controller
            .handle_event(InboundEvent::Error("refused".to_string()))
            .await;
        assert!(matches!(
            outcome,
            EventOutcome::Failed(SessionError::Connect(_))
        ));
    }

    #[tokio::test]
    async fn test_error_while_active_maps_to_transport() {
        let (mut controller, _) = test_controller();
        controller.state = SessionState::Active;

        let outcome = controller
            .handle_event(InboundEvent::Error("reset".to_string()))
            .await;
        assert!(matches!(
            outcome,
            EventOutcome::Failed(SessionError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_finishes_the_run() {
        let (mut controller, _) = test_controller();
        let outcome = controller.handle_event(InboundEvent::Closed).await;
        assert!(matches!(outcome, EventOutcome::Finished));
    }

    #[tokio::test]
    async fn test_run_without_live_config_fails_into_error_state() {
        let (mut controller, _) = test_controller();
        let (_stop_tx, mut stop_rx) = mpsc::unbounded_channel();

        let result = controller.run(&mut stop_rx).await;
        assert!(matches!(result, Err(SessionError::Connect(_))));
        assert_eq!(controller.state(), SessionState::Error);
    }
}
