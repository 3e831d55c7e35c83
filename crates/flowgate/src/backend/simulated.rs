//! Demo backend used when no assistant is configured.
//!
//! Streams a fixed reply that quotes the user's text one character at a
//! time, then finishes the turn. It never fails.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use super::{AssistantBackend, BackendEvent, BackendOptions, BackendResult, BackendSession};

/// Delays of the simulated stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationTiming {
    /// Pause before the first chunk.
    pub warmup: Duration,
    /// Pause after every chunk.
    pub char_delay: Duration,
    /// Extra pause before `TaskFinish`.
    pub trailing: Duration,
}

impl Default for SimulationTiming {
    fn default() -> Self {
        Self {
            warmup: Duration::from_millis(500),
            char_delay: Duration::from_millis(20),
            trailing: Duration::from_millis(300),
        }
    }
}

impl SimulationTiming {
    /// No delays at all.
    pub fn instant() -> Self {
        Self {
            warmup: Duration::ZERO,
            char_delay: Duration::ZERO,
            trailing: Duration::ZERO,
        }
    }
}

/// The reply the simulation streams for `message`.
pub fn simulated_reply(message: &str) -> String {
    format!(
        "This is a simulated response. You said: '{message}'.\n\n\
         The assistant backend is not configured, so the gateway is running in demo mode. \
         Configure a backend to enable the full assistant."
    )
}

/// Backend that fakes an assistant.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBackend {
    timing: SimulationTiming,
}

impl SimulatedBackend {
    pub fn new(timing: SimulationTiming) -> Self {
        Self { timing }
    }
}

#[async_trait]
impl AssistantBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn open_session(&self, options: BackendOptions) -> BackendResult<Box<dyn BackendSession>> {
        debug!(
            "Opening simulated session (options ignored: {:?})",
            options.permission_mode
        );
        Ok(Box::new(SimulatedSession::new(self.timing)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No message submitted yet.
    Idle,
    /// Waiting out the warm-up before the first chunk.
    Warmup,
    /// Emitting characters.
    Streaming,
    /// `TaskFinish` has been emitted.
    Finished,
}

struct SimulatedSession {
    timing: SimulationTiming,
    phase: Phase,
    pending: VecDeque<char>,
    emitted: usize,
}

impl SimulatedSession {
    fn new(timing: SimulationTiming) -> Self {
        Self {
            timing,
            phase: Phase::Idle,
            pending: VecDeque::new(),
            emitted: 0,
        }
    }
}

#[async_trait]
impl BackendSession for SimulatedSession {
    async fn send_message(&mut self, text: &str) -> BackendResult<()> {
        self.pending = simulated_reply(text).chars().collect();
        self.emitted = 0;
        self.phase = Phase::Warmup;
        Ok(())
    }

    async fn next_event(&mut self) -> BackendResult<Option<BackendEvent>> {
        if self.phase == Phase::Warmup {
            tokio::time::sleep(self.timing.warmup).await;
            self.phase = Phase::Streaming;
        }

        if self.phase != Phase::Streaming {
            return Ok(None);
        }

        // The previous chunk's pause is taken lazily so a caller that stops
        // reading does not wait for it.
        if self.emitted > 0 {
            tokio::time::sleep(self.timing.char_delay).await;
        }

        if let Some(ch) = self.pending.pop_front() {
            self.emitted += 1;
            return Ok(Some(BackendEvent::AssistantChunk {
                text: ch.to_string(),
            }));
        }

        tokio::time::sleep(self.timing.trailing).await;
        self.phase = Phase::Finished;
        Ok(Some(BackendEvent::TaskFinish))
    }

    async fn close(&mut self) -> BackendResult<()> {
        self.pending.clear();
        self.phase = Phase::Finished;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgate_protocol::SessionConfig;
    use tokio::time::Instant;

    async fn drain(session: &mut dyn BackendSession) -> Vec<BackendEvent> {
        let mut events = Vec::new();
        while let Some(event) = session.next_event().await.unwrap() {
            events.push(event);
        }
        events
    }

    fn options() -> BackendOptions {
        BackendOptions::from(&SessionConfig::default())
    }

    #[test]
    fn test_reply_quotes_message() {
        let reply = simulated_reply("hi there");
        assert!(reply.contains("'hi there'"));
        assert!(simulated_reply("").contains("''"));
    }

    #[tokio::test]
    async fn test_streams_reply_char_by_char_then_finishes() {
        let backend = SimulatedBackend::new(SimulationTiming::instant());
        let mut session = backend.open_session(options()).await.unwrap();
        session.send_message("héllo").await.unwrap();

        let events = drain(session.as_mut()).await;
        let expected = simulated_reply("héllo");

        assert_eq!(events.len(), expected.chars().count() + 1);
        assert_eq!(events.last(), Some(&BackendEvent::TaskFinish));

        let text: String = events
            .iter()
            .filter_map(|event| match event {
                BackendEvent::AssistantChunk { text } => {
                    assert_eq!(text.chars().count(), 1);
                    Some(text.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(text, expected);
    }

    #[tokio::test]
    async fn test_no_message_means_no_events() {
        let backend = SimulatedBackend::default();
        let mut session = backend.open_session(options()).await.unwrap();
        assert!(session.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_stops_stream() {
        let backend = SimulatedBackend::new(SimulationTiming::instant());
        let mut session = backend.open_session(options()).await.unwrap();
        session.send_message("x").await.unwrap();
        assert!(session.next_event().await.unwrap().is_some());

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(session.next_event().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_timing() {
        let timing = SimulationTiming::default();
        let backend = SimulatedBackend::new(timing);
        let mut session = backend.open_session(options()).await.unwrap();
        session.send_message("ok").await.unwrap();

        let start = Instant::now();
        let first = session.next_event().await.unwrap();
        assert!(matches!(first, Some(BackendEvent::AssistantChunk { .. })));
        assert_elapsed(start, timing.warmup);

        let events = drain(session.as_mut()).await;
        let chars = simulated_reply("ok").chars().count() as u32;
        let expected = timing.warmup + timing.char_delay * chars + timing.trailing;
        assert_eq!(events.len() as u32, chars);
        assert_elapsed(start, expected);
    }

    fn assert_elapsed(start: Instant, expected: std::time::Duration) {
        let elapsed = start.elapsed();
        assert!(elapsed >= expected, "{elapsed:?} < {expected:?}");
        assert!(
            elapsed < expected + std::time::Duration::from_millis(5),
            "{elapsed:?} >> {expected:?}"
        );
    }
}
