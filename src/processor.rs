//! Sequential interpretation of agent replies.
//!
//! A reply is an ordered list of [`GenericMessage`] units. Units are applied
//! strictly one after another: a pause unit holds back everything behind it,
//! and a later reply never starts until the earlier one has drained.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::{GenericMessage, QuickButton};

/// The UI calls a reply can make.
pub trait ChatSurface: Send {
    fn add_response_message(&mut self, text: String);
    fn set_quick_buttons(&mut self, buttons: Vec<QuickButton>);
    fn set_typing(&mut self, typing: bool);
}

/// Reply units held most-recent-first, so popping from the back yields server order.
#[derive(Debug, Default)]
pub struct UnitQueue {
    stack: Vec<GenericMessage>,
}

impl UnitQueue {
    pub fn from_server(mut units: Vec<GenericMessage>) -> Self {
        units.reverse();
        Self { stack: units }
    }

    pub fn pop_next(&mut self) -> Option<GenericMessage> {
        self.stack.pop()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Stored order (most recent first).
    #[cfg(test)]
    pub fn as_stored(&self) -> &[GenericMessage] {
        &self.stack
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    Cancelled,
}

/// Drain `units` into `surface` in server order.
///
/// The token is checked before every unit and raced against pause sleeps;
/// once it fires the remaining units are dropped.
pub async fn process_units<S>(
    units: Vec<GenericMessage>,
    surface: &mut S,
    cancel: &CancellationToken,
) -> ProcessOutcome
where
    S: ChatSurface + ?Sized,
{
    let mut queue = UnitQueue::from_server(units);
    if queue.is_empty() {
        return ProcessOutcome::Completed;
    }
    debug!(units = queue.len(), "draining reply");

    while let Some(unit) = queue.pop_next() {
        if cancel.is_cancelled() {
            debug!(dropped = queue.len() + 1, "reply processing cancelled");
            return ProcessOutcome::Cancelled;
        }
        if apply_unit(unit, surface, cancel).await == ProcessOutcome::Cancelled {
            debug!(dropped = queue.len(), "reply processing cancelled during pause");
            return ProcessOutcome::Cancelled;
        }
    }

    ProcessOutcome::Completed
}

async fn apply_unit<S>(
    unit: GenericMessage,
    surface: &mut S,
    cancel: &CancellationToken,
) -> ProcessOutcome
where
    S: ChatSurface + ?Sized,
{
    debug!(kind = unit.kind(), "applying reply unit");
    match unit {
        GenericMessage::Text(content) => {
            surface.set_typing(false);
            for line in content.into_lines() {
                surface.add_response_message(line);
            }
        }
        GenericMessage::Options(buttons) => {
            surface.set_quick_buttons(buttons);
        }
        GenericMessage::Typing(typing) => {
            surface.set_typing(typing);
        }
        GenericMessage::Pause { time, typing } => {
            surface.set_typing(typing);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(time)) => {}
                _ = cancel.cancelled() => return ProcessOutcome::Cancelled,
            }
        }
        GenericMessage::Unknown(tag) => {
            warn!(response_type = %tag, "skipping unknown reply unit");
        }
    }
    ProcessOutcome::Completed
}

struct RunState {
    generation: u64,
    token: CancellationToken,
}

/// Background worker that runs one reply at a time.
pub struct MessageProcessor {
    tx: mpsc::UnboundedSender<(u64, Vec<GenericMessage>)>,
    state: Arc<Mutex<RunState>>,
    shutdown: CancellationToken,
    worker: JoinHandle<()>,
}

impl MessageProcessor {
    pub fn spawn<S>(mut surface: S) -> Self
    where
        S: ChatSurface + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<(u64, Vec<GenericMessage>)>();
        let shutdown = CancellationToken::new();
        let state = Arc::new(Mutex::new(RunState {
            generation: 0,
            token: shutdown.child_token(),
        }));

        let worker_state = state.clone();
        let worker_shutdown = shutdown.clone();
        let worker = tokio::spawn(async move {
            loop {
                let (generation, units) = tokio::select! {
                    _ = worker_shutdown.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(reply) => reply,
                        None => break,
                    },
                };

                let token = {
                    let mut state = worker_state.lock().unwrap_or_else(PoisonError::into_inner);
                    if generation != state.generation {
                        debug!(units = units.len(), "dropping reply queued before cancellation");
                        continue;
                    }
                    state.token = worker_shutdown.child_token();
                    state.token.clone()
                };

                process_units(units, &mut surface, &token).await;
            }
            debug!("message processor stopped");
        });

        Self {
            tx,
            state,
            shutdown,
            worker,
        }
    }

    /// Queue a reply behind any reply still draining.
    pub fn submit(&self, units: Vec<GenericMessage>) {
        if units.is_empty() {
            return;
        }
        let generation = self.state.lock().unwrap_or_else(PoisonError::into_inner).generation;
        if self.tx.send((generation, units)).is_err() {
            warn!("message processor is gone, dropping reply");
        }
    }

    /// Abort the reply being drained and discard queued ones.
    pub fn cancel_in_flight(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.generation += 1;
        state.token.cancel();
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }
}

impl Drop for MessageProcessor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TextContent;
    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Text(String),
        Buttons(Vec<QuickButton>),
        Typing(bool),
    }

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<(Call, Instant)>>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
        }

        fn timed(&self) -> Vec<(Call, Instant)> {
            self.calls.lock().unwrap().clone()
        }

        fn texts(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Text(t) => Some(t),
                    _ => None,
                })
                .collect()
        }
    }

    impl ChatSurface for Recorder {
        fn add_response_message(&mut self, text: String) {
            self.calls.lock().unwrap().push((Call::Text(text), Instant::now()));
        }

        fn set_quick_buttons(&mut self, buttons: Vec<QuickButton>) {
            self.calls.lock().unwrap().push((Call::Buttons(buttons), Instant::now()));
        }

        fn set_typing(&mut self, typing: bool) {
            self.calls.lock().unwrap().push((Call::Typing(typing), Instant::now()));
        }
    }

    async fn wait_for_texts(recorder: &Recorder, count: usize) {
        for _ in 0..1000 {
            if recorder.texts().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {count} texts, got {:?}", recorder.texts());
    }

    #[test]
    fn test_unit_queue_stores_reversed_and_drains_in_order() {
        let units = vec![
            GenericMessage::text("X"),
            GenericMessage::text("Y"),
            GenericMessage::text("Z"),
        ];
        let mut queue = UnitQueue::from_server(units);
        assert_eq!(
            queue.as_stored(),
            &[
                GenericMessage::text("Z"),
                GenericMessage::text("Y"),
                GenericMessage::text("X"),
            ]
        );

        let mut drained = Vec::new();
        while let Some(unit) = queue.pop_next() {
            drained.push(unit);
        }
        assert_eq!(
            drained,
            vec![
                GenericMessage::text("X"),
                GenericMessage::text("Y"),
                GenericMessage::text("Z"),
            ]
        );
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_delays_following_units() {
        let mut recorder = Recorder::default();
        let cancel = CancellationToken::new();
        let units = vec![
            GenericMessage::text("a"),
            GenericMessage::pause(100, true),
            GenericMessage::text("b"),
        ];

        let outcome = process_units(units, &mut recorder, &cancel).await;
        assert_eq!(outcome, ProcessOutcome::Completed);

        let timed = recorder.timed();
        assert_eq!(
            timed.iter().map(|(c, _)| c.clone()).collect::<Vec<_>>(),
            vec![
                Call::Typing(false),
                Call::Text("a".into()),
                Call::Typing(true),
                Call::Typing(false),
                Call::Text("b".into()),
            ]
        );
        let a_at = timed[1].1;
        let b_at = timed[4].1;
        assert!(b_at.duration_since(a_at) >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_text_lines_append_in_order() {
        let mut recorder = Recorder::default();
        let units = vec![GenericMessage::Text(TextContent::Lines(vec![
            "one".into(),
            "two".into(),
            "three".into(),
        ]))];
        process_units(units, &mut recorder, &CancellationToken::new()).await;
        assert_eq!(recorder.texts(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_empty_sequence_touches_nothing() {
        let mut recorder = Recorder::default();
        let outcome = process_units(Vec::new(), &mut recorder, &CancellationToken::new()).await;
        assert_eq!(outcome, ProcessOutcome::Completed);
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_options_replace_buttons_and_unknown_is_skipped() {
        let mut recorder = Recorder::default();
        let units = vec![
            GenericMessage::Unknown("carousel".into()),
            GenericMessage::Options(vec![
                QuickButton::new("Yes", "yes"),
                QuickButton::new("No", "no"),
            ]),
            GenericMessage::Typing(true),
        ];
        process_units(units, &mut recorder, &CancellationToken::new()).await;
        assert_eq!(
            recorder.calls(),
            vec![
                Call::Buttons(vec![
                    QuickButton::new("Yes", "yes"),
                    QuickButton::new("No", "no"),
                ]),
                Call::Typing(true),
            ]
        );
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_first_unit() {
        let mut recorder = Recorder::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = process_units(vec![GenericMessage::text("a")], &mut recorder, &cancel).await;
        assert_eq!(outcome, ProcessOutcome::Cancelled);
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_serializes_replies() {
        let recorder = Recorder::default();
        let processor = MessageProcessor::spawn(recorder.clone());

        processor.submit(vec![
            GenericMessage::text("a"),
            GenericMessage::pause(500, true),
            GenericMessage::text("b"),
        ]);
        processor.submit(vec![GenericMessage::text("c")]);

        wait_for_texts(&recorder, 3).await;
        assert_eq!(recorder.texts(), vec!["a", "b", "c"]);
        processor.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_in_flight_drops_rest_of_reply_and_queue() {
        let recorder = Recorder::default();
        let processor = MessageProcessor::spawn(recorder.clone());

        processor.submit(vec![
            GenericMessage::text("a"),
            GenericMessage::pause(1000, true),
            GenericMessage::text("b"),
        ]);
        processor.submit(vec![GenericMessage::text("queued")]);

        wait_for_texts(&recorder, 1).await;
        processor.cancel_in_flight();
        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(recorder.texts(), vec!["a"]);

        processor.submit(vec![GenericMessage::text("after")]);
        wait_for_texts(&recorder, 2).await;
        assert_eq!(recorder.texts(), vec!["a", "after"]);
        processor.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_worker() {
        let recorder = Recorder::default();
        let processor = MessageProcessor::spawn(recorder.clone());
        processor.submit(vec![GenericMessage::pause(10_000, true), GenericMessage::text("late")]);
        tokio::time::sleep(Duration::from_millis(10)).await;

        processor.shutdown();
        for _ in 0..100 {
            if !processor.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!processor.is_running());
        assert!(recorder.texts().is_empty());
    }
}
