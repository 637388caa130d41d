use log::info;
use sidekick_protocol::CompletionOutcome;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A displayed completion is rejected unless accepted within this window.
const REJECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Two displays within this window whose first lines extend one another
/// represent the same user intention.
const SUPERSEDE_WINDOW: Duration = Duration::from_millis(500);

/// Outcome notification delivered to the owner (telemetry, bracket state).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcomeEvent {
    pub completion_id: String,
    pub filepath: String,
    pub text: String,
    pub outcome: CompletionOutcome,
}

struct PendingCompletion {
    filepath: String,
    text: String,
    displayed_at: Instant,
    rejection_timer: CancellationToken,
}

type OutcomeSink = Arc<dyn Fn(CompletionOutcomeEvent) + Send + Sync>;

/// Tracks the displayed → accepted | rejected lifecycle. Each completion
/// transitions at most once to displayed, then at most once to a terminal
/// outcome; rejection fires from a 10 s timer unless acceptance wins.
pub struct CompletionLogger {
    pending: Arc<Mutex<HashMap<String, PendingCompletion>>>,
    last_displayed: Mutex<Option<(String, Instant)>>,
    sink: OutcomeSink,
}

impl CompletionLogger {
    pub fn new(sink: OutcomeSink) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            last_displayed: Mutex::new(None),
            sink,
        }
    }

    /// Record a displayed completion and start its rejection timer.
    pub fn displayed(&self, completion_id: &str, filepath: &str, text: &str) {
        let now = Instant::now();

        // A rapid re-display that extends (or shortens) the prior first
        // line is the same user intention; silence the prior timer instead
        // of logging a rejection.
        let superseded = {
            let mut last = lock(&self.last_displayed);
            let prior = last.replace((completion_id.to_string(), now));
            prior.and_then(|(prior_id, at)| {
                (now.duration_since(at) < SUPERSEDE_WINDOW).then_some(prior_id)
            })
        };
        if let Some(prior_id) = superseded {
            let prior_first = self.first_line_of(&prior_id);
            let new_first = first_line(text).to_string();
            if let Some(prior_first) = prior_first {
                if prior_first.starts_with(&new_first) || new_first.starts_with(&prior_first) {
                    self.drop_silently(&prior_id);
                }
            }
        }

        let timer = CancellationToken::new();
        lock(&self.pending).insert(
            completion_id.to_string(),
            PendingCompletion {
                filepath: filepath.to_string(),
                text: text.to_string(),
                displayed_at: now,
                rejection_timer: timer.clone(),
            },
        );

        let pending = self.pending.clone();
        let sink = self.sink.clone();
        let id = completion_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(REJECTION_TIMEOUT) => {
                    let entry = lock(&pending).remove(&id);
                    if let Some(entry) = entry {
                        info!("Completion {id} rejected by timeout");
                        sink(CompletionOutcomeEvent {
                            completion_id: id,
                            filepath: entry.filepath,
                            text: entry.text,
                            outcome: CompletionOutcome::Rejected,
                        });
                    }
                }
            }
        });
    }

    /// Mark a completion accepted; returns its text and file for the
    /// bracket service.
    pub fn accept(&self, completion_id: &str) -> Option<(String, String)> {
        let entry = lock(&self.pending).remove(completion_id)?;
        entry.rejection_timer.cancel();
        info!(
            "Completion {completion_id} accepted after {:?}",
            entry.displayed_at.elapsed()
        );
        (self.sink)(CompletionOutcomeEvent {
            completion_id: completion_id.to_string(),
            filepath: entry.filepath.clone(),
            text: entry.text.clone(),
            outcome: CompletionOutcome::Accepted,
        });
        Some((entry.filepath, entry.text))
    }

    fn first_line_of(&self, completion_id: &str) -> Option<String> {
        lock(&self.pending)
            .get(completion_id)
            .map(|entry| first_line(&entry.text).to_string())
    }

    /// Remove without emitting an outcome.
    fn drop_silently(&self, completion_id: &str) {
        if let Some(entry) = lock(&self.pending).remove(completion_id) {
            entry.rejection_timer.cancel();
        }
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

fn first_line(text: &str) -> &str {
    text.split('\n').next().unwrap_or("")
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
