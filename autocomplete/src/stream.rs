use crate::error::Result;
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use log::debug;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

pub type ChunkStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// One in-flight model generation: the prompt prefix it was started for,
/// everything produced so far, and the listeners being fanned out to.
struct ActiveGeneration {
    prefix: String,
    produced: Arc<Mutex<String>>,
    listeners: Arc<Mutex<Vec<mpsc::UnboundedSender<String>>>>,
    finished: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl ActiveGeneration {
    fn new(prefix: String) -> Self {
        Self {
            prefix,
            produced: Arc::new(Mutex::new(String::new())),
            listeners: Arc::new(Mutex::new(Vec::new())),
            finished: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Fan a chunk out to every listener, dropping the ones whose receivers
/// are gone. Removal happens via `retain`, so it is safe against
/// listeners disappearing mid-iteration.
fn fan_out(listeners: &Mutex<Vec<mpsc::UnboundedSender<String>>>, chunk: &str) {
    lock(listeners).retain(|listener| listener.send(chunk.to_string()).is_ok());
}

/// Reuses a pending generation when the user keeps typing exactly what the
/// model is already producing; otherwise cancels it and starts fresh.
#[derive(Default)]
pub struct GeneratorReuseManager {
    current: tokio::sync::Mutex<Option<ActiveGeneration>>,
}

impl GeneratorReuseManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a chunk stream for `prefix`. The prior generation is reused when
    /// its `prefix + produced` still starts with the new prefix and the new
    /// prefix is at least as long as the old one; chars the user has typed
    /// since are skipped. Otherwise the prior generation is cancelled and
    /// `start` is invoked for a fresh model stream.
    pub async fn get_generator(
        &self,
        prefix: &str,
        start: impl FnOnce() -> BoxFuture<'static, Result<ChunkStream>>,
    ) -> Result<ChunkStream> {
        let mut current = self.current.lock().await;

        if let Some(generation) = current.as_ref() {
            let produced = lock(&generation.produced).clone();
            let combined = format!("{}{}", generation.prefix, produced);
            let reusable = !generation.cancel.is_cancelled()
                && prefix.len() >= generation.prefix.len()
                && combined.starts_with(prefix);

            if reusable {
                debug!("Reusing pending generation ({} chars produced)", produced.len());
                let typed_since = prefix.len() - generation.prefix.len();

                // Hold the produced lock across registration so the pump
                // cannot slip a chunk between the backlog snapshot and the
                // listener becoming visible.
                let produced_guard = lock(&generation.produced);
                let backlog = produced_guard.get(typed_since..).unwrap_or("").to_string();
                let (tx, rx) = mpsc::unbounded_channel();
                if !backlog.is_empty() {
                    let _ = tx.send(backlog);
                }
                if !generation.finished.load(Ordering::SeqCst) {
                    lock(&generation.listeners).push(tx);
                }
                drop(produced_guard);
                return Ok(Box::pin(UnboundedReceiverStream::new(rx)));
            }

            generation.cancel.cancel();
        }

        let generation = ActiveGeneration::new(prefix.to_string());
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&generation.listeners).push(tx);

        let mut inner = start().await?;
        let produced = generation.produced.clone();
        let listeners = generation.listeners.clone();
        let finished = generation.finished.clone();
        let cancel = generation.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    chunk = inner.next() => {
                        let Some(chunk) = chunk else { break };
                        // Same lock spans append and fan-out; see the
                        // reuse path for why.
                        let mut produced_guard = lock(&produced);
                        produced_guard.push_str(&chunk);
                        fan_out(&listeners, &chunk);
                        drop(produced_guard);
                    }
                }
            }
            finished.store(true, Ordering::SeqCst);
            lock(&listeners).clear();
        });

        *current = Some(generation);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}
