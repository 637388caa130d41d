use async_trait::async_trait;
use log::{debug, info, warn};
use sidekick_autocomplete::{AbortRegistry, CompletionProvider};
use sidekick_codebase_indexer::{CodebaseIndexer, IndexError};
use sidekick_protocol::{
    InboundMessage, IndexingStatus, Message, OutboundMessage, ProgressUpdate,
};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Malformed message payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Indexing error: {0}")]
    Index(#[from] IndexError),

    #[error("Autocomplete error: {0}")]
    Autocomplete(#[from] sidekick_autocomplete::AutocompleteError),
}

/// Outbound side of the messenger; the transport implements this.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, message: OutboundMessage);
}

/// Dispatches inbound IDE messages to the indexing and completion
/// engines.
pub struct CoreService {
    indexer: Arc<CodebaseIndexer>,
    completions: Arc<CompletionProvider>,
    abort: Arc<AbortRegistry>,
    messenger: Arc<dyn Messenger>,
    workspace_dirs: Vec<String>,
    active_refresh: Mutex<Option<CancellationToken>>,
}

impl CoreService {
    pub fn new(
        indexer: Arc<CodebaseIndexer>,
        completions: Arc<CompletionProvider>,
        abort: Arc<AbortRegistry>,
        messenger: Arc<dyn Messenger>,
        workspace_dirs: Vec<String>,
    ) -> Self {
        Self {
            indexer,
            completions,
            abort,
            messenger,
            workspace_dirs,
            active_refresh: Mutex::new(None),
        }
    }

    /// Handle one inbound envelope. Returns the response payload for
    /// request/response message types, `None` for notifications and
    /// unhandled types.
    pub async fn handle_message(
        &self,
        message: &Message,
    ) -> Result<Option<serde_json::Value>, CoreError> {
        let Some(inbound) = InboundMessage::parse(message)? else {
            return Ok(None);
        };

        match inbound {
            InboundMessage::ForceReIndex(params) => {
                if params.should_clear_indexes {
                    self.indexer.clear_indexes();
                }
                let dirs = params.dirs.unwrap_or_else(|| self.workspace_dirs.clone());
                self.start_refresh(dirs);
                Ok(None)
            }
            InboundMessage::SetPaused(paused) => {
                info!("Indexing paused: {paused}");
                self.indexer.set_paused(paused);
                Ok(None)
            }
            InboundMessage::AutocompleteComplete(input) => {
                match self.completions.provide(&input).await {
                    Ok(Some(completion)) => {
                        Ok(Some(serde_json::json!([completion.text])))
                    }
                    Ok(None) => Ok(Some(serde_json::json!([]))),
                    Err(e) => {
                        // Completion failures cancel silently; nothing is
                        // displayed and no toast is raised.
                        warn!("Completion failed: {e}");
                        Ok(Some(serde_json::json!([])))
                    }
                }
            }
            InboundMessage::AutocompleteAccept { completion_id } => {
                self.completions.accept(&completion_id);
                Ok(None)
            }
            InboundMessage::AutocompleteCancel => {
                self.abort.abort(&message.message_id);
                Ok(None)
            }
            InboundMessage::FilesChanged { uris }
            | InboundMessage::FilesCreated { uris }
            | InboundMessage::FilesDeleted { uris } => {
                self.refresh_changed_files(&uris).await;
                Ok(None)
            }
            InboundMessage::FilesClosed { uris } | InboundMessage::FilesOpened { uris } => {
                debug!("File visibility changed for {} uris", uris.len());
                Ok(None)
            }
            InboundMessage::Abort { message_id } => {
                self.abort.abort(&message_id);
                Ok(None)
            }
        }
    }

    /// Kick off a streaming refresh; progress updates are forwarded to the
    /// messenger and a submenu refresh is requested once indexing settles.
    fn start_refresh(&self, dirs: Vec<String>) {
        let cancel = CancellationToken::new();
        if let Some(previous) = self
            .lock_active()
            .replace(cancel.clone())
        {
            previous.cancel();
        }

        let mut progress = self.indexer.refresh_dirs(dirs, cancel);
        let messenger = self.messenger.clone();
        tokio::spawn(async move {
            let mut finished = false;
            while let Some(update) = progress.next().await {
                let done = matches!(
                    update.status,
                    IndexingStatus::Done | IndexingStatus::Failed | IndexingStatus::Cancelled
                );
                messenger.send(OutboundMessage::IndexProgress(update)).await;
                if done {
                    finished = true;
                }
            }
            if finished {
                messenger
                    .send(OutboundMessage::RefreshSubmenuItems {
                        providers: "dependsOnIndexing".to_string(),
                    })
                    .await;
            }
        });
    }

    /// File-event refreshes run inline and never raise toasts; failures
    /// are logged and the next full refresh reconciles.
    async fn refresh_changed_files(&self, uris: &[String]) {
        for dir in &self.workspace_dirs {
            let in_dir: Vec<String> = uris
                .iter()
                .filter(|uri| uri_belongs_to(uri, dir))
                .cloned()
                .collect();
            if in_dir.is_empty() {
                continue;
            }
            if let Err(e) = self.indexer.refresh_files(dir, &in_dir).await {
                warn!("File-change refresh failed under {dir}: {e}");
                if e.should_clear_indexes() {
                    self.messenger
                        .send(OutboundMessage::IndexProgress(ProgressUpdate::failed(
                            e.to_string(),
                            true,
                            None,
                        )))
                        .await;
                }
            }
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        match self.active_refresh.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn uri_belongs_to(uri: &str, dir: &str) -> bool {
    let normalize = |s: &str| s.trim_start_matches("file://").trim_end_matches('/').to_string();
    let uri = normalize(uri);
    let dir = normalize(dir);
    uri.starts_with(&format!("{dir}/")) || uri == dir
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn uri_prefix_matching_respects_boundaries() {
        assert!(uri_belongs_to("/ws/src/main.rs", "/ws"));
        assert!(uri_belongs_to("file:///ws/src/main.rs", "file:///ws/"));
        assert!(!uri_belongs_to("/workspace-other/main.rs", "/ws"));
        assert!(!uri_belongs_to("/wsx/main.rs", "/ws"));
    }

    #[test]
    fn core_error_display_is_actionable() {
        let err = CoreError::Payload(serde_json::from_str::<bool>("{").unwrap_err());
        assert!(err.to_string().starts_with("Malformed message payload"));
    }
}
