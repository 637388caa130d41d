use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Per-request cancellation tokens, keyed by message id. Signaling a token
/// removes the entry; cancellation itself is cooperative and polled at the
/// documented suspension points.
#[derive(Default)]
pub struct AbortRegistry {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl AbortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a token for `message_id`, replacing (and cancelling) any
    /// prior token under the same id.
    pub fn register(&self, message_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self
            .lock()
            .insert(message_id.to_string(), token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        token
    }

    /// Signal and remove the token for `message_id`.
    pub fn abort(&self, message_id: &str) {
        if let Some(token) = self.lock().remove(message_id) {
            token.cancel();
        }
    }

    /// Drop the entry without signaling, once a request completes.
    pub fn finish(&self, message_id: &str) {
        self.lock().remove(message_id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
        match self.tokens.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn abort_signals_and_removes() {
        let registry = AbortRegistry::new();
        let token = registry.register("m1");
        assert!(!token.is_cancelled());

        registry.abort("m1");
        assert!(token.is_cancelled());
        assert!(registry.is_empty());
    }

    #[test]
    fn registering_same_id_cancels_prior() {
        let registry = AbortRegistry::new();
        let first = registry.register("m1");
        let second = registry.register("m1");
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn finish_removes_without_signaling() {
        let registry = AbortRegistry::new();
        let token = registry.register("m1");
        registry.finish("m1");
        assert!(!token.is_cancelled());
        assert!(registry.is_empty());
    }
}
