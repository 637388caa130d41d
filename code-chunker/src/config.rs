use serde::{Deserialize, Serialize};

/// Configuration for code chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Maximum chunk size in model tokens (hard limit). Chunks exceeding
    /// this after construction are discarded, not split.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
}

fn default_max_chunk_size() -> usize {
    512
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
        }
    }
}

impl ChunkerConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        // The basic chunker reserves 5 tokens of headroom.
        if self.max_chunk_size <= 5 {
            return Err("max_chunk_size must be greater than 5".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ChunkerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let config = ChunkerConfig { max_chunk_size: 5 };
        assert!(config.validate().is_err());
    }
}
