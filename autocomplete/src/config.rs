use serde::{Deserialize, Serialize};

/// Multiline behavior for completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MultilineMode {
    Always,
    Never,
    /// Decide per trigger from language and cursor context.
    #[default]
    Auto,
}

/// Configuration for the completion orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutocompleteConfig {
    /// Master switch; when off every trigger resolves to no completion.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Model identifier, used to select the prompt template and its
    /// stop-token artifacts.
    #[serde(default = "default_model")]
    pub model: String,

    /// Gitignore-style patterns for files autocomplete must never touch.
    /// `*.prompt` is always added on top of these.
    #[serde(default)]
    pub disable_in_files: Vec<String>,

    /// Path of the assistant's own configuration file, excluded from
    /// completion.
    #[serde(default)]
    pub config_file_path: Option<String>,

    /// Debounce delay before a trigger proceeds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_delay_ms: u64,

    /// Token budget for the rendered prompt.
    #[serde(default = "default_max_prompt_tokens")]
    pub max_prompt_tokens: usize,

    /// Extra stop tokens on top of the built-in and model-family sets.
    #[serde(default)]
    pub stop_tokens: Vec<String>,

    #[serde(default)]
    pub multiline: MultilineMode,

    /// Soft timeout for the filter pipeline: once elapsed and at least one
    /// non-blank line has been produced, the stream is cut.
    #[serde(default = "default_show_at_ms")]
    pub show_whatever_we_have_at_ms: u64,

    /// Optional template override; replaces the model-selected template.
    #[serde(default)]
    pub template: Option<String>,

    /// Snippet sources that may contribute to the prompt, in priority
    /// order. Empty means the built-in order.
    #[serde(default)]
    pub snippet_priority: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "starcoder2:3b".to_string()
}

fn default_debounce_ms() -> u64 {
    350
}

fn default_max_prompt_tokens() -> usize {
    1024
}

fn default_show_at_ms() -> u64 {
    1800
}

impl Default for AutocompleteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: default_model(),
            disable_in_files: Vec::new(),
            config_file_path: None,
            debounce_delay_ms: default_debounce_ms(),
            max_prompt_tokens: default_max_prompt_tokens(),
            stop_tokens: Vec::new(),
            multiline: MultilineMode::default(),
            show_whatever_we_have_at_ms: default_show_at_ms(),
            template: None,
            snippet_priority: Vec::new(),
        }
    }
}

impl AutocompleteConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_prompt_tokens < 16 {
            return Err("max_prompt_tokens must be at least 16".to_string());
        }
        if self.debounce_delay_ms > 10_000 {
            return Err("debounce_delay_ms above 10s makes completions useless".to_string());
        }
        Ok(())
    }
}
