/*!
# Sidekick Autocomplete

The streaming code-completion pipeline. A trigger flows through a
prefilter, a coalescing debouncer, parallel context-snippet collection,
prompt rendering against a model-specific template, and finally the stream
filter chain that turns raw model output into a display-ready completion:
stop-token detection, bracket matching, repetition and English-prose
suppression, blank-line limits, and a soft timeout.

Model transport is a collaborator behind [`ModelClient`]; this crate owns
everything between the cursor event and the displayed text.
*/

mod abort;
mod config;
mod context;
mod debounce;
mod error;
mod filters;
mod logging;
mod multiline;
mod orchestrator;
mod pipeline;
mod prefilter;
mod stream;
mod template;
mod types;

pub use abort::AbortRegistry;
pub use config::{AutocompleteConfig, MultilineMode};
pub use context::{
    ContextSnippet, DefinitionProvider, DiffProvider, NoDefinitions, NoDiff, SnippetCollector,
    SnippetKind,
};
pub use debounce::Debouncer;
pub use error::{AutocompleteError, Result};
pub use filters::bracket::BracketMatchingService;
pub use logging::{CompletionLogger, CompletionOutcomeEvent};
pub use multiline::decide_multiline;
pub use orchestrator::{CompletionProvider, FileProvider, ModelClient};
pub use pipeline::{apply_filter_pipeline, PipelineOptions};
pub use stream::{ChunkStream, GeneratorReuseManager};
pub use template::{render_template, select_template, stop_tokens_for, AutocompleteTemplate};
pub use types::{Completion, FileContext};
