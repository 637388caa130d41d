use crate::abort::AbortRegistry;
use crate::config::AutocompleteConfig;
use crate::context::SnippetCollector;
use crate::debounce::Debouncer;
use crate::error::{AutocompleteError, Result};
use crate::filters::bracket::BracketMatchingService;
use crate::logging::CompletionLogger;
use crate::multiline::decide_multiline;
use crate::pipeline::{apply_filter_pipeline, PipelineOptions};
use crate::prefilter::Prefilter;
use crate::stream::{ChunkStream, GeneratorReuseManager};
use crate::template::{
    assemble_snippets, render_template, select_template, stop_tokens_for, AutocompleteTemplate,
    TemplateVars,
};
use crate::types::{Completion, FileContext};
use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info};
use sidekick_code_chunker::Language;
use sidekick_protocol::AutocompleteInput;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Characters of file text around the caret used for snippet
/// deduplication.
const CARET_WINDOW_CHARS: usize = 2000;

/// Streams raw completion text for a rendered prompt. The concrete model
/// transport lives outside this crate.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn stream_complete(
        &self,
        prompt: &str,
        stop_tokens: &[String],
    ) -> Result<ChunkStream>;
}

/// Reads current file contents by URI; implemented by the IDE messenger.
#[async_trait]
pub trait FileProvider: Send + Sync {
    async fn read(&self, uri: &str) -> std::io::Result<String>;
}

/// The completion orchestrator: prefilter, debounce, context, prompt,
/// stream, filter, display.
pub struct CompletionProvider {
    config: AutocompleteConfig,
    prefilter: Prefilter,
    debouncer: Debouncer,
    abort: Arc<AbortRegistry>,
    collector: SnippetCollector,
    reuse: GeneratorReuseManager,
    brackets: Arc<BracketMatchingService>,
    logger: Arc<CompletionLogger>,
    model: Arc<dyn ModelClient>,
    files: Arc<dyn FileProvider>,
    repo_name: Option<String>,
}

impl CompletionProvider {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AutocompleteConfig,
        collector: SnippetCollector,
        model: Arc<dyn ModelClient>,
        files: Arc<dyn FileProvider>,
        brackets: Arc<BracketMatchingService>,
        logger: Arc<CompletionLogger>,
        abort: Arc<AbortRegistry>,
        repo_name: Option<String>,
    ) -> Result<Self> {
        let prefilter = Prefilter::new(&config)?;
        Ok(Self {
            config,
            prefilter,
            debouncer: Debouncer::new(),
            abort,
            collector,
            reuse: GeneratorReuseManager::new(),
            brackets,
            logger,
            model,
            files,
            repo_name,
        })
    }

    /// Produce one completion for a trigger, or `None` when the trigger is
    /// filtered, debounced, cancelled, or yields nothing displayable.
    pub async fn provide(&self, input: &AutocompleteInput) -> Result<Option<Completion>> {
        let contents = match self.files.read(&input.filepath).await {
            Ok(contents) => contents,
            Err(e) => {
                debug!("Cannot read {}: {e}", input.filepath);
                return Ok(None);
            }
        };

        if !self.prefilter.should_complete(&self.config, input, &contents) {
            return Ok(None);
        }
        if self
            .debouncer
            .delay(Duration::from_millis(self.config.debounce_delay_ms))
            .await
        {
            debug!("Trigger {} debounced", input.completion_id);
            return Ok(None);
        }

        let cancel = self.abort.register(&input.completion_id);
        let language = Language::from_path(Path::new(&input.filepath));
        let mut ctx = FileContext::at_cursor(&contents, input.pos.line, input.pos.character);
        if let Some(prefix) = &input.manually_pass_prefix {
            ctx.prefix = prefix.clone();
        }

        let multiline = decide_multiline(
            self.config.multiline,
            language,
            &ctx,
            input.selected_completion_info,
        );

        let snippets = self
            .collector
            .collect(input, &contents, &ctx, language, None)
            .await;
        let caret_window = caret_window(&ctx);
        let kept = assemble_snippets(
            snippets,
            &caret_window,
            self.config.max_prompt_tokens,
            &self.config.snippet_priority,
        );

        let template = self.template();
        let prompt_prefix = format!("{}{}", snippet_header(&kept, language), ctx.prefix);
        let filename = Path::new(&input.filepath)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&input.filepath)
            .to_string();
        let prompt = render_template(
            &template.template,
            &TemplateVars {
                prefix: &prompt_prefix,
                suffix: &ctx.suffix,
                filename: &filename,
                reponame: self.repo_name.as_deref().unwrap_or(""),
                language: language.name(),
            },
        );
        let stop_tokens = stop_tokens_for(&self.config, &template);

        let model = self.model.clone();
        let stop_for_model = stop_tokens.clone();
        let raw = self
            .reuse
            .get_generator(&ctx.prefix, move || {
                Box::pin(async move { model.stream_complete(&prompt, &stop_for_model).await })
            })
            .await?;

        let bracket_seed = self.brackets.seed(
            &input.filepath,
            multiline,
            ctx.current_line_prefix(),
            &ctx.suffix,
        );
        let mut filtered = apply_filter_pipeline(
            raw,
            PipelineOptions {
                stop_tokens,
                suffix: ctx.suffix.clone(),
                line_below_cursor: ctx.line_below_cursor().to_string(),
                comment_prefix: language.comment_prefix().to_string(),
                multiline,
                bracket_seed,
                end_of_line_chars: Vec::new(),
                show_whatever_we_have_at: Duration::from_millis(
                    self.config.show_whatever_we_have_at_ms,
                ),
            },
        );

        let mut text = String::new();
        while let Some(chunk) = filtered.next().await {
            // Cancellation is checked before each forwarded chunk.
            if cancel.is_cancelled() {
                debug!("Completion {} cancelled mid-stream", input.completion_id);
                self.abort.finish(&input.completion_id);
                return Ok(None);
            }
            text.push_str(&chunk);
        }
        self.abort.finish(&input.completion_id);

        if text.trim().is_empty() {
            return Ok(None);
        }

        info!(
            "Completion {} ready ({} chars)",
            input.completion_id,
            text.len()
        );
        self.logger.displayed(&input.completion_id, &input.filepath, &text);
        Ok(Some(Completion {
            completion_id: input.completion_id.clone(),
            filepath: input.filepath.clone(),
            text,
        }))
    }

    /// Record an acceptance: resolves the lifecycle and feeds the bracket
    /// service's cross-request state.
    pub fn accept(&self, completion_id: &str) {
        if let Some((filepath, text)) = self.logger.accept(completion_id) {
            self.brackets.on_accept(&filepath, &text);
        }
    }

    /// Cancel an in-flight completion by id.
    pub fn cancel(&self, completion_id: &str) {
        self.abort.abort(completion_id);
    }

    fn template(&self) -> AutocompleteTemplate {
        match &self.config.template {
            Some(custom) => AutocompleteTemplate {
                template: custom.clone(),
                family_stop_tokens: Vec::new(),
            },
            None => select_template(&self.config.model),
        }
    }
}

/// Text surrounding the caret, used to drop snippets the user already
/// sees.
fn caret_window(ctx: &FileContext) -> String {
    let prefix_tail: String = ctx
        .prefix
        .chars()
        .rev()
        .take(CARET_WINDOW_CHARS / 2)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let suffix_head: String = ctx.suffix.chars().take(CARET_WINDOW_CHARS / 2).collect();
    format!("{prefix_tail}{suffix_head}")
}

/// Render kept snippets as a commented header block above the prefix.
fn snippet_header(snippets: &[crate::context::ContextSnippet], language: Language) -> String {
    let comment = language.comment_prefix();
    let mut header = String::new();
    for snippet in snippets {
        if !snippet.filepath.is_empty() {
            header.push_str(&format!("{comment} Path: {}\n", snippet.filepath));
        }
        for line in snippet.content.lines() {
            header.push_str(&format!("{comment} {line}\n"));
        }
        header.push('\n');
    }
    header
}
