use crate::config::AutocompleteConfig;
use crate::context::{ContextSnippet, SnippetKind};
use rand::seq::SliceRandom;
use sidekick_code_chunker::TokenCounter;

/// Stop tokens applied to every model, on top of user and family sets.
const DEFAULT_STOP_TOKENS: &[&str] = &["/src/", "#- coding: utf-8", "``` "];

/// Tokens reserved out of the prompt budget for template overhead.
const PROMPT_OVERHEAD_TOKENS: usize = 10;

/// A fill-in-the-middle prompt template plus the wrapper tokens the model
/// family is known to leak.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutocompleteTemplate {
    pub template: String,
    pub family_stop_tokens: Vec<String>,
}

/// Pick a template by model identifier. Unknown models get the starcoder
/// FIM format, which most local code models understand.
pub fn select_template(model: &str) -> AutocompleteTemplate {
    let lowered = model.to_lowercase();
    let (template, stops): (&str, &[&str]) = if lowered.contains("codestral") {
        (
            "[SUFFIX]{{suffix}}[PREFIX]{{prefix}}",
            &["[PREFIX]", "[SUFFIX]"],
        )
    } else if lowered.contains("codellama") || lowered.contains("llama") {
        (
            "<PRE> {{prefix}} <SUF>{{suffix}} <MID>",
            &["<PRE>", "<SUF>", "<MID>", "<EOT>"],
        )
    } else if lowered.contains("qwen") || lowered.contains("codeqwen") {
        (
            "<|fim_prefix|>{{prefix}}<|fim_suffix|>{{suffix}}<|fim_middle|>",
            &["<|fim_prefix|>", "<|fim_suffix|>", "<|fim_middle|>", "<|endoftext|>"],
        )
    } else {
        (
            "<fim_prefix>{{prefix}}<fim_suffix>{{suffix}}<fim_middle>",
            &["<fim_prefix>", "<fim_suffix>", "<fim_middle>", "<|endoftext|>"],
        )
    };
    AutocompleteTemplate {
        template: template.to_string(),
        family_stop_tokens: stops.iter().map(|s| s.to_string()).collect(),
    }
}

/// Variables available to prompt templates.
pub struct TemplateVars<'a> {
    pub prefix: &'a str,
    pub suffix: &'a str,
    pub filename: &'a str,
    pub reponame: &'a str,
    pub language: &'a str,
}

/// Render a `{{var}}` template. Unknown variables are left in place.
pub fn render_template(template: &str, vars: &TemplateVars<'_>) -> String {
    template
        .replace("{{prefix}}", vars.prefix)
        .replace("{{suffix}}", vars.suffix)
        .replace("{{filename}}", vars.filename)
        .replace("{{reponame}}", vars.reponame)
        .replace("{{language}}", vars.language)
}

/// Full stop-token set: user-configured, the built-in defaults, and the
/// model family's wrapper tokens.
pub fn stop_tokens_for(config: &AutocompleteConfig, template: &AutocompleteTemplate) -> Vec<String> {
    let mut tokens: Vec<String> = config.stop_tokens.clone();
    tokens.extend(DEFAULT_STOP_TOKENS.iter().map(|s| s.to_string()));
    tokens.extend(template.family_stop_tokens.iter().cloned());
    tokens.dedup();
    tokens
}

/// Order snippets by source priority, drop ones already visible around the
/// caret, shuffle the base group to vary prompts, and greedily fill the
/// token budget.
pub fn assemble_snippets(
    mut snippets: Vec<ContextSnippet>,
    caret_window: &str,
    max_prompt_tokens: usize,
    priority_override: &[String],
) -> Vec<ContextSnippet> {
    let counter = TokenCounter::new();
    let budget = max_prompt_tokens
        .saturating_sub(counter.count(caret_window))
        .saturating_sub(PROMPT_OVERHEAD_TOKENS);

    // Content the user can already see contributes nothing.
    snippets.retain(|snippet| {
        !snippet.content.trim().is_empty() && !caret_window.contains(snippet.content.trim())
    });

    // The base group (imports and root-path definitions) is shuffled so
    // repeated triggers do not produce byte-identical prompts.
    let (mut base, mut ranked): (Vec<_>, Vec<_>) = snippets
        .into_iter()
        .partition(|snippet| matches!(snippet.kind, SnippetKind::Imports | SnippetKind::RootPath));
    base.shuffle(&mut rand::thread_rng());
    ranked.sort_by_key(|snippet| priority_of(&snippet.kind, priority_override));
    ranked.extend(base);

    let mut used = 0usize;
    let mut kept = Vec::new();
    for snippet in ranked {
        let cost = counter.count(&snippet.content);
        if used + cost > budget {
            continue;
        }
        used += cost;
        kept.push(snippet);
    }
    kept
}

fn priority_of(kind: &SnippetKind, config_override: &[String]) -> usize {
    if !config_override.is_empty() {
        if let Some(position) = config_override.iter().position(|name| kind.matches_name(name)) {
            return position;
        }
        return usize::MAX;
    }
    match kind {
        SnippetKind::Clipboard => 0,
        SnippetKind::RecentlyVisited => 1,
        SnippetKind::RecentlyEdited => 2,
        SnippetKind::Diff => 3,
        SnippetKind::Ide => 4,
        SnippetKind::Imports | SnippetKind::RootPath => 5,
    }
}
