use crate::config::MultilineMode;
use crate::types::FileContext;
use sidekick_code_chunker::Language;

/// Decide whether this completion may span multiple lines.
///
/// Single-line is forced when the IDE's own suggestion pop-up is visible,
/// when the cursor line begins a single-line comment, or when
/// configuration says never. In auto mode, multiline is allowed when the
/// rest of the cursor line is empty, so the model is not asked to splice
/// lines together.
pub fn decide_multiline(
    mode: MultilineMode,
    language: Language,
    ctx: &FileContext,
    selected_completion_info: bool,
) -> bool {
    if selected_completion_info {
        return false;
    }
    let line_prefix = ctx.current_line_prefix();
    if line_prefix.trim_start().starts_with(language.comment_prefix()) {
        return false;
    }

    match mode {
        MultilineMode::Always => true,
        MultilineMode::Never => false,
        MultilineMode::Auto => {
            let rest_of_line = ctx.suffix.split('\n').next().unwrap_or("");
            rest_of_line.trim().is_empty()
        }
    }
}
