use crate::config::AutocompleteConfig;
use crate::error::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use log::debug;
use sidekick_protocol::AutocompleteInput;

/// Prompt files are never completed into, independent of configuration.
const ALWAYS_DISABLED_PATTERNS: &[&str] = &["*.prompt"];

/// Cheap rejections that run before any work is spent on a trigger.
pub struct Prefilter {
    disabled_files: GlobSet,
}

impl Prefilter {
    pub fn new(config: &AutocompleteConfig) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in ALWAYS_DISABLED_PATTERNS {
            builder.add(Glob::new(pattern)?);
        }
        for pattern in &config.disable_in_files {
            builder.add(Glob::new(pattern)?);
            // Bare directory patterns should also match their contents.
            if !pattern.contains('*') {
                builder.add(Glob::new(&format!("{}/**", pattern.trim_end_matches('/')))?);
            }
        }
        Ok(Self {
            disabled_files: builder.build()?,
        })
    }

    /// `true` means the trigger should proceed.
    pub fn should_complete(
        &self,
        config: &AutocompleteConfig,
        input: &AutocompleteInput,
        file_contents: &str,
    ) -> bool {
        if !config.enabled {
            return false;
        }
        if self.disabled_files.is_match(&input.filepath)
            || self
                .disabled_files
                .is_match(input.filepath.trim_start_matches("file://"))
        {
            debug!("Autocomplete disabled for {}", input.filepath);
            return false;
        }
        if let Some(config_path) = &config.config_file_path {
            if &input.filepath == config_path {
                return false;
            }
        }
        // Untitled empty buffers produce nothing useful.
        if input.filepath.starts_with("untitled:") && file_contents.trim().is_empty() {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidekick_protocol::Position;

    fn input(filepath: &str) -> AutocompleteInput {
        AutocompleteInput {
            completion_id: "id".into(),
            filepath: filepath.into(),
            pos: Position::new(0, 0),
            recently_edited_ranges: Vec::new(),
            recently_visited_ranges: Vec::new(),
            clipboard: None,
            manually_pass_prefix: None,
            selected_completion_info: false,
        }
    }

    #[test]
    fn prompt_files_are_always_disabled() {
        let config = AutocompleteConfig::default();
        let prefilter = Prefilter::new(&config).unwrap();
        assert!(!prefilter.should_complete(&config, &input("/ws/system.prompt"), "body"));
        assert!(prefilter.should_complete(&config, &input("/ws/main.rs"), "body"));
    }

    #[test]
    fn disabled_flag_blocks_everything() {
        let config = AutocompleteConfig {
            enabled: false,
            ..Default::default()
        };
        let prefilter = Prefilter::new(&config).unwrap();
        assert!(!prefilter.should_complete(&config, &input("/ws/main.rs"), "body"));
    }

    #[test]
    fn configured_patterns_disable_matching_files() {
        let config = AutocompleteConfig {
            disable_in_files: vec!["**/generated/**".into(), "*.lock".into()],
            ..Default::default()
        };
        let prefilter = Prefilter::new(&config).unwrap();
        assert!(!prefilter.should_complete(&config, &input("/ws/generated/api.rs"), "x"));
        assert!(!prefilter.should_complete(&config, &input("/ws/Cargo.lock"), "x"));
        assert!(prefilter.should_complete(&config, &input("/ws/src/main.rs"), "x"));
    }

    #[test]
    fn config_file_itself_is_excluded() {
        let config = AutocompleteConfig {
            config_file_path: Some("/home/user/.sidekick/config.json".into()),
            ..Default::default()
        };
        let prefilter = Prefilter::new(&config).unwrap();
        assert!(!prefilter.should_complete(
            &config,
            &input("/home/user/.sidekick/config.json"),
            "{}"
        ));
    }

    #[test]
    fn unnamed_empty_buffer_is_skipped() {
        let config = AutocompleteConfig::default();
        let prefilter = Prefilter::new(&config).unwrap();
        assert!(!prefilter.should_complete(&config, &input("untitled:Untitled-1"), "  \n"));
        assert!(prefilter.should_complete(&config, &input("untitled:Untitled-1"), "fn x() {}"));
    }
}
