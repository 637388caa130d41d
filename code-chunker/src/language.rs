use std::path::Path;

/// Supported programming languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
    Java,
    C,
    Cpp,
    CSharp,
    Ruby,
    Bash,
    Unknown,
}

impl Language {
    /// Detect language from file extension.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    /// Detect language from file extension string.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "rs" => Language::Rust,
            "py" | "pyw" | "pyi" => Language::Python,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "mts" | "cts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" => Language::Cpp,
            "cs" => Language::CSharp,
            "rb" => Language::Ruby,
            "sh" | "bash" => Language::Bash,
            _ => Language::Unknown,
        }
    }

    /// Get the language name as string.
    pub fn name(self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Ruby => "ruby",
            Language::Bash => "bash",
            Language::Unknown => "unknown",
        }
    }

    /// Whether a tree-sitter grammar is wired up for smart-collapse mode.
    pub fn has_tree_sitter_support(self) -> bool {
        self.grammar().is_some()
    }

    /// The tree-sitter grammar, where one is compiled in.
    pub fn grammar(self) -> Option<tree_sitter::Language> {
        match self {
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            _ => None,
        }
    }

    /// Node types that are function definitions, declarations, or methods.
    pub fn function_node_types(self) -> &'static [&'static str] {
        match self {
            Language::Rust => &["function_item"],
            Language::Python => &["function_definition"],
            Language::JavaScript | Language::TypeScript | Language::Tsx => &[
                "function_declaration",
                "generator_function_declaration",
                "method_definition",
                "arrow_function",
                "function_expression",
            ],
            _ => &[],
        }
    }

    /// Node types that contain functions (classes, impls, traits).
    pub fn container_node_types(self) -> &'static [&'static str] {
        match self {
            Language::Rust => &["impl_item", "trait_item"],
            Language::Python => &["class_definition"],
            Language::JavaScript | Language::TypeScript | Language::Tsx => &["class_declaration"],
            _ => &[],
        }
    }

    /// Whether function bodies are brace-delimited blocks.
    pub fn uses_braces(self) -> bool {
        !matches!(self, Language::Python | Language::Ruby | Language::Unknown)
    }

    /// Placeholder standing in for a collapsed function body.
    pub fn collapsed_placeholder(self) -> &'static str {
        if self.uses_braces() {
            "{ ... }"
        } else {
            "..."
        }
    }

    /// Prefix starting a single-line comment.
    pub fn comment_prefix(self) -> &'static str {
        match self {
            Language::Python | Language::Ruby | Language::Bash => "#",
            _ => "//",
        }
    }
}
