use std::path::Path;

use serde::{Deserialize, Serialize};
use tree_sitter::Language;

/// Languages the pipeline recognizes.
///
/// Variants without a grammar are still indexed, but always through
/// file-level chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Go,
    GoMod,
    TypeScript,
    Tsx,
    JavaScript,
    Rust,
    Python,
    Json,
    Toml,
    Yaml,
    Markdown,
    Css,
    Html,
    Dockerfile,
}

impl Lang {
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Go => "go",
            Self::GoMod => "mod",
            Self::TypeScript => "ts",
            Self::Tsx => "tsx",
            Self::JavaScript => "js",
            Self::Rust => "rs",
            Self::Python => "py",
            Self::Json => "json",
            Self::Toml => "toml",
            Self::Yaml => "yaml",
            Self::Markdown => "md",
            Self::Css => "css",
            Self::Html => "html",
            Self::Dockerfile => "Dockerfile",
        }
    }

    #[must_use]
    pub fn grammar(self) -> Option<Language> {
        match self {
            Self::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Self::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Self::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            Self::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Self::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Self::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Self::Json => Some(tree_sitter_json::LANGUAGE.into()),
            Self::Toml => Some(tree_sitter_toml_ng::LANGUAGE.into()),
            Self::Markdown => Some(tree_sitter_md::LANGUAGE.into()),
            Self::GoMod
            | Self::Yaml
            | Self::Css
            | Self::Html
            | Self::Dockerfile => None,
        }
    }

    /// Node kinds treated as extractable entities.
    ///
    /// Empty for data and markup languages so callers fall back to
    /// file-level chunking.
    #[must_use]
    pub fn entity_node_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Go => &[
                "function_declaration",
                "method_declaration",
                "type_declaration",
            ],
            Self::TypeScript | Self::Tsx | Self::JavaScript => &[
                "function_declaration",
                "method_definition",
                "class_declaration",
            ],
            Self::Rust => &[
                "function_item",
                "struct_item",
                "enum_item",
                "trait_item",
                "impl_item",
            ],
            Self::Python => &["function_definition", "class_definition"],
            _ => &[],
        }
    }
}

/// Detect the language of a file from its name and extension.
#[must_use]
pub fn detect_language(path: &Path) -> Option<Lang> {
    if path.file_name().is_some_and(|n| n == "Dockerfile") {
        return Some(Lang::Dockerfile);
    }
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "go" => Some(Lang::Go),
        "mod" => Some(Lang::GoMod),
        "ts" => Some(Lang::TypeScript),
        "tsx" => Some(Lang::Tsx),
        "js" => Some(Lang::JavaScript),
        "rs" => Some(Lang::Rust),
        "py" => Some(Lang::Python),
        "json" => Some(Lang::Json),
        "toml" => Some(Lang::Toml),
        "yaml" | "yml" => Some(Lang::Yaml),
        "md" | "markdown" => Some(Lang::Markdown),
        "css" => Some(Lang::Css),
        "html" | "htm" => Some(Lang::Html),
        _ => None,
    }
}

/// Language tag stored in point payloads.
///
/// The extension without the dot, or the literal file name for
/// extensionless special files like `Dockerfile`. Extensions are
/// lowercased so `deploy.YAML` and `deploy.yaml` carry the same tag
/// and payload filters stay case-insensitive.
#[must_use]
pub fn language_tag(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_ascii_lowercase(),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
    }
}
