use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser};

use crate::languages::Lang;

/// Node kinds that can carry an entity name, searched in order.
const NAME_NODE_KINDS: &[&str] = &[
    "identifier",
    "name",
    "property_identifier",
    "field_identifier",
    "type_identifier",
];

/// Kind of a structurally extracted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Function,
    Method,
    Type,
    Struct,
    Interface,
}

impl EntityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Type => "type",
            Self::Struct => "struct",
            Self::Interface => "interface",
        }
    }
}

/// A named declaration with its source span.
#[derive(Debug, Clone)]
pub struct CodeEntity {
    pub kind: EntityKind,
    pub name: Option<String>,
    /// 1-based source lines.
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
}

/// Structural extraction result for one file.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub package: Option<String>,
    pub imports: Vec<String>,
    pub entities: Vec<CodeEntity>,
}

/// Entity extractor with a lazily-built parser cache.
///
/// One parser per language, reused across files. Parse failures and
/// languages without entity kinds both yield an empty extraction so the
/// caller falls back to file-level chunking.
pub struct Extractor {
    parsers: Mutex<HashMap<Lang, Parser>>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor").finish_non_exhaustive()
    }
}

impl Extractor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            parsers: Mutex::new(HashMap::new()),
        }
    }

    /// Extract named entities from `source`.
    ///
    /// Matched entity nodes are not descended into, so nested declarations
    /// stay part of their enclosing entity's text.
    #[must_use]
    pub fn extract(&self, source: &str, lang: Lang) -> Extraction {
        let kinds = lang.entity_node_kinds();
        if kinds.is_empty() {
            return Extraction::default();
        }
        let Some(grammar) = lang.grammar() else {
            return Extraction::default();
        };

        let Ok(mut parsers) = self.parsers.lock() else {
            return Extraction::default();
        };
        if !parsers.contains_key(&lang) {
            let mut parser = Parser::new();
            if parser.set_language(&grammar).is_err() {
                tracing::debug!(lang = lang.id(), "grammar rejected by parser");
                return Extraction::default();
            }
            parsers.insert(lang, parser);
        }
        let Some(parser) = parsers.get_mut(&lang) else {
            return Extraction::default();
        };
        let Some(tree) = parser.parse(source, None) else {
            tracing::debug!(lang = lang.id(), "parse failed, falling back to file chunking");
            return Extraction::default();
        };

        let root = tree.root_node();
        let mut extraction = Extraction::default();
        if lang == Lang::Go {
            extraction.package = go_package(&root, source);
            extraction.imports = go_imports(&root, source);
        }

        let mut queue = VecDeque::from([root]);
        while let Some(node) = queue.pop_front() {
            if kinds.contains(&node.kind()) {
                if node.kind() == "type_declaration" {
                    extraction.entities.extend(go_type_specs(&node, source));
                } else {
                    extraction.entities.push(to_entity(&node, source));
                }
                continue;
            }
            let child_count = u32::try_from(node.child_count()).unwrap_or(u32::MAX);
            for i in 0..child_count {
                if let Some(child) = node.child(i) {
                    queue.push_back(child);
                }
            }
        }
        extraction
    }
}

fn to_entity(node: &Node, source: &str) -> CodeEntity {
    CodeEntity {
        kind: entity_kind(node.kind()),
        name: entity_name(node, source),
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        text: node_text(node, source),
    }
}

fn entity_kind(node_kind: &str) -> EntityKind {
    match node_kind {
        "method_declaration" | "method_definition" => EntityKind::Method,
        "struct_item" => EntityKind::Struct,
        "trait_item" => EntityKind::Interface,
        "class_declaration" | "class_definition" | "enum_item" | "impl_item"
        | "type_declaration" => EntityKind::Type,
        _ => EntityKind::Function,
    }
}

/// Find a name-bearing child, direct children first, then one level deeper.
fn entity_name(node: &Node, source: &str) -> Option<String> {
    let child_count = u32::try_from(node.child_count()).unwrap_or(u32::MAX);
    for i in 0..child_count {
        let Some(child) = node.child(i) else { continue };
        if NAME_NODE_KINDS.contains(&child.kind()) {
            return Some(node_text(&child, source));
        }
    }
    for i in 0..child_count {
        let Some(child) = node.child(i) else { continue };
        let grandchild_count = u32::try_from(child.child_count()).unwrap_or(u32::MAX);
        for j in 0..grandchild_count {
            let Some(grandchild) = child.child(j) else {
                continue;
            };
            if NAME_NODE_KINDS.contains(&grandchild.kind()) {
                return Some(node_text(&grandchild, source));
            }
        }
    }
    None
}

fn node_text(node: &Node, source: &str) -> String {
    source.get(node.byte_range()).unwrap_or_default().to_owned()
}

fn go_package(root: &Node, source: &str) -> Option<String> {
    let child_count = u32::try_from(root.child_count()).unwrap_or(u32::MAX);
    for i in 0..child_count {
        let Some(child) = root.child(i) else { continue };
        if child.kind() != "package_clause" {
            continue;
        }
        let inner = u32::try_from(child.child_count()).unwrap_or(u32::MAX);
        for j in 0..inner {
            if let Some(ident) = child.child(j)
                && ident.kind() == "package_identifier"
            {
                return Some(node_text(&ident, source));
            }
        }
    }
    None
}

fn go_imports(root: &Node, source: &str) -> Vec<String> {
    let mut imports = Vec::new();
    let mut queue = VecDeque::new();
    let child_count = u32::try_from(root.child_count()).unwrap_or(u32::MAX);
    for i in 0..child_count {
        if let Some(child) = root.child(i)
            && child.kind() == "import_declaration"
        {
            queue.push_back(child);
        }
    }
    while let Some(node) = queue.pop_front() {
        if matches!(
            node.kind(),
            "interpreted_string_literal" | "raw_string_literal"
        ) {
            let text = node_text(&node, source);
            imports.push(text.trim_matches(['"', '`']).to_owned());
            continue;
        }
        let child_count = u32::try_from(node.child_count()).unwrap_or(u32::MAX);
        for i in 0..child_count {
            if let Some(child) = node.child(i) {
                queue.push_back(child);
            }
        }
    }
    imports
}

/// A Go `type_declaration` can hold several `type_spec`s; each becomes its
/// own entity, classified as struct, interface, or plain type.
fn go_type_specs(node: &Node, source: &str) -> Vec<CodeEntity> {
    let mut entities = Vec::new();
    let child_count = u32::try_from(node.child_count()).unwrap_or(u32::MAX);
    for i in 0..child_count {
        let Some(spec) = node.child(i) else { continue };
        if spec.kind() != "type_spec" {
            continue;
        }
        let mut name = None;
        let mut kind = EntityKind::Type;
        let inner = u32::try_from(spec.child_count()).unwrap_or(u32::MAX);
        for j in 0..inner {
            let Some(child) = spec.child(j) else { continue };
            match child.kind() {
                "type_identifier" if name.is_none() => name = Some(node_text(&child, source)),
                "struct_type" => kind = EntityKind::Struct,
                "interface_type" => kind = EntityKind::Interface,
                _ => {}
            }
        }
        entities.push(CodeEntity {
            kind,
            name,
            start_line: spec.start_position().row + 1,
            end_line: spec.end_position().row + 1,
            text: node_text(&spec, source),
        });
    }
    entities
}
