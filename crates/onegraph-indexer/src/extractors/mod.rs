//! Per-format extractors.
//!
//! Dispatch is a table lookup over the file extension; every extractor
//! returns `(nodes, edges, text_units)` as an [`ExtractionResult`]. The
//! extractors parse the provided content only and perform no further I/O.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use onegraph_domain::entities::{ExtractionResult, GraphEdge, GraphNode, NodeKey};
use onegraph_domain::error::Result;
use onegraph_domain::stable_guid;

use crate::loader::LoadedDocument;

/// .bsl routine scanner.
pub mod bsl;
/// Plain text and HTML.
pub mod text;
/// Role, HTTP service, document journal and form XML.
pub mod xml;

/// Map of path root components to 1C object types.
const OBJECT_TYPE_MAP: &[(&str, &str)] = &[
    ("Catalogs", "Catalog"),
    ("Documents", "Document"),
    ("Reports", "Report"),
    ("DataProcessors", "DataProcessor"),
    ("InformationRegisters", "InformationRegister"),
    ("AccumulationRegisters", "AccumulationRegister"),
    ("ChartsOfCharacteristicTypes", "ChartOfCharacteristicTypes"),
    ("CommonModules", "CommonModule"),
    ("Enums", "Enum"),
    ("Constants", "Constant"),
];

/// Recognised module file stems.
const MODULE_KIND_MAP: &[&str] = &[
    "ObjectModule",
    "ManagerModule",
    "FormModule",
    "CommandModule",
    "CommonModule",
];

fn object_type(root: &str) -> &'static str {
    OBJECT_TYPE_MAP
        .iter()
        .find(|(from, _)| *from == root)
        .map_or("Other", |(_, to)| to)
}

fn module_kind(stem: &str) -> Option<&'static str> {
    MODULE_KIND_MAP.iter().copied().find(|kind| *kind == stem)
}

/// Extract one loaded document with the extractor for its extension.
///
/// # Errors
///
/// Returns a soft per-document error (e.g. malformed XML); the caller
/// records it and continues with the remaining documents.
pub fn extract_document(document: &LoadedDocument) -> Result<ExtractionResult> {
    match document.extension.as_str() {
        ".bsl" => Ok(bsl::extract(document)),
        ".xml" => xml::extract(document),
        _ => Ok(text::extract(document)),
    }
}

/// Common prefix shared by the code and text extractors: the enclosing
/// platform object (when the path is deep enough) and the module node.
pub(crate) struct CommonPrefix {
    /// The module node, always present.
    pub module: GraphNode,
    /// Identity of the module node.
    pub module_key: NodeKey,
    /// The enclosing object, when the path has at least two components.
    pub object: Option<GraphNode>,
    /// `HAS_MODULE` / `OWNED_BY` edges between object and module.
    pub edges: Vec<GraphEdge>,
}

pub(crate) fn build_object_and_module(document: &LoadedDocument) -> CommonPrefix {
    let parts: Vec<&str> = document.rel_path.split('/').collect();

    let object = enclosing_object(document);

    let stem = file_stem(&document.rel_path);
    let kind = module_kind(&stem)
        .or_else(|| {
            parts
                .get(2)
                .and_then(|third| third.split('.').next())
                .and_then(module_kind)
        })
        .unwrap_or("CommonModule");

    let module_guid = stable_guid(&format!("{}:module", document.rel_path));
    let module = GraphNode::new(
        "Module",
        single_key("guid", &module_guid),
        props(vec![
            ("name", json!(stem)),
            ("kind", json!(kind)),
            ("guid", json!(module_guid)),
            ("path", json!(document.rel_path)),
        ]),
    );
    let module_key = module.node_key();

    let mut edges = Vec::new();
    if let Some(object) = &object {
        edges.push(GraphEdge::new(
            object.node_key(),
            "HAS_MODULE",
            module_key.clone(),
        ));
        edges.push(GraphEdge::new(
            module_key.clone(),
            "OWNED_BY",
            object.node_key(),
        ));
    }

    CommonPrefix {
        module,
        module_key,
        object,
        edges,
    }
}

/// The enclosing object node for paths like `Catalogs/Contacts/...`.
pub(crate) fn enclosing_object(document: &LoadedDocument) -> Option<GraphNode> {
    let parts: Vec<&str> = document.rel_path.split('/').collect();
    if parts.len() < 2 {
        return None;
    }
    let root = parts[0];
    let name = parts[1];
    let qualified_name = format!("{root}.{name}");
    Some(GraphNode::new(
        "Object",
        single_key("qualified_name", &qualified_name),
        props(vec![
            ("qualified_name", json!(qualified_name)),
            ("type", json!(object_type(root))),
            ("name", json!(name)),
            ("path", json!(document.rel_path)),
        ]),
    ))
}

pub(crate) fn file_stem(rel_path: &str) -> String {
    let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
    match name.rfind('.') {
        Some(idx) if idx > 0 => name[..idx].to_owned(),
        _ => name.to_owned(),
    }
}

pub(crate) fn single_key(field: &str, value: &str) -> BTreeMap<String, String> {
    let mut key = BTreeMap::new();
    key.insert(field.to_owned(), value.to_owned());
    key
}

pub(crate) fn props(pairs: Vec<(&str, Value)>) -> BTreeMap<String, Value> {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_owned(), value))
        .collect()
}
