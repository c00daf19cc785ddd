//! Plain text and HTML extractor.
//!
//! Emits the common prefix nodes and a single text unit holding the
//! entire content, attached to the module node.

use onegraph_domain::entities::{ExtractionResult, TextUnit};

use super::{CommonPrefix, build_object_and_module};
use crate::loader::LoadedDocument;

/// Extract a text-bearing document.
#[must_use]
pub fn extract(document: &LoadedDocument) -> ExtractionResult {
    let CommonPrefix {
        module,
        module_key,
        object,
        edges,
    } = build_object_and_module(document);

    let mut nodes = vec![module];
    if let Some(object) = object {
        nodes.push(object);
    }

    ExtractionResult {
        nodes,
        edges,
        text_units: vec![TextUnit {
            text: document.content.clone(),
            path: document.rel_path.clone(),
            locator: None,
            node_key: module_key,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_content_becomes_one_text_unit() {
        let document = LoadedDocument {
            path: std::path::PathBuf::from("Documents/Invoice/Help.txt"),
            rel_path: "Documents/Invoice/Help.txt".to_owned(),
            extension: ".txt".to_owned(),
            content: "Как провести документ.\n\nПодробности.".to_owned(),
        };
        let result = extract(&document);
        assert_eq!(result.text_units.len(), 1);
        let unit = &result.text_units[0];
        assert_eq!(unit.path, "Documents/Invoice/Help.txt");
        assert_eq!(unit.node_key.label, "Module");
        assert_eq!(unit.text, document.content);
        assert_eq!(result.nodes.len(), 2);
    }
}
