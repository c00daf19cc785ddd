//! Property-graph entities produced by the extractors.
//!
//! Nodes and edges are identified by [`NodeKey`] values, never by object
//! identity: accumulators index by key, references between nodes go
//! through keys, and dedup falls out of key equality.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical identity of a graph node, independent of its properties.
///
/// Two nodes are the same iff their `NodeKey`s are equal. Key fields are
/// kept sorted by name so equality does not depend on insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    /// Node label, e.g. `Module` or `Object`.
    pub label: String,
    /// Sorted `(field, value)` pairs forming the identity.
    pub key: Vec<(String, String)>,
}

impl NodeKey {
    /// Build a key from a label and key-field map.
    #[must_use]
    pub fn new(label: impl Into<String>, key_fields: &BTreeMap<String, String>) -> Self {
        Self {
            label: label.into(),
            key: key_fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// The key fields as a map.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.key.iter().cloned().collect()
    }

    /// Canonical `field=value` rendering in sorted field order.
    ///
    /// Used inside guid seeds; stable across runs by construction.
    #[must_use]
    pub fn canonical_key(&self) -> String {
        self.key
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// `label|field=value|...` rendering used to correlate upsert rows
    /// with the element ids the graph store returns.
    #[must_use]
    pub fn key_hash(&self) -> String {
        let mut out = self.label.clone();
        for (k, v) in &self.key {
            out.push('|');
            out.push_str(k);
            out.push('=');
            out.push_str(v);
        }
        out
    }
}

/// A node extracted from a source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Node label.
    pub label: String,
    /// Identity fields, a subset of the properties.
    pub key: BTreeMap<String, String>,
    /// Property map. `Value::Null` entries never overwrite on merge.
    pub properties: BTreeMap<String, Value>,
}

impl GraphNode {
    /// Construct a node from its label, key fields and properties.
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        key: BTreeMap<String, String>,
        properties: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            label: label.into(),
            key,
            properties,
        }
    }

    /// The canonical identity of this node.
    #[must_use]
    pub fn node_key(&self) -> NodeKey {
        NodeKey::new(self.label.clone(), &self.key)
    }

    /// Merge a later occurrence of the same node into this one.
    ///
    /// Every non-null property of `other` overwrites; null values never do.
    pub fn merge_from(&mut self, other: GraphNode) {
        for (name, value) in other.properties {
            if !value.is_null() {
                self.properties.insert(name, value);
            }
        }
    }
}

/// A directed edge between two node keys.
///
/// Edge identity is the `(start, type, end)` triple; properties of the
/// first observed occurrence win on collision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Start node identity.
    pub start: NodeKey,
    /// Relationship type, e.g. `HAS_ROUTINE`.
    #[serde(rename = "type")]
    pub rel_type: String,
    /// End node identity.
    pub end: NodeKey,
    /// Edge property map.
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl GraphEdge {
    /// Construct an edge with no properties.
    #[must_use]
    pub fn new(start: NodeKey, rel_type: impl Into<String>, end: NodeKey) -> Self {
        Self {
            start,
            rel_type: rel_type.into(),
            end,
            properties: BTreeMap::new(),
        }
    }

    /// The `(start, type, end)` identity triple.
    #[must_use]
    pub fn identity(&self) -> (NodeKey, String, NodeKey) {
        (self.start.clone(), self.rel_type.clone(), self.end.clone())
    }
}

/// A body of text attributable to exactly one node, the chunker input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextUnit {
    /// The text body.
    pub text: String,
    /// Source path or signature the text came from. Never empty.
    pub path: String,
    /// Optional finer-grained locator within the source.
    pub locator: Option<String>,
    /// The node this text belongs to.
    pub node_key: NodeKey,
}

/// Output of one extractor invocation over one document.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    /// Extracted nodes, possibly with duplicates across documents.
    pub nodes: Vec<GraphNode>,
    /// Extracted edges.
    pub edges: Vec<GraphEdge>,
    /// Text units for the vector corpus.
    pub text_units: Vec<TextUnit>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn node_key_independent_of_insertion_order() {
        let mut a = BTreeMap::new();
        a.insert("b".to_owned(), "2".to_owned());
        a.insert("a".to_owned(), "1".to_owned());
        let mut b = BTreeMap::new();
        b.insert("a".to_owned(), "1".to_owned());
        b.insert("b".to_owned(), "2".to_owned());
        assert_eq!(NodeKey::new("X", &a), NodeKey::new("X", &b));
        assert_eq!(NodeKey::new("X", &a).canonical_key(), "a=1;b=2");
    }

    #[test]
    fn node_key_distinguishes_labels() {
        let k = key(&[("guid", "g1")]);
        assert_ne!(NodeKey::new("Module", &k), NodeKey::new("Form", &k));
    }

    #[test]
    fn merge_keeps_non_null_and_overwrites_later() {
        let mut first = GraphNode::new(
            "Object",
            key(&[("qualified_name", "Catalogs.Contacts")]),
            [
                ("name".to_owned(), json!("Contacts")),
                ("path".to_owned(), json!("Catalogs/Contacts/a.bsl")),
            ]
            .into(),
        );
        let second = GraphNode::new(
            "Object",
            key(&[("qualified_name", "Catalogs.Contacts")]),
            [
                ("name".to_owned(), json!("Contacts2")),
                ("path".to_owned(), Value::Null),
                ("type".to_owned(), json!("Catalog")),
            ]
            .into(),
        );
        first.merge_from(second);
        assert_eq!(first.properties["name"], json!("Contacts2"));
        assert_eq!(first.properties["path"], json!("Catalogs/Contacts/a.bsl"));
        assert_eq!(first.properties["type"], json!("Catalog"));
    }

    #[test]
    fn key_hash_is_label_prefixed() {
        let k = NodeKey::new("Module", &key(&[("guid", "g1")]));
        assert_eq!(k.key_hash(), "Module|guid=g1");
    }
}
