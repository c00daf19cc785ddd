//! Ontology loading and extraction validation.
//!
//! The ontology is a static JSON declaration of node labels with
//! required/allowed property names, an allow-list of relationship types
//! and three `additional_*` escape hatches. It is loaded once per
//! pipeline and enforced against every extraction; violations are fatal
//! to the job.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{error, info, warn};

use onegraph_domain::entities::{ExtractionResult, GraphEdge, GraphNode, TextUnit};
use onegraph_domain::error::{Error, Result};

/// Default ontology shipped with the repository.
pub const DEFAULT_SCHEMA_PATH: &str = "schema/ontology_1c.json";
/// Default optional YAML pointer file naming the ontology.
pub const DEFAULT_CONFIG_PATH: &str = "schema/kg_1c.yaml";

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct PropertyDef {
    name: String,
    #[serde(default)]
    required: bool,
}

#[derive(Debug, Deserialize)]
struct NodeTypeDef {
    label: String,
    #[serde(default)]
    properties: Vec<PropertyDef>,
}

#[derive(Debug, Deserialize)]
struct OntologyDef {
    node_types: Vec<NodeTypeDef>,
    #[serde(default)]
    relationship_types: Vec<String>,
    #[serde(default = "default_true")]
    additional_node_types: bool,
    #[serde(default = "default_true")]
    additional_relationship_types: bool,
    #[serde(default = "default_true")]
    additional_properties_allowed: bool,
}

#[derive(Debug)]
struct NodeSpec {
    required: HashSet<String>,
    allowed: HashSet<String>,
}

/// Validates extraction output against the ontology contract.
#[derive(Debug)]
pub struct SchemaValidator {
    specs: HashMap<String, NodeSpec>,
    relationships: HashSet<String>,
    additional_node_types: bool,
    additional_relationship_types: bool,
    additional_properties_allowed: bool,
}

impl SchemaValidator {
    /// Load the ontology from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file is missing or not a valid ontology
    /// document.
    pub fn load(schema_path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(schema_path)?;
        let def: OntologyDef = serde_json::from_str(&raw)?;

        let mut specs = HashMap::new();
        for node in def.node_types {
            let allowed: HashSet<String> =
                node.properties.iter().map(|p| p.name.clone()).collect();
            let required: HashSet<String> = node
                .properties
                .iter()
                .filter(|p| p.required)
                .map(|p| p.name.clone())
                .collect();
            specs.insert(node.label, NodeSpec { required, allowed });
        }

        Ok(Self {
            specs,
            relationships: def.relationship_types.into_iter().collect(),
            additional_node_types: def.additional_node_types,
            additional_relationship_types: def.additional_relationship_types,
            additional_properties_allowed: def.additional_properties_allowed,
        })
    }

    /// Resolve the ontology location and load it.
    ///
    /// Resolution order: a YAML config naming the schema file, an explicit
    /// schema path, then the shipped default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigMissing`] when no candidate file exists.
    pub fn from_config(config_path: Option<&Path>, schema_path: Option<&Path>) -> Result<Self> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let resolved = if config_path.exists() {
            schema_path_from_yaml(&config_path)
        } else {
            info!(
                event = "schema_config_missing",
                path = %config_path.display(),
            );
            None
        };

        let resolved = resolved.unwrap_or_else(|| {
            schema_path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_PATH))
        });

        if !resolved.exists() {
            return Err(Error::ConfigMissing(format!(
                "ontology schema not found: {}",
                resolved.display()
            )));
        }
        Self::load(&resolved)
    }

    /// Validate one extraction against the ontology.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaValidation`] on the first violation; the
    /// pipeline treats this as fatal.
    pub fn validate(&self, extraction: &ExtractionResult, source: &str) -> Result<()> {
        for node in &extraction.nodes {
            self.validate_node(node, source)?;
        }
        for edge in &extraction.edges {
            self.validate_edge(edge, source)?;
        }
        for unit in &extraction.text_units {
            self.validate_text_unit(unit, source)?;
        }
        Ok(())
    }

    fn validate_node(&self, node: &GraphNode, source: &str) -> Result<()> {
        let Some(spec) = self.specs.get(&node.label) else {
            if self.additional_node_types {
                return Ok(());
            }
            return fail(format!("unknown node label '{}'", node.label), source);
        };

        if !self.additional_properties_allowed {
            let mut unknown: Vec<&str> = node
                .properties
                .keys()
                .filter(|name| !spec.allowed.contains(*name))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                unknown.sort_unstable();
                return fail(
                    format!(
                        "node '{}' contains unsupported properties: {unknown:?}",
                        node.label
                    ),
                    source,
                );
            }
        }

        let mut missing: Vec<&str> = spec
            .required
            .iter()
            .filter(|name| {
                match node.properties.get(*name) {
                    None => true,
                    Some(value) => value.is_null() || value.as_str() == Some(""),
                }
            })
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            return fail(
                format!("node '{}' missing required properties: {missing:?}", node.label),
                source,
            );
        }
        Ok(())
    }

    fn validate_edge(&self, edge: &GraphEdge, source: &str) -> Result<()> {
        if edge.start.label.is_empty()
            || edge.start.key.is_empty()
            || edge.end.label.is_empty()
            || edge.end.key.is_empty()
        {
            return fail(
                format!("edge '{}' must have start and end node keys", edge.rel_type),
                source,
            );
        }
        if !self.relationships.contains(&edge.rel_type) && !self.additional_relationship_types {
            return fail(
                format!("unknown relationship type '{}'", edge.rel_type),
                source,
            );
        }
        Ok(())
    }

    fn validate_text_unit(&self, unit: &TextUnit, source: &str) -> Result<()> {
        if unit.path.trim().is_empty() {
            return fail(
                format!(
                    "text unit for '{}' missing required file path",
                    unit.node_key.label
                ),
                source,
            );
        }
        Ok(())
    }
}

fn fail(message: String, source: &str) -> Result<()> {
    error!(
        event = "schema_validation_failed",
        message = %message,
        source = %source,
    );
    Err(Error::schema_validation(message, Some(source)))
}

/// The YAML pointer file naming the ontology schema.
#[derive(Debug, Deserialize)]
struct SchemaPointer {
    #[serde(default)]
    schema: Option<PathBuf>,
}

/// Resolve the `schema:` entry of the YAML pointer file.
///
/// Paths are resolved relative to the config file; a present config with
/// no usable entry points at the sibling default schema name.
fn schema_path_from_yaml(config_path: &Path) -> Option<PathBuf> {
    let parent = config_path.parent().unwrap_or_else(|| Path::new("."));
    let raw = std::fs::read_to_string(config_path).ok()?;
    let pointer = match serde_yaml::from_str::<SchemaPointer>(&raw) {
        Ok(pointer) => pointer,
        Err(err) => {
            warn!(
                event = "schema_config_unparseable",
                path = %config_path.display(),
                error = %err,
            );
            return Some(parent.join("ontology_1c.json"));
        }
    };
    match pointer.schema {
        Some(schema) => Some(parent.join(schema)),
        None => {
            warn!(
                event = "schema_config_incomplete",
                path = %config_path.display(),
            );
            Some(parent.join("ontology_1c.json"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onegraph_domain::entities::NodeKey;
    use serde_json::{Value, json};
    use std::collections::BTreeMap;

    const ONTOLOGY: &str = r#"{
        "node_types": [
            {"label": "Module", "properties": [
                {"name": "guid", "required": true},
                {"name": "name", "required": true},
                {"name": "kind"},
                {"name": "path"}
            ]}
        ],
        "relationship_types": ["HAS_ROUTINE"],
        "additional_node_types": true,
        "additional_relationship_types": false,
        "additional_properties_allowed": false
    }"#;

    fn validator(raw: &str) -> SchemaValidator {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ontology.json");
        std::fs::write(&path, raw).unwrap();
        SchemaValidator::load(&path).unwrap()
    }

    fn module_node(properties: BTreeMap<String, Value>) -> GraphNode {
        let mut key = BTreeMap::new();
        key.insert("guid".to_owned(), "g1".to_owned());
        GraphNode::new("Module", key, properties)
    }

    fn extraction(node: GraphNode) -> ExtractionResult {
        ExtractionResult {
            nodes: vec![node],
            ..Default::default()
        }
    }

    #[test]
    fn valid_node_passes() {
        let v = validator(ONTOLOGY);
        let node = module_node(
            [("guid".to_owned(), json!("g1")), ("name".to_owned(), json!("M"))].into(),
        );
        assert!(v.validate(&extraction(node), "m.bsl").is_ok());
    }

    #[test]
    fn missing_required_property_fails() {
        let v = validator(ONTOLOGY);
        let node = module_node([("guid".to_owned(), json!("g1"))].into());
        let err = v.validate(&extraction(node), "m.bsl").unwrap_err();
        assert!(matches!(err, Error::SchemaValidation { .. }));
    }

    #[test]
    fn empty_string_required_property_fails() {
        let v = validator(ONTOLOGY);
        let node = module_node(
            [("guid".to_owned(), json!("g1")), ("name".to_owned(), json!(""))].into(),
        );
        assert!(v.validate(&extraction(node), "m.bsl").is_err());
    }

    #[test]
    fn unknown_property_fails_when_disallowed() {
        let v = validator(ONTOLOGY);
        let node = module_node(
            [
                ("guid".to_owned(), json!("g1")),
                ("name".to_owned(), json!("M")),
                ("surprise".to_owned(), json!(1)),
            ]
            .into(),
        );
        assert!(v.validate(&extraction(node), "m.bsl").is_err());
    }

    #[test]
    fn unknown_label_allowed_by_flag() {
        let v = validator(ONTOLOGY);
        let mut key = BTreeMap::new();
        key.insert("name".to_owned(), "R".to_owned());
        let node = GraphNode::new("Role", key, BTreeMap::new());
        assert!(v.validate(&extraction(node), "r.xml").is_ok());
    }

    #[test]
    fn unknown_relationship_fails_when_disallowed() {
        let v = validator(ONTOLOGY);
        let mut key = BTreeMap::new();
        key.insert("guid".to_owned(), "g".to_owned());
        let a = NodeKey::new("Module", &key);
        let b = NodeKey::new("Routine", &key);
        let result = ExtractionResult {
            edges: vec![GraphEdge::new(a, "MADE_UP", b)],
            ..Default::default()
        };
        assert!(v.validate(&result, "m.bsl").is_err());
    }

    #[test]
    fn edge_without_endpoint_keys_fails() {
        let v = validator(ONTOLOGY);
        let empty = NodeKey {
            label: "Module".to_owned(),
            key: Vec::new(),
        };
        let mut key = BTreeMap::new();
        key.insert("guid".to_owned(), "g".to_owned());
        let other = NodeKey::new("Routine", &key);
        let result = ExtractionResult {
            edges: vec![GraphEdge::new(empty, "HAS_ROUTINE", other)],
            ..Default::default()
        };
        assert!(v.validate(&result, "m.bsl").is_err());
    }

    #[test]
    fn empty_text_unit_path_fails() {
        let v = validator(ONTOLOGY);
        let mut key = BTreeMap::new();
        key.insert("guid".to_owned(), "g".to_owned());
        let result = ExtractionResult {
            text_units: vec![TextUnit {
                text: "body".to_owned(),
                path: "  ".to_owned(),
                locator: None,
                node_key: NodeKey::new("Routine", &key),
            }],
            ..Default::default()
        };
        assert!(v.validate(&result, "m.bsl").is_err());
    }

    #[test]
    fn yaml_pointer_resolves_relative_schema() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kg.yaml"), "schema: custom.json\n").unwrap();
        std::fs::write(dir.path().join("custom.json"), ONTOLOGY).unwrap();
        let v = SchemaValidator::from_config(Some(&dir.path().join("kg.yaml")), None).unwrap();
        assert!(!v.additional_relationship_types);
    }

    #[test]
    fn yaml_pointer_tolerates_comments_and_extra_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("kg.yaml"),
            "version: 2\nschema: \"custom.json\"  # ontology contract\nlabels:\n  - Module\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("custom.json"), ONTOLOGY).unwrap();
        let v = SchemaValidator::from_config(Some(&dir.path().join("kg.yaml")), None).unwrap();
        assert!(!v.additional_relationship_types);
    }

    #[test]
    fn yaml_pointer_without_schema_entry_uses_the_sibling_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kg.yaml"), "version: 2\n").unwrap();
        std::fs::write(dir.path().join("ontology_1c.json"), ONTOLOGY).unwrap();
        let v = SchemaValidator::from_config(Some(&dir.path().join("kg.yaml")), None).unwrap();
        assert!(!v.additional_relationship_types);
    }

    #[test]
    fn missing_everything_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SchemaValidator::from_config(
            Some(&dir.path().join("absent.yaml")),
            Some(&dir.path().join("absent.json")),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ConfigMissing(_)));
    }
}
