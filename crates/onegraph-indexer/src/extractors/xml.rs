//! XML extractors, dispatched by path prefix.
//!
//! `Roles/*` yields role/access-right subgraphs, `HTTPServices/*` yields
//! service/template/method subgraphs, `DocumentJournals/*` yields journal
//! membership, form XML yields a `Form` under its enclosing object, and
//! anything else becomes a bare `Document` node keyed by path. Malformed
//! XML fails the single file with a soft error.

use std::collections::HashSet;

use roxmltree::{Document, Node};
use serde_json::json;
use tracing::warn;

use onegraph_domain::entities::{ExtractionResult, GraphEdge, GraphNode, NodeKey, TextUnit};
use onegraph_domain::error::{Error, Result};
use onegraph_domain::stable_guid;

use super::{enclosing_object, file_stem, props, single_key};
use crate::loader::LoadedDocument;

/// Bilingual table of access right names.
const ACTION_TABLE: &[(&str, &str)] = &[
    ("Чтение", "Read"),
    ("Read", "Read"),
    ("Запись", "Write"),
    ("Write", "Write"),
    ("Добавление", "Insert"),
    ("Insert", "Insert"),
    ("Изменение", "Update"),
    ("Update", "Update"),
    ("Удаление", "Delete"),
    ("Delete", "Delete"),
    ("Проведение", "Post"),
    ("Post", "Post"),
    ("Просмотр", "View"),
    ("View", "View"),
    ("Редактирование", "Edit"),
    ("Edit", "Edit"),
    ("Использование", "Use"),
    ("Use", "Use"),
];

/// HTTP verbs admitted on URL templates.
const HTTP_VERBS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

/// Extract an XML document according to its path prefix.
///
/// # Errors
///
/// Returns [`Error::Extraction`] when the XML cannot be parsed; the
/// pipeline records this as a soft per-document error.
pub fn extract(document: &LoadedDocument) -> Result<ExtractionResult> {
    match document.rel_path.split('/').next().unwrap_or("") {
        "Roles" => extract_role(document),
        "HTTPServices" => extract_http_service(document),
        "DocumentJournals" => extract_journal(document),
        _ if is_form_xml(&document.rel_path) => extract_form(document),
        _ => Ok(extract_plain_document(document)),
    }
}

fn parse<'a>(document: &'a LoadedDocument) -> Result<Document<'a>> {
    Document::parse(&document.content).map_err(|e| Error::Extraction {
        message: format!("malformed XML: {e}"),
        path: document.rel_path.clone(),
    })
}

/// Whether a path points at a managed form definition.
fn is_form_xml(rel_path: &str) -> bool {
    let lower = rel_path.to_lowercase();
    lower.split('/').any(|segment| segment == "forms")
        || lower == "form.xml"
        || lower.ends_with("/form.xml")
}

fn element_text<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.text().map(str::trim).filter(|t| !t.is_empty())
}

fn first_descendant_text<'a>(scope: Node<'a, '_>, names: &[&str]) -> Option<&'a str> {
    scope
        .descendants()
        .filter(Node::is_element)
        .find(|n| names.contains(&n.tag_name().name()))
        .and_then(element_text)
}

fn truthy(text: Option<&str>) -> bool {
    text.is_some_and(|t| {
        let lower = t.trim().to_lowercase();
        lower == "true" || lower == "истина" || lower == "1"
    })
}

fn normalize_action(raw: &str) -> (String, Option<String>) {
    ACTION_TABLE
        .iter()
        .find(|(from, _)| *from == raw)
        .map_or_else(
            || ("Custom".to_owned(), Some(raw.to_owned())),
            |(_, to)| ((*to).to_owned(), None),
        )
}

/// `Roles/*`: one `AccessRight` per distinct grant tuple, linked to its
/// role and target object.
fn extract_role(document: &LoadedDocument) -> Result<ExtractionResult> {
    let tree = parse(document)?;
    let root = tree.root_element();

    let role_name = first_descendant_text(root, &["Name"])
        .map_or_else(|| file_stem(&document.rel_path), str::to_owned);

    let role = GraphNode::new(
        "Role",
        single_key("name", &role_name),
        props(vec![("name", json!(role_name))]),
    );
    let role_key = role.node_key();

    let mut result = ExtractionResult {
        nodes: vec![role],
        ..Default::default()
    };

    let mut objects_seen: HashSet<String> = HashSet::new();
    let mut grants_seen: HashSet<String> = HashSet::new();

    for entry in root
        .descendants()
        .filter(Node::is_element)
        .filter(|n| matches!(n.tag_name().name(), "ObjectRight" | "Rights"))
    {
        let Some(object_ref) = first_descendant_text(entry, &["Object", "MetadataObject"]) else {
            continue;
        };
        let condition = first_descendant_text(entry, &["Condition", "Filter", "Expression"]);

        let mut actions: Vec<(String, Option<String>)> = Vec::new();
        for child in entry.children().filter(Node::is_element) {
            let tag = child.tag_name().name();
            match tag {
                "Right" | "Value" => {
                    if let Some(raw) = element_text(child) {
                        actions.push(normalize_action(raw));
                    }
                }
                _ if ACTION_TABLE.iter().any(|(from, _)| *from == tag) => {
                    if truthy(child.text()) {
                        actions.push(normalize_action(tag));
                    }
                }
                _ => {}
            }
        }

        let object_key = ensure_object(&mut result, &mut objects_seen, object_ref);
        if !result
            .edges
            .iter()
            .any(|e| e.rel_type == "ROLE_HAS_ACCESS_TO" && e.end == object_key)
        {
            result.edges.push(GraphEdge::new(
                role_key.clone(),
                "ROLE_HAS_ACCESS_TO",
                object_key.clone(),
            ));
        }

        for (action, details) in actions {
            let seed = format!(
                "access_right:{role_name}|{object_ref}|{action}|{}|{}",
                condition.unwrap_or(""),
                details.as_deref().unwrap_or("")
            );
            if !grants_seen.insert(seed.clone()) {
                continue;
            }
            let guid = stable_guid(&seed);
            let mut right_props = props(vec![("guid", json!(guid)), ("action", json!(action))]);
            if let Some(condition) = condition {
                right_props.insert("condition".to_owned(), json!(condition));
            }
            if let Some(details) = &details {
                right_props.insert("details".to_owned(), json!(details));
            }
            let right = GraphNode::new("AccessRight", single_key("guid", &guid), right_props);
            let right_key = right.node_key();
            result.nodes.push(right);
            result
                .edges
                .push(GraphEdge::new(role_key.clone(), "GRANTS", right_key.clone()));
            result
                .edges
                .push(GraphEdge::new(right_key, "PERMITS", object_key.clone()));
        }
    }

    Ok(result)
}

/// Emit the referenced object once, returning its key.
fn ensure_object(
    result: &mut ExtractionResult,
    seen: &mut HashSet<String>,
    reference: &str,
) -> NodeKey {
    let mut object_props = props(vec![
        ("qualified_name", json!(reference)),
        ("name", json!(last_segment(reference))),
    ]);
    if let Some((object_type, _)) = reference.split_once('.') {
        object_props.insert("type".to_owned(), json!(object_type));
    }
    let node = GraphNode::new(
        "Object",
        single_key("qualified_name", reference),
        object_props,
    );
    let key = node.node_key();
    if seen.insert(reference.to_owned()) {
        result.nodes.push(node);
    }
    key
}

fn last_segment(reference: &str) -> &str {
    reference.rsplit('.').next().unwrap_or(reference)
}

/// `HTTPServices/*`: service, URL templates and admitted verbs.
fn extract_http_service(document: &LoadedDocument) -> Result<ExtractionResult> {
    let tree = parse(document)?;
    let root = tree.root_element();

    let service_name = first_descendant_text(root, &["Name"])
        .map_or_else(|| file_stem(&document.rel_path), str::to_owned);

    let service = GraphNode::new(
        "HTTPService",
        single_key("name", &service_name),
        props(vec![("name", json!(service_name))]),
    );
    let service_key = service.node_key();

    let configuration = GraphNode::new(
        "Configuration",
        single_key("name", "Configuration"),
        props(vec![("name", json!("Configuration"))]),
    );
    let configuration_key = configuration.node_key();

    let mut result = ExtractionResult {
        nodes: vec![service, configuration],
        edges: vec![GraphEdge::new(
            configuration_key,
            "HAS_HTTP_SERVICE",
            service_key.clone(),
        )],
        ..Default::default()
    };

    for template_node in root
        .descendants()
        .filter(Node::is_element)
        .filter(|n| n.tag_name().name() == "URLTemplate")
    {
        let template = first_descendant_text(template_node, &["Template"])
            .or_else(|| template_node.attribute("Template"))
            .or_else(|| {
                template_node
                    .children()
                    .filter(Node::is_element)
                    .find(|n| n.tag_name().name() == "Name")
                    .and_then(element_text)
            });
        let Some(template) = template else {
            continue;
        };

        let url_template = GraphNode::new(
            "URLTemplate",
            single_key("template", template),
            props(vec![("template", json!(template))]),
        );
        let template_key = url_template.node_key();
        result.nodes.push(url_template);
        result.edges.push(GraphEdge::new(
            service_key.clone(),
            "HAS_URL_TEMPLATE",
            template_key.clone(),
        ));

        for verb_node in template_node
            .descendants()
            .filter(Node::is_element)
            .filter(|n| matches!(n.tag_name().name(), "Method" | "HTTPMethod"))
        {
            let Some(raw) = element_text(verb_node) else {
                continue;
            };
            let verb = raw.to_uppercase();
            if !HTTP_VERBS.contains(&verb.as_str()) {
                warn!(
                    event = "http_verb_skipped",
                    path = %document.rel_path,
                    verb = %raw,
                );
                continue;
            }
            let guid = stable_guid(&format!("http_method:{service_name}:{template}:{verb}"));
            let method = GraphNode::new(
                "HTTPMethod",
                single_key("guid", &guid),
                props(vec![("guid", json!(guid)), ("name", json!(verb))]),
            );
            let method_key = method.node_key();
            result.nodes.push(method);
            result.edges.push(GraphEdge::new(
                template_key.clone(),
                "HAS_URL_METHOD",
                method_key,
            ));
        }
    }

    Ok(result)
}

/// `DocumentJournals/*`: journal membership, both directions.
fn extract_journal(document: &LoadedDocument) -> Result<ExtractionResult> {
    let tree = parse(document)?;
    let root = tree.root_element();

    let journal_name = first_descendant_text(root, &["Name"])
        .map_or_else(|| file_stem(&document.rel_path), str::to_owned);

    let journal = GraphNode::new(
        "DocumentJournal",
        single_key("name", &journal_name),
        props(vec![("name", json!(journal_name))]),
    );
    let journal_key = journal.node_key();

    let mut result = ExtractionResult {
        nodes: vec![journal],
        ..Default::default()
    };

    let mut seen: HashSet<String> = HashSet::new();
    for node in root
        .descendants()
        .filter(Node::is_element)
        .filter(|n| matches!(n.tag_name().name(), "RegisteredDocuments" | "Document"))
    {
        let Some(raw) = element_text(node) else {
            continue;
        };
        let qualified = if raw.contains('.') {
            raw.to_owned()
        } else {
            format!("Document.{raw}")
        };
        if !seen.insert(qualified.clone()) {
            continue;
        }
        let object = GraphNode::new(
            "Object",
            single_key("qualified_name", &qualified),
            props(vec![
                ("qualified_name", json!(qualified)),
                ("type", json!("Document")),
                ("name", json!(last_segment(&qualified))),
            ]),
        );
        let object_key = object.node_key();
        result.nodes.push(object);
        result.edges.push(GraphEdge::new(
            journal_key.clone(),
            "CONTAINS",
            object_key.clone(),
        ));
        result
            .edges
            .push(GraphEdge::new(object_key, "JOURNALED_IN", journal_key.clone()));
    }

    Ok(result)
}

/// Form XML under an enclosing object: `Object -HAS_FORM→ Form` with the
/// form body as a text unit. Without an enclosing object the file is not
/// a form and falls back to the bare document handling.
fn extract_form(document: &LoadedDocument) -> Result<ExtractionResult> {
    parse(document)?;
    let Some(object) = enclosing_object(document) else {
        return Ok(extract_plain_document(document));
    };

    let form_guid = stable_guid(&format!("{}:form", document.rel_path));
    let form = GraphNode::new(
        "Form",
        single_key("guid", &form_guid),
        props(vec![
            ("name", json!(form_name(&document.rel_path))),
            ("guid", json!(form_guid)),
        ]),
    );
    let form_key = form.node_key();
    let object_key = object.node_key();

    Ok(ExtractionResult {
        nodes: vec![object, form],
        edges: vec![GraphEdge::new(object_key, "HAS_FORM", form_key.clone())],
        text_units: vec![TextUnit {
            text: document.content.clone(),
            path: document.rel_path.clone(),
            locator: None,
            node_key: form_key,
        }],
    })
}

/// Human form name: the nearest ancestor directory that is not the
/// `Forms`/`Ext` scaffolding, else the file stem.
fn form_name(rel_path: &str) -> String {
    let segments: Vec<&str> = rel_path.split('/').collect();
    for segment in segments.iter().rev().skip(1) {
        let lower = segment.to_lowercase();
        if lower != "ext" && lower != "forms" {
            return (*segment).to_owned();
        }
    }
    file_stem(rel_path)
}

/// Any other XML: a bare `Document` node keyed by path.
fn extract_plain_document(document: &LoadedDocument) -> ExtractionResult {
    let node = GraphNode::new(
        "Document",
        single_key("path", &document.rel_path),
        props(vec![
            ("path", json!(document.rel_path)),
            ("name", json!(file_stem(&document.rel_path))),
        ]),
    );
    ExtractionResult {
        nodes: vec![node],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn doc(rel_path: &str, content: &str) -> LoadedDocument {
        LoadedDocument {
            path: std::path::PathBuf::from(rel_path),
            rel_path: rel_path.to_owned(),
            extension: ".xml".to_owned(),
            content: content.to_owned(),
        }
    }

    fn node<'a>(result: &'a ExtractionResult, label: &str) -> &'a GraphNode {
        result.nodes.iter().find(|n| n.label == label).unwrap()
    }

    #[test]
    fn role_grant_with_condition() {
        let result = extract(&doc(
            "Roles/Manager/Ext/Rights.xml",
            r"<Rights>
                <Name>Manager</Name>
                <ObjectRight>
                    <Object>Catalog.Contacts</Object>
                    <Condition>Владелец=&amp;Пользователь</Condition>
                    <Right>Чтение</Right>
                </ObjectRight>
            </Rights>",
        ))
        .unwrap();

        assert_eq!(node(&result, "Role").key["name"], "Manager");
        assert_eq!(node(&result, "Object").key["qualified_name"], "Catalog.Contacts");

        let right = node(&result, "AccessRight");
        assert_eq!(right.properties["action"], json!("Read"));
        assert_eq!(right.properties["condition"], json!("Владелец=&Пользователь"));

        let types: Vec<&str> = result.edges.iter().map(|e| e.rel_type.as_str()).collect();
        assert_eq!(types, ["ROLE_HAS_ACCESS_TO", "GRANTS", "PERMITS"]);
    }

    #[test]
    fn role_flag_style_rights_and_custom_action() {
        let result = extract(&doc(
            "Roles/Admin/Rights.xml",
            r"<Rights>
                <ObjectRight>
                    <Object>Document.Invoice</Object>
                    <Запись>true</Запись>
                    <Right>ЧтоТоНеизвестное</Right>
                </ObjectRight>
            </Rights>",
        ))
        .unwrap();

        let rights: Vec<&GraphNode> = result
            .nodes
            .iter()
            .filter(|n| n.label == "AccessRight")
            .collect();
        assert_eq!(rights.len(), 2);
        let actions: Vec<&Value> = rights.iter().map(|n| &n.properties["action"]).collect();
        assert!(actions.contains(&&json!("Write")));
        assert!(actions.contains(&&json!("Custom")));
        let custom = rights
            .iter()
            .find(|n| n.properties["action"] == json!("Custom"))
            .unwrap();
        assert_eq!(custom.properties["details"], json!("ЧтоТоНеизвестное"));
    }

    #[test]
    fn duplicate_grants_collapse() {
        let result = extract(&doc(
            "Roles/Admin/Rights.xml",
            r"<Rights>
                <ObjectRight>
                    <Object>Catalog.Goods</Object>
                    <Right>Чтение</Right>
                    <Right>Чтение</Right>
                </ObjectRight>
            </Rights>",
        ))
        .unwrap();
        let rights = result.nodes.iter().filter(|n| n.label == "AccessRight").count();
        assert_eq!(rights, 1);
    }

    #[test]
    fn http_service_with_templates_and_verbs() {
        let result = extract(&doc(
            "HTTPServices/Api/Ext/Module.xml",
            r"<HTTPService>
                <Name>Api</Name>
                <URLTemplate>
                    <Template>/orders/{id}</Template>
                    <Method><HTTPMethod>get</HTTPMethod></Method>
                    <Method><HTTPMethod>TRACE</HTTPMethod></Method>
                </URLTemplate>
            </HTTPService>",
        ))
        .unwrap();

        assert_eq!(node(&result, "HTTPService").key["name"], "Api");
        assert_eq!(node(&result, "URLTemplate").key["template"], "/orders/{id}");
        let methods: Vec<&GraphNode> = result
            .nodes
            .iter()
            .filter(|n| n.label == "HTTPMethod")
            .collect();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].properties["name"], json!("GET"));

        let types: Vec<&str> = result.edges.iter().map(|e| e.rel_type.as_str()).collect();
        assert!(types.contains(&"HAS_HTTP_SERVICE"));
        assert!(types.contains(&"HAS_URL_TEMPLATE"));
        assert!(types.contains(&"HAS_URL_METHOD"));
    }

    #[test]
    fn journal_membership_is_bidirectional() {
        let result = extract(&doc(
            "DocumentJournals/Sales/Journal.xml",
            r"<DocumentJournal>
                <Name>Sales</Name>
                <RegisteredDocuments>Document.Invoice</RegisteredDocuments>
                <RegisteredDocuments>Shipment</RegisteredDocuments>
            </DocumentJournal>",
        ))
        .unwrap();

        let objects: Vec<&str> = result
            .nodes
            .iter()
            .filter(|n| n.label == "Object")
            .map(|n| n.key["qualified_name"].as_str())
            .collect();
        assert_eq!(objects, ["Document.Invoice", "Document.Shipment"]);

        let contains = result.edges.iter().filter(|e| e.rel_type == "CONTAINS").count();
        let journaled = result
            .edges
            .iter()
            .filter(|e| e.rel_type == "JOURNALED_IN")
            .count();
        assert_eq!((contains, journaled), (2, 2));
    }

    #[test]
    fn form_xml_binds_text_to_form() {
        let result = extract(&doc(
            "Catalogs/Contacts/Forms/ItemForm/Ext/Form.xml",
            "<Form><Title>Item</Title></Form>",
        ))
        .unwrap();

        let form = node(&result, "Form");
        assert_eq!(form.properties["name"], json!("ItemForm"));
        let edge = &result.edges[0];
        assert_eq!(edge.rel_type, "HAS_FORM");
        assert_eq!(edge.start.label, "Object");
        assert_eq!(result.text_units.len(), 1);
        assert_eq!(result.text_units[0].node_key, form.node_key());
    }

    #[test]
    fn other_xml_is_a_bare_document() {
        let result = extract(&doc(
            "Configuration.xml",
            "<MetaDataObject><Name>Base</Name></MetaDataObject>",
        ))
        .unwrap();
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(node(&result, "Document").key["path"], "Configuration.xml");
        assert!(result.text_units.is_empty());
    }

    #[test]
    fn malformed_xml_is_a_soft_error() {
        let err = extract(&doc("Roles/Broken/Rights.xml", "<Rights><unclosed")).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
        assert!(!err.is_transient());
    }
}
