//! .bsl source extractor: a line-oriented routine scanner.
//!
//! Recognises bilingual routine declarations, buffers `&` compiler
//! directives for the following routine, and derives CALLS, register
//! access and object reference edges from the collected bodies.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use onegraph_domain::entities::{ExtractionResult, GraphEdge, GraphNode, NodeKey, TextUnit};
use onegraph_domain::stable_guid;

use super::{CommonPrefix, build_object_and_module, props, single_key};
use crate::loader::LoadedDocument;

static ROUTINE_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:Процедура|Функция|Procedure|Function)\s+([A-Za-zА-Яа-я_]\w*)\s*\((.*?)\)\s*(.*)$")
        .unwrap()
});
static ROUTINE_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:КонецПроцедуры|КонецФункции|EndProcedure|EndFunction)").unwrap()
});
static CALL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([\p{L}_]\w*)\s*\(").unwrap());
static REGISTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(РегистрыНакопления|РегистрыСведений)\.(\w+)").unwrap());
static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(Документ|Справочник|ПланОбмена|ПланВидовХарактеристик)\.(\w+)").unwrap()
});

/// Compiler directives mapped to the execution side of a routine.
const EXEC_SIDE_DIRECTIVES: &[(&str, &str)] = &[
    ("НаКлиенте", "Client"),
    ("НаСервере", "Server"),
    ("НаСервереБезКонтекста", "Server"),
    ("НаКлиентеНаСервереБезКонтекста", "ClientServer"),
    ("НаКлиентеНаСервере", "ClientServer"),
];

/// Language keywords that look like calls but never are.
const RESERVED_CALL_NAMES: &[&str] = &[
    "Если",
    "Тогда",
    "Иначе",
    "КонецЕсли",
    "Для",
    "Каждого",
    "Цикл",
    "КонецЦикла",
    "Попытка",
    "Исключение",
    "КонецПопытки",
    "Возврат",
    "Продолжить",
    "Прервать",
];

const REGISTER_PREFIXES: &[(&str, &str)] = &[
    ("РегистрыНакопления", "AccumulationRegister"),
    ("РегистрыСведений", "InformationRegister"),
];

const REFERENCE_PREFIXES: &[(&str, &str)] = &[
    ("Документ", "Document"),
    ("Справочник", "Catalog"),
    ("ПланОбмена", "ExchangePlan"),
    ("ПланВидовХарактеристик", "ChartOfCharacteristicTypes"),
];

/// Tokens that classify a register access as a write within the window.
const WRITE_MARKERS: &[&str] = &["Записать", "Запись", "ДобавитьДвижения", "Write", "Post"];

/// Characters inspected on each side of a register hit.
const CLASSIFY_WINDOW: usize = 200;

struct OpenRoutine {
    name: String,
    signature: String,
    export: bool,
    exec_side: &'static str,
    lines: Vec<String>,
}

/// Extract routines, calls, register accesses and references.
#[must_use]
pub fn extract(document: &LoadedDocument) -> ExtractionResult {
    let CommonPrefix {
        module,
        module_key,
        object,
        edges,
    } = build_object_and_module(document);

    let mut result = ExtractionResult {
        nodes: vec![module],
        edges,
        text_units: Vec::new(),
    };
    let object_node = object.clone();
    if let Some(object) = object {
        result.nodes.push(object);
    }

    // Per-invocation scanner state; bodies are owned by this call only.
    let mut directives: Vec<String> = Vec::new();
    let mut routine_order: Vec<(String, NodeKey)> = Vec::new();
    let mut routine_lookup: HashMap<String, NodeKey> = HashMap::new();
    let mut bodies: HashMap<NodeKey, String> = HashMap::new();
    let mut open: Option<OpenRoutine> = None;

    for line in document.content.lines() {
        let stripped = line.trim();

        if let Some(directive) = stripped.strip_prefix('&') {
            directives.push(directive.to_owned());
            continue;
        }

        if let Some(captures) = ROUTINE_START.captures(stripped) {
            if let Some(previous) = open.take() {
                finalize_routine(
                    &mut result,
                    &module_key,
                    previous,
                    &mut routine_order,
                    &mut routine_lookup,
                    &mut bodies,
                );
            }
            let name = captures[1].to_owned();
            let params = captures[2].trim();
            let tail = captures[3].to_lowercase();
            open = Some(OpenRoutine {
                signature: format!("{name}({params})"),
                export: tail.contains("экспорт") || tail.contains("export"),
                exec_side: determine_exec_side(&directives),
                name,
                lines: Vec::new(),
            });
            directives.clear();
            continue;
        }

        if ROUTINE_END.is_match(stripped) {
            if let Some(finished) = open.take() {
                finalize_routine(
                    &mut result,
                    &module_key,
                    finished,
                    &mut routine_order,
                    &mut routine_lookup,
                    &mut bodies,
                );
            }
            directives.clear();
            continue;
        }

        if let Some(open) = open.as_mut() {
            open.lines.push(line.to_owned());
        }
    }

    if let Some(unterminated) = open.take() {
        finalize_routine(
            &mut result,
            &module_key,
            unterminated,
            &mut routine_order,
            &mut routine_lookup,
            &mut bodies,
        );
    }

    derive_body_relations(
        &mut result,
        &module_key,
        object_node.as_ref(),
        &routine_order,
        &routine_lookup,
        &bodies,
    );

    result
}

fn finalize_routine(
    result: &mut ExtractionResult,
    module_key: &NodeKey,
    routine: OpenRoutine,
    routine_order: &mut Vec<(String, NodeKey)>,
    routine_lookup: &mut HashMap<String, NodeKey>,
    bodies: &mut HashMap<NodeKey, String>,
) {
    let guid = stable_guid(&format!(
        "{}:{}:{}",
        module_key.label,
        module_key.canonical_key(),
        routine.name
    ));
    let node = GraphNode::new(
        "Routine",
        single_key("guid", &guid),
        props(vec![
            ("name", json!(routine.name)),
            ("signature", json!(routine.signature)),
            ("export", json!(routine.export)),
            ("exec_side", json!(routine.exec_side)),
            ("guid", json!(guid)),
        ]),
    );
    let key = node.node_key();
    result.nodes.push(node);
    result
        .edges
        .push(GraphEdge::new(module_key.clone(), "HAS_ROUTINE", key.clone()));

    let body = routine.lines.join("\n");
    // Empty-bodied routines stay retrievable through their signature.
    let unit_text = if body.trim().is_empty() {
        routine.signature.clone()
    } else {
        body.clone()
    };
    result.text_units.push(TextUnit {
        text: unit_text,
        path: if routine.signature.is_empty() {
            routine.name.clone()
        } else {
            routine.signature.clone()
        },
        locator: None,
        node_key: key.clone(),
    });

    routine_order.push((routine.name.clone(), key.clone()));
    routine_lookup.insert(routine.name, key.clone());
    bodies.insert(key, body);
}

fn determine_exec_side(directives: &[String]) -> &'static str {
    for directive in directives {
        let clean = directive.trim();
        if !clean.starts_with("На") {
            continue;
        }
        let name = clean.replace("Диалог", "").replace("()", "");
        if let Some((_, side)) = EXEC_SIDE_DIRECTIVES.iter().find(|(d, _)| *d == name) {
            return side;
        }
    }
    "Unknown"
}

/// Derive CALLS, register and reference edges from the collected bodies.
fn derive_body_relations(
    result: &mut ExtractionResult,
    module_key: &NodeKey,
    object: Option<&GraphNode>,
    routine_order: &[(String, NodeKey)],
    routine_lookup: &HashMap<String, NodeKey>,
    bodies: &HashMap<NodeKey, String>,
) {
    let object_is_document = object
        .is_some_and(|node| node.properties.get("type") == Some(&json!("Document")));

    let mut registers_seen: HashSet<(String, String)> = HashSet::new();
    let mut register_edges_seen: HashSet<(String, String, &'static str)> = HashSet::new();
    let mut movements_seen: HashSet<(String, String)> = HashSet::new();

    for (_, routine_key) in routine_order {
        let Some(body) = bodies.get(routine_key).filter(|body| !body.is_empty()) else {
            continue;
        };

        for captures in CALL.captures_iter(body) {
            let candidate = &captures[1];
            if RESERVED_CALL_NAMES.contains(&candidate) {
                continue;
            }
            if let Some(target) = routine_lookup.get(candidate) {
                result
                    .edges
                    .push(GraphEdge::new(routine_key.clone(), "CALLS", target.clone()));
            }
        }

        for captures in REGISTER.captures_iter(body) {
            let prefix = &captures[1];
            let name = captures[2].to_owned();
            let Some((_, label)) = REGISTER_PREFIXES.iter().find(|(p, _)| *p == prefix) else {
                continue;
            };
            let hit = captures.get(0).map_or((0, 0), |m| (m.start(), m.end()));
            let window = window_around(body, hit.0, hit.1, CLASSIFY_WINDOW);
            let direction = if WRITE_MARKERS.iter().any(|marker| window.contains(marker)) {
                "WRITES_TO"
            } else {
                "READS_FROM"
            };

            let guid = stable_guid(&format!("{label}:{name}"));
            let register_key = NodeKey::new(*label, &single_key("guid", &guid));
            if registers_seen.insert(((*label).to_owned(), name.clone())) {
                result.nodes.push(GraphNode::new(
                    *label,
                    single_key("guid", &guid),
                    props(vec![("name", json!(name)), ("guid", json!(guid))]),
                ));
            }
            if register_edges_seen.insert(((*label).to_owned(), name.clone(), direction)) {
                result.edges.push(GraphEdge::new(
                    module_key.clone(),
                    direction,
                    register_key.clone(),
                ));
            }
            if object_is_document
                && *label == "AccumulationRegister"
                && movements_seen.insert(((*label).to_owned(), name.clone()))
            {
                if let Some(object) = object {
                    result.edges.push(GraphEdge::new(
                        object.node_key(),
                        "MAKES_MOVEMENTS_IN",
                        register_key,
                    ));
                }
            }
        }

        for captures in REFERENCE.captures_iter(body) {
            let prefix = &captures[1];
            let name = &captures[2];
            let Some((_, label)) = REFERENCE_PREFIXES.iter().find(|(p, _)| *p == prefix) else {
                continue;
            };
            let qualified_name = format!("{label}.{name}");
            let node = GraphNode::new(
                "Object",
                single_key("qualified_name", &qualified_name),
                props(vec![
                    ("qualified_name", json!(qualified_name)),
                    ("type", json!(label)),
                    ("name", json!(name)),
                ]),
            );
            let target = node.node_key();
            result.nodes.push(node);
            result
                .edges
                .push(GraphEdge::new(routine_key.clone(), "REFERENCES", target));
        }
    }
}

/// Slice `radius` characters around a byte range, char-boundary safe.
fn window_around(body: &str, start: usize, end: usize, radius: usize) -> &str {
    let mut begin = start;
    for _ in 0..radius {
        match body[..begin].chars().next_back() {
            Some(c) => begin -= c.len_utf8(),
            None => break,
        }
    }
    let mut stop = end;
    let mut ahead = body[stop..].chars();
    for _ in 0..radius {
        match ahead.next() {
            Some(c) => stop += c.len_utf8(),
            None => break,
        }
    }
    &body[begin..stop]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(rel_path: &str, content: &str) -> LoadedDocument {
        LoadedDocument {
            path: std::path::PathBuf::from(rel_path),
            rel_path: rel_path.to_owned(),
            extension: ".bsl".to_owned(),
            content: content.to_owned(),
        }
    }

    fn edge_types(result: &ExtractionResult) -> Vec<&str> {
        result.edges.iter().map(|e| e.rel_type.as_str()).collect()
    }

    fn routine<'a>(result: &'a ExtractionResult, name: &str) -> &'a GraphNode {
        result
            .nodes
            .iter()
            .find(|n| n.label == "Routine" && n.properties["name"] == json!(name))
            .unwrap()
    }

    #[test]
    fn exported_procedure_in_catalog_module() {
        let result = extract(&doc(
            "Catalogs/Contacts/ObjectModule.bsl",
            "Процедура Hello() Экспорт\nКонецПроцедуры\n",
        ));

        let labels: Vec<&str> = result.nodes.iter().map(|n| n.label.as_str()).collect();
        assert!(labels.contains(&"Object"));
        assert!(labels.contains(&"Module"));
        assert!(labels.contains(&"Routine"));

        let hello = routine(&result, "Hello");
        assert_eq!(hello.properties["export"], json!(true));
        assert_eq!(hello.properties["exec_side"], json!("Unknown"));
        assert_eq!(hello.properties["signature"], json!("Hello()"));

        let types = edge_types(&result);
        assert!(types.contains(&"HAS_MODULE"));
        assert!(types.contains(&"OWNED_BY"));
        assert!(types.contains(&"HAS_ROUTINE"));
        assert_eq!(result.text_units.len(), 1);
        assert_eq!(result.text_units[0].path, "Hello()");
    }

    #[test]
    fn cross_routine_call() {
        let result = extract(&doc(
            "CommonModules/Tools/Module.bsl",
            "Процедура A()\n    B(1);\nКонецПроцедуры\n\
             Процедура B(X)\nКонецПроцедуры\n",
        ));
        let calls: Vec<&GraphEdge> = result
            .edges
            .iter()
            .filter(|e| e.rel_type == "CALLS")
            .collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].start, routine(&result, "A").node_key());
        assert_eq!(calls[0].end, routine(&result, "B").node_key());
    }

    #[test]
    fn reserved_words_are_not_calls() {
        let result = extract(&doc(
            "CommonModules/Tools/Module.bsl",
            "Процедура Если()\nКонецПроцедуры\n\
             Процедура C()\n    Если (Истина) Тогда\n    КонецЕсли;\nКонецПроцедуры\n",
        ));
        assert!(result.edges.iter().all(|e| e.rel_type != "CALLS"));
    }

    #[test]
    fn document_posting_to_accumulation_register() {
        let result = extract(&doc(
            "Documents/Invoice/ObjectModule.bsl",
            "Процедура ОбработкаПроведения()\n    РегистрыНакопления.Sales.Записать();\nКонецПроцедуры\n",
        ));

        let register = result
            .nodes
            .iter()
            .find(|n| n.label == "AccumulationRegister")
            .unwrap();
        assert_eq!(register.properties["name"], json!("Sales"));

        let types = edge_types(&result);
        assert!(types.contains(&"WRITES_TO"));
        assert!(types.contains(&"MAKES_MOVEMENTS_IN"));
        assert!(!types.contains(&"READS_FROM"));

        let writes = result
            .edges
            .iter()
            .find(|e| e.rel_type == "WRITES_TO")
            .unwrap();
        assert_eq!(writes.start.label, "Module");
    }

    #[test]
    fn register_read_without_write_marker() {
        let result = extract(&doc(
            "Catalogs/Contacts/ObjectModule.bsl",
            "Процедура Q()\n    Т = РегистрыСведений.Prices.СрезПоследних();\nКонецПроцедуры\n",
        ));
        let types = edge_types(&result);
        assert!(types.contains(&"READS_FROM"));
        assert!(!types.contains(&"WRITES_TO"));
        assert!(!types.contains(&"MAKES_MOVEMENTS_IN"));
    }

    #[test]
    fn register_node_is_emitted_once_per_module() {
        let result = extract(&doc(
            "Documents/Invoice/ObjectModule.bsl",
            "Процедура A()\n    РегистрыНакопления.Sales.Записать();\nКонецПроцедуры\n\
             Процедура B()\n    РегистрыНакопления.Sales.Записать();\nКонецПроцедуры\n",
        ));
        let registers = result
            .nodes
            .iter()
            .filter(|n| n.label == "AccumulationRegister")
            .count();
        assert_eq!(registers, 1);
        let writes = result
            .edges
            .iter()
            .filter(|e| e.rel_type == "WRITES_TO")
            .count();
        assert_eq!(writes, 1);
    }

    #[test]
    fn references_emit_object_edges() {
        let result = extract(&doc(
            "CommonModules/Tools/Module.bsl",
            "Функция F()\n    Возврат Документ.Заказ;\nКонецФункции\n",
        ));
        let object = result
            .nodes
            .iter()
            .find(|n| n.label == "Object" && n.key["qualified_name"] == "Document.Заказ")
            .unwrap();
        assert_eq!(object.properties["type"], json!("Document"));
        let refs: Vec<&GraphEdge> = result
            .edges
            .iter()
            .filter(|e| e.rel_type == "REFERENCES")
            .collect();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].start.label, "Routine");
    }

    #[test]
    fn directives_set_exec_side() {
        let result = extract(&doc(
            "CommonModules/Client/Module.bsl",
            "&НаКлиенте\nПроцедура P()\nКонецПроцедуры\n\
             &НаСервереБезКонтекста\nФункция S()\nКонецФункции\n",
        ));
        assert_eq!(routine(&result, "P").properties["exec_side"], json!("Client"));
        assert_eq!(routine(&result, "S").properties["exec_side"], json!("Server"));
    }

    #[test]
    fn english_keywords_are_recognised() {
        let result = extract(&doc(
            "CommonModules/Tools/Module.bsl",
            "Function Add(A, B) Export\n    Return A + B;\nEndFunction\n",
        ));
        let add = routine(&result, "Add");
        assert_eq!(add.properties["export"], json!(true));
        assert_eq!(add.properties["signature"], json!("Add(A, B)"));
    }

    #[test]
    fn routine_guid_is_deterministic() {
        let content = "Процедура Hello()\nКонецПроцедуры\n";
        let a = extract(&doc("Catalogs/C/ObjectModule.bsl", content));
        let b = extract(&doc("Catalogs/C/ObjectModule.bsl", content));
        assert_eq!(
            routine(&a, "Hello").key["guid"],
            routine(&b, "Hello").key["guid"]
        );
    }
}
