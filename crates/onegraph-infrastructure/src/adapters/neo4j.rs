//! Neo4j bolt adapter for the graph store port.
//!
//! Executes the parameterised UNWIND/MERGE statements built by the graph
//! writer. Every call is one auto-commit transaction, which matches the
//! one-transaction-per-batch contract of the writer.

use async_trait::async_trait;
use neo4rs::{
    BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString, BoltType,
    ConfigBuilder, Graph, query,
};
use serde_json::Value;

use onegraph_domain::error::{Error, Result};
use onegraph_domain::ports::{EdgeBatchRow, GraphStore, NodeBatchResult, NodeBatchRow};

/// Graph store over a shared neo4rs connection pool.
pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    /// Connect to a Neo4j server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphDb`] when the connection cannot be
    /// established.
    pub async fn connect(
        uri: &str,
        username: &str,
        password: &str,
        database: &str,
    ) -> Result<Self> {
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(username)
            .password(password)
            .db(database)
            .build()
            .map_err(to_graph_error)?;
        let graph = Graph::connect(config).await.map_err(to_graph_error)?;
        Ok(Self { graph })
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn upsert_nodes(
        &self,
        statement: &str,
        rows: Vec<NodeBatchRow>,
    ) -> Result<Vec<NodeBatchResult>> {
        let mut bolt_rows = BoltList::default();
        for row in rows {
            let mut bolt_row = BoltMap::default();
            bolt_row.put(BoltString::from("key"), string_map(&row.key));
            bolt_row.put(BoltString::from("props"), value_map(&row.props));
            bolt_row.put(
                BoltString::from("key_hash"),
                BoltType::String(BoltString::from(row.key_hash.as_str())),
            );
            bolt_rows.push(BoltType::Map(bolt_row));
        }

        let mut stream = self
            .graph
            .execute(query(statement).param("nodes", BoltType::List(bolt_rows)))
            .await
            .map_err(to_graph_error)?;

        let mut results = Vec::new();
        while let Some(row) = stream.next().await.map_err(to_graph_error)? {
            let key_hash: String = row
                .get("key_hash")
                .map_err(|err| Error::graph_db(format!("missing key_hash column: {err}")))?;
            let element_id: String = row
                .get("element_id")
                .map_err(|err| Error::graph_db(format!("missing element_id column: {err}")))?;
            results.push(NodeBatchResult {
                key_hash,
                element_id,
            });
        }
        Ok(results)
    }

    async fn upsert_edges(&self, statement: &str, rows: Vec<EdgeBatchRow>) -> Result<()> {
        let mut bolt_rows = BoltList::default();
        for row in rows {
            let mut bolt_row = BoltMap::default();
            bolt_row.put(BoltString::from("start"), string_map(&row.start));
            bolt_row.put(BoltString::from("end"), string_map(&row.end));
            bolt_row.put(BoltString::from("props"), value_map(&row.props));
            bolt_rows.push(BoltType::Map(bolt_row));
        }

        self.graph
            .run(query(statement).param("edges", BoltType::List(bolt_rows)))
            .await
            .map_err(to_graph_error)
    }

    async fn run_statement(&self, statement: &str) -> Result<()> {
        self.graph
            .run(query(statement))
            .await
            .map_err(to_graph_error)
    }
}

fn to_graph_error(err: neo4rs::Error) -> Error {
    Error::GraphDb {
        message: err.to_string(),
        code: None,
    }
}

fn string_map(fields: &std::collections::BTreeMap<String, String>) -> BoltType {
    let mut map = BoltMap::default();
    for (name, value) in fields {
        map.put(
            BoltString::from(name.as_str()),
            BoltType::String(BoltString::from(value.as_str())),
        );
    }
    BoltType::Map(map)
}

fn value_map(properties: &std::collections::BTreeMap<String, Value>) -> BoltType {
    let mut map = BoltMap::default();
    for (name, value) in properties {
        map.put(BoltString::from(name.as_str()), bolt_scalar(value));
    }
    BoltType::Map(map)
}

/// Scalar JSON value to bolt. Nulls are stripped upstream by the writer;
/// the arm only keeps the conversion total.
fn bolt_scalar(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull::default()),
        Value::Bool(flag) => BoltType::Boolean(BoltBoolean::new(*flag)),
        Value::Number(number) => number.as_i64().map_or_else(
            || BoltType::Float(BoltFloat::new(number.as_f64().unwrap_or(0.0))),
            |int| BoltType::Integer(BoltInteger::new(int)),
        ),
        Value::String(text) => BoltType::String(BoltString::from(text.as_str())),
        other => BoltType::String(BoltString::from(other.to_string().as_str())),
    }
}
