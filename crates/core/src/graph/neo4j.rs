//! Neo4j backend over the HTTP transactional endpoint.
//!
//! Every statement is parameterized Cypher; identifiers and display names
//! are never spliced into query text.

use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::graph::{props, ClassNode, GraphError, GraphResult, GraphStore, InterfaceNode, WriteOutcome};
use crate::model::ComId;
use crate::project::Neo4jConfig;

/// Neo4j reports uniqueness-constraint violations with this status code.
pub const CONSTRAINT_VIOLATION: &str = "Neo.ClientError.Schema.ConstraintValidationFailed";

const CREATE_CLASS: &str = "MERGE (c:ComClass {clsid: $clsid}) ON CREATE SET c += $props";
const CREATE_INTERFACE: &str = "MERGE (i:ComInterface {iid: $iid}) ON CREATE SET i += $props";
const MERGE_IMPLEMENTS: &str = "MATCH (c:ComClass {clsid: $clsid}) \
     MATCH (i:ComInterface {iid: $iid}) \
     MERGE (c)-[:implements]->(i) \
     RETURN count(c) AS matched";
const SCHEMA: &[&str] = &[
    "CREATE CONSTRAINT com_class_clsid IF NOT EXISTS FOR (c:ComClass) REQUIRE c.clsid IS UNIQUE",
    "CREATE CONSTRAINT com_interface_iid IF NOT EXISTS FOR (i:ComInterface) REQUIRE i.iid IS UNIQUE",
];

/// Graph store talking to Neo4j's `/db/{name}/tx/commit` endpoint.
///
/// One agent (connection pool) is held for the lifetime of the store.
pub struct Neo4jHttpStore {
    config: Neo4jConfig,
    agent: ureq::Agent,
    auth_header: String,
}

impl std::fmt::Debug for Neo4jHttpStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neo4jHttpStore")
            .field("url", &self.config.url)
            .field("database", &self.config.database)
            .finish_non_exhaustive()
    }
}

impl Neo4jHttpStore {
    pub fn new(config: Neo4jConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        let credentials =
            format!("{}:{}", config.user, config.password.as_deref().unwrap_or_default());
        let auth_header =
            format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(credentials));
        Self { config, agent, auth_header }
    }

    fn run(&self, statement: &str, parameters: Value) -> GraphResult<StatementResult> {
        let body = TxRequest {
            statements: vec![Statement { statement, parameters, include_stats: true }],
        };
        let response = self
            .agent
            .post(&self.config.commit_url())
            .set("Authorization", &self.auth_header)
            .set("Accept", "application/json")
            .send_json(&body);

        let response = match response {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, resp)) => {
                let text = resp.into_string().unwrap_or_default();
                return Err(GraphError::Transport(format!("HTTP {code}: {text}")));
            }
            Err(e) => return Err(GraphError::Transport(e.to_string())),
        };

        let parsed: TxResponse =
            response.into_json().map_err(|e| GraphError::Transport(e.to_string()))?;
        parsed.into_single()
    }
}

impl GraphStore for Neo4jHttpStore {
    fn create_class(&mut self, node: &ClassNode) -> GraphResult<WriteOutcome> {
        let mut props_map = Map::new();
        for (key, value) in &node.properties {
            props_map.insert((*key).to_string(), Value::String(value.clone()));
        }
        let params = json!({ "clsid": node.clsid.as_str(), "props": props_map });
        outcome_from(self.run(CREATE_CLASS, params), |s| s.nodes_created)
    }

    fn create_interface(&mut self, node: &InterfaceNode) -> GraphResult<WriteOutcome> {
        let mut props_map = Map::new();
        if let Some(name) = &node.name {
            props_map.insert(props::NAME.to_string(), Value::String(name.clone()));
        }
        let params = json!({ "iid": node.iid.as_str(), "props": props_map });
        outcome_from(self.run(CREATE_INTERFACE, params), |s| s.nodes_created)
    }

    fn merge_implements(&mut self, clsid: &ComId, iid: &ComId) -> GraphResult<WriteOutcome> {
        let params = json!({ "clsid": clsid.as_str(), "iid": iid.as_str() });
        let result = self.run(MERGE_IMPLEMENTS, params)?;
        if result.first_count() == Some(0) {
            return Err(GraphError::MissingEndpoint { clsid: clsid.clone(), iid: iid.clone() });
        }
        outcome_from(Ok(result), |s| s.relationships_created)
    }

    fn ensure_schema(&mut self) -> GraphResult<()> {
        for statement in SCHEMA {
            self.run(statement, json!({}))?;
            tracing::info!(statement, "ensured Neo4j constraint");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("neo4j {} (database {})", self.config.url, self.config.database)
    }
}

/// Decide created vs already-exists from a statement result.
///
/// A uniqueness-constraint violation is the only rejection treated as
/// success; anything else the server refuses stays an error.
fn outcome_from(
    result: GraphResult<StatementResult>,
    created: impl Fn(&Stats) -> u64,
) -> GraphResult<WriteOutcome> {
    match result {
        Ok(res) => {
            let n = res.stats.as_ref().map(&created).unwrap_or(0);
            Ok(if n > 0 { WriteOutcome::Created } else { WriteOutcome::AlreadyExists })
        }
        Err(GraphError::Rejected { code, .. }) if code == CONSTRAINT_VIOLATION => {
            Ok(WriteOutcome::AlreadyExists)
        }
        Err(e) => Err(e),
    }
}

#[derive(Debug, Serialize)]
struct TxRequest<'a> {
    statements: Vec<Statement<'a>>,
}

#[derive(Debug, Serialize)]
struct Statement<'a> {
    statement: &'a str,
    parameters: Value,
    #[serde(rename = "includeStats")]
    include_stats: bool,
}

#[derive(Debug, Default, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

impl TxResponse {
    fn into_single(self) -> GraphResult<StatementResult> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(GraphError::Rejected { code: err.code, message: err.message });
        }
        Ok(self.results.into_iter().next().unwrap_or_default())
    }
}

#[derive(Debug, Default, Deserialize)]
struct StatementResult {
    #[serde(default)]
    data: Vec<RowData>,
    #[serde(default)]
    stats: Option<Stats>,
}

impl StatementResult {
    fn first_count(&self) -> Option<u64> {
        self.data.first().and_then(|row| row.row.first()).and_then(Value::as_u64)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RowData {
    #[serde(default)]
    row: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Stats {
    #[serde(default)]
    nodes_created: u64,
    #[serde(default)]
    relationships_created: u64,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    #[serde(default)]
    message: String,
}
