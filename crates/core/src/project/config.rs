use serde::{Deserialize, Serialize};

/// Environment variable consulted for the Neo4j password when the config
/// file does not carry one.
pub const NEO4J_PASSWORD_ENV: &str = "COMMAP_NEO4J_PASSWORD";

/// Connection settings for a Neo4j server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neo4jConfig {
    /// Base HTTP URL, e.g. `http://127.0.0.1:7474`.
    pub url: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_database() -> String {
    "neo4j".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Neo4jConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: "neo4j".to_string(),
            password: None,
            database: default_database(),
            timeout_secs: default_http_timeout_secs(),
        }
    }

    pub fn commit_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.url.trim_end_matches('/'), self.database)
    }

    /// Fill in the password from `COMMAP_NEO4J_PASSWORD` if none is configured.
    pub fn with_env_password(mut self) -> Self {
        if self.password.is_none() {
            self.password = std::env::var(NEO4J_PASSWORD_ENV).ok().filter(|p| !p.is_empty());
        }
        self
    }
}

/// Which graph store a run writes into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphBackendConfig {
    /// Embedded SQLite graph (path is typically relative to the root).
    Sqlite { path: String },
    Neo4j(Neo4jConfig),
    /// Nothing is persisted; useful for dry runs.
    Memory,
}

impl GraphBackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            GraphBackendConfig::Sqlite { .. } => "sqlite",
            GraphBackendConfig::Neo4j(_) => "neo4j",
            GraphBackendConfig::Memory => "memory",
        }
    }
}

/// How classes are probed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Probe each class in a supervised child process.
    #[serde(default)]
    pub isolate: bool,
    /// Watchdog for isolated probes.
    #[serde(default = "default_probe_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_probe_timeout_secs() -> u64 {
    60
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self { isolate: false, timeout_secs: default_probe_timeout_secs() }
    }
}

/// Serializable configuration for a mapper workspace.
///
/// Lives at `.commap/config.json` under the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Config format version, not the tool version.
    pub config_version: String,
    pub graph: GraphBackendConfig,
    #[serde(default)]
    pub probe: ProbeSettings,
}

impl MapperConfig {
    /// Config writing into an SQLite graph at `db_path`.
    pub fn sqlite(db_path: impl Into<String>) -> Self {
        Self {
            config_version: "0.1.0".to_string(),
            graph: GraphBackendConfig::Sqlite { path: db_path.into() },
            probe: ProbeSettings::default(),
        }
    }

    pub fn neo4j(neo4j: Neo4jConfig) -> Self {
        Self {
            config_version: "0.1.0".to_string(),
            graph: GraphBackendConfig::Neo4j(neo4j),
            probe: ProbeSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_is_tagged_by_kind() {
        let config = MapperConfig::sqlite(".commap/graph.db");
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["graph"]["kind"], "sqlite");
        assert_eq!(json["graph"]["path"], ".commap/graph.db");
        assert_eq!(json["probe"]["isolate"], false);
    }

    #[test]
    fn neo4j_defaults_fill_in() {
        let config: MapperConfig = serde_json::from_str(
            r#"{"config_version":"0.1.0","graph":{"kind":"neo4j","url":"http://db:7474","user":"neo4j"}}"#,
        )
        .unwrap();
        match config.graph {
            GraphBackendConfig::Neo4j(neo) => {
                assert_eq!(neo.database, "neo4j");
                assert_eq!(neo.commit_url(), "http://db:7474/db/neo4j/tx/commit");
            }
            other => panic!("unexpected backend {other:?}"),
        }
        assert_eq!(config.probe, ProbeSettings::default());
    }
}
