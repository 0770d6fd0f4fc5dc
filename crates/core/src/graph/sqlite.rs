use std::path::Path;

use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;

use crate::graph::{
    props, ClassNode, GraphError, GraphResult, GraphStore, InterfaceNode, WriteOutcome,
};
use crate::model::ComId;

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Node and edge totals, for operator summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphCounts {
    pub classes: usize,
    pub interfaces: usize,
    pub edges: usize,
}

/// SQLite-backed property graph.
///
/// Uniqueness lives in the schema: primary keys on `clsid`, `iid` and
/// `(clsid, iid)`. Node creation is a plain `INSERT` whose primary-key
/// violation is reported as `AlreadyExists`; every other failure surfaces as
/// an error.
#[derive(Debug)]
pub struct SqliteGraphStore {
    conn: Connection,
    label: String,
}

impl SqliteGraphStore {
    /// Open (or create) a graph database at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> GraphResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn, path.display().to_string())
    }

    pub fn open_in_memory() -> GraphResult<Self> {
        Self::init(Connection::open_in_memory()?, ":memory:".to_string())
    }

    fn init(conn: Connection, label: String) -> GraphResult<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        apply_migrations(&conn)?;
        Ok(Self { conn, label })
    }

    /// Expose the underlying connection for advanced callers.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn counts(&self) -> GraphResult<GraphCounts> {
        let count = |table: &str| -> GraphResult<usize> {
            let n: i64 =
                self.conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(GraphCounts {
            classes: count("com_classes")?,
            interfaces: count("com_interfaces")?,
            edges: count("implements")?,
        })
    }

    /// Load a class node back, with only the properties that were written.
    pub fn class_node(&self, clsid: &ComId) -> GraphResult<Option<ClassNode>> {
        let node = self
            .conn
            .query_row(
                r#"
                SELECT name, inproc_server32, prog_id, inproc_handler32, local_server32, version
                FROM com_classes
                WHERE clsid = ?1
                "#,
                params![clsid.as_str()],
                |row| {
                    let keys = [
                        props::NAME,
                        props::INPROC_SERVER32,
                        props::PROG_ID,
                        props::INPROC_HANDLER32,
                        props::LOCAL_SERVER32,
                        props::VERSION,
                    ];
                    let mut properties = Vec::new();
                    for (idx, key) in keys.into_iter().enumerate() {
                        if let Some(value) = row.get::<_, Option<String>>(idx)? {
                            properties.push((key, value));
                        }
                    }
                    Ok(ClassNode { clsid: clsid.clone(), properties })
                },
            )
            .optional()?;
        Ok(node)
    }

    /// Interface ids linked from a class, ordered by id.
    pub fn implemented_by(&self, clsid: &ComId) -> GraphResult<Vec<ComId>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT iid FROM implements
            WHERE clsid = ?1
            ORDER BY iid
            "#,
        )?;
        let rows = stmt.query_map(params![clsid.as_str()], |row| row.get::<_, String>(0))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(ComId::new(row?));
        }
        Ok(out)
    }
}

impl GraphStore for SqliteGraphStore {
    fn create_class(&mut self, node: &ClassNode) -> GraphResult<WriteOutcome> {
        let result = self.conn.execute(
            r#"
            INSERT INTO com_classes (clsid, name, inproc_server32, prog_id, inproc_handler32, local_server32, version)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                node.clsid.as_str(),
                node.property(props::NAME),
                node.property(props::INPROC_SERVER32),
                node.property(props::PROG_ID),
                node.property(props::INPROC_HANDLER32),
                node.property(props::LOCAL_SERVER32),
                node.property(props::VERSION),
            ],
        );
        classify_insert(result)
    }

    fn create_interface(&mut self, node: &InterfaceNode) -> GraphResult<WriteOutcome> {
        let result = self.conn.execute(
            r#"
            INSERT INTO com_interfaces (iid, name)
            VALUES (?1, ?2)
            "#,
            params![node.iid.as_str(), node.name],
        );
        classify_insert(result)
    }

    fn merge_implements(&mut self, clsid: &ComId, iid: &ComId) -> GraphResult<WriteOutcome> {
        // OR IGNORE covers the primary key only; foreign keys still fail.
        let result = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO implements (clsid, iid)
            VALUES (?1, ?2)
            "#,
            params![clsid.as_str(), iid.as_str()],
        );
        match result {
            Ok(0) => Ok(WriteOutcome::AlreadyExists),
            Ok(_) => Ok(WriteOutcome::Created),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                Err(GraphError::MissingEndpoint { clsid: clsid.clone(), iid: iid.clone() })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        format!("sqlite {}", self.label)
    }
}

/// Map an `INSERT` result onto create-if-absent semantics.
///
/// Only a primary-key/unique violation means "already exists"; NOT NULL,
/// CHECK and every non-constraint failure stay errors.
fn classify_insert(result: rusqlite::Result<usize>) -> GraphResult<WriteOutcome> {
    match result {
        Ok(_) => Ok(WriteOutcome::Created),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE) =>
        {
            Ok(WriteOutcome::AlreadyExists)
        }
        Err(e) => Err(e.into()),
    }
}

/// Apply schema migrations to bring the database to the latest version.
///
/// We use `PRAGMA user_version` as the schema version indicator.
///
/// Version map:
/// - 0: no schema
/// - 1: com_classes, com_interfaces, implements
fn apply_migrations(conn: &Connection) -> GraphResult<()> {
    let current_version = current_schema_version(conn)?;

    // Reject DBs created with a newer schema than we support.
    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(GraphError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS com_classes (
                clsid            TEXT PRIMARY KEY NOT NULL,
                name             TEXT,
                inproc_server32  TEXT,
                prog_id          TEXT,
                inproc_handler32 TEXT,
                local_server32   TEXT,
                version          TEXT
            );

            CREATE TABLE IF NOT EXISTS com_interfaces (
                iid  TEXT PRIMARY KEY NOT NULL,
                name TEXT
            );

            CREATE TABLE IF NOT EXISTS implements (
                clsid TEXT NOT NULL REFERENCES com_classes (clsid),
                iid   TEXT NOT NULL REFERENCES com_interfaces (iid),
                PRIMARY KEY (clsid, iid)
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> GraphResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
