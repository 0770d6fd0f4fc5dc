use std::path::{Path, PathBuf};

/// Logical layout of a mapper workspace on disk.
///
/// Derived from a chosen root path. It does *not* perform any IO itself;
/// frontends create directories and files based on it.
#[derive(Debug, Clone)]
pub struct MapperLayout {
    pub root: PathBuf,
    /// Directory for internal metadata (.commap).
    pub meta_dir: PathBuf,
    pub config_path: PathBuf,
    /// Default SQLite graph location.
    pub graph_db_path: PathBuf,
    pub checkpoint_path: PathBuf,
    /// Interface list handed to probe workers.
    pub interfaces_path: PathBuf,
}

impl MapperLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let meta_dir = root.join(".commap");
        Self {
            config_path: meta_dir.join("config.json"),
            graph_db_path: meta_dir.join("graph.db"),
            checkpoint_path: meta_dir.join("checkpoint.json"),
            interfaces_path: meta_dir.join("interfaces.json"),
            meta_dir,
            root,
        }
    }

    /// Graph path string suitable for storing in `MapperConfig`, relative to
    /// `root` when possible.
    pub fn graph_db_relative_string(&self) -> String {
        match self.graph_db_path.strip_prefix(&self.root) {
            Ok(rel) => rel.to_string_lossy().to_string(),
            Err(_) => self.graph_db_path.to_string_lossy().to_string(),
        }
    }

    /// Resolve a configured path against the root unless it is absolute.
    pub fn resolve(&self, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
