use std::path::{Path, PathBuf};

/// Holds the project root that every launcher path hangs off.
///
/// Use `ConfigPaths::from_current_dir()` for production (the directory the
/// tool is invoked from), or `ConfigPaths::with_base()` for tests with an
/// isolated directory.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    base: PathBuf,
}

impl ConfigPaths {
    /// Create paths rooted at the current working directory.
    pub fn from_current_dir() -> anyhow::Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| anyhow::anyhow!("Could not determine current directory: {e}"))?;
        Ok(Self { base: cwd })
    }

    /// Create paths rooted at a custom base directory (useful for tests).
    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn root(&self) -> &Path {
        &self.base
    }

    pub fn config_path(&self) -> PathBuf {
        self.base.join("taskwire.toml")
    }

    /// Resolve a configured directory against the project root.
    ///
    /// Absolute paths are kept as-is and a leading `~/` expands to the home
    /// directory.
    pub fn resolve(&self, configured: &Path) -> PathBuf {
        if let Ok(rest) = configured.strip_prefix("~") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            self.base.join(configured)
        }
    }
}
