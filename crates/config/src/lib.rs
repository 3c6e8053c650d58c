//! Configuration for hashbank.
//!
//! Settings are merged from several layers, each overriding the last:
//!
//! 1. Built-in defaults.
//! 2. `config.toml` in the platform's user configuration directory.
//! 3. `hashbank.toml` in the working directory.
//! 4. An explicitly requested file (TOML, YAML or JSON, chosen by extension).
//! 5. Environment variables prefixed `HASHBANK_`, with `__` between nested
//!    keys (`HASHBANK_DATABASE__PATH=/srv/hashbank.db`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

const LOCAL_FILE: &str = "hashbank.toml";
const ENV_PREFIX: &str = "HASHBANK_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file holding the comparison records. Its directory is created
    /// on startup.
    pub path: PathBuf,
    pub max_connections: u32,
}
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("db/hashbank.db"), max_connections: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory that cached files are served from. Stored paths are
    /// relative to it.
    pub public_root: PathBuf,
    /// Where placed files go, relative to `public_root`.
    pub cache_dir: PathBuf,
    /// Where uploads wait before being compared.
    pub staging_dir: PathBuf,
}
impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            public_root: PathBuf::from("public"),
            cache_dir: PathBuf::from("cache"),
            staging_dir: PathBuf::from("uploads"),
        }
    }
}

impl Config {
    /// Load configuration from every layer, with `explicit` (if given)
    /// overriding the implicit files.
    ///
    /// Unlike the implicit files, an explicit file must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let user = ProjectDirs::from("", "", "hashbank").map(|dirs| dirs.config_dir().join("config.toml"));
        Self::extract(Self::figment(user.as_deref(), explicit)?)
    }

    fn figment(user: Option<&Path>, explicit: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(user) = user {
            tracing::trace!(path = %user.display(), "checking user configuration");
            figment = figment.merge(Toml::file(user));
        }
        figment = figment.merge(Toml::file(LOCAL_FILE));
        if let Some(path) = explicit {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that can be parsed but not used.
    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            exn::bail!(ErrorKind::Invalid("database.max_connections"));
        }
        if !stays_inside(&self.storage.cache_dir) {
            exn::bail!(ErrorKind::Invalid("storage.cache_dir"));
        }
        Ok(())
    }
}

/// A non-empty relative path that never climbs above where it starts.
fn stays_inside(path: &Path) -> bool {
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {},
            Component::ParentDir if depth > 0 => depth -= 1,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    depth > 0
}
