//! Catalog file parsing for replicas.toml
//!
//! The file lists every alias with its local path and remote endpoint, any
//! redirects onto those aliases, and sync settings. Parsing yields a
//! [`CatalogFile`]; [`CatalogFile::into_config`] validates it and resolves
//! relative paths into a [`ReplicaConfig`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::catalog::{
    AliasCatalog, AliasConfig, Credential, DEFAULT_DIALECT, FreshnessMarker, Redirect,
    validate_identifier,
};
use crate::inspect::{DEFAULT_STALE_AFTER_MINUTES, DEFAULT_UPDATE_LOG_TABLE};
use crate::schedule::DEFAULT_STATE_FILE;
use crate::{Error, Result};

/// Default catalog file name.
pub const DEFAULT_CONFIG_FILE: &str = "replicas.toml";

/// Dialects the local replica driver understands.
pub const SUPPORTED_DIALECTS: [&str; 2] = [DEFAULT_DIALECT, "sqlite"];

fn default_dialect() -> String {
    DEFAULT_DIALECT.to_string()
}

fn default_state_file() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_FILE)
}

fn default_update_log_table() -> String {
    DEFAULT_UPDATE_LOG_TABLE.to_string()
}

fn default_stale_after_minutes() -> i64 {
    DEFAULT_STALE_AFTER_MINUTES
}

/// Freshness marker as written in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessSection {
    pub table: String,
    pub column: String,
}

/// One `[aliases.<name>]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AliasSection {
    pub path: PathBuf,
    pub remote_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Environment variable holding the token, read at load time.
    #[serde(default)]
    pub auth_token_env: Option<String>,
    #[serde(default = "default_dialect")]
    pub dialect: String,
    #[serde(default)]
    pub freshness: Option<FreshnessSection>,
}

/// The `[sync]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_update_log_table")]
    pub update_log_table: String,
    #[serde(default = "default_stale_after_minutes")]
    pub stale_after_minutes: i64,
}

impl SyncSettings {
    /// Stale threshold as a duration.
    ///
    /// `None` unless `stale_after_minutes` is positive and representable.
    pub fn stale_after(&self) -> Option<TimeDelta> {
        TimeDelta::try_minutes(self.stale_after_minutes).filter(|d| *d > TimeDelta::zero())
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            update_log_table: default_update_log_table(),
            stale_after_minutes: default_stale_after_minutes(),
        }
    }
}

/// Parsed, unvalidated catalog file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub aliases: BTreeMap<String, AliasSection>,
    #[serde(default)]
    pub redirects: BTreeMap<String, Redirect>,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// A validated catalog plus sync settings with resolved paths.
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    pub catalog: AliasCatalog,
    pub settings: SyncSettings,
}

impl CatalogFile {
    /// Parse catalog TOML.
    pub fn parse(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)?;
        Ok(file)
    }

    /// Validate and resolve against `base_dir`, the directory the file was
    /// read from. `origin` only labels errors.
    pub fn into_config(self, base_dir: &Path, origin: &Path) -> Result<ReplicaConfig> {
        let invalid = |message: String| Error::ConfigParse {
            path: origin.to_path_buf(),
            message,
        };

        let mut aliases = Vec::with_capacity(self.aliases.len());
        for (name, section) in self.aliases {
            if !SUPPORTED_DIALECTS.contains(&section.dialect.as_str()) {
                return Err(invalid(format!(
                    "alias '{name}': unsupported dialect '{}'",
                    section.dialect
                )));
            }

            let credential = match (&section.auth_token, &section.auth_token_env) {
                (Some(_), Some(_)) => {
                    return Err(invalid(format!(
                        "alias '{name}': set only one of auth_token and auth_token_env"
                    )));
                }
                (Some(token), None) => Credential::new(token.clone()),
                (None, Some(var)) => match std::env::var(var) {
                    Ok(token) => Credential::new(token),
                    Err(_) => {
                        tracing::warn!(alias = %name, var = %var, "auth token variable is not set");
                        Credential::default()
                    }
                },
                (None, None) => Credential::default(),
            };

            let mut config = AliasConfig::new(
                name.clone(),
                resolve_path(base_dir, &section.path),
                section.remote_url,
                credential,
            )
            .with_dialect(section.dialect);
            if let Some(freshness) = section.freshness {
                config = config.with_freshness(FreshnessMarker::new(
                    freshness.table,
                    freshness.column,
                )?);
            }
            aliases.push(config);
        }

        let mut catalog = AliasCatalog::new(aliases);
        for (name, redirect) in self.redirects {
            if catalog.aliases().all(|config| config.alias != redirect.target) {
                return Err(invalid(format!(
                    "redirect '{name}' targets unknown alias '{}'",
                    redirect.target
                )));
            }
            catalog = catalog.with_redirect(name, redirect.target, redirect.deprecated);
        }

        validate_identifier(&self.sync.update_log_table)?;
        if self.sync.stale_after().is_none() {
            return Err(invalid(format!(
                "stale_after_minutes must be a positive number of minutes, got {}",
                self.sync.stale_after_minutes
            )));
        }
        let settings = SyncSettings {
            state_file: resolve_path(base_dir, &self.sync.state_file),
            ..self.sync
        };

        Ok(ReplicaConfig { catalog, settings })
    }
}

fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

impl ReplicaConfig {
    /// Load and validate the catalog file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path)?;
        let file = CatalogFile::parse(&content).map_err(|err| match err {
            Error::TomlDe(err) => Error::ConfigParse {
                path: path.to_path_buf(),
                message: err.to_string(),
            },
            other => other,
        })?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let config = file.into_config(base_dir, path)?;
        tracing::debug!(
            path = %path.display(),
            aliases = config.catalog.len(),
            redirects = config.catalog.redirects().len(),
            "loaded replica catalog"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
        [aliases.wcmkt2]
        path = "data/wcmkt2.db"
        remote_url = "libsql://wcmkt2.example.turso.io"
        auth_token = "secret"

        [aliases.wcmkt2.freshness]
        table = "marketstats"
        column = "last_update"

        [aliases.sde]
        path = "/srv/sde.db"
        remote_url = "file:///srv/remote/sde.db"
        dialect = "sqlite"

        [redirects]
        wcmkt = { target = "wcmkt2" }
        wcmkt3 = { target = "wcmkt2", deprecated = true }
    "#;

    #[test]
    fn parses_and_resolves_sample() {
        let file = CatalogFile::parse(SAMPLE).unwrap();
        let config = file
            .into_config(Path::new("/etc/replicas"), Path::new("replicas.toml"))
            .unwrap();

        let wcmkt = config.catalog.resolve("wcmkt").unwrap();
        assert_eq!(wcmkt.alias, "wcmkt2");
        assert_eq!(wcmkt.local_path, PathBuf::from("/etc/replicas/data/wcmkt2.db"));
        assert_eq!(wcmkt.credential.expose(), "secret");
        assert_eq!(wcmkt.dialect, DEFAULT_DIALECT);
        assert!(wcmkt.is_freshness_tracked());

        let sde = config.catalog.resolve("sde").unwrap();
        assert_eq!(sde.local_path, PathBuf::from("/srv/sde.db"));
        assert!(sde.credential.is_empty());
        assert!(!sde.is_freshness_tracked());

        assert_eq!(config.settings.update_log_table, DEFAULT_UPDATE_LOG_TABLE);
        assert_eq!(
            config.settings.state_file,
            PathBuf::from("/etc/replicas").join(DEFAULT_STATE_FILE)
        );
    }

    #[test]
    fn rejects_redirect_to_unknown_alias() {
        let file = CatalogFile::parse(
            r#"
            [redirects]
            old = { target = "missing" }
            "#,
        )
        .unwrap();
        let err = file
            .into_config(Path::new("."), Path::new("replicas.toml"))
            .unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }), "{err}");
    }

    #[test]
    fn rejects_unsupported_dialect() {
        let file = CatalogFile::parse(
            r#"
            [aliases.pg]
            path = "pg.db"
            remote_url = "postgres://localhost/db"
            dialect = "postgresql"
            "#,
        )
        .unwrap();
        let err = file
            .into_config(Path::new("."), Path::new("replicas.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("unsupported dialect"), "{err}");
    }

    #[test]
    fn rejects_unsafe_freshness_identifier() {
        let file = CatalogFile::parse(
            r#"
            [aliases.a]
            path = "a.db"
            remote_url = "file:///tmp/a.db"
            freshness = { table = "stats; DROP TABLE x", column = "ts" }
            "#,
        )
        .unwrap();
        let err = file
            .into_config(Path::new("."), Path::new("replicas.toml"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier { .. }), "{err}");
    }

    #[test]
    fn rejects_unknown_alias_keys() {
        let err = CatalogFile::parse(
            r#"
            [aliases.a]
            path = "a.db"
            remote_url = "file:///tmp/a.db"
            token = "oops"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::TomlDe(_)));
    }
}
