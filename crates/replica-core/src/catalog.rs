//! Alias catalog
//!
//! Static mapping of alias to local file, remote endpoint and credential.
//! Built once at startup and never mutated afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default connection dialect for embedded replicas.
pub const DEFAULT_DIALECT: &str = "sqlite+libsql";

/// Opaque remote credential.
///
/// `Debug` and `Display` never print the token.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for handing to a remote client.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Validate a table or column name before it is spliced into SQL.
///
/// Accepts ASCII letters, digits and underscores, not starting with a digit.
pub fn validate_identifier(identifier: &str) -> Result<()> {
    let mut chars = identifier.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier {
            identifier: identifier.to_string(),
        })
    }
}

/// Table and column holding the "last updated" marker used to compare a
/// local replica with its remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessMarker {
    table: String,
    column: String,
}

impl FreshnessMarker {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Result<Self> {
        let table = table.into();
        let column = column.into();
        validate_identifier(&table)?;
        validate_identifier(&column)?;
        Ok(Self { table, column })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// `SELECT MAX(<column>) FROM <table>`
    pub fn query(&self) -> String {
        format!("SELECT MAX({}) FROM {}", self.column, self.table)
    }
}

/// Immutable description of one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasConfig {
    pub alias: String,
    pub local_path: PathBuf,
    pub remote_endpoint: String,
    pub credential: Credential,
    pub dialect: String,
    /// Present for aliases whose sync health is tracked.
    pub freshness: Option<FreshnessMarker>,
}

impl AliasConfig {
    pub fn new(
        alias: impl Into<String>,
        local_path: impl Into<PathBuf>,
        remote_endpoint: impl Into<String>,
        credential: Credential,
    ) -> Self {
        Self {
            alias: alias.into(),
            local_path: local_path.into(),
            remote_endpoint: remote_endpoint.into(),
            credential,
            dialect: DEFAULT_DIALECT.to_string(),
            freshness: None,
        }
    }

    pub fn with_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.dialect = dialect.into();
        self
    }

    pub fn with_freshness(mut self, marker: FreshnessMarker) -> Self {
        self.freshness = Some(marker);
        self
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn is_freshness_tracked(&self) -> bool {
        self.freshness.is_some()
    }
}

/// A name that resolves to another alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub target: String,
    #[serde(default)]
    pub deprecated: bool,
}

/// The set of known aliases plus redirects onto them.
#[derive(Debug, Clone, Default)]
pub struct AliasCatalog {
    aliases: BTreeMap<String, Arc<AliasConfig>>,
    redirects: BTreeMap<String, Redirect>,
}

impl AliasCatalog {
    pub fn new(aliases: impl IntoIterator<Item = AliasConfig>) -> Self {
        let aliases = aliases
            .into_iter()
            .map(|config| (config.alias.clone(), Arc::new(config)))
            .collect();
        Self {
            aliases,
            redirects: BTreeMap::new(),
        }
    }

    /// Add a redirect from `name` onto `target`.
    pub fn with_redirect(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        deprecated: bool,
    ) -> Self {
        self.redirects.insert(
            name.into(),
            Redirect {
                target: target.into(),
                deprecated,
            },
        );
        self
    }

    /// Resolve a caller-supplied name to its canonical alias config.
    ///
    /// A configured alias wins over a redirect of the same name only when the
    /// redirect is not marked deprecated.
    pub fn resolve(&self, name: &str) -> Result<Arc<AliasConfig>> {
        let canonical = self.canonical_name(name)?;
        self.aliases
            .get(canonical)
            .cloned()
            .ok_or_else(|| self.unknown(name))
    }

    /// Canonical alias for `name`, following at most one redirect.
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> Result<&'a str> {
        if let Some(redirect) = self.redirects.get(name) {
            if redirect.deprecated {
                tracing::warn!(
                    alias = name,
                    target = %redirect.target,
                    "alias is deprecated, using target instead"
                );
            }
            if redirect.deprecated || !self.aliases.contains_key(name) {
                return if self.aliases.contains_key(&redirect.target) {
                    Ok(redirect.target.as_str())
                } else {
                    Err(self.unknown(name))
                };
            }
        }

        if self.aliases.contains_key(name) {
            Ok(name)
        } else {
            Err(self.unknown(name))
        }
    }

    fn unknown(&self, name: &str) -> Error {
        Error::UnknownAlias {
            alias: name.to_string(),
            available: self.aliases.keys().cloned().collect(),
        }
    }

    /// Canonical aliases in name order.
    pub fn aliases(&self) -> impl Iterator<Item = &Arc<AliasConfig>> {
        self.aliases.values()
    }

    pub fn redirects(&self) -> &BTreeMap<String, Redirect> {
        &self.redirects
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> AliasCatalog {
        AliasCatalog::new([
            AliasConfig::new("wcmkt2", "wcmkt2.db", "libsql://m", Credential::new("t1")),
            AliasConfig::new("sde", "sde.db", "libsql://s", Credential::new("t2")),
        ])
        .with_redirect("wcmkt", "wcmkt2", false)
        .with_redirect("wcmkt3", "wcmkt2", true)
    }

    #[test]
    fn resolves_direct_and_redirected_names() {
        let catalog = catalog();
        assert_eq!(catalog.resolve("sde").unwrap().alias, "sde");
        assert_eq!(catalog.resolve("wcmkt").unwrap().alias, "wcmkt2");
        assert_eq!(catalog.resolve("wcmkt3").unwrap().alias, "wcmkt2");
    }

    #[test]
    fn unknown_alias_lists_available() {
        let err = catalog().resolve("build_cost").unwrap_err();
        match err {
            Error::UnknownAlias { alias, available } => {
                assert_eq!(alias, "build_cost");
                assert_eq!(available, vec!["sde".to_string(), "wcmkt2".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn dangling_redirect_is_unknown() {
        let catalog = catalog().with_redirect("old", "missing", true);
        assert!(matches!(
            catalog.resolve("old"),
            Err(Error::UnknownAlias { .. })
        ));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let config = AliasConfig::new("a", "a.db", "libsql://a", Credential::new("secret"));
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"), "got: {debug}");
    }

    #[test]
    fn identifiers_are_validated() {
        assert!(validate_identifier("marketstats").is_ok());
        assert!(validate_identifier("_last_update2").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2fast").is_err());
        assert!(validate_identifier("x; DROP TABLE y").is_err());
        assert!(FreshnessMarker::new("marketstats", "last update").is_err());
    }

    #[test]
    fn freshness_query_is_max_of_column() {
        let marker = FreshnessMarker::new("marketstats", "last_update").unwrap();
        assert_eq!(marker.query(), "SELECT MAX(last_update) FROM marketstats");
    }
}
