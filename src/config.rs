//! Import configuration loaded from TOML.
//!
//! ```toml
//! database = "data/clients.db"
//! table = "client_data"
//! batch_size = 500
//! max_reported_errors = 10
//! commit_mode = "all_or_nothing"   # or "incremental"
//! match_policy = "best_score"      # or "first_match"
//! catalog = "catalog.toml"         # optional; built-in sales catalog otherwise
//! required_fields = ["client_name", "value"]
//! ```
//!
//! Every key is optional.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::catalog::{Catalog, is_identifier};
use crate::error::{CatalogError, ImportError, ImportResult};
use crate::ingestion::pipeline::ImportOptions;
use crate::ingestion::resolve::MatchPolicy;
use crate::persist::{CommitMode, DEFAULT_BATCH_SIZE};
use crate::report::DEFAULT_MAX_REPORTED_ERRORS;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportConfig {
    /// SQLite database file.
    pub database: PathBuf,
    /// Table records are written to.
    pub table: String,
    pub batch_size: usize,
    pub max_reported_errors: usize,
    pub commit_mode: CommitMode,
    pub match_policy: MatchPolicy,
    /// Catalog TOML file. Relative paths are resolved against the config file's directory.
    pub catalog: Option<PathBuf>,
    pub required_fields: Option<Vec<String>>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("tabular_import.db"),
            table: "client_data".to_owned(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_reported_errors: DEFAULT_MAX_REPORTED_ERRORS,
            commit_mode: CommitMode::default(),
            match_policy: MatchPolicy::default(),
            catalog: None,
            required_fields: None,
        }
    }
}

impl ImportConfig {
    /// Read and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> ImportResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ImportError::Config {
            message: format!("failed to read config file '{}': {e}", path.display()),
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let (Some(catalog), Some(dir)) = (config.catalog.as_mut(), path.parent()) {
            if catalog.is_relative() {
                *catalog = dir.join(&*catalog);
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> ImportResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ImportResult<()> {
        if self.batch_size == 0 {
            return Err(config_error("batch_size must be > 0"));
        }
        if self.max_reported_errors == 0 {
            return Err(config_error("max_reported_errors must be > 0"));
        }
        if !is_identifier(&self.table) {
            return Err(config_error(format!(
                "'{}' is not a valid table name (expected [a-z_][a-z0-9_]*)",
                self.table
            )));
        }
        Ok(())
    }

    /// The configured catalog file, or the built-in sales catalog.
    ///
    /// Configured required fields must exist in the catalog.
    pub fn catalog(&self) -> ImportResult<Catalog> {
        let catalog = match &self.catalog {
            Some(path) => Catalog::load(path)?,
            None => Catalog::sales(),
        };
        for name in self.required_fields.iter().flatten() {
            if catalog.field(name).is_none() {
                return Err(CatalogError::UnknownField(name.clone()).into());
            }
        }
        Ok(catalog)
    }

    /// Import options carrying this config's settings; per-run flags are left at their defaults.
    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            batch_size: self.batch_size,
            commit_mode: self.commit_mode,
            match_policy: self.match_policy,
            required_fields: self.required_fields.clone(),
            max_reported_errors: self.max_reported_errors,
            ..ImportOptions::default()
        }
    }
}

fn config_error(message: impl Into<String>) -> ImportError {
    ImportError::Config {
        message: message.into(),
    }
}
