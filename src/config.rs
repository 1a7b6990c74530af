// src/config.rs

//! Run files: loop options plus linear-market data, as JSON.
//!
//! ```json
//! {
//!   "options": { "tol": 1e-4, "damping": 0.5 },
//!   "market": {
//!     "product": "CO2",
//!     "periods": [{ "intercept": 100.0, "slope": 1.0 }],
//!     "suppliers": [
//!       { "id": "A", "marginal_cost": 10.0 },
//!       { "id": "B", "marginal_cost": 10.0, "capacity": 40.0 }
//!     ]
//!   }
//! }
//! ```
//!
//! `options` may be omitted entirely; missing fields take their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cournot::EquilibriumOptions;
use crate::error::EquilibriumError;
use crate::market::linear::{LinearMarketConfig, LinearMarketError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read run file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid run file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid options: {0}")]
    Options(#[from] EquilibriumError),
    #[error("invalid market: {0}")]
    Market(#[from] LinearMarketError),
}

/// Everything one run of the `cournot` binary needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub options: EquilibriumOptions,
    pub market: LinearMarketConfig,
}

impl RunConfig {
    pub fn new(options: EquilibriumOptions, market: LinearMarketConfig) -> Self {
        Self { options, market }
    }

    /// Load and validate a run file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails validation.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a run file's contents.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Options must be in range, the market well formed, and an explicit
    /// order a permutation of the market's suppliers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.options.validate()?;
        self.market.validate()?;
        let ids: Vec<_> = self.market.suppliers.iter().map(|s| s.id.clone()).collect();
        self.options.resolve_order(&ids)?;
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
