//! Queries persisted to disk
//!
//! A saved query is the controller it ran against, its normalised path and
//! its compiled parameters, stored as a small JSON file:
//!
//! ```json
//! {"node": "10.0.0.1", "path": "class/fvTenant.json", "parameters": {"query-target": "self"}}
//! ```

use super::{Query, QueryParameters};
use crate::error::AciError;
use crate::session::SessionSource;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// A query that can be written out and re-run later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedQuery {
    /// Address of the controller the query runs against
    pub node: String,
    pub path: String,
    #[serde(default)]
    pub parameters: QueryParameters,
}

impl SavedQuery {
    /// Capture `query` as it would be sent to `node`
    pub fn from_query(node: impl Into<String>, query: &Query) -> Result<Self, AciError> {
        let path = query
            .path()
            .ok_or_else(|| AciError::InvalidQueryOption("cannot save a query without a path".to_string()))?;
        Ok(Self {
            node: node.into(),
            path: path.to_string(),
            parameters: query.compile()?,
        })
    }

    pub fn write(&self, file: impl AsRef<Path>) -> Result<(), AciError> {
        let file = file.as_ref();
        fs::write(file, serde_json::to_string(self)?)?;
        debug!("Saved query {} to {}", self.path, file.display());
        Ok(())
    }

    pub fn read(file: impl AsRef<Path>) -> Result<Self, AciError> {
        let text = fs::read_to_string(file.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Rebuild the query, validating every stored parameter
    pub fn to_query(&self) -> Result<Query, AciError> {
        Query::from_parameters(&self.path, &self.parameters)
    }

    /// Where to run the query
    pub fn session_source<T: Transport>(&self) -> SessionSource<T> {
        SessionSource::Address(self.node.clone())
    }
}
