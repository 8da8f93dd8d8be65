//! Declarative APIC read queries
//!
//! A [`Query`] describes one read: a path (instance or class scope) plus up
//! to nine options. Options are validated when they are parsed; [`Query::compile`]
//! turns them into the wire parameter map, and [`Query::execute`] runs the
//! query through a [`Session`] and keeps the resulting [`ResponseDocument`].
//!
//! ```no_run
//! use aci_client::{Query, QueryTarget, Session, SessionConfig};
//!
//! # fn example() -> Result<(), aci_client::AciError> {
//! let mut session = Session::connect("10.0.0.1", &SessionConfig::from_env()?)?;
//! let mut query = Query::new("fvTenant")?
//!     .with_filter("name=common")
//!     .with_target(QueryTarget::SelfOnly);
//! let tenants = query.execute(&mut session)?;
//! println!("{}", tenants.count());
//! # Ok(())
//! # }
//! ```

pub mod options;
pub mod saved;

pub use options::{IncludeDirective, IncludeOption, PropInclude, QueryTarget, SubtreeInclude, SubtreeMode};
pub use saved::SavedQuery;

use crate::document::ResponseDocument;
use crate::error::AciError;
use crate::session::Session;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

pub const QUERY_TARGET: &str = "query-target";
pub const TARGET_SUBTREE_CLASS: &str = "target-subtree-class";
pub const QUERY_TARGET_FILTER: &str = "query-target-filter";
pub const RSP_PROP_INCLUDE: &str = "rsp-prop-include";
pub const RSP_SUBTREE: &str = "rsp-subtree";
pub const RSP_SUBTREE_CLASS: &str = "rsp-subtree-class";
pub const RSP_SUBTREE_FILTER: &str = "rsp-subtree-filter";
pub const RSP_SUBTREE_INCLUDE: &str = "rsp-subtree-include";
pub const ORDER_BY: &str = "order-by";

/// Normalised query path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryPath {
    /// `mo/<dn>.json`
    Instance(String),
    /// `class/<class>.json`
    Class(String),
}

impl QueryPath {
    /// Classify a path: an explicit `mo/` or `class/` prefix wins, otherwise a
    /// path containing `/` is a dn and anything else a class name. A trailing
    /// `.json` is dropped.
    pub fn parse(path: &str) -> Result<Self, AciError> {
        let path = path.trim().trim_start_matches('/');
        let path = path.strip_suffix(".json").unwrap_or(path);

        let parsed = if let Some(dn) = path.strip_prefix("mo/") {
            Self::Instance(dn.to_string())
        } else if let Some(class) = path.strip_prefix("class/") {
            Self::Class(class.to_string())
        } else if path.contains('/') {
            Self::Instance(path.to_string())
        } else {
            Self::Class(path.to_string())
        };

        match &parsed {
            Self::Instance(name) | Self::Class(name) if name.is_empty() => {
                Err(AciError::InvalidQueryOption(format!("{path:?} does not name an object or class")))
            }
            Self::Class(class) if class.contains('/') => {
                Err(AciError::InvalidQueryOption(format!("{class:?} is not a class name")))
            }
            _ => Ok(parsed),
        }
    }

    /// Path below `/api/`
    pub fn api_path(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for QueryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(dn) => write!(f, "mo/{dn}.json"),
            Self::Class(class) => write!(f, "class/{class}.json"),
        }
    }
}

/// `query-target-filter` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// A complete filter expression, passed through unchanged
    Expression(String),
    /// `key=value`, expanded to `eq(<class>.<key>, "<value>")`
    Shorthand { key: String, value: String },
}

impl Filter {
    /// Treat `key=value` with a plain property name as shorthand, anything else as an expression
    pub fn parse(filter: &str) -> Self {
        if let Some((key, value)) = filter.split_once('=') {
            let key = key.trim();
            let plain_key = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if plain_key && !value.contains('=') {
                return Self::Shorthand {
                    key: key.to_string(),
                    value: value.trim_start().to_string(),
                };
            }
        }
        Self::Expression(filter.to_string())
    }

    /// Wire form, given the class the shorthand applies to
    pub fn expand(&self, class: &str) -> String {
        match self {
            Self::Expression(expression) => expression.clone(),
            Self::Shorthand { key, value } => format!("eq({class}.{key}, \"{value}\")"),
        }
    }
}

/// Compiled wire parameters; absent options are simply missing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParameters(BTreeMap<String, String>);

impl QueryParameters {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Borrowed pairs in the form [`Session::get`] takes
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.iter().collect()
    }

    fn insert(&mut self, key: &str, value: Option<String>) {
        if let Some(value) = value {
            self.0.insert(key.to_string(), value);
        }
    }
}

impl FromIterator<(String, String)> for QueryParameters {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One read query and its most recent output
#[derive(Debug, Clone, Default)]
pub struct Query {
    path: Option<QueryPath>,
    target: Option<QueryTarget>,
    target_class: Option<String>,
    filter: Option<Filter>,
    include: Option<PropInclude>,
    subtree: Option<SubtreeMode>,
    subtree_class: Option<String>,
    subtree_filter: Option<String>,
    subtree_include: Option<SubtreeInclude>,
    order: Option<String>,
    /// Class of the instance path, looked up once per path
    resolved_class: Option<String>,
    output: Option<ResponseDocument>,
}

impl Query {
    /// Create a query for `path` with no options
    pub fn new(path: &str) -> Result<Self, AciError> {
        Ok(Self {
            path: Some(QueryPath::parse(path)?),
            ..Self::default()
        })
    }

    /// Rebuild a query from a compiled parameter map, validating every entry
    pub fn from_parameters(path: &str, parameters: &QueryParameters) -> Result<Self, AciError> {
        let mut query = Self::new(path)?;
        for (key, value) in parameters.iter() {
            query.set(key, value)?;
        }
        Ok(query)
    }

    /// Set one option from its wire name and value; an empty value clears it
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), AciError> {
        let text = Some(value.trim()).filter(|v| !v.is_empty());
        match key {
            QUERY_TARGET => self.target = text.map(str::parse::<QueryTarget>).transpose()?,
            TARGET_SUBTREE_CLASS => self.target_class = text.map(str::to_string),
            QUERY_TARGET_FILTER => self.filter = text.map(Filter::parse),
            RSP_PROP_INCLUDE => self.include = text.map(str::parse::<PropInclude>).transpose()?,
            RSP_SUBTREE => self.subtree = text.map(str::parse::<SubtreeMode>).transpose()?,
            RSP_SUBTREE_CLASS => self.subtree_class = text.map(str::to_string),
            RSP_SUBTREE_FILTER => self.subtree_filter = text.map(str::to_string),
            RSP_SUBTREE_INCLUDE => self.subtree_include = text.map(str::parse::<SubtreeInclude>).transpose()?,
            ORDER_BY => self.order = text.map(str::to_string),
            other => {
                return Err(AciError::InvalidQueryOption(format!("unknown query parameter {other:?}")));
            }
        }
        self.output = None;
        Ok(())
    }

    #[must_use]
    pub fn with_target(mut self, target: QueryTarget) -> Self {
        self.target = Some(target);
        self.invalidated()
    }

    #[must_use]
    pub fn with_target_class(mut self, class: impl Into<String>) -> Self {
        self.target_class = Some(class.into());
        self.invalidated()
    }

    /// Filter expression, or `key=value` shorthand
    #[must_use]
    pub fn with_filter(mut self, filter: &str) -> Self {
        self.filter = Some(Filter::parse(filter));
        self.invalidated()
    }

    #[must_use]
    pub fn with_include(mut self, include: PropInclude) -> Self {
        self.include = Some(include);
        self.invalidated()
    }

    #[must_use]
    pub fn with_subtree(mut self, subtree: SubtreeMode) -> Self {
        self.subtree = Some(subtree);
        self.invalidated()
    }

    #[must_use]
    pub fn with_subtree_class(mut self, class: impl Into<String>) -> Self {
        self.subtree_class = Some(class.into());
        self.invalidated()
    }

    #[must_use]
    pub fn with_subtree_filter(mut self, filter: impl Into<String>) -> Self {
        self.subtree_filter = Some(filter.into());
        self.invalidated()
    }

    #[must_use]
    pub fn with_subtree_include(mut self, include: impl Into<SubtreeInclude>) -> Self {
        self.subtree_include = Some(include.into());
        self.invalidated()
    }

    #[must_use]
    pub fn with_order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self.invalidated()
    }

    fn invalidated(mut self) -> Self {
        self.output = None;
        self
    }

    pub fn path(&self) -> Option<&QueryPath> {
        self.path.as_ref()
    }

    /// Change the path; a different path drops the cached output and class
    pub fn set_path(&mut self, path: &str) -> Result<(), AciError> {
        let path = if path.trim().is_empty() {
            None
        } else {
            Some(QueryPath::parse(path)?)
        };
        if path != self.path {
            self.output = None;
            self.resolved_class = None;
        }
        self.path = path;
        Ok(())
    }

    /// Clear the path and every option
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    /// Class the query's objects belong to, when known without a lookup
    pub fn output_class(&self) -> Option<&str> {
        match &self.path {
            Some(QueryPath::Class(class)) => Some(class),
            Some(QueryPath::Instance(_)) => self.resolved_class.as_deref(),
            None => None,
        }
    }

    /// Look up the class of an instance path when a shorthand filter needs it
    pub fn resolve<T: Transport>(&mut self, session: &mut Session<T>) -> Result<(), AciError> {
        let needs_class = matches!(self.filter, Some(Filter::Shorthand { .. }))
            && self.resolved_class.is_none();
        if let (true, Some(QueryPath::Instance(dn))) = (needs_class, &self.path) {
            let class = session.class_of(dn)?;
            debug!("Resolved {} to class {}", dn, class);
            self.resolved_class = Some(class);
        }
        Ok(())
    }

    /// Compile the options into wire parameters
    pub fn compile(&self) -> Result<QueryParameters, AciError> {
        let filter = match &self.filter {
            None => None,
            Some(Filter::Expression(expression)) => Some(expression.clone()),
            Some(shorthand) => {
                let class = self.output_class().ok_or_else(|| {
                    AciError::InvalidQueryOption(
                        "shorthand filter needs the class of the path; resolve the query first".to_string(),
                    )
                })?;
                Some(shorthand.expand(class))
            }
        };

        let mut parameters = QueryParameters::default();
        parameters.insert(QUERY_TARGET, self.target.map(|v| v.to_string()));
        parameters.insert(TARGET_SUBTREE_CLASS, self.target_class.clone());
        parameters.insert(QUERY_TARGET_FILTER, filter);
        parameters.insert(RSP_PROP_INCLUDE, self.include.map(|v| v.to_string()));
        parameters.insert(RSP_SUBTREE, self.subtree.map(|v| v.to_string()));
        parameters.insert(RSP_SUBTREE_CLASS, self.subtree_class.clone());
        parameters.insert(RSP_SUBTREE_FILTER, self.subtree_filter.clone());
        parameters.insert(RSP_SUBTREE_INCLUDE, self.subtree_include.map(|v| v.to_string()));
        parameters.insert(ORDER_BY, self.order.clone());
        Ok(parameters)
    }

    /// Run the query, reusing the previous output while path and options are unchanged
    pub fn execute<T: Transport>(&mut self, session: &mut Session<T>) -> Result<&ResponseDocument, AciError> {
        if self.output.is_some() {
            debug!("Reusing cached output for {:?}", self.path);
        } else {
            let path = self
                .path
                .clone()
                .ok_or_else(|| AciError::InvalidQueryOption("path has not been set".to_string()))?;
            self.resolve(session)?;
            let parameters = self.compile()?;
            debug!("Running query {} with {} parameters", path, parameters.len());
            let document = session.get_document(&path.api_path(), &parameters.pairs())?;
            self.output = Some(document);
        }
        self.output
            .as_ref()
            .ok_or_else(|| AciError::InvalidQueryOption("query produced no output".to_string()))
    }

    /// Drop the cached output and run the query again
    pub fn refresh<T: Transport>(&mut self, session: &mut Session<T>) -> Result<&ResponseDocument, AciError> {
        self.output = None;
        self.execute(session)
    }

    /// Output of the last execution
    pub fn output(&self) -> Option<&ResponseDocument> {
        self.output.as_ref()
    }

    pub fn count(&self) -> Option<u64> {
        self.output.as_ref().map(ResponseDocument::count)
    }
}
