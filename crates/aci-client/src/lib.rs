//! Cisco ACI (APIC) REST API Client
//!
//! A blocking Rust client for the APIC object-model REST API: an
//! authenticated session that recovers once from an expired cookie, a
//! declarative query builder, a response document that reads both the JSON
//! and the markup encoding, and IPv4 subnet arithmetic.
//!
//! # Example
//!
//! ```no_run
//! use aci_client::{Query, Session, SessionConfig, SubtreeMode};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig {
//!     username: Some("admin".to_string()),
//!     password: Some("password".to_string()),
//!     ..SessionConfig::default()
//! };
//!
//! // Probes the controller; fails if it does not answer
//! let mut session = Session::connect("10.0.0.1", &config)?;
//! session.login(None, None)?;
//!
//! // Class query with a shorthand filter
//! let mut query = Query::new("fvBD")?
//!     .with_filter("name=web")
//!     .with_subtree(SubtreeMode::Children);
//! let bds = query.execute(&mut session)?;
//! for dn in bds.attribute("dn")? {
//!     println!("{dn}");
//! }
//!
//! session.logout()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Sessions**: login, refresh and logout with one automatic re-login on 403
//! - **Queries**: validated query options compiled to APIC query parameters
//! - **Documents**: JSON and markup responses in one model, convertible both ways
//! - **Addresses**: subnet, broadcast, gateway and range computations

pub mod address;
pub mod config;
pub mod document;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod query;
pub mod session;
pub mod transport;

pub use address::{Address, GatewayRule, Mask};
pub use config::SessionConfig;
pub use document::{ApiFault, Content, Format, ManagedObject, ResponseDocument};
pub use error::AciError;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockTransport;
pub use query::{
    Filter, IncludeDirective, IncludeOption, PropInclude, Query, QueryParameters, QueryPath, QueryTarget,
    SavedQuery, SubtreeInclude, SubtreeMode,
};
pub use session::{NodeIdentity, Payload, Session, SessionSource, SessionStatus};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};
