//! OpenERP XML-RPC client library.
//!
//! - `codec` - XML-RPC envelope encoding/decoding and list normalization
//! - `transport` - HTTP transport and the `Transport` seam
//! - `router` - service name to entry point path mapping
//! - `session` - credentials and authentication state
//! - `auth` - login and other `common` service calls
//! - `object` - search/read/write/unlink and external id resolution
//! - `client` - wiring of all of the above from a `ClientConfig`
//!
//! # Usage
//!
//! ```ignore
//! use openerp_rpc::{Client, ClientConfig, DomainItem};
//!
//! let client = Client::new(ClientConfig::from_env()?)?;
//! let object = client.object();
//!
//! // Logs in on first use.
//! let ids = object.search("res.partner", &[DomainItem::term("name", "=", "Doe")], 0, 1000).await?;
//! let partners = object.read("res.partner", ids, &["name"]).await?;
//!
//! let countries = object.resolve_external_ids("res.country", &["base.us", "base.uk"]).await?;
//! ```

pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod external_id;
pub mod object;
pub mod router;
pub mod session;
pub mod transport;
pub mod value;

pub use auth::AuthService;
pub use client::Client;
pub use config::ClientConfig;
pub use domain::DomainItem;
pub use error::RpcError;
pub use external_id::ExternalId;
pub use object::{FieldSelection, IdList, ObjectService};
pub use router::{EntryPointRouter, Service};
pub use session::{AuthState, Credentials, Session, SharedSession};
pub use transport::{Transport, XmlRpcTransport};
pub use value::{Fault, Record, RpcCall, RpcResult, Value};
