//! Wiring of transport, session and services for one remote account.
//!
//! Components are built bottom-up and handed to each other explicitly:
//!
//! ```text
//! ClientConfig ─► XmlRpcTransport (EntryPointRouter inside)
//!                        │
//!        Session ────────┼──► AuthService
//!                        └──► ObjectService (AuthService for lazy login)
//! ```

use std::sync::Arc;

use crate::auth::AuthService;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::object::ObjectService;
use crate::session::{Credentials, Session, SharedSession};
use crate::transport::{Transport, XmlRpcTransport};

/// Entry point for callers: one session, its auth and object services.
///
/// # Example
///
/// ```ignore
/// let client = Client::new(ClientConfig::from_env()?)?;
/// let ids = client.object().search("res.partner", &[DomainItem::term("name", "=", "Doe")], 0, 1000).await?;
/// let records = client.object().read("res.partner", ids, &["name"]).await?;
/// ```
#[derive(Clone)]
pub struct Client {
    session: SharedSession,
    auth: AuthService,
    object: ObjectService,
    http: Option<Arc<XmlRpcTransport>>,
}

impl Client {
    /// Build an HTTP-backed client from configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = Arc::new(XmlRpcTransport::from_config(&config)?);
        let mut client = Self::with_transport(transport.clone(), config.credentials());
        client.http = Some(transport);
        Ok(client)
    }

    /// Build a client over any transport.
    pub fn with_transport(transport: Arc<dyn Transport>, credentials: Credentials) -> Self {
        let session = Session::shared(credentials);
        let auth = AuthService::new(transport.clone(), session.clone());
        let object = ObjectService::new(transport, session.clone(), auth.clone());
        Self {
            session,
            auth,
            object,
            http: None,
        }
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn object(&self) -> &ObjectService {
        &self.object
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Log in now instead of on the first object call.
    pub async fn login(&self) -> Result<i64> {
        self.auth.login().await
    }

    /// Replace credentials; the next object call logs in again.
    pub async fn set_credentials(&self, credentials: Credentials) {
        self.session.write().await.set_credentials(credentials);
    }

    /// Raw body of the last request, when backed by HTTP.
    pub fn last_request(&self) -> Option<String> {
        self.http.as_ref().and_then(|t| t.last_request())
    }

    /// Raw body of the last response, when backed by HTTP.
    pub fn last_response(&self) -> Option<String> {
        self.http.as_ref().and_then(|t| t.last_response())
    }
}
