//! Login and the other `common` entry point calls.

use std::sync::Arc;

use crate::error::{Result, RpcError};
use crate::router::Service;
use crate::session::{Credentials, SharedSession};
use crate::transport::Transport;
use crate::value::{RpcResult, Value};

/// Authenticates the shared session against the `common` service.
#[derive(Clone)]
pub struct AuthService {
    transport: Arc<dyn Transport>,
    session: SharedSession,
}

impl AuthService {
    pub fn new(transport: Arc<dyn Transport>, session: SharedSession) -> Self {
        Self { transport, session }
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Replace the stored credentials and log in with them.
    pub async fn login_with(&self, credentials: Credentials) -> Result<i64> {
        self.session.write().await.set_credentials(credentials);
        self.login().await
    }

    /// Log in with the stored credentials and record the user id.
    ///
    /// Any falsy result (`0`, `false`, empty string) counts as a rejected
    /// login even though the server raised no fault.
    ///
    /// # Errors
    ///
    /// - `RpcError::AuthenticationFailed` on a fault or a falsy user id
    /// - transport and decode errors as-is
    pub async fn login(&self) -> Result<i64> {
        let credentials = self.session.read().await.credentials().clone();
        let args = vec![
            Value::from(credentials.database.as_str()),
            Value::from(credentials.username.as_str()),
            Value::from(credentials.password.as_str()),
        ];

        let outcome = self
            .transport
            .call(Service::Common.as_str(), "login", args)
            .await;

        let value = match outcome {
            Ok(RpcResult::Success(value)) => value,
            Ok(RpcResult::Fault(fault)) => {
                self.session.write().await.logout();
                tracing::warn!(
                    database = %credentials.database,
                    username = %credentials.username,
                    "Login fault: {}",
                    fault.message
                );
                return Err(RpcError::AuthenticationFailed {
                    code: fault.code,
                    message: fault.message,
                });
            }
            Err(e) => {
                self.session.write().await.logout();
                return Err(e);
            }
        };

        let user_id = match value {
            Value::Int(uid) if uid != 0 => uid,
            other => {
                self.session.write().await.logout();
                let message = if other.is_truthy() {
                    format!("unexpected login result of kind {}", other.kind())
                } else {
                    format!(
                        "login rejected for {:?} on database {:?}",
                        credentials.username, credentials.database
                    )
                };
                tracing::warn!("{}", message);
                return Err(RpcError::AuthenticationFailed { code: 0, message });
            }
        };

        self.session.write().await.mark_authenticated(user_id);
        tracing::info!(
            database = %credentials.database,
            username = %credentials.username,
            user_id,
            "Logged in"
        );
        Ok(user_id)
    }

    /// Server version string (the `server_version` member of `common.version`).
    pub async fn version(&self) -> Result<String> {
        let value = self.common("version", Vec::new()).await?;
        match value {
            Value::String(version) => Ok(version),
            Value::Struct(members) => members
                .get("server_version")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    RpcError::ShapeNormalization("version struct without server_version".into())
                }),
            other => Err(RpcError::ShapeNormalization(format!(
                "version result of kind {}",
                other.kind()
            ))),
        }
    }

    /// Raw `common.about` result.
    pub async fn about(&self, extended: bool) -> Result<Value> {
        self.common("about", vec![Value::Bool(extended)]).await
    }

    /// Time zone of the server, via `common.timezone_get`.
    pub async fn timezone(&self) -> Result<String> {
        let credentials = self.session.read().await.credentials().clone();
        let args = vec![
            Value::from(credentials.database),
            Value::from(credentials.username),
            Value::from(credentials.password),
        ];
        match self.common("timezone_get", args).await? {
            Value::String(tz) => Ok(tz),
            other => Err(RpcError::ShapeNormalization(format!(
                "timezone result of kind {}",
                other.kind()
            ))),
        }
    }

    async fn common(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.transport
            .call(Service::Common.as_str(), method, args)
            .await?
            .into_value()
    }
}
