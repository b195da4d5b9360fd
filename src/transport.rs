//! HTTP transport for XML-RPC calls.
//!
//! [`Transport`] is the seam the auth and object services talk through. The
//! production implementation, [`XmlRpcTransport`], POSTs one encoded request
//! per call and decodes the reply; tests substitute scripted transports.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::codec::{check_charset, decode_response, encode_call};
use crate::config::ClientConfig;
use crate::error::{Result, RpcError};
use crate::router::EntryPointRouter;
use crate::value::{RpcCall, RpcResult, Value};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default user agent sent with every request.
pub const USER_AGENT: &str = concat!("openerp-rpc/", env!("CARGO_PKG_VERSION"));

/// Content type of every request body.
const CONTENT_TYPE_XML: &str = "text/xml; charset=utf-8";

/// One remote call against a named entry point.
///
/// Faults come back as `Ok(RpcResult::Fault(_))`; `Err` is reserved for
/// routing, network and decoding failures.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, service: &str, method: &str, args: Vec<Value>) -> Result<RpcResult>;
}

#[derive(Debug, Default)]
struct Exchange {
    request: Option<String>,
    response: Option<String>,
}

/// XML-RPC over HTTP.
///
/// Issues exactly one POST per [`Transport::call`]: no retries, no caching.
/// The last raw request and response are kept for diagnostics.
///
/// # Example
///
/// ```ignore
/// let transport = XmlRpcTransport::new("http://localhost", 8069, EntryPointRouter::new(), "utf-8")?;
/// let result = transport.call("common", "version", vec![]).await?;
/// ```
#[derive(Debug)]
pub struct XmlRpcTransport {
    http: reqwest::Client,
    base_url: Url,
    router: EntryPointRouter,
    charset: String,
    user_agent: String,
    exchange: Mutex<Exchange>,
}

impl XmlRpcTransport {
    /// Build a transport for `url` (scheme and host) on `port`.
    ///
    /// # Errors
    ///
    /// `RpcError::InvalidConfig` if the URL does not parse or cannot carry a
    /// port, or `charset` is not UTF-8; `RpcError::Transport` if the HTTP
    /// client cannot be built.
    pub fn new(url: &str, port: u16, router: EntryPointRouter, charset: &str) -> Result<Self> {
        Self::with_timeout(
            url,
            port,
            router,
            charset,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Same as [`XmlRpcTransport::new`] with an explicit request timeout.
    pub fn with_timeout(
        url: &str,
        port: u16,
        router: EntryPointRouter,
        charset: &str,
        timeout: Duration,
    ) -> Result<Self> {
        Self::build(url, port, router, charset, timeout, USER_AGENT)
    }

    fn build(
        url: &str,
        port: u16,
        router: EntryPointRouter,
        charset: &str,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        check_charset(charset)?;
        let mut base_url = Url::parse(url.trim_end_matches('/'))
            .map_err(|e| RpcError::InvalidConfig(format!("invalid url {:?}: {}", url, e)))?;
        base_url
            .set_port(Some(port))
            .map_err(|_| RpcError::InvalidConfig(format!("url {:?} cannot carry a port", url)))?;

        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            router,
            charset: charset.to_string(),
            user_agent: user_agent.to_string(),
            exchange: Mutex::new(Exchange::default()),
        })
    }

    /// Build a transport from a validated configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let router = EntryPointRouter::with_root(config.root_path.clone())?;
        Self::build(
            &config.url,
            config.port,
            router,
            &config.charset,
            Duration::from_secs(config.timeout_secs),
            &config.user_agent,
        )
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn router(&self) -> &EntryPointRouter {
        &self.router
    }

    /// Full URL a service name resolves to.
    pub fn endpoint(&self, service: &str) -> Result<Url> {
        let path = self.router.resolve(service)?;
        let mut url = self.base_url.clone();
        url.set_path(&path);
        Ok(url)
    }

    /// Raw body of the most recent request, if any.
    pub fn last_request(&self) -> Option<String> {
        self.exchange().request.clone()
    }

    /// Raw body of the most recent response, if any.
    pub fn last_response(&self) -> Option<String> {
        self.exchange().response.clone()
    }

    fn exchange(&self) -> MutexGuard<'_, Exchange> {
        self.exchange.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for XmlRpcTransport {
    async fn call(&self, service: &str, method: &str, args: Vec<Value>) -> Result<RpcResult> {
        // Routing errors surface before anything touches the network.
        let url = self.endpoint(service)?;

        let payload = encode_call(&RpcCall::new(method, args), &self.charset)?;
        tracing::debug!(
            service,
            method,
            bytes = payload.len(),
            "Sending XML-RPC request to {}",
            url
        );
        {
            let mut exchange = self.exchange();
            exchange.request = Some(payload.clone());
            exchange.response = None;
        }

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, CONTENT_TYPE_XML)
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        self.exchange().response = Some(body.clone());

        if !status.is_success() {
            tracing::warn!(service, method, status = status.as_u16(), "HTTP error response");
            return Err(RpcError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let result = decode_response(&body)?;
        if let RpcResult::Fault(fault) = &result {
            tracing::warn!(service, method, code = fault.code, "Server fault: {}", fault.message);
        } else {
            tracing::debug!(service, method, bytes = body.len(), "Received XML-RPC response");
        }
        Ok(result)
    }
}
