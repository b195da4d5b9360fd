//! Logical service name to URL path mapping.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, RpcError};

/// The fixed set of remote entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Common,
    Object,
    Db,
    Report,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Common => "common",
            Service::Object => "object",
            Service::Db => "db",
            Service::Report => "report",
        }
    }

    /// Path of this entry point below the configured root.
    pub fn path(&self) -> &'static str {
        match self {
            Service::Common => "/xmlrpc/common",
            Service::Object => "/xmlrpc/object",
            Service::Db => "/xmlrpc/db",
            Service::Report => "/xmlrpc/report_spool",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = RpcError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "common" => Ok(Service::Common),
            "object" => Ok(Service::Object),
            "db" => Ok(Service::Db),
            "report" => Ok(Service::Report),
            other => Err(RpcError::UnknownService(other.to_string())),
        }
    }
}

/// Resolves service names to request paths, optionally under a root path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPointRouter {
    root: String,
}

impl EntryPointRouter {
    /// Router with no root prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Router prefixing every path with `root`.
    ///
    /// # Errors
    ///
    /// `RpcError::InvalidConfig` unless `root` is empty or starts with `/`
    /// and does not end with `/`.
    pub fn with_root(root: impl Into<String>) -> Result<Self> {
        let root = root.into();
        validate_root_path(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Path for a service name.
    ///
    /// # Errors
    ///
    /// `RpcError::UnknownService` for names outside the fixed set. This is a
    /// configuration error and is never worth retrying.
    pub fn resolve(&self, name: &str) -> Result<String> {
        let service: Service = name.parse()?;
        Ok(self.path_for(service))
    }

    pub fn path_for(&self, service: Service) -> String {
        format!("{}{}", self.root, service.path())
    }
}

/// Root paths are either empty or `/segment[/segment...]` without a trailing slash.
pub fn validate_root_path(root: &str) -> Result<()> {
    if root.is_empty() {
        return Ok(());
    }
    if !root.starts_with('/') {
        return Err(RpcError::InvalidConfig(format!(
            "root path {:?} must start with '/'",
            root
        )));
    }
    if root.ends_with('/') {
        return Err(RpcError::InvalidConfig(format!(
            "root path {:?} must not end with '/'",
            root
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_services() {
        let router = EntryPointRouter::new();
        assert_eq!(router.resolve("common").unwrap(), "/xmlrpc/common");
        assert_eq!(router.resolve("object").unwrap(), "/xmlrpc/object");
        assert_eq!(router.resolve("db").unwrap(), "/xmlrpc/db");
        assert_eq!(router.resolve("report").unwrap(), "/xmlrpc/report_spool");
    }

    #[test]
    fn test_resolve_with_root() {
        let router = EntryPointRouter::with_root("/erp").unwrap();
        assert_eq!(router.resolve("object").unwrap(), "/erp/xmlrpc/object");
    }

    #[test]
    fn test_unknown_service_fails_fast() {
        let err = EntryPointRouter::new().resolve("reports").unwrap_err();
        assert!(matches!(err, RpcError::UnknownService(ref name) if name == "reports"));
    }

    #[test]
    fn test_root_path_validation() {
        assert!(EntryPointRouter::with_root("").is_ok());
        assert!(EntryPointRouter::with_root("/a/b").is_ok());
        assert!(matches!(
            EntryPointRouter::with_root("erp"),
            Err(RpcError::InvalidConfig(_))
        ));
        assert!(matches!(
            EntryPointRouter::with_root("/erp/"),
            Err(RpcError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_service_display_roundtrip() {
        for service in [Service::Common, Service::Object, Service::Db, Service::Report] {
            assert_eq!(service.to_string().parse::<Service>().unwrap(), service);
        }
    }
}
