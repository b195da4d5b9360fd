//! Generic record access over the `object` entry point.
//!
//! Every operation funnels through [`ObjectService::execute`], which logs in
//! lazily and prefixes the positional arguments with
//! `(database, user_id, password, model, method)`.
//!
//! External ids are resolved in two round trips: a search on
//! [`MAPPING_MODEL`] with a prefix-notation domain, then a read of the
//! matching mapping rows. Names with no mapping row are left out of the
//! result rather than reported as errors.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::auth::AuthService;
use crate::codec::{normalize_ids, normalize_records};
use crate::domain::{domain_to_value, DomainItem};
use crate::error::{Result, RpcError};
use crate::external_id::{mapping_domain, ExternalId, MAPPING_MODEL};
use crate::router::Service;
use crate::session::{Credentials, SharedSession};
use crate::transport::Transport;
use crate::value::{Record, Value};

/// Default page size for [`ObjectService::search`].
pub const DEFAULT_SEARCH_LIMIT: i64 = 1000;

/// A zero limit asks the server for every match.
const UNLIMITED: i64 = 0;

/// Fields read from the target model by `list_with_external_ids` by default.
const DEFAULT_LISTING_FIELDS: [&str; 2] = ["id", "name"];

/// Mapping-model fields shown alongside each listed record.
const LISTING_MAPPING_FIELDS: [&str; 3] = ["display_name", "complete_name", "res_id"];

/// One or more internal ids. A bare id becomes a one-element list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdList(pub Vec<i64>);

impl IdList {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn to_value(&self) -> Value {
        Value::from(self.0.clone())
    }
}

impl From<i64> for IdList {
    fn from(id: i64) -> Self {
        IdList(vec![id])
    }
}

impl From<Vec<i64>> for IdList {
    fn from(ids: Vec<i64>) -> Self {
        IdList(ids)
    }
}

impl From<&[i64]> for IdList {
    fn from(ids: &[i64]) -> Self {
        IdList(ids.to_vec())
    }
}

impl<const N: usize> From<[i64; N]> for IdList {
    fn from(ids: [i64; N]) -> Self {
        IdList(ids.to_vec())
    }
}

/// Which target-model fields `list_with_external_ids` reads.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldSelection {
    /// `id` and `name`
    #[default]
    Default,
    /// Every field of the model
    All,
    /// `id`, `name` and the given extras
    Extra(Vec<String>),
}

impl FieldSelection {
    fn fields(&self) -> Vec<String> {
        let defaults = DEFAULT_LISTING_FIELDS.iter().map(|f| f.to_string());
        match self {
            FieldSelection::Default => defaults.collect(),
            // An empty field list reads everything.
            FieldSelection::All => Vec::new(),
            FieldSelection::Extra(extra) => {
                let mut fields: Vec<String> = defaults.collect();
                for field in extra {
                    if !fields.contains(field) {
                        fields.push(field.clone());
                    }
                }
                fields
            }
        }
    }
}

/// Generic model access: search, read, write, unlink and friends.
///
/// Not internally synchronized; see [`crate::session`] for what sharing one
/// session between tasks requires.
#[derive(Clone)]
pub struct ObjectService {
    transport: Arc<dyn Transport>,
    session: SharedSession,
    auth: AuthService,
}

impl ObjectService {
    pub fn new(transport: Arc<dyn Transport>, session: SharedSession, auth: AuthService) -> Self {
        Self {
            transport,
            session,
            auth,
        }
    }

    /// Log in with the stored credentials unless already authenticated.
    ///
    /// Returns the user id and the credentials to use for the call. A failed
    /// login surfaces as the login's own error.
    async fn ensure_authenticated(&self) -> Result<(i64, Credentials)> {
        {
            let session = self.session.read().await;
            if let Some(uid) = session.user_id() {
                return Ok((uid, session.credentials().clone()));
            }
        }

        tracing::debug!("Session not authenticated, logging in");
        let uid = self.auth.login().await?;
        let credentials = self.session.read().await.credentials().clone();
        Ok((uid, credentials))
    }

    /// Call `method` on `model` with extra positional arguments.
    ///
    /// # Errors
    ///
    /// Faults become `RpcError::ProtocolFault`; login, transport and decode
    /// errors pass through unchanged.
    pub async fn execute(&self, model: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        let (uid, credentials) = self.ensure_authenticated().await?;

        let mut params = Vec::with_capacity(5 + args.len());
        params.push(Value::from(credentials.database));
        params.push(Value::Int(uid));
        params.push(Value::from(credentials.password));
        params.push(Value::from(model));
        params.push(Value::from(method));
        params.extend(args);

        tracing::debug!(model, method, "execute");
        self.transport
            .call(Service::Object.as_str(), "execute", params)
            .await?
            .into_value()
    }

    /// Create one record and return its id.
    pub async fn create(&self, model: &str, fields: Record) -> Result<i64> {
        let value = self
            .execute(model, "create", vec![Value::Struct(fields)])
            .await?;
        value.as_i64().ok_or_else(|| {
            RpcError::ShapeNormalization(format!("create returned {}", value.kind()))
        })
    }

    /// Ids matching `domain`, paged by `offset` and `limit`.
    pub async fn search(
        &self,
        model: &str,
        domain: &[DomainItem],
        offset: i64,
        limit: i64,
    ) -> Result<Vec<i64>> {
        let value = self
            .execute(
                model,
                "search",
                vec![domain_to_value(domain), Value::Int(offset), Value::Int(limit)],
            )
            .await?;
        normalize_ids(value)
    }

    /// Read `fields` (all fields when empty) of the given records.
    ///
    /// An empty id list returns no records without calling the server.
    pub async fn read(
        &self,
        model: &str,
        ids: impl Into<IdList>,
        fields: &[&str],
    ) -> Result<Vec<Record>> {
        let ids = ids.into();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let value = self
            .execute(model, "read", vec![ids.to_value(), Value::from(fields)])
            .await?;
        normalize_records(value)
    }

    /// [`ObjectService::read`] deserialized into `T` through JSON.
    pub async fn read_as<T: DeserializeOwned>(
        &self,
        model: &str,
        ids: impl Into<IdList>,
        fields: &[&str],
    ) -> Result<Vec<T>> {
        self.read(model, ids, fields)
            .await?
            .into_iter()
            .map(|record| {
                serde_json::from_value(Value::Struct(record).to_json())
                    .map_err(|e| RpcError::Decode(format!("{} record: {}", model, e)))
            })
            .collect()
    }

    /// Update `fields` on every given record; `true` when the server applied it.
    pub async fn write(&self, model: &str, ids: impl Into<IdList>, fields: Record) -> Result<bool> {
        let ids = ids.into();
        let value = self
            .execute(model, "write", vec![ids.to_value(), Value::Struct(fields)])
            .await?;
        Ok(value.is_truthy())
    }

    /// Delete the given records; `true` when the server removed them.
    pub async fn unlink(&self, model: &str, ids: impl Into<IdList>) -> Result<bool> {
        let ids = ids.into();
        let value = self.execute(model, "unlink", vec![ids.to_value()]).await?;
        Ok(value.is_truthy())
    }

    /// The subset of `ids` that still exist.
    ///
    /// Older servers answer with a single boolean; `true` then means all of
    /// the given ids exist.
    pub async fn exists(&self, model: &str, ids: impl Into<IdList>) -> Result<Vec<i64>> {
        let ids = ids.into();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        match self.execute(model, "exists", vec![ids.to_value()]).await? {
            Value::Bool(true) => Ok(ids.0),
            Value::Bool(false) => Ok(Vec::new()),
            other => normalize_ids(other),
        }
    }

    /// Distinct values of `field` matching `value`, via the model's
    /// `distinct_field_get`. Absent `args` and `limit` are sent as nil.
    pub async fn distinct_field_get(
        &self,
        model: &str,
        field: &str,
        value: impl Into<Value>,
        args: Option<&[DomainItem]>,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<Value> {
        self.execute(
            model,
            "distinct_field_get",
            vec![
                Value::from(field),
                value.into(),
                args.map_or(Value::Nil, domain_to_value),
                Value::Int(offset),
                limit.map_or(Value::Nil, Value::Int),
            ],
        )
        .await
    }

    /// `(model, internal id)` for one external id, as the server reports it.
    ///
    /// Unlike [`ObjectService::resolve_external_id`] this faults when the
    /// external id is unknown.
    pub async fn get_object_reference(&self, external_id: &str) -> Result<(String, i64)> {
        let id = ExternalId::parse(external_id);
        let value = self
            .execute(
                MAPPING_MODEL,
                "get_object_reference",
                vec![Value::from(id.module), Value::from(id.name)],
            )
            .await?;

        match value.as_array() {
            Some([Value::String(model), Value::Int(res_id)]) => Ok((model.clone(), *res_id)),
            _ => Err(RpcError::ShapeNormalization(format!(
                "get_object_reference returned {}",
                value.kind()
            ))),
        }
    }

    /// Map external ids of `model` records to internal ids.
    ///
    /// Names without a mapping entry are absent from the result.
    pub async fn resolve_external_ids(
        &self,
        model: &str,
        external_ids: &[&str],
    ) -> Result<BTreeMap<String, i64>> {
        let mut resolved = BTreeMap::new();
        if external_ids.is_empty() {
            return Ok(resolved);
        }

        let ids: Vec<ExternalId> = external_ids.iter().map(|id| ExternalId::parse(id)).collect();
        let domain = mapping_domain(model, &ids);

        let mapping_ids = self
            .search(MAPPING_MODEL, &domain, 0, UNLIMITED)
            .await?;
        let rows = self
            .read(
                MAPPING_MODEL,
                mapping_ids,
                &["module", "name", "complete_name", "res_id"],
            )
            .await?;

        for row in rows {
            let Some(res_id) = row.get("res_id").and_then(Value::as_i64) else {
                continue;
            };
            let key = match (
                row.get("module").and_then(Value::as_str),
                row.get("name").and_then(Value::as_str),
            ) {
                (Some(module), Some(name)) => ExternalId::new(module, name).to_string(),
                _ => match row.get("complete_name").and_then(Value::as_str) {
                    Some(complete_name) => complete_name.to_string(),
                    None => continue,
                },
            };
            resolved.insert(key, res_id);
        }

        tracing::debug!(
            model,
            requested = external_ids.len(),
            resolved = resolved.len(),
            "Resolved external ids"
        );
        Ok(resolved)
    }

    /// Internal id for a single external id, `None` when unknown.
    pub async fn resolve_external_id(&self, model: &str, external_id: &str) -> Result<Option<i64>> {
        let resolved = self.resolve_external_ids(model, &[external_id]).await?;
        let key = ExternalId::parse(external_id).to_string();
        Ok(resolved.get(&key).copied())
    }

    /// Read records of `model` identified by external ids. Unknown ids are
    /// skipped; records come back in the order of `external_ids`.
    pub async fn read_by_external_ids(
        &self,
        model: &str,
        external_ids: &[&str],
        fields: &[&str],
    ) -> Result<Vec<Record>> {
        let resolved = self.resolve_external_ids(model, external_ids).await?;

        let mut res_ids = Vec::new();
        for external_id in external_ids {
            let key = ExternalId::parse(external_id).to_string();
            if let Some(&res_id) = resolved.get(&key) {
                if !res_ids.contains(&res_id) {
                    res_ids.push(res_id);
                }
            }
        }

        self.read(model, res_ids, fields).await
    }

    /// Every record of `model` that has an external id, keyed by internal id.
    ///
    /// Each row carries the mapping fields (`display_name`, `complete_name`,
    /// `res_id`, and the mapping row's own `id`) plus the selected target
    /// fields the mapping row does not already have. Mapping rows whose
    /// target record no longer exists are dropped.
    pub async fn list_with_external_ids(
        &self,
        model: &str,
        selection: FieldSelection,
    ) -> Result<BTreeMap<i64, Record>> {
        let domain = [DomainItem::term("model", "=", model)];
        let mapping_ids = self.search(MAPPING_MODEL, &domain, 0, UNLIMITED).await?;
        let mapping_rows = self
            .read(MAPPING_MODEL, mapping_ids, &LISTING_MAPPING_FIELDS)
            .await?;

        let mut res_ids = Vec::new();
        for row in &mapping_rows {
            if let Some(res_id) = row.get("res_id").and_then(Value::as_i64) {
                if !res_ids.contains(&res_id) {
                    res_ids.push(res_id);
                }
            }
        }

        let fields = selection.fields();
        let field_refs: Vec<&str> = fields.iter().map(String::as_str).collect();
        let records = self.read(model, res_ids, &field_refs).await?;

        let mut by_id: BTreeMap<i64, Record> = BTreeMap::new();
        for record in records {
            if let Some(id) = record.get("id").and_then(Value::as_i64) {
                by_id.insert(id, record);
            }
        }

        let mut joined = BTreeMap::new();
        for row in mapping_rows {
            let Some(res_id) = row.get("res_id").and_then(Value::as_i64) else {
                continue;
            };
            let Some(record) = by_id.get(&res_id) else {
                continue;
            };
            let mut merged = row;
            for (field, value) in record {
                merged.entry(field.clone()).or_insert_with(|| value.clone());
            }
            joined.insert(res_id, merged);
        }

        tracing::debug!(model, records = joined.len(), "Listed records with external ids");
        Ok(joined)
    }
}
