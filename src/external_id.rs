//! External ids (`module.name`) and the mapping-model query built from them.

use std::fmt;

use crate::domain::{any_of, both, DomainItem};
use crate::value::Value;

/// Remote model holding the external id to internal id mapping.
pub const MAPPING_MODEL: &str = "ir.model.data";

/// A qualified record name. A name without `.` belongs to module `""`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalId {
    pub module: String,
    pub name: String,
}

impl ExternalId {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    /// Split at the first `.`; everything after it is the name.
    pub fn parse(qualified: &str) -> Self {
        match qualified.split_once('.') {
            Some((module, name)) => Self::new(module, name),
            None => Self::new("", qualified),
        }
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}.{}", self.module, self.name)
        }
    }
}

/// Group names by module, keeping first-seen module order and dropping
/// repeated names.
pub fn group_by_module(ids: &[ExternalId]) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for id in ids {
        match groups.iter_mut().find(|(module, _)| *module == id.module) {
            Some((_, names)) => {
                if !names.contains(&id.name) {
                    names.push(id.name.clone());
                }
            }
            None => groups.push((id.module.clone(), vec![id.name.clone()])),
        }
    }
    groups
}

/// Mapping-model search for `ids` within `target_model`.
///
/// ```text
/// [("model","=",target)] ++ (modules-1) x "|" ++ per module: ["&", ("module","=",m), ("name","in",[..])]
/// ```
pub fn mapping_domain(target_model: &str, ids: &[ExternalId]) -> Vec<DomainItem> {
    let groups = group_by_module(ids)
        .into_iter()
        .map(|(module, names)| {
            both(
                DomainItem::term("module", "=", module),
                DomainItem::term("name", "in", Value::from(names)),
            )
        })
        .collect();

    let mut domain = vec![DomainItem::term("model", "=", target_model)];
    domain.extend(any_of(groups));
    domain
}
