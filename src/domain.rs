//! Search criteria in prefix (Polish) notation.
//!
//! A domain is a flat list. Consecutive terms are implicitly ANDed; `&` and
//! `|` each consume the next two terms or sub-expressions, `!` consumes one:
//!
//! ```text
//! ["|", ("a","=",1), "&", ("b","=",2), ("c","=",3)]   ==   a=1 OR (b=2 AND c=3)
//! ```

use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum DomainItem {
    /// `(field, operator, value)`
    Term {
        field: String,
        operator: String,
        value: Value,
    },
    And,
    Or,
    Not,
}

impl DomainItem {
    pub fn term(field: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        DomainItem::Term {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    /// Wire form: a 3-element array for terms, the operator string otherwise.
    pub fn to_value(&self) -> Value {
        match self {
            DomainItem::Term {
                field,
                operator,
                value,
            } => Value::Array(vec![
                Value::from(field.as_str()),
                Value::from(operator.as_str()),
                value.clone(),
            ]),
            DomainItem::And => Value::from("&"),
            DomainItem::Or => Value::from("|"),
            DomainItem::Not => Value::from("!"),
        }
    }
}

/// Wire form of a whole domain.
pub fn domain_to_value(domain: &[DomainItem]) -> Value {
    Value::Array(domain.iter().map(DomainItem::to_value).collect())
}

/// OR together groups of terms: `n - 1` leading `|` operators, then each
/// group. A group of more than one term must already carry its own `&`
/// prefixes. An empty input yields an empty domain.
pub fn any_of(groups: Vec<Vec<DomainItem>>) -> Vec<DomainItem> {
    let mut domain: Vec<DomainItem> = std::iter::repeat(DomainItem::Or)
        .take(groups.len().saturating_sub(1))
        .collect();
    domain.extend(groups.into_iter().flatten());
    domain
}

/// AND two terms explicitly: `["&", left, right]`.
pub fn both(left: DomainItem, right: DomainItem) -> Vec<DomainItem> {
    vec![DomainItem::And, left, right]
}
