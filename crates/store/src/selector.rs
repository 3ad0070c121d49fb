//! Label and field selectors used to scope lists and informers.
//!
//! Label selector syntax is a comma-separated list of requirements:
//!
//! | form     | matches when                          |
//! |----------|---------------------------------------|
//! | `k=v`    | label `k` is present with value `v`   |
//! | `k==v`   | same as `k=v`                         |
//! | `k!=v`   | label `k` is absent or not `v`        |
//! | `k`      | label `k` is present                  |
//! | `!k`     | label `k` is absent                   |
//!
//! Field selectors support `metadata.namespace` and `metadata.name` with the
//! `=`, `==`, and `!=` operators.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use converge_core::ObjectMeta;

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum LabelRequirement {
    Equals(String, String),
    NotEquals(String, String),
    Exists(String),
    DoesNotExist(String),
}

impl LabelRequirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Self::Equals(key, value) => labels.get(key) == Some(value),
            Self::NotEquals(key, value) => labels.get(key) != Some(value),
            Self::Exists(key) => labels.contains_key(key),
            Self::DoesNotExist(key) => !labels.contains_key(key),
        }
    }
}

impl fmt::Display for LabelRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(key, value) => write!(f, "{key}={value}"),
            Self::NotEquals(key, value) => write!(f, "{key}!={value}"),
            Self::Exists(key) => write!(f, "{key}"),
            Self::DoesNotExist(key) => write!(f, "!{key}"),
        }
    }
}

/// A parsed label selector. The empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<LabelRequirement>,
}

impl LabelSelector {
    /// The selector that matches every object.
    pub fn everything() -> Self {
        Self::default()
    }

    /// Parse a selector string.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Invalid`] for empty keys or malformed terms.
    pub fn parse(selector: &str) -> Result<Self> {
        let requirements = selector
            .split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(parse_label_term)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { requirements })
    }

    /// Require `key=value`.
    #[must_use]
    pub fn with_equals(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements
            .push(LabelRequirement::Equals(key.into(), value.into()));
        self
    }

    /// Require label `key` to be present.
    #[must_use]
    pub fn with_exists(mut self, key: impl Into<String>) -> Self {
        self.requirements.push(LabelRequirement::Exists(key.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Whether the given label set satisfies every requirement.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

fn parse_label_term(term: &str) -> Result<LabelRequirement> {
    if let Some(key) = term.strip_prefix('!') {
        return Ok(LabelRequirement::DoesNotExist(validate_label_key(key, term)?));
    }
    if let Some((key, value)) = term.split_once("!=") {
        return Ok(LabelRequirement::NotEquals(
            validate_label_key(key, term)?,
            validate_label_value(value, term)?,
        ));
    }
    if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
        return Ok(LabelRequirement::Equals(
            validate_label_key(key, term)?,
            validate_label_value(value, term)?,
        ));
    }
    Ok(LabelRequirement::Exists(validate_label_key(term, term)?))
}

fn validate_label_key(key: &str, term: &str) -> Result<String> {
    let key = key.trim();
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if valid {
        Ok(key.to_string())
    } else {
        Err(ClientError::invalid(format!(
            "invalid label key in selector term '{term}'"
        )))
    }
}

fn validate_label_value(value: &str, term: &str) -> Result<String> {
    let value = value.trim();
    if value.contains(['=', '!', ' ']) {
        return Err(ClientError::invalid(format!(
            "invalid label value in selector term '{term}'"
        )));
    }
    Ok(value.to_string())
}

impl FromStr for LabelSelector {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self.requirements.iter().map(ToString::to_string).collect();
        write!(f, "{}", terms.join(","))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Namespace,
    Name,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldRequirement {
    field: Field,
    value: String,
    negated: bool,
}

impl FieldRequirement {
    fn matches(&self, meta: &ObjectMeta) -> bool {
        let actual = match self.field {
            Field::Namespace => &meta.namespace,
            Field::Name => &meta.name,
        };
        (actual == &self.value) != self.negated
    }
}

/// A parsed field selector over object metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    requirements: Vec<FieldRequirement>,
}

impl FieldSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    /// Select objects in a single namespace.
    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self {
            requirements: vec![FieldRequirement {
                field: Field::Namespace,
                value: namespace.into(),
                negated: false,
            }],
        }
    }

    /// Parse a selector string.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Invalid`] for unsupported fields or operators.
    pub fn parse(selector: &str) -> Result<Self> {
        let requirements = selector
            .split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(parse_field_term)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { requirements })
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn matches(&self, meta: &ObjectMeta) -> bool {
        self.requirements.iter().all(|r| r.matches(meta))
    }
}

fn parse_field_term(term: &str) -> Result<FieldRequirement> {
    let (field, value, negated) = if let Some((field, value)) = term.split_once("!=") {
        (field, value, true)
    } else if let Some((field, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
        (field, value, false)
    } else {
        return Err(ClientError::invalid(format!(
            "field selector term '{term}' has no operator"
        )));
    };

    let field = match field.trim() {
        "metadata.namespace" => Field::Namespace,
        "metadata.name" => Field::Name,
        other => {
            return Err(ClientError::invalid(format!(
                "unsupported field '{other}' in selector"
            )));
        }
    };

    Ok(FieldRequirement {
        field,
        value: value.trim().to_string(),
        negated,
    })
}

impl FromStr for FieldSelector {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let selector = LabelSelector::parse("").unwrap();
        assert!(selector.is_empty());
        assert!(selector.matches(&labels(&[])));
        assert!(selector.matches(&labels(&[("app", "web")])));
    }

    #[test]
    fn test_equality_forms() {
        let single = LabelSelector::parse("app=web").unwrap();
        let double = LabelSelector::parse("app==web").unwrap();
        assert_eq!(single, double);
        assert!(single.matches(&labels(&[("app", "web")])));
        assert!(!single.matches(&labels(&[("app", "db")])));
        assert!(!single.matches(&labels(&[])));
    }

    #[test]
    fn test_inequality_matches_absent_key() {
        let selector = LabelSelector::parse("tier!=cache").unwrap();
        assert!(selector.matches(&labels(&[])));
        assert!(selector.matches(&labels(&[("tier", "web")])));
        assert!(!selector.matches(&labels(&[("tier", "cache")])));
    }

    #[test]
    fn test_existence_terms() {
        let selector = LabelSelector::parse("app, !legacy").unwrap();
        assert!(selector.matches(&labels(&[("app", "x")])));
        assert!(!selector.matches(&labels(&[("app", "x"), ("legacy", "1")])));
        assert!(!selector.matches(&labels(&[])));
    }

    #[test]
    fn test_display_round_trips() {
        let selector = LabelSelector::parse("app=web,tier!=cache,env,!legacy").unwrap();
        assert_eq!(selector.to_string(), "app=web,tier!=cache,env,!legacy");
        assert_eq!(
            LabelSelector::parse(&selector.to_string()).unwrap(),
            selector
        );
    }

    #[test]
    fn test_invalid_label_terms() {
        assert!(LabelSelector::parse("=web").is_err());
        assert!(LabelSelector::parse("!").is_err());
        assert!(LabelSelector::parse("a b=c").is_err());
    }

    #[test]
    fn test_builder_matches_parsed() {
        let built = LabelSelector::everything()
            .with_equals("app", "web")
            .with_exists("env");
        assert_eq!(built, LabelSelector::parse("app=web,env").unwrap());
    }

    #[test]
    fn test_field_selector() {
        let selector = FieldSelector::parse("metadata.namespace=prod,metadata.name!=skip").unwrap();
        assert!(selector.matches(&ObjectMeta::new("prod", "a")));
        assert!(!selector.matches(&ObjectMeta::new("prod", "skip")));
        assert!(!selector.matches(&ObjectMeta::new("dev", "a")));

        assert!(FieldSelector::namespace("dev").matches(&ObjectMeta::new("dev", "a")));
        assert!(FieldSelector::everything().matches(&ObjectMeta::cluster("a")));
    }

    #[test]
    fn test_invalid_field_terms() {
        assert!(FieldSelector::parse("spec.replicas=3").is_err());
        assert!(FieldSelector::parse("metadata.name").is_err());
    }
}
