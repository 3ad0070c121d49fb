//! Type identity of a resource collection.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::Result;

/// Group, version, and kind of a resource type.
///
/// The core group is the empty string, in which case the api version is just
/// the version (`v1`); otherwise it is `group/version` (`apps/v1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    /// Create a new type identity.
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Build an identity from an api version string and a kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidApiVersion`] if the api version is empty or
    /// contains more than one `/`.
    pub fn from_api_version(api_version: &str, kind: impl Into<String>) -> Result<Self> {
        let (group, version) = parse_api_version(api_version)?;
        Ok(Self::new(group, version, kind))
    }

    /// The `group/version` string (or just `version` for the core group).
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Whether an `(api_version, kind)` pair names this type.
    pub fn matches(&self, api_version: &str, kind: &str) -> bool {
        self.kind == kind
            && parse_api_version(api_version)
                .is_ok_and(|(group, version)| group == self.group && version == self.version)
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

fn parse_api_version(api_version: &str) -> Result<(&str, &str)> {
    match api_version.split_once('/') {
        None if !api_version.is_empty() => Ok(("", api_version)),
        Some((group, version)) if !version.is_empty() && !version.contains('/') => {
            Ok((group, version))
        }
        _ => Err(Error::invalid_api_version(
            api_version,
            "expected 'version' or 'group/version'",
        )),
    }
}
