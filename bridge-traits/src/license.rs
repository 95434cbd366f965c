//! License Abstractions
//!
//! The license expression model shared by the core and the host, plus the two
//! external licensing tools the core depends on: a content scanner and an
//! expression parser. Neither the grammar nor the scanning heuristics live in
//! the core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::Result;

/// Sentinel id for "no assertion is made".
pub const NOASSERTION: &str = "NOASSERTION";

/// Sentinel id for "no license".
pub const NONE: &str = "NONE";

/// A non-standard license carried with its full text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomLicense {
    /// Locally unique reference id, e.g. `LicenseRef-1`
    pub id: String,
    /// Full license text
    pub text: String,
    /// Display name; empty when the license has none
    #[serde(default)]
    pub name: String,
}

impl CustomLicense {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            name: String::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Name shown to users: the display name, or the id when unnamed.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// License expression tree.
///
/// Conjunctive and disjunctive sets hold their members in order; equality is
/// structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LicenseExpression {
    /// A license from the standard list, by id
    Standard(String),
    /// A non-standard license
    Custom(CustomLicense),
    /// All members apply
    And(Vec<LicenseExpression>),
    /// Any one member applies
    Or(Vec<LicenseExpression>),
    NoAssertion,
    None,
}

impl LicenseExpression {
    pub fn standard(id: impl Into<String>) -> Self {
        Self::Standard(id.into())
    }

    /// Every license id referenced by this expression, in tree order.
    pub fn referenced_ids(&self) -> Vec<&str> {
        let mut ids = Vec::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids<'a>(&'a self, ids: &mut Vec<&'a str>) {
        match self {
            Self::Standard(id) => ids.push(id),
            Self::Custom(license) => ids.push(&license.id),
            Self::And(members) | Self::Or(members) => {
                for member in members {
                    member.collect_ids(ids);
                }
            }
            Self::NoAssertion | Self::None => {}
        }
    }

    fn is_compound(&self) -> bool {
        matches!(self, Self::And(_) | Self::Or(_))
    }

    fn fmt_members(
        f: &mut fmt::Formatter<'_>,
        members: &[LicenseExpression],
        operator: &str,
    ) -> fmt::Result {
        for (index, member) in members.iter().enumerate() {
            if index > 0 {
                write!(f, " {} ", operator)?;
            }
            if member.is_compound() {
                write!(f, "({})", member)?;
            } else {
                write!(f, "{}", member)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for LicenseExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard(id) => f.write_str(id),
            Self::Custom(license) => f.write_str(&license.id),
            Self::And(members) => Self::fmt_members(f, members, "AND"),
            Self::Or(members) => Self::fmt_members(f, members, "OR"),
            Self::NoAssertion => f.write_str(NOASSERTION),
            Self::None => f.write_str(NONE),
        }
    }
}

/// What a scanner found in one file's content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Raw license tokens as they appear in the file (expression strings)
    pub license_tokens: Vec<String>,
    /// Copyright statement, if one was detected
    pub copyright: Option<String>,
    /// Notice text, if one was detected
    pub notice: Option<String>,
}

/// Embedded license token scanner.
///
/// Implementations inspect file content only; they must not consult or
/// mutate manifest state.
#[async_trait]
pub trait LicenseScanner: Send + Sync {
    /// Scan `content` read from `path` (project-relative).
    async fn scan(&self, path: &Path, content: &[u8]) -> Result<ScanReport>;
}

/// License expression grammar.
///
/// Returns [`BridgeError::InvalidInput`](crate::error::BridgeError::InvalidInput)
/// for strings that are not valid expressions.
pub trait LicenseExpressionParser: Send + Sync {
    fn parse(&self, expression: &str) -> Result<LicenseExpression>;
}
