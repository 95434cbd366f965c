//! # License Catalog
//!
//! Every license id a manifest may reference: the standard list (seeded from
//! configuration), the `NOASSERTION`/`NONE` sentinels and the project's custom
//! licenses registered under `LicenseRef-<n>` ids.

use crate::{Result, SyncError};
use bridge_traits::license::{CustomLicense, LicenseExpression, NOASSERTION, NONE};
use std::collections::{BTreeMap, BTreeSet};

/// Prefix for locally defined license ids.
pub const LICENSE_REF_PREFIX: &str = "LicenseRef-";

/// True when `id` has the `LicenseRef-[A-Za-z0-9.-]+` format.
pub fn is_license_ref(id: &str) -> bool {
    match id.strip_prefix(LICENSE_REF_PREFIX) {
        Some(suffix) => {
            !suffix.is_empty()
                && suffix
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        }
        None => false,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LicenseCatalog {
    standard: BTreeSet<String>,
    custom: BTreeMap<String, CustomLicense>,
}

impl LicenseCatalog {
    /// Catalog holding the standard ids, the sentinels and no custom licenses.
    pub fn seeded<I, S>(standard_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut standard: BTreeSet<String> = standard_ids.into_iter().map(Into::into).collect();
        standard.insert(NOASSERTION.to_string());
        standard.insert(NONE.to_string());
        Self {
            standard,
            custom: BTreeMap::new(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.standard.contains(id) || self.custom.contains_key(id)
    }

    pub fn standard_ids(&self) -> impl Iterator<Item = &str> {
        self.standard
            .iter()
            .map(String::as_str)
            .filter(|id| *id != NOASSERTION && *id != NONE)
    }

    pub fn custom_licenses(&self) -> impl Iterator<Item = &CustomLicense> {
        self.custom.values()
    }

    pub fn custom_license(&self, id: &str) -> Option<&CustomLicense> {
        self.custom.get(id)
    }

    /// Display names of every catalog entry, sorted.
    pub fn available_license_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .standard
            .iter()
            .cloned()
            .chain(self.custom.values().map(|l| l.display_name().to_string()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// True iff `id` is well formed and not already present.
    pub fn verify_new_license_id(&self, id: &str) -> bool {
        is_license_ref(id) && !self.contains(id)
    }

    /// Smallest `LicenseRef-<n>`, n >= 1, not already in the catalog.
    pub fn next_available_license_id(&self) -> String {
        let mut n = 1u64;
        loop {
            let id = format!("{}{}", LICENSE_REF_PREFIX, n);
            if !self.contains(&id) {
                return id;
            }
            n += 1;
        }
    }

    /// Register a custom license.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidLicenseId`] for a malformed id,
    /// [`SyncError::DuplicateLicenseId`] when the id is taken.
    pub fn add_custom(&mut self, license: CustomLicense) -> Result<()> {
        if !is_license_ref(&license.id) {
            return Err(SyncError::InvalidLicenseId(license.id));
        }
        if self.contains(&license.id) {
            return Err(SyncError::DuplicateLicenseId(license.id));
        }
        self.custom.insert(license.id.clone(), license);
        Ok(())
    }

    /// Custom license whose text matches `text`, ignoring whitespace layout.
    pub fn custom_with_text(&self, text: &str) -> Option<&CustomLicense> {
        let wanted = normalize_text(text);
        self.custom
            .values()
            .find(|license| normalize_text(&license.text) == wanted)
    }

    /// Rewrite `expression` so every custom license it mentions lives in this
    /// catalog.
    ///
    /// Absent input becomes `NoAssertion`. A custom license reuses an entry
    /// with equivalent text or is registered under the next free id.
    pub fn convert_to_local(&mut self, expression: Option<&LicenseExpression>) -> LicenseExpression {
        let Some(expression) = expression else {
            return LicenseExpression::NoAssertion;
        };

        match expression {
            LicenseExpression::And(members) => LicenseExpression::And(
                members
                    .iter()
                    .map(|member| self.convert_to_local(Some(member)))
                    .collect(),
            ),
            LicenseExpression::Or(members) => LicenseExpression::Or(
                members
                    .iter()
                    .map(|member| self.convert_to_local(Some(member)))
                    .collect(),
            ),
            LicenseExpression::Custom(license) => {
                if let Some(existing) = self.custom_with_text(&license.text) {
                    return LicenseExpression::Custom(existing.clone());
                }
                let id = self.next_available_license_id();
                let local = CustomLicense {
                    id: id.clone(),
                    text: license.text.clone(),
                    name: license.name.clone(),
                };
                self.custom.insert(id, local.clone());
                LicenseExpression::Custom(local)
            }
            other => other.clone(),
        }
    }

    /// Ids referenced by `expression` that this catalog does not know.
    pub fn unknown_ids<'a>(&self, expression: &'a LicenseExpression) -> Vec<&'a str> {
        expression
            .referenced_ids()
            .into_iter()
            .filter(|id| !self.contains(id))
            .collect()
    }
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
