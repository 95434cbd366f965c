//! Package verification code.
//!
//! The code is the SHA-1 of the concatenated, lexicographically sorted
//! lowercase hex digests of every file record whose path is not excluded.
//! Record order never affects the result.

use crate::record::FileRecord;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeSet;

/// Verification code together with the paths left out of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCode {
    pub value: String,
    /// Stored verbatim; paths that never had a record are harmless here.
    #[serde(default)]
    pub excluded_files: BTreeSet<String>,
}

pub struct VerificationCodeCalculator;

impl VerificationCodeCalculator {
    pub fn compute<'a, I>(records: I, excluded_files: &BTreeSet<String>) -> VerificationCode
    where
        I: IntoIterator<Item = &'a FileRecord>,
    {
        let mut digests: Vec<String> = records
            .into_iter()
            .filter(|record| !excluded_files.contains(&record.path))
            .map(|record| record.sha1.to_ascii_lowercase())
            .collect();
        digests.sort();

        let mut hasher = Sha1::new();
        for digest in &digests {
            hasher.update(digest.as_bytes());
        }

        VerificationCode {
            value: hex::encode(hasher.finalize()),
            excluded_files: excluded_files.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{sha1_hex, FileType};
    use bridge_traits::license::LicenseExpression;

    fn record(path: &str, content: &[u8]) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            sha1: sha1_hex(content),
            file_type: FileType::Other,
            seen_licenses: BTreeSet::new(),
            concluded_license: LicenseExpression::NoAssertion,
            copyright: String::new(),
            notice: String::new(),
            comment: String::new(),
            contributors: Vec::new(),
            artifact_of: Vec::new(),
        }
    }

    #[test]
    fn test_empty_set_is_digest_of_nothing() {
        let code = VerificationCodeCalculator::compute(std::iter::empty(), &BTreeSet::new());
        assert_eq!(code.value, "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn test_known_value() {
        let records = vec![record("a", b"a"), record("b", b"b"), record("c", b"c")];
        let code = VerificationCodeCalculator::compute(&records, &BTreeSet::new());
        assert_eq!(code.value, "0ef42d3fb18575bc18b285423eadf13b12b6f704");
    }

    #[test]
    fn test_order_does_not_matter() {
        let forward = vec![record("a", b"a"), record("b", b"b"), record("c", b"c")];
        let mut reversed = forward.clone();
        reversed.reverse();
        let rotated = vec![forward[1].clone(), forward[2].clone(), forward[0].clone()];

        let expected = VerificationCodeCalculator::compute(&forward, &BTreeSet::new());
        assert_eq!(
            VerificationCodeCalculator::compute(&reversed, &BTreeSet::new()),
            expected
        );
        assert_eq!(
            VerificationCodeCalculator::compute(&rotated, &BTreeSet::new()),
            expected
        );
    }

    #[test]
    fn test_excluded_paths_are_skipped_and_kept() {
        let records = vec![record("a", b"a"), record("b", b"b"), record("c", b"c")];
        let excluded: BTreeSet<String> = ["b".to_string(), "never-seen".to_string()].into();

        let code = VerificationCodeCalculator::compute(&records, &excluded);

        assert_eq!(code.value, "c10e6b410a5bd1579a9d81d0b48afbc3b3f43726");
        assert_eq!(code.excluded_files, excluded);
    }
}
