//! SPDX tag scanner
//!
//! Detects `SPDX-License-Identifier:` tags and the first copyright line in a
//! text file. Binary content (anything with a NUL byte in the first 8 KiB) is
//! reported as having no tokens.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    license::{LicenseScanner, ScanReport},
};
use regex::Regex;
use std::path::Path;
use tracing::trace;

const BINARY_PROBE_LEN: usize = 8 * 1024;

/// Scanner for SPDX short-form identifiers embedded in source comments.
#[derive(Debug, Clone)]
pub struct SpdxTagScanner {
    identifier: Regex,
    copyright: Regex,
}

impl SpdxTagScanner {
    pub fn new() -> Result<Self> {
        let identifier = Regex::new(r"SPDX-License-Identifier:\s*(.+?)\s*(?:\*/|-->)?\s*$")
            .map_err(|e| BridgeError::OperationFailed(format!("identifier pattern: {}", e)))?;
        let copyright = Regex::new(r"(?i)^[\s#*/;!-]*(copyright\b.*?)\s*(?:\*/)?\s*$")
            .map_err(|e| BridgeError::OperationFailed(format!("copyright pattern: {}", e)))?;
        Ok(Self {
            identifier,
            copyright,
        })
    }

    fn looks_binary(content: &[u8]) -> bool {
        content.iter().take(BINARY_PROBE_LEN).any(|b| *b == 0)
    }
}

#[async_trait]
impl LicenseScanner for SpdxTagScanner {
    async fn scan(&self, path: &Path, content: &[u8]) -> Result<ScanReport> {
        let mut report = ScanReport::default();
        if Self::looks_binary(content) {
            return Ok(report);
        }

        let text = String::from_utf8_lossy(content);
        for line in text.lines() {
            if let Some(caps) = self.identifier.captures(line) {
                let token = caps[1].trim().to_string();
                if !token.is_empty() && !report.license_tokens.contains(&token) {
                    report.license_tokens.push(token);
                }
            } else if report.copyright.is_none() {
                if let Some(caps) = self.copyright.captures(line) {
                    report.copyright = Some(caps[1].to_string());
                }
            }
        }

        trace!(
            path = ?path,
            tokens = report.license_tokens.len(),
            "Scanned file for license tags"
        );
        Ok(report)
    }
}
