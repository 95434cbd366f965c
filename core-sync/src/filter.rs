//! # File Filter
//!
//! Decides which project files belong in the manifest.
//!
//! A path is in scope when it lies under one of the included resource
//! directories and no segment of it (folder names and the file name) fully
//! matches any exclude pattern. An included directory of `/`, `\` or the empty
//! string stands for the whole project.
//!
//! Paths are project-relative and always use `/` as separator; see
//! [`normalize_path`].

use crate::{Result, SyncError};
use regex::Regex;

/// Separator for list-valued project properties.
pub const LIST_SEPARATOR: &str = ";";

/// Include/exclude rules for one project.
#[derive(Debug, Clone)]
pub struct FileFilter {
    include_directories: Vec<String>,
    exclude_patterns: Vec<String>,
    compiled: Vec<Regex>,
}

impl FileFilter {
    /// Build a filter, compiling every exclude pattern.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidPattern`] for the first pattern that does
    /// not compile. No filter is produced in that case.
    pub fn new<I, S, J, T>(include_directories: I, exclude_patterns: J) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        J: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let include_directories = include_directories
            .into_iter()
            .map(|dir| dir.as_ref().to_string())
            .collect();

        let mut patterns = Vec::new();
        let mut compiled = Vec::new();
        for pattern in exclude_patterns {
            let pattern = pattern.as_ref().to_string();
            compiled.push(compile_full_match(&pattern)?);
            patterns.push(pattern);
        }

        Ok(Self {
            include_directories,
            exclude_patterns: patterns,
            compiled,
        })
    }

    /// Included resource directories as configured.
    pub fn include_directories(&self) -> &[String] {
        &self.include_directories
    }

    /// Exclude pattern sources as configured.
    pub fn exclude_patterns(&self) -> &[String] {
        &self.exclude_patterns
    }

    /// True when the path is under an included directory and not excluded.
    pub fn is_included(&self, path: &str) -> bool {
        let path = normalize_path(path);
        if path.is_empty() {
            return false;
        }
        self.is_under_included_directory(&path) && !self.is_path_excluded(&path)
    }

    /// True when a single name (file or folder) fully matches an exclude pattern.
    pub fn is_name_excluded(&self, name: &str) -> bool {
        self.compiled.iter().any(|regex| regex.is_match(name))
    }

    /// True when any segment of the path is excluded.
    pub fn is_path_excluded(&self, path: &str) -> bool {
        normalize_path(path)
            .split('/')
            .any(|segment| self.is_name_excluded(segment))
    }

    /// True when the path lies under at least one included directory.
    pub fn is_under_included_directory(&self, path: &str) -> bool {
        let path = normalize_path(path);
        let segments: Vec<&str> = path.split('/').collect();

        self.include_directories.iter().any(|dir| {
            let dir = normalize_path(dir);
            if dir.is_empty() {
                return true;
            }
            let prefix: Vec<&str> = dir.split('/').collect();
            segments.len() > prefix.len() && segments[..prefix.len()] == prefix[..]
        })
    }

    /// Copy of this filter with `pattern` appended, unless already present.
    pub fn with_exclude_pattern(&self, pattern: &str) -> Result<Self> {
        let mut filter = self.clone();
        if !filter.exclude_patterns.iter().any(|p| p == pattern) {
            filter.compiled.push(compile_full_match(pattern)?);
            filter.exclude_patterns.push(pattern.to_string());
        }
        Ok(filter)
    }

    /// Copy of this filter without `pattern`.
    pub fn without_exclude_pattern(&self, pattern: &str) -> Self {
        let mut filter = self.clone();
        if let Some(index) = filter.exclude_patterns.iter().position(|p| p == pattern) {
            filter.exclude_patterns.remove(index);
            filter.compiled.remove(index);
        }
        filter
    }
}

/// Check that every pattern compiles without building a filter.
///
/// # Errors
///
/// [`SyncError::InvalidPattern`] for the first pattern that does not compile.
pub fn validate_patterns<I, T>(patterns: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    for pattern in patterns {
        compile_full_match(pattern.as_ref())?;
    }
    Ok(())
}

fn compile_full_match(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| SyncError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// Split a list-valued property on [`LIST_SEPARATOR`], dropping blank entries.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Inverse of [`parse_list`].
pub fn join_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| item.as_ref())
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR)
}

/// Exclude pattern matching exactly one literal file name.
pub fn escape_file_name(name: &str) -> String {
    regex::escape(name)
}

/// Canonical project-relative form: `/` separators, no leading `./` or `/`,
/// no empty segments, no trailing separator.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &[&str] = &[
        "src/srcfiles1.c",
        "src/srcfiles2.c",
        "src/srcfiles3.skip",
        "src/subdir/srcfiles4.php",
        "src/subdir/srcfiles5.php",
        "bin/binfile.a",
        "bin/binfile2.a",
        "bin/subdir/binefile3.a",
        "attrootfile1.c",
        "attrootfile2.c",
        "attrootfile3.skip",
    ];

    fn scenario_filter(include: &[&str]) -> FileFilter {
        FileFilter::new(include, [r".*\.skip", r".*\.project", r".*\.spdx"]).unwrap()
    }

    fn count_included(filter: &FileFilter) -> usize {
        SCENARIO.iter().filter(|p| filter.is_included(p)).count()
    }

    #[test]
    fn test_validate_patterns_reports_first_bad_pattern() {
        assert!(validate_patterns([r".*\.o", "bin"]).is_ok());
        let err = validate_patterns(["ok", "[unclosed", "(also"]).unwrap_err();
        assert!(matches!(err, SyncError::InvalidPattern { ref pattern, .. } if pattern == "[unclosed"));
    }

    #[test]
    fn test_include_src_only() {
        let filter = scenario_filter(&["src"]);
        assert_eq!(count_included(&filter), 4);
        assert!(filter.is_included("src/subdir/srcfiles4.php"));
        assert!(!filter.is_included("src/srcfiles3.skip"));
        assert!(!filter.is_included("bin/binfile.a"));
    }

    #[test]
    fn test_root_entries_include_everything() {
        for root in ["/", "\\", ""] {
            let filter = scenario_filter(&[root]);
            assert_eq!(count_included(&filter), 9, "root entry {:?}", root);
        }
    }

    #[test]
    fn test_prefix_is_segment_wise() {
        let filter = FileFilter::new(["src"], Vec::<String>::new()).unwrap();
        assert!(filter.is_included("src/a.c"));
        assert!(!filter.is_included("srcfiles/a.c"));
        assert!(!filter.is_included("src"));
    }

    #[test]
    fn test_nested_include_directory() {
        let filter = FileFilter::new(["bin/subdir"], Vec::<String>::new()).unwrap();
        assert!(filter.is_included("bin/subdir/binefile3.a"));
        assert!(!filter.is_included("bin/binfile.a"));
    }

    #[test]
    fn test_excluded_folder_excludes_contents() {
        let filter = FileFilter::new(["/"], ["subdir"]).unwrap();
        assert!(!filter.is_included("src/subdir/srcfiles4.php"));
        assert!(filter.is_included("src/srcfiles1.c"));
    }

    #[test]
    fn test_patterns_are_full_match() {
        let filter = FileFilter::new(["/"], ["skip"]).unwrap();
        assert!(filter.is_included("attrootfile3.skip"));
        assert!(filter.is_name_excluded("skip"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = FileFilter::new(["/"], ["ok", "[unclosed"]).unwrap_err();
        match err {
            SyncError::InvalidPattern { pattern, .. } => assert_eq!(pattern, "[unclosed"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_with_and_without_exclude_pattern() {
        let filter = FileFilter::new(["/"], Vec::<String>::new()).unwrap();
        let escaped = escape_file_name("demo.spdx");

        let with = filter.with_exclude_pattern(&escaped).unwrap();
        assert!(!with.is_included("demo.spdx"));
        assert!(with.is_included("demoxspdx"));
        assert_eq!(with.with_exclude_pattern(&escaped).unwrap().exclude_patterns().len(), 1);

        let without = with.without_exclude_pattern(&escaped);
        assert!(without.is_included("demo.spdx"));
    }

    #[test]
    fn test_list_round_trip() {
        assert_eq!(parse_list(" src ; ;bin"), vec!["src", "bin"]);
        assert_eq!(join_list(&["src", "bin"]), "src;bin");
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./src//a.c"), "src/a.c");
        assert_eq!(normalize_path("\\bin\\a.a"), "bin/a.a");
        assert_eq!(normalize_path("/"), "");
    }
}
