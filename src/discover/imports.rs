//! Line-based scanner for `import` statements in a directory of Python files.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::discover::StdlibFilter;
use crate::model::{CandidateSet, Origin, PackageName};
use crate::traits::{CandidateSource, Discovery, DiscoveryError};

const SOURCE_EXTENSION: &str = "py";

/// How a line qualifies as an import statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImportMatching {
    /// Any line containing `import` (case-insensitive). Lines such as
    /// `# this is important` produce false candidates.
    #[default]
    Substring,
    /// Only lines whose first token is `import` or `from`.
    Statement,
}

/// Extracts the module root referenced by one source line.
///
/// `import a.b as c` and `from a.b import c` both yield `a`. Relative
/// imports yield `None`.
pub fn scan_line(line: &str, matching: ImportMatching) -> Option<PackageName> {
    if !line.to_lowercase().contains("import") {
        return None;
    }

    let mut tokens = line.split_whitespace();
    let first = tokens.next()?;
    if matching == ImportMatching::Statement && first != "import" && first != "from" {
        return None;
    }

    let Some(token) = tokens.next() else {
        debug!(line = line.trim(), "import line without a module token");
        return None;
    };

    let root = token
        .trim_end_matches([',', ';'])
        .split('.')
        .next()
        .unwrap_or_default();
    if !root
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        debug!(line = line.trim(), token = root, "import token is not a module name");
        return None;
    }
    PackageName::new(root)
}

/// Scans the `*.py` files directly inside one directory.
pub struct ImportScanner {
    dir: PathBuf,
    matching: ImportMatching,
}

impl ImportScanner {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            matching: ImportMatching::default(),
        }
    }

    pub fn with_matching(mut self, matching: ImportMatching) -> Self {
        self.matching = matching;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the candidate set with stdlib and self-import names removed.
    pub fn scan(&self, stdlib: &StdlibFilter) -> Result<CandidateSet, DiscoveryError> {
        let files = self.source_files()?;
        let local_modules: HashSet<String> = files
            .iter()
            .filter_map(|path| path.file_stem())
            .map(|stem| stem.to_string_lossy().to_lowercase())
            .collect();

        let mut candidates = CandidateSet::new();
        for path in &files {
            let content = fs::read_to_string(path).map_err(|source| DiscoveryError::Read {
                path: path.clone(),
                source,
            })?;

            for line in content.lines() {
                let Some(name) = scan_line(line, self.matching) else {
                    continue;
                };
                if stdlib.contains(name.as_str()) || local_modules.contains(name.as_str()) {
                    continue;
                }
                if candidates.insert(name.clone()) {
                    debug!(package = %name, file = %path.display(), "import candidate");
                }
            }
        }

        info!(
            dir = %self.dir.display(),
            files = files.len(),
            candidates = candidates.len(),
            "Scanned source imports"
        );
        Ok(candidates)
    }

    fn source_files(&self) -> Result<Vec<PathBuf>, DiscoveryError> {
        if !self.dir.is_dir() {
            return Err(DiscoveryError::NotFound(self.dir.clone()));
        }

        let entries = fs::read_dir(&self.dir).map_err(|source| DiscoveryError::Read {
            path: self.dir.clone(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| DiscoveryError::Read {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl CandidateSource for ImportScanner {
    fn source_id(&self) -> &str {
        "imports"
    }

    fn discover(&self, stdlib: &StdlibFilter) -> Result<Discovery, DiscoveryError> {
        let mut discovery = Discovery::new(Origin::SourceScan);
        discovery.unclassified = self.scan(stdlib)?;
        Ok(discovery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(line: &str) -> Option<String> {
        scan_line(line, ImportMatching::Substring).map(|n| n.to_string())
    }

    #[test]
    fn test_plain_and_from_imports() {
        assert_eq!(name("import requests"), Some("requests".into()));
        assert_eq!(name("from sqlalchemy import Table"), Some("sqlalchemy".into()));
        assert_eq!(name("from sqlalchemy import *"), Some("sqlalchemy".into()));
        assert_eq!(name("import NumPy"), Some("numpy".into()));
    }

    #[test]
    fn test_aliases_submodules_and_lists() {
        assert_eq!(name("import numpy as np"), Some("numpy".into()));
        assert_eq!(name("import xml.etree"), Some("xml".into()));
        assert_eq!(name("from a.b.c import d, e"), Some("a".into()));
        assert_eq!(name("import os, sys"), Some("os".into()));
        assert_eq!(name("    import pandas  # for testing"), Some("pandas".into()));
    }

    #[test]
    fn test_relative_imports_skipped() {
        assert_eq!(name("from . import helpers"), None);
        assert_eq!(name("from .models import User"), None);
    }

    #[test]
    fn test_non_import_lines() {
        assert_eq!(name("x = 1"), None);
        assert_eq!(name("import"), None);
    }

    #[test]
    fn test_non_identifier_tokens_rejected() {
        assert_eq!(name(r#"print("import x#y")"#), None);
        assert_eq!(name("msg = 'cannot import: retry'"), None);
        assert_eq!(name("import ruamel_yaml"), Some("ruamel_yaml".into()));
        assert_eq!(name("import py-spy"), Some("py-spy".into()));
    }

    #[test]
    fn test_substring_matching_keeps_known_false_positive() {
        assert_eq!(name("# this is important"), Some("this".into()));
        assert_eq!(
            scan_line("# this is important", ImportMatching::Statement),
            None
        );
        assert_eq!(
            scan_line("from flask import Flask", ImportMatching::Statement).map(|n| n.to_string()),
            Some("flask".into())
        );
    }

    #[test]
    fn test_scan_excludes_stdlib_and_local_modules() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("main.py"),
            "import os\nimport requests\nimport mymodule\nfrom sqlalchemy import Table\nimport requests\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("mymodule.py"), "import json\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "import ignored\n").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("deep.py"), "import deep_pkg\n").unwrap();

        let scanner = ImportScanner::new(dir.path());
        let candidates = scanner.scan(&StdlibFilter::python()).unwrap();
        let names: Vec<_> = candidates.iter().map(|n| n.as_str().to_string()).collect();

        assert_eq!(names, vec!["requests", "sqlalchemy"]);
    }

    #[test]
    fn test_scan_missing_dir() {
        let scanner = ImportScanner::new("/definitely/not/here");
        let err = scanner.scan(&StdlibFilter::python()).unwrap_err();
        assert!(matches!(err, DiscoveryError::NotFound(_)));
    }
}
