//! Resolve user-supplied paths, globs, and directories to the plaintext or
//! ciphertext files an operation should touch.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::layout::{STORE_DIR_NAME, WRAPPED_EXT};

/// Which side of the plaintext/ciphertext pairing a caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Plaintext,
    Ciphertext,
}

impl FileKind {
    fn matches(self, name: &str) -> bool {
        match self {
            FileKind::Plaintext => is_plaintext_candidate(name),
            FileKind::Ciphertext => is_ciphertext_candidate(name),
        }
    }

    fn expected(self) -> &'static str {
        match self {
            FileKind::Plaintext => "an environment file (*.env*)",
            FileKind::Ciphertext => "an encrypted environment file (*.env*.kanuka)",
        }
    }
}

/// Environment-file naming is a substring rule: anything with `.env` in the
/// basename qualifies, so `my.env.backup` is a candidate too.
pub fn is_plaintext_candidate(name: &str) -> bool {
    name.contains(".env") && !name.ends_with(&format!(".{WRAPPED_EXT}"))
}

pub fn is_ciphertext_candidate(name: &str) -> bool {
    let Some(stem) = name.strip_suffix(&format!(".{WRAPPED_EXT}")) else {
        return false;
    };
    stem.contains(".env")
}

/// Resolve `patterns` against `root`. An empty list returns `None`; callers
/// apply their default (scan the project root). Order is first-seen,
/// deduplicated.
pub fn resolve(patterns: &[String], root: &Path, kind: FileKind) -> Result<Option<Vec<PathBuf>>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |path: PathBuf| {
        if seen.insert(path.clone()) {
            out.push(path);
        }
    };

    for pattern in patterns {
        let literal = root_relative(root, pattern);
        if literal.is_dir() {
            for found in walk(&literal, kind)? {
                push(found);
            }
        } else if is_glob(pattern) {
            for found in expand_glob(root, pattern, kind)? {
                push(found);
            }
        } else {
            if !literal.is_file() {
                return Err(Error::FileNotFound(literal));
            }
            let name = file_name(&literal);
            if !kind.matches(&name) {
                return Err(Error::InvalidFileType {
                    path: literal,
                    expected: kind.expected(),
                });
            }
            push(literal);
        }
    }
    Ok(Some(out))
}

/// The default when no patterns are given: recurse the project root.
pub fn scan(root: &Path, kind: FileKind) -> Result<Vec<PathBuf>> {
    walk(root, kind)
}

fn root_relative(root: &Path, pattern: &str) -> PathBuf {
    let path = Path::new(pattern);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Recurse a directory, skipping the store-dir so wrapped project keys are
/// never mistaken for wrapped plaintexts.
fn walk(dir: &Path, kind: FileKind) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let entries = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != STORE_DIR_NAME);
    for entry in entries {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if entry.file_type().is_file() && kind.matches(&entry.file_name().to_string_lossy()) {
            out.push(entry.into_path());
        }
    }
    Ok(out)
}

fn expand_glob(root: &Path, pattern: &str, kind: FileKind) -> Result<Vec<PathBuf>> {
    let full = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        root.join(pattern).to_string_lossy().into_owned()
    };
    let matches = glob::glob(&full).map_err(|_| Error::InvalidFileType {
        path: PathBuf::from(pattern),
        expected: "a valid glob pattern",
    })?;
    let mut out = Vec::new();
    for entry in matches {
        let path = entry.map_err(|e| Error::Io(e.into_error()))?;
        if !path.is_file() {
            continue;
        }
        if path
            .components()
            .any(|c| c.as_os_str() == STORE_DIR_NAME)
        {
            continue;
        }
        if kind.matches(&file_name(&path)) {
            out.push(path);
        }
    }
    Ok(out)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
