use std::fs;
use std::io;
use std::path::{Component, Path};

use walkdir::WalkDir;

use convguard_domain::facts::{
    extract_pyproject_facts, extract_python_facts, extract_requirements_facts, SourceFact,
};
use convguard_types::{FileCategory, Finding, Severity, RULE_INTERNAL};

/// Directories that never contain project source worth checking.
const SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".venv",
    "venv",
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    ".tox",
    ".eggs",
    "node_modules",
];

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("cannot read project root '{root}': {source}")]
    RootUnreadable { root: String, source: io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub facts: Vec<SourceFact>,
    /// Diagnostics for files that could not be read. Recovered per file:
    /// the rest of the scan proceeds.
    pub skipped: Vec<Finding>,
}

/// Walks the project tree and extracts facts from every Python source
/// file and dependency manifest. Entries are visited in sorted order so
/// two scans of the same tree always produce the same outcome.
pub fn scan_tree(root: &Path) -> Result<ScanOutcome, ScanError> {
    let meta = fs::metadata(root).map_err(|source| ScanError::RootUnreadable {
        root: root.display().to_string(),
        source,
    })?;
    if !meta.is_dir() {
        return Err(ScanError::RootUnreadable {
            root: root.display().to_string(),
            source: io::Error::new(io::ErrorKind::Other, "not a directory"),
        });
    }

    let mut outcome = ScanOutcome {
        facts: Vec::new(),
        skipped: Vec::new(),
    };

    // Depth 0 is the root the caller asked for; only descendants are
    // subject to the directory skip list.
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e.file_name().to_str()));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let path = e
                    .path()
                    .map(|p| relative_slash_path(root, p))
                    .unwrap_or_default();
                tracing::warn!(path = %path, error = %e, "skipping unreadable entry");
                outcome.skipped.push(diagnostic_finding(
                    path,
                    format!("directory entry could not be read: {e}"),
                ));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = relative_slash_path(root, entry.path());
        let Some(kind) = classify(&rel) else {
            continue;
        };

        let text = match fs::read_to_string(entry.path()) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(path = %rel, error = %e, "skipping unreadable file");
                outcome
                    .skipped
                    .push(diagnostic_finding(rel, format!("file could not be read: {e}")));
                continue;
            }
        };

        let fact = match kind.parser {
            Parser::Python => extract_python_facts(&rel, kind.category, &text),
            Parser::Requirements => extract_requirements_facts(&rel, &text),
            Parser::Pyproject => extract_pyproject_facts(&rel, &text),
            Parser::None => SourceFact::empty(rel, kind.category),
        };
        outcome.facts.push(fact);
    }

    // Scans over a sorted walk still need one final sort: facts from
    // nested directories interleave with files at the same level.
    outcome.facts.sort_by(|a, b| a.path.cmp(&b.path));
    outcome.skipped.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(outcome)
}

#[derive(Debug, Clone, Copy)]
enum Parser {
    Python,
    Requirements,
    Pyproject,
    None,
}

#[derive(Debug, Clone, Copy)]
struct FileKind {
    category: FileCategory,
    parser: Parser,
}

/// Decides whether a relative path is interesting and how to parse it.
/// Returns `None` for files outside the checker's remit (docs, data,
/// compiled artifacts).
fn classify(rel: &str) -> Option<FileKind> {
    let file_name = rel.rsplit('/').next().unwrap_or(rel);
    let top = rel.split('/').next().unwrap_or(rel);

    if file_name == "pyproject.toml" {
        return Some(FileKind {
            category: FileCategory::Config,
            parser: Parser::Pyproject,
        });
    }
    if file_name.starts_with("requirements") && file_name.ends_with(".txt") {
        return Some(FileKind {
            category: FileCategory::Config,
            parser: Parser::Requirements,
        });
    }
    if file_name == "setup.cfg" || file_name == "setup.py" {
        return Some(FileKind {
            category: FileCategory::Config,
            parser: Parser::None,
        });
    }

    if file_name.ends_with(".py") {
        let category = match top {
            "src" => FileCategory::Module,
            "tests" | "test" => FileCategory::Test,
            "config" => FileCategory::Config,
            _ => FileCategory::Other,
        };
        return Some(FileKind {
            category,
            parser: Parser::Python,
        });
    }

    if top == "config" {
        return Some(FileKind {
            category: FileCategory::Config,
            parser: Parser::None,
        });
    }

    None
}

fn is_skipped_dir(name: Option<&str>) -> bool {
    matches!(name, Some(n) if SKIP_DIRS.contains(&n))
}

fn diagnostic_finding(path: String, message: String) -> Finding {
    Finding {
        rule_id: RULE_INTERNAL.to_string(),
        severity: Severity::Error,
        path,
        line: None,
        message,
        fingerprint: String::new(),
    }
}

/// Root-relative path with forward slashes, regardless of platform.
fn relative_slash_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<&str> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(os) => os.to_str(),
            _ => None,
        })
        .collect();
    parts.join("/")
}
