//! Configuration loading with include resolution.
//!
//! Supports the `includes` directive so teams can share a base policy
//! file, with circular-include detection and later-wins merge semantics.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::debug;

use convguard_types::{ConfigFile, Defaults};

const MAX_INCLUDE_DEPTH: usize = 10;

/// Load a configuration file, resolving `includes` recursively.
/// Later definitions override earlier ones per rule id; the including
/// file wins over everything it includes.
pub fn load_config_with_includes(path: &Path) -> Result<ConfigFile> {
    let mut visited = HashSet::new();
    load_config_recursive(path, &mut visited, 0)
}

fn load_config_recursive(
    path: &Path,
    visited: &mut HashSet<PathBuf>,
    depth: usize,
) -> Result<ConfigFile> {
    if depth > MAX_INCLUDE_DEPTH {
        bail!(
            "include depth exceeded maximum of {} levels at '{}'",
            MAX_INCLUDE_DEPTH,
            path.display()
        );
    }

    let canonical = path
        .canonicalize()
        .with_context(|| format!("canonicalize path '{}'", path.display()))?;
    if !visited.insert(canonical) {
        bail!("circular include detected: '{}'", path.display());
    }

    debug!("loading config from '{}' (depth {})", path.display(), depth);

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config '{}'", path.display()))?;
    let config: ConfigFile =
        toml::from_str(&text).with_context(|| format!("parse config '{}'", path.display()))?;

    if config.includes.is_empty() {
        return Ok(config);
    }

    let base_dir = path.parent().unwrap_or(Path::new("."));
    let mut merged = ConfigFile::default();

    for include_path in &config.includes {
        let full_path = base_dir.join(include_path);
        if !full_path.exists() {
            bail!(
                "included config file not found: '{}' (resolved from '{}')",
                full_path.display(),
                include_path
            );
        }
        let included = load_config_recursive(&full_path, visited, depth + 1)?;
        merged = merge_configs(merged, included);
    }

    let main_without_includes = ConfigFile {
        includes: vec![],
        defaults: config.defaults,
        rule: config.rule,
    };
    Ok(merge_configs(merged, main_without_includes))
}

/// Merge two configs. Overrides from `other` win per rule id; defaults
/// from `other` win when they differ from the built-in defaults.
fn merge_configs(base: ConfigFile, other: ConfigFile) -> ConfigFile {
    let defaults = if other.defaults != Defaults::default() {
        other.defaults
    } else {
        base.defaults
    };

    let mut overrides_map = std::collections::BTreeMap::new();
    for rule in base.rule {
        overrides_map.insert(rule.id.clone(), rule);
    }
    for rule in other.rule {
        overrides_map.insert(rule.id.clone(), rule);
    }

    ConfigFile {
        includes: vec![],
        defaults,
        rule: overrides_map.into_values().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convguard_types::{Severity, RULE_LOGGING};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn simple_config_without_includes() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("convguard.toml");
        fs::write(
            &config_path,
            r#"
[defaults]
max_findings = 50

[[rule]]
id = "logging.no_print"
enabled = false
"#,
        )
        .unwrap();

        let result = load_config_with_includes(&config_path).unwrap();
        assert_eq!(result.defaults.max_findings, Some(50));
        assert_eq!(result.rule.len(), 1);
        assert_eq!(result.rule[0].id, RULE_LOGGING);
    }

    #[test]
    fn included_overrides_merge_with_main_winning() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("base.toml"),
            r#"
[[rule]]
id = "logging.no_print"
severity = "info"

[[rule]]
id = "docstrings.public"
enabled = false
"#,
        )
        .unwrap();
        let main_path = temp.path().join("main.toml");
        fs::write(
            &main_path,
            r#"
includes = ["base.toml"]

[[rule]]
id = "logging.no_print"
severity = "error"
"#,
        )
        .unwrap();

        let result = load_config_with_includes(&main_path).unwrap();
        assert_eq!(result.rule.len(), 2);
        let logging = result.rule.iter().find(|r| r.id == RULE_LOGGING).unwrap();
        assert_eq!(logging.severity, Some(Severity::Error));
    }

    #[test]
    fn circular_include_is_detected() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.toml"), "includes = [\"b.toml\"]\n").unwrap();
        fs::write(temp.path().join("b.toml"), "includes = [\"a.toml\"]\n").unwrap();

        let err = load_config_with_includes(&temp.path().join("a.toml")).unwrap_err();
        assert!(err.to_string().contains("circular include"));
    }

    #[test]
    fn missing_include_errors() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "includes = [\"nonexistent.toml\"]\n").unwrap();

        let err = load_config_with_includes(&config_path).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn invalid_toml_returns_parse_error() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("bad.toml");
        fs::write(&config_path, "invalid = [").unwrap();

        let err = load_config_with_includes(&config_path).unwrap_err();
        assert!(err.to_string().contains("parse config"));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let temp = TempDir::new().unwrap();
        for i in 0..=MAX_INCLUDE_DEPTH + 1 {
            let path = temp.path().join(format!("level{i}.toml"));
            if i < MAX_INCLUDE_DEPTH + 1 {
                fs::write(&path, format!("includes = [\"level{}.toml\"]\n", i + 1)).unwrap();
            } else {
                fs::write(&path, "").unwrap();
            }
        }

        let err = load_config_with_includes(&temp.path().join("level0.toml")).unwrap_err();
        assert!(err.to_string().contains("include depth exceeded"));
    }
}
