use std::collections::BTreeSet;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use convguard_types::{
    built_in_rules, FileCategory, RuleInfo, RuleOverride, Severity, RULE_INTERNAL,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown rule id '{rule_id}' in configuration")]
    UnknownRule { rule_id: String },

    #[error("rule '{rule_id}' is reserved and cannot be overridden")]
    ReservedRule { rule_id: String },

    #[error("rule '{rule_id}' is overridden more than once")]
    DuplicateOverride { rule_id: String },

    #[error("rule '{rule_id}' has invalid exclude glob '{glob}': {source}")]
    InvalidGlob {
        rule_id: String,
        glob: String,
        source: globset::Error,
    },
}

/// A catalog rule with configuration overrides applied.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: String,
    pub severity: Severity,
    pub message: String,
    /// None means the rule inspects every scanned file.
    pub category: Option<FileCategory>,
    pub exclude: Option<GlobSet>,
    pub enabled: bool,
    pub help: Option<String>,
    pub url: Option<String>,
}

impl CompiledRule {
    pub fn applies_to(&self, path: &Path, category: FileCategory) -> bool {
        if !self.enabled {
            return false;
        }

        if let Some(target) = self.category {
            if target != category {
                return false;
            }
        }

        if let Some(exclude) = &self.exclude {
            if exclude.is_match(path) {
                return false;
            }
        }

        true
    }
}

/// Compiles the fixed catalog with the caller's overrides applied.
///
/// The catalog order is preserved; reports group findings in this order.
/// An override referencing an id outside the catalog is a fatal
/// [`ConfigError`] before any scan starts.
pub fn compile_ruleset(overrides: &[RuleOverride]) -> Result<Vec<CompiledRule>, ConfigError> {
    let catalog = built_in_rules();
    let known: BTreeSet<&str> = catalog.iter().map(|r| r.id.as_str()).collect();

    let mut seen = BTreeSet::<&str>::new();
    for o in overrides {
        if !known.contains(o.id.as_str()) {
            return Err(ConfigError::UnknownRule {
                rule_id: o.id.clone(),
            });
        }
        // The internal rule carries recovered scan failures; letting
        // config disable or scope it would silently discard errors.
        if o.id == RULE_INTERNAL {
            return Err(ConfigError::ReservedRule {
                rule_id: o.id.clone(),
            });
        }
        if !seen.insert(o.id.as_str()) {
            return Err(ConfigError::DuplicateOverride {
                rule_id: o.id.clone(),
            });
        }
    }

    let mut out = Vec::with_capacity(catalog.len());
    for info in catalog {
        let o = overrides.iter().find(|o| o.id == info.id);
        out.push(compile_one(info, o)?);
    }
    Ok(out)
}

fn compile_one(info: RuleInfo, o: Option<&RuleOverride>) -> Result<CompiledRule, ConfigError> {
    let exclude = match o {
        Some(o) if !o.exclude_paths.is_empty() => Some(compile_globs(&o.exclude_paths, &info.id)?),
        _ => None,
    };

    Ok(CompiledRule {
        severity: o.and_then(|o| o.severity).unwrap_or(info.severity),
        enabled: o.and_then(|o| o.enabled).unwrap_or(true),
        exclude,
        id: info.id,
        message: info.message,
        category: info.category,
        help: info.help,
        url: info.url,
    })
}

fn compile_globs(globs: &[String], rule_id: &str) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for g in globs {
        let glob = Glob::new(g).map_err(|e| ConfigError::InvalidGlob {
            rule_id: rule_id.to_string(),
            glob: g.clone(),
            source: e,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ConfigError::InvalidGlob {
        rule_id: rule_id.to_string(),
        glob: globs.join(","),
        source: e,
    })
}
