//! Data types (config + report) for convguard.
//!
//! This crate is intentionally "dumb": pure DTOs with serde + schemars,
//! plus the compiled-in rule catalog the rest of the workspace evaluates.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ── Schema Identifiers ─────────────────────────────────────────
pub const REPORT_SCHEMA_V1: &str = "convguard.report.v1";

// ── Frozen Vocabulary ──────────────────────────────────────────
// Rule IDs
pub const RULE_STRUCTURE: &str = "structure.layout";
pub const RULE_DOCSTRINGS: &str = "docstrings.public";
pub const RULE_TYPE_HINTS: &str = "type_hints.signatures";
pub const RULE_LOGGING: &str = "logging.no_print";
pub const RULE_EXCEPTIONS: &str = "exceptions.no_bare";
pub const RULE_DEPS: &str = "deps.pinned";
/// Reserved rule that carries recovered scan/evaluation failures.
/// Always registered, so every finding references a rule in the loaded set.
pub const RULE_INTERNAL: &str = "internal.diagnostic";

// Report warning tokens (snake_case)
pub const WARNING_TRUNCATED: &str = "truncated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }
}

/// Role a scanned file plays in the project layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Module,
    Test,
    Config,
    /// Recognized source that does not sit in a conventional location.
    Other,
}

impl FileCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            FileCategory::Module => "module",
            FileCategory::Test => "test",
            FileCategory::Config => "config",
            FileCategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ToolMeta {
    pub name: String,
    pub version: String,
}

/// Counts cover the files actually checked: exclude-glob filtering is
/// applied before they are taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScanMeta {
    /// Root directory the scan started from, as given by the caller.
    pub root: String,
    pub files_scanned: u32,
    pub modules: u32,
    pub tests: u32,
    pub configs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Finding {
    pub rule_id: String,
    pub severity: Severity,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub message: String,
    /// Stable identifier for this finding across runs (16 hex chars).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RuleCount {
    pub rule_id: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub struct Summary {
    pub compliant: bool,
    pub total: u32,
    /// Number of findings dropped due to the max-findings cap.
    /// Dropped findings still count toward `total` and `per_rule`.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub truncated: u32,
    /// Violation count per rule, in rule-set load order.
    pub per_rule: Vec<RuleCount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// The terminal artifact of a compliance run. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Report {
    pub schema: String,
    pub tool: ToolMeta,
    pub scan: ScanMeta,
    pub findings: Vec<Finding>,
    pub summary: Summary,
}

/// A compiled-in rule definition. The catalog is fixed; configuration can
/// only toggle, re-grade, or scope these entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RuleInfo {
    pub id: String,
    pub severity: Severity,
    pub message: String,
    /// Target category. None means the rule looks at every scanned file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<FileCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// The fixed, ordered rule catalog. Report grouping follows this order.
pub fn built_in_rules() -> Vec<RuleInfo> {
    vec![
        RuleInfo {
            id: RULE_STRUCTURE.to_string(),
            severity: Severity::Warn,
            message: "Python source must live under src/ or tests/.".to_string(),
            category: Some(FileCategory::Other),
            help: Some(
                "Keep application modules under src/, test modules under tests/, and \
                configuration under config/ or the project root. Loose scripts make \
                packaging and discovery unreliable."
                    .to_string(),
            ),
            url: Some("https://packaging.python.org/en/latest/tutorials/packaging-projects/".to_string()),
        },
        RuleInfo {
            id: RULE_DOCSTRINGS.to_string(),
            severity: Severity::Warn,
            message: "Public functions require a docstring.".to_string(),
            category: Some(FileCategory::Module),
            help: Some(
                "Add a Google-style docstring describing the function's purpose, \
                arguments, and return value. Private helpers (leading underscore) \
                are exempt."
                    .to_string(),
            ),
            url: Some("https://google.github.io/styleguide/pyguide.html#38-comments-and-docstrings".to_string()),
        },
        RuleInfo {
            id: RULE_TYPE_HINTS.to_string(),
            severity: Severity::Error,
            message: "All function parameters and return types must be annotated.".to_string(),
            category: Some(FileCategory::Module),
            help: Some(
                "Annotate every parameter and the return type. Use typing.Optional, \
                typing.Any, or -> None where appropriate rather than omitting the \
                annotation."
                    .to_string(),
            ),
            url: Some("https://docs.python.org/3/library/typing.html".to_string()),
        },
        RuleInfo {
            id: RULE_LOGGING.to_string(),
            severity: Severity::Warn,
            message: "No direct console output for diagnostics.".to_string(),
            category: Some(FileCategory::Module),
            help: Some(
                "Use the logging module instead of print() or sys.stdout.write() in \
                application code. Configure levels (DEBUG, INFO, WARNING, ERROR) at \
                the entry point."
                    .to_string(),
            ),
            url: Some("https://docs.python.org/3/library/logging.html".to_string()),
        },
        RuleInfo {
            id: RULE_EXCEPTIONS.to_string(),
            severity: Severity::Error,
            message: "No unqualified exception handlers.".to_string(),
            category: Some(FileCategory::Module),
            help: Some(
                "Catch specific exception types instead of a bare 'except:'. Bare \
                handlers swallow SystemExit and KeyboardInterrupt and hide real \
                failures."
                    .to_string(),
            ),
            url: Some("https://docs.python.org/3/tutorial/errors.html#handling-exceptions".to_string()),
        },
        RuleInfo {
            id: RULE_DEPS.to_string(),
            severity: Severity::Error,
            message: "Dependencies must be pinned to exact versions.".to_string(),
            category: Some(FileCategory::Config),
            help: Some(
                "Pin every dependency with '==' in requirements files and pyproject \
                dependency tables so builds are reproducible."
                    .to_string(),
            ),
            url: Some("https://pip.pypa.io/en/stable/topics/repeatable-installs/".to_string()),
        },
        RuleInfo {
            id: RULE_INTERNAL.to_string(),
            severity: Severity::Error,
            message: "Internal diagnostic (recovered scan or evaluation failure).".to_string(),
            category: None,
            help: Some(
                "A file could not be read or a rule could not evaluate its input. \
                The run continued; fix the underlying file and re-run."
                    .to_string(),
            ),
            url: None,
        },
    ]
}

/// The on-disk configuration file (`convguard.toml`).
///
/// Configuration never defines new rules; it adjusts the compiled-in
/// catalog. Referencing an unknown rule id is a fatal configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub struct ConfigFile {
    /// Include other config files. Paths are relative to this config file's
    /// directory. Overrides are merged: later definitions win by rule ID.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub rule: Vec<RuleOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub struct Defaults {
    /// Maximum number of findings to include in the report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_findings: Option<usize>,

    /// Path globs excluded from every rule.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

/// Adjustment for one compiled-in rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RuleOverride {
    /// The rule ID to adjust (e.g., "logging.no_print").
    pub id: String,

    /// Set to false to disable this rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Override the rule's severity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    /// Path globs this rule should skip.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_paths: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_and_category_as_str() {
        assert_eq!(Severity::Info.as_str(), "info");
        assert_eq!(Severity::Warn.as_str(), "warn");
        assert_eq!(Severity::Error.as_str(), "error");

        assert_eq!(FileCategory::Module.as_str(), "module");
        assert_eq!(FileCategory::Test.as_str(), "test");
        assert_eq!(FileCategory::Config.as_str(), "config");
        assert_eq!(FileCategory::Other.as_str(), "other");
    }

    #[test]
    fn built_in_rules_have_unique_ids_in_stable_order() {
        let rules = built_in_rules();
        let ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                RULE_STRUCTURE,
                RULE_DOCSTRINGS,
                RULE_TYPE_HINTS,
                RULE_LOGGING,
                RULE_EXCEPTIONS,
                RULE_DEPS,
                RULE_INTERNAL,
            ]
        );

        let unique: std::collections::HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len(), "rule IDs must be unique");
    }

    #[test]
    fn summary_truncated_is_omitted_when_zero() {
        let summary = Summary {
            compliant: true,
            ..Summary::default()
        };
        let value = serde_json::to_value(&summary).expect("serialize summary");
        let obj = value.as_object().expect("summary should be object");
        assert!(!obj.contains_key("truncated"));
        assert!(!obj.contains_key("warnings"));

        let with_truncation = Summary {
            truncated: 4,
            ..summary
        };
        let value = serde_json::to_value(&with_truncation).expect("serialize summary");
        let obj = value.as_object().expect("summary should be object");
        assert_eq!(obj.get("truncated").and_then(|v| v.as_u64()), Some(4));
    }

    #[test]
    fn finding_omits_empty_line_and_fingerprint() {
        let finding = Finding {
            rule_id: RULE_LOGGING.to_string(),
            severity: Severity::Warn,
            path: "src/app.py".to_string(),
            line: None,
            message: "m".to_string(),
            fingerprint: String::new(),
        };
        let value = serde_json::to_value(&finding).expect("serialize finding");
        let obj = value.as_object().expect("finding should be object");
        assert!(!obj.contains_key("line"));
        assert!(!obj.contains_key("fingerprint"));
    }

    #[test]
    fn config_file_parses_minimal_toml() {
        let cfg: ConfigFile = toml::from_str(
            r#"
            [defaults]
            max_findings = 50

            [[rule]]
            id = "logging.no_print"
            enabled = false

            [[rule]]
            id = "docstrings.public"
            severity = "error"
            exclude_paths = ["src/generated/**"]
            "#,
        )
        .expect("parse config");

        assert_eq!(cfg.defaults.max_findings, Some(50));
        assert_eq!(cfg.rule.len(), 2);
        assert_eq!(cfg.rule[0].enabled, Some(false));
        assert_eq!(cfg.rule[1].severity, Some(Severity::Error));
        assert_eq!(cfg.rule[1].exclude_paths, vec!["src/generated/**"]);
    }
}
