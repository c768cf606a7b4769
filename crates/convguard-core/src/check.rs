use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

use convguard_domain::{compile_ruleset, evaluate_facts};
use convguard_types::{
    ConfigFile, FileCategory, Report, ScanMeta, ToolMeta, RULE_INTERNAL, REPORT_SCHEMA_V1,
    WARNING_TRUNCATED,
};

use crate::fingerprint::compute_fingerprint;
use crate::render;
use crate::scan::scan_tree;

/// Cap applied when neither the command line nor the config sets one.
pub const DEFAULT_MAX_FINDINGS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckPlan {
    pub root: PathBuf,
    /// Overrides the config default when set.
    pub max_findings: Option<usize>,
    /// Path globs excluded from checking, merged with the config's.
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRun {
    pub report: Report,
    pub markdown: String,
    pub annotations: Vec<String>,
    pub exit_code: i32,
    /// Number of findings dropped by the max-findings cap.
    pub truncated_findings: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum PathFilterError {
    #[error("invalid exclude glob '{glob}': {source}")]
    InvalidGlob {
        glob: String,
        source: globset::Error,
    },
}

/// Full check pipeline: compile rules, scan the tree, evaluate, attach
/// fingerprints, render. Fails fast on configuration and root-level scan
/// errors; per-file problems surface as findings instead.
pub fn run_check(plan: &CheckPlan, config: &ConfigFile) -> Result<CheckRun, anyhow::Error> {
    let rules = compile_ruleset(&config.rule)?;

    let mut exclude_globs: Vec<String> = config.defaults.exclude.clone();
    exclude_globs.extend(plan.exclude.iter().cloned());
    let excludes = compile_exclude_globs(&exclude_globs)?;

    let max_findings = plan
        .max_findings
        .or(config.defaults.max_findings)
        .unwrap_or(DEFAULT_MAX_FINDINGS);

    let mut outcome = scan_tree(&plan.root)?;
    if let Some(excludes) = &excludes {
        outcome.facts.retain(|f| !excludes.is_match(Path::new(&f.path)));
        outcome
            .skipped
            .retain(|f| !excludes.is_match(Path::new(&f.path)));
    }

    // Counted after exclude filtering, so the report reflects what was
    // actually checked. Unreadable files count as scanned but carry no
    // category.
    let files_scanned = (outcome.facts.len() + outcome.skipped.len()) as u32;
    let (mut modules, mut tests, mut configs) = (0u32, 0u32, 0u32);
    for fact in &outcome.facts {
        match fact.category {
            FileCategory::Module => modules += 1,
            FileCategory::Test => tests += 1,
            FileCategory::Config => configs += 1,
            FileCategory::Other => {}
        }
    }

    tracing::debug!(
        files = files_scanned,
        facts = outcome.facts.len(),
        skipped = outcome.skipped.len(),
        "scan complete"
    );

    let mut evaluation = evaluate_facts(&outcome.facts, &rules, max_findings);

    // Scanner diagnostics ride on the internal rule, which sits last in
    // the catalog, so appending here keeps findings grouped by rule.
    // The rule cannot be disabled: no recovered error is discarded.
    for mut diagnostic in outcome.skipped {
        evaluation.total = evaluation.total.saturating_add(1);
        if let Some(count) = evaluation
            .per_rule
            .iter_mut()
            .find(|c| c.rule_id == RULE_INTERNAL)
        {
            count.count = count.count.saturating_add(1);
        }
        if evaluation.findings.len() < max_findings {
            diagnostic.fingerprint = String::new();
            evaluation.findings.push(diagnostic);
        } else {
            evaluation.truncated = evaluation.truncated.saturating_add(1);
        }
    }

    for finding in &mut evaluation.findings {
        finding.fingerprint = compute_fingerprint(finding);
    }

    let mut warnings = Vec::new();
    if evaluation.truncated > 0 {
        warnings.push(WARNING_TRUNCATED.to_string());
    }

    let compliant = evaluation.total == 0;
    let report = Report {
        schema: REPORT_SCHEMA_V1.to_string(),
        tool: ToolMeta {
            name: "convguard".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        scan: ScanMeta {
            root: plan.root.display().to_string(),
            files_scanned,
            modules,
            tests,
            configs,
        },
        findings: evaluation.findings,
        summary: convguard_types::Summary {
            compliant,
            total: evaluation.total,
            truncated: evaluation.truncated,
            per_rule: evaluation.per_rule,
            warnings,
        },
    };

    let markdown = render::render_markdown(&report);
    let annotations = render::render_annotations(&report.findings);
    let exit_code = if compliant { 0 } else { 1 };
    let truncated_findings = report.summary.truncated;

    Ok(CheckRun {
        report,
        markdown,
        annotations,
        exit_code,
        truncated_findings,
    })
}

fn compile_exclude_globs(globs: &[String]) -> Result<Option<GlobSet>, PathFilterError> {
    if globs.is_empty() {
        return Ok(None);
    }
    let mut b = GlobSetBuilder::new();
    for g in globs {
        let glob = Glob::new(g).map_err(|e| PathFilterError::InvalidGlob {
            glob: g.clone(),
            source: e,
        })?;
        b.add(glob);
    }
    Ok(Some(b.build().map_err(|e| PathFilterError::InvalidGlob {
        glob: globs.join(","),
        source: e,
    })?))
}
