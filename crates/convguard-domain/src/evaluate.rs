use convguard_types::{
    Finding, RuleCount, Severity, RULE_DEPS, RULE_DOCSTRINGS, RULE_EXCEPTIONS, RULE_LOGGING,
    RULE_STRUCTURE, RULE_TYPE_HINTS,
};

use crate::facts::SourceFact;
use crate::rules::CompiledRule;

/// A predicate failing on malformed input. Recovered locally: the failure
/// becomes a finding referencing the faulting rule, and evaluation
/// continues for the remaining rule/file pairs.
#[derive(Debug, thiserror::Error)]
pub enum PredicateError {
    #[error("dependency manifest could not be parsed: {detail}")]
    UnparseableManifest { detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub findings: Vec<Finding>,
    /// Violation count per rule, in rule-set order. Counts include
    /// findings dropped by the max-findings cap.
    pub per_rule: Vec<RuleCount>,
    pub total: u32,
    pub truncated: u32,
}

struct RuleHit {
    line: Option<u32>,
    severity: Severity,
    message: String,
}

/// Evaluates every (rule, fact) pair with a matching category.
///
/// Rule-major order keeps the output grouped and deterministic: all files
/// are checked against rule 1, then rule 2, and so on. Within a rule,
/// facts are visited in ascending path order and hits in ascending line
/// order. Purely functional over its inputs.
pub fn evaluate_facts(
    facts: &[SourceFact],
    rules: &[CompiledRule],
    max_findings: usize,
) -> Evaluation {
    let mut ordered: Vec<&SourceFact> = facts.iter().collect();
    ordered.sort_by(|a, b| a.path.cmp(&b.path));

    let mut findings = Vec::new();
    let mut per_rule = Vec::with_capacity(rules.len());
    let mut total: u32 = 0;
    let mut truncated: u32 = 0;

    for rule in rules {
        let mut rule_count: u32 = 0;

        for fact in &ordered {
            if !rule.applies_to(std::path::Path::new(&fact.path), fact.category) {
                continue;
            }

            let hits = match apply_rule(rule, fact) {
                Ok(mut hits) => {
                    hits.sort_by_key(|h| h.line.unwrap_or(0));
                    hits
                }
                Err(e) => vec![RuleHit {
                    line: None,
                    severity: Severity::Error,
                    // Parser diagnostics can span lines; finding messages
                    // must stay single-line for table and annotation output.
                    message: single_line(&format!("rule evaluation failed: {e}")),
                }],
            };

            for hit in hits {
                rule_count = rule_count.saturating_add(1);
                total = total.saturating_add(1);

                if findings.len() < max_findings {
                    findings.push(Finding {
                        rule_id: rule.id.clone(),
                        severity: hit.severity,
                        path: fact.path.clone(),
                        line: hit.line,
                        message: hit.message,
                        fingerprint: String::new(),
                    });
                } else {
                    truncated = truncated.saturating_add(1);
                }
            }
        }

        per_rule.push(RuleCount {
            rule_id: rule.id.clone(),
            count: rule_count,
        });
    }

    Evaluation {
        findings,
        per_rule,
        total,
        truncated,
    }
}

/// Collapses all whitespace runs (including newlines) to single spaces.
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn apply_rule(rule: &CompiledRule, fact: &SourceFact) -> Result<Vec<RuleHit>, PredicateError> {
    let hits = match rule.id.as_str() {
        RULE_STRUCTURE => vec![RuleHit {
            line: None,
            severity: rule.severity,
            message: format!(
                "Python source '{}' is outside src/ or tests/.",
                fact.path
            ),
        }],
        RULE_DOCSTRINGS => fact
            .functions
            .iter()
            .filter(|f| f.public && !f.has_docstring)
            .map(|f| RuleHit {
                line: Some(f.line),
                severity: rule.severity,
                message: format!("Public function '{}' is missing a docstring.", f.name),
            })
            .collect(),
        RULE_TYPE_HINTS => fact
            .functions
            .iter()
            .filter(|f| !f.annotated)
            .map(|f| RuleHit {
                line: Some(f.line),
                severity: rule.severity,
                message: format!(
                    "Function '{}' has unannotated parameters or return type.",
                    f.name
                ),
            })
            .collect(),
        RULE_LOGGING => fact
            .console_calls
            .iter()
            .map(|c| RuleHit {
                line: Some(c.line),
                severity: rule.severity,
                message: format!(
                    "Direct console output via {}(); use the logging module.",
                    c.callee
                ),
            })
            .collect(),
        RULE_EXCEPTIONS => fact
            .handlers
            .iter()
            .filter(|h| h.bare)
            .map(|h| RuleHit {
                line: Some(h.line),
                severity: rule.severity,
                message: "Bare 'except:' handler; catch specific exception types.".to_string(),
            })
            .collect(),
        RULE_DEPS => {
            if let Some(detail) = &fact.manifest_error {
                return Err(PredicateError::UnparseableManifest {
                    detail: detail.clone(),
                });
            }
            fact.deps
                .iter()
                .filter(|d| !d.pinned)
                .map(|d| RuleHit {
                    line: d.line,
                    severity: rule.severity,
                    message: format!(
                        "Dependency '{}' is not pinned to an exact version.",
                        d.name
                    ),
                })
                .collect()
        }
        // The internal rule carries scanner diagnostics; it has no predicate.
        _ => vec![],
    };

    Ok(hits)
}
