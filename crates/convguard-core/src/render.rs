use convguard_types::{Finding, Report, Severity, WARNING_TRUNCATED};

pub fn render_markdown(report: &Report) -> String {
    let status = if report.summary.compliant {
        "COMPLIANT"
    } else {
        "NONCOMPLIANT"
    };

    let mut out = String::new();
    out.push_str(&format!("## convguard — {status}\n\n"));

    out.push_str(&format!(
        "Scanned **{}** file(s) under `{}` ({} module(s), {} test(s), {} config file(s))\n\n",
        report.scan.files_scanned,
        escape_md(&report.scan.root),
        report.scan.modules,
        report.scan.tests,
        report.scan.configs
    ));

    if !report.summary.warnings.is_empty() {
        out.push_str("**Warnings:**\n");
        for w in &report.summary.warnings {
            if w == WARNING_TRUNCATED {
                out.push_str(&format!(
                    "- finding list truncated ({} dropped)\n",
                    report.summary.truncated
                ));
            } else {
                out.push_str(&format!("- {w}\n"));
            }
        }
        out.push('\n');
    }

    if report.findings.is_empty() {
        out.push_str("No findings.\n");
        return out;
    }

    out.push_str("| Severity | Rule | Location | Message |\n");
    out.push_str("|---|---|---|---|\n");
    for f in &report.findings {
        out.push_str(&render_finding_row(f));
    }
    out.push('\n');

    out.push_str("**Findings by rule:**\n");
    for c in report.summary.per_rule.iter().filter(|c| c.count > 0) {
        out.push_str(&format!("- `{}`: {}\n", escape_md(&c.rule_id), c.count));
    }
    out.push('\n');

    out
}

fn render_finding_row(f: &Finding) -> String {
    let loc = match f.line {
        Some(line) => format!("{}:{}", escape_md(&f.path), line),
        None => escape_md(&f.path),
    };
    format!(
        "| {sev} | `{rule}` | `{loc}` | {msg} |\n",
        sev = f.severity.as_str(),
        rule = escape_md(&f.rule_id),
        loc = loc,
        msg = escape_md(&f.message)
    )
}

/// GitHub workflow command lines, one per finding. The `line=` field is
/// omitted for findings that have no line (manifest-wide and file-wide
/// diagnostics).
pub fn render_annotations(findings: &[Finding]) -> Vec<String> {
    findings
        .iter()
        .map(|f| {
            let level = match f.severity {
                Severity::Info => "notice",
                Severity::Warn => "warning",
                Severity::Error => "error",
            };
            let location = match f.line {
                Some(line) => format!("file={path},line={line}", path = f.path),
                None => format!("file={path}", path = f.path),
            };
            format!(
                "::{level} {location}::{rule} {msg}",
                level = level,
                location = location,
                rule = f.rule_id,
                msg = f.message
            )
        })
        .collect()
}

fn escape_md(s: &str) -> String {
    s.replace('|', "\\|").replace('`', "\\`")
}
