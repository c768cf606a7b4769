use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, info};

use convguard_core::{run_check, CheckPlan};
use convguard_domain::{compile_ruleset, CompiledRule};
use convguard_types::{built_in_rules, ConfigFile, FileCategory, Severity};

mod config_loader;

use config_loader::load_config_with_includes;

#[derive(Parser)]
#[command(name = "convguard")]
#[command(about = "Convention compliance checks for Python project trees", long_about = None)]
struct Cli {
    /// Enable verbose (info-level) logging to stderr.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Enable debug-level logging to stderr.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a project tree and evaluate the convention rules.
    Check(CheckArgs),

    /// Print the effective rule catalog (built-in + config overrides).
    Rules(RulesArgs),

    /// Show detailed information about a specific rule.
    Explain(ExplainArgs),

    /// Validate the configuration file (rule ids, globs, includes).
    Validate(ValidateArgs),

    /// Initialize a new convguard.toml configuration file.
    Init(InitArgs),
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Project root to scan.
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Path to a config file. If omitted, uses <root>/convguard.toml if present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum number of findings to include in the report.
    #[arg(long)]
    max_findings: Option<usize>,

    /// Exclude paths matching these glob patterns. Repeatable.
    #[arg(long, action = clap::ArgAction::Append)]
    exclude: Vec<String>,

    /// Where to write the JSON report.
    #[arg(long, default_value = "artifacts/convguard/report.json")]
    out: PathBuf,

    /// Write a Markdown summary.
    ///
    /// If provided with no value, defaults to artifacts/convguard/comment.md
    #[arg(
        long,
        value_name = "PATH",
        num_args = 0..=1,
        default_missing_value = "artifacts/convguard/comment.md"
    )]
    md: Option<PathBuf>,

    /// Emit GitHub Actions annotations to stdout.
    #[arg(long)]
    github_annotations: bool,
}

#[derive(Parser, Debug)]
struct RulesArgs {
    /// Path to a config file. If omitted, uses ./convguard.toml if present.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = RulesFormat::Toml)]
    format: RulesFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RulesFormat {
    Toml,
    Json,
}

#[derive(Parser, Debug)]
struct ExplainArgs {
    /// The rule ID to explain (e.g., "logging.no_print").
    rule_id: String,

    /// Path to a config file. If omitted, uses ./convguard.toml if present.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Path to a config file. If omitted, uses ./convguard.toml if present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable strict mode: also report best-practice warnings.
    #[arg(long)]
    strict: bool,

    /// Output format for validation results.
    #[arg(long, value_enum, default_value_t = ValidateFormat::Text)]
    format: ValidateFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ValidateFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
struct InitArgs {
    /// Output path for the configuration file.
    #[arg(long, short, default_value = "convguard.toml")]
    output: PathBuf,

    /// Overwrite an existing configuration file.
    #[arg(long, short)]
    force: bool,
}

fn main() -> std::process::ExitCode {
    match run_with_args(std::env::args_os()) {
        Ok(code) => std::process::ExitCode::from(code as u8),
        // Fatal: configuration or scan-aborting failures.
        Err(err) => {
            eprintln!("convguard: {err:?}");
            std::process::ExitCode::from(2)
        }
    }
}

fn run_with_args<I, T>(args: I) -> Result<i32>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose, cli.debug);

    match cli.command {
        Commands::Check(args) => cmd_check(args),
        Commands::Rules(args) => {
            cmd_rules(args)?;
            Ok(0)
        }
        Commands::Explain(args) => {
            cmd_explain(args)?;
            Ok(0)
        }
        Commands::Validate(args) => cmd_validate(args),
        Commands::Init(args) => {
            cmd_init(args)?;
            Ok(0)
        }
    }
}

/// Initialize tracing/logging based on CLI flags.
fn init_logging(verbose: bool, debug: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    debug!("logging initialized at level: {}", level);
}

fn load_config(explicit: Option<PathBuf>, fallback_dir: &Path) -> Result<ConfigFile> {
    match explicit {
        Some(path) => load_config_with_includes(&path),
        None => {
            let candidate = fallback_dir.join("convguard.toml");
            if candidate.exists() {
                load_config_with_includes(&candidate)
            } else {
                Ok(ConfigFile::default())
            }
        }
    }
}

fn cmd_check(args: CheckArgs) -> Result<i32> {
    let config = load_config(args.config.clone(), &args.root)?;

    let plan = CheckPlan {
        root: args.root.clone(),
        max_findings: args.max_findings,
        exclude: args.exclude.clone(),
    };

    let run = run_check(&plan, &config)?;

    let json = serde_json::to_string_pretty(&run.report).context("serialize report")?;
    write_text(&args.out, &json)?;
    info!(
        findings = run.report.summary.total,
        compliant = run.report.summary.compliant,
        out = %args.out.display(),
        "report written"
    );

    if let Some(md_path) = &args.md {
        write_text(md_path, &run.markdown)?;
    }

    if args.github_annotations {
        for line in &run.annotations {
            println!("{line}");
        }
    }

    if run.truncated_findings > 0 {
        eprintln!(
            "convguard: finding list truncated ({} dropped); raise --max-findings to see all",
            run.truncated_findings
        );
    }

    Ok(run.exit_code)
}

/// Serializable view of a compiled rule for `rules` output.
#[derive(Debug, Serialize)]
struct EffectiveRule {
    id: String,
    severity: Severity,
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<FileCategory>,
    message: String,
}

#[derive(Debug, Serialize)]
struct RuleListing {
    rule: Vec<EffectiveRule>,
}

fn effective_rules(config: &ConfigFile) -> Result<Vec<CompiledRule>> {
    Ok(compile_ruleset(&config.rule)?)
}

fn cmd_rules(args: RulesArgs) -> Result<()> {
    let config = load_config(args.config, Path::new("."))?;
    let rules = effective_rules(&config)?;

    let listing = RuleListing {
        rule: rules
            .iter()
            .map(|r| EffectiveRule {
                id: r.id.clone(),
                severity: r.severity,
                enabled: r.enabled,
                category: r.category,
                message: r.message.clone(),
            })
            .collect(),
    };

    match args.format {
        RulesFormat::Toml => {
            let s = toml::to_string_pretty(&listing).context("render toml")?;
            print!("{s}");
        }
        RulesFormat::Json => {
            let s = serde_json::to_string_pretty(&listing.rule).context("render json")?;
            println!("{s}");
        }
    }

    Ok(())
}

fn cmd_explain(args: ExplainArgs) -> Result<()> {
    let config = load_config(args.config, Path::new("."))?;
    let rules = effective_rules(&config)?;

    match rules.iter().find(|r| r.id == args.rule_id) {
        Some(rule) => {
            print!("{}", format_rule_explanation(rule));
            Ok(())
        }
        None => {
            let suggestions = find_similar_rules(&args.rule_id, &rules);
            let mut msg = format!("Rule '{}' not found.", args.rule_id);
            if !suggestions.is_empty() {
                msg.push_str("\n\nDid you mean one of these?\n");
                for s in &suggestions {
                    msg.push_str(&format!("  - {s}\n"));
                }
            }
            msg.push_str("\nUse 'convguard rules' to list all available rules.");
            bail!("{msg}");
        }
    }
}

fn format_rule_explanation(rule: &CompiledRule) -> String {
    let mut out = String::new();

    out.push_str(&format!("Rule: {}\n", rule.id));
    out.push_str(&format!("Severity: {}\n", rule.severity.as_str()));
    out.push_str(&format!(
        "Enabled: {}\n",
        if rule.enabled { "yes" } else { "no" }
    ));
    out.push_str(&format!(
        "Applies to: {}\n",
        rule.category
            .map(|c| format!("{} files", c.as_str()))
            .unwrap_or_else(|| "scanner diagnostics".to_string())
    ));
    out.push_str(&format!("Message: {}\n", rule.message));

    if let Some(help) = &rule.help {
        out.push_str("\nRemediation:\n");
        for line in help.lines() {
            out.push_str(&format!("  {line}\n"));
        }
    }

    if let Some(url) = &rule.url {
        out.push_str(&format!("\nSee also: {url}\n"));
    }

    out
}

/// Find rules with ids similar to the given one, best matches first.
fn find_similar_rules(rule_id: &str, rules: &[CompiledRule]) -> Vec<String> {
    let needle = rule_id.to_lowercase();
    let mut candidates: Vec<(String, usize)> = Vec::new();

    for r in rules {
        let id_lower = r.id.to_lowercase();
        if id_lower.starts_with(&needle) || needle.starts_with(&id_lower) {
            candidates.push((r.id.clone(), 0));
            continue;
        }
        if id_lower.contains(&needle) || needle.contains(&id_lower) {
            candidates.push((r.id.clone(), 1));
            continue;
        }
        let distance = simple_edit_distance(&needle, &id_lower);
        if distance <= 3 {
            candidates.push((r.id.clone(), distance + 2));
        }
    }

    candidates.sort_by_key(|(_, score)| *score);
    candidates.truncate(5);
    candidates.into_iter().map(|(id, _)| id).collect()
}

fn simple_edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr: Vec<usize> = vec![0; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

fn cmd_validate(args: ValidateArgs) -> Result<i32> {
    info!("validating configuration file");

    let config_path = args.config.clone().or_else(|| {
        let p = PathBuf::from("convguard.toml");
        p.exists().then_some(p)
    });

    let Some(path) = config_path else {
        bail!("no configuration file found; specify --config or create convguard.toml");
    };

    debug!("loading config from: {}", path.display());

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: ConfigFile =
        toml::from_str(&text).with_context(|| format!("parse config {}", path.display()))?;

    let known_ids: Vec<String> = built_in_rules().into_iter().map(|r| r.id).collect();

    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    let mut seen_ids: std::collections::HashSet<&str> = std::collections::HashSet::new();
    for rule in &cfg.rule {
        if !seen_ids.insert(&rule.id) {
            errors.push(format!("Rule '{}': duplicate override", rule.id));
        }
        if !known_ids.contains(&rule.id) {
            errors.push(format!("Rule '{}': unknown rule id", rule.id));
        }
        if rule.id == convguard_types::RULE_INTERNAL {
            errors.push(format!(
                "Rule '{}': reserved rule cannot be overridden",
                rule.id
            ));
        }
        for glob in &rule.exclude_paths {
            if let Err(e) = globset::Glob::new(glob) {
                errors.push(format!(
                    "Rule '{}': invalid exclude_paths glob '{}': {}",
                    rule.id, glob, e
                ));
            }
        }

        if args.strict
            && rule.enabled.is_none()
            && rule.severity.is_none()
            && rule.exclude_paths.is_empty()
        {
            warnings.push(format!("Rule '{}': override changes nothing", rule.id));
        }
    }

    for glob in &cfg.defaults.exclude {
        if let Err(e) = globset::Glob::new(glob) {
            errors.push(format!("Defaults: invalid exclude glob '{}': {}", glob, e));
        }
    }
    if args.strict && cfg.defaults.max_findings == Some(0) {
        warnings.push("Defaults: max_findings = 0 drops every finding from the report".to_string());
    }

    if errors.is_empty() {
        if let Err(e) = compile_ruleset(&cfg.rule) {
            errors.push(format!("Rule compilation error: {e}"));
        }
    }

    match args.format {
        ValidateFormat::Json => {
            let result = serde_json::json!({
                "valid": errors.is_empty(),
                "path": path.display().to_string(),
                "overrides_count": cfg.rule.len(),
                "errors": errors,
                "warnings": warnings,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        ValidateFormat::Text => {
            println!("Validating {}...", path.display());
            println!();

            if !warnings.is_empty() {
                println!("Warnings ({}):", warnings.len());
                for (i, warn) in warnings.iter().enumerate() {
                    println!("  {}. {}", i + 1, warn);
                }
                println!();
            }

            if errors.is_empty() {
                println!("Configuration is valid!");
                println!("  {} override(s) defined", cfg.rule.len());
            } else {
                println!("Configuration has {} error(s):", errors.len());
                println!();
                for (i, err) in errors.iter().enumerate() {
                    println!("  {}. {}", i + 1, err);
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(0)
    } else {
        Ok(1)
    }
}

const INIT_TEMPLATE: &str = r#"# convguard configuration
#
# Overrides for the built-in rule catalog. Run `convguard rules` to list
# rule ids, and `convguard explain <rule-id>` for details.

[defaults]
# max_findings = 500
# exclude = ["migrations/**"]

# [[rule]]
# id = "logging.no_print"
# enabled = false

# [[rule]]
# id = "docstrings.public"
# severity = "error"
# exclude_paths = ["src/generated/**"]
"#;

fn cmd_init(args: InitArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "'{}' already exists; use --force to overwrite",
            args.output.display()
        );
    }

    write_text(&args.output, INIT_TEMPLATE)?;
    println!("Wrote starter configuration to {}", args.output.display());
    Ok(())
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
    }
    let mut body = contents.to_string();
    if !body.ends_with('\n') {
        body.push('\n');
    }
    std::fs::write(path, body).with_context(|| format!("write {}", path.display()))
}
