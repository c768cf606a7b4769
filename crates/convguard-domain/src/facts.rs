//! Syntactic fact extraction from scanned project files.
//!
//! This module is I/O-free: it takes file text and produces normalized
//! [`SourceFact`] records for the evaluator. Python extraction is a
//! line-oriented scanner with string/comment masking, not a full parser;
//! it recognizes exactly the constructs the rule catalog needs.

use std::sync::OnceLock;

use regex::Regex;

use convguard_types::FileCategory;

/// One function signature as seen by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSig {
    pub name: String,
    /// Line of the `def` keyword (1-based).
    pub line: u32,
    /// Public means no leading underscore.
    pub public: bool,
    /// True when every parameter and the return type are annotated.
    pub annotated: bool,
    pub has_docstring: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub line: u32,
    /// `except:` with no exception type.
    pub bare: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleCall {
    pub line: u32,
    pub callee: String,
}

/// One declared dependency from a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepDecl {
    pub name: String,
    /// Known for requirements files; pyproject tables lose line positions.
    pub line: Option<u32>,
    /// Pinned means an exact `==` version specifier.
    pub pinned: bool,
}

/// Normalized, extracted information about one scanned file.
///
/// Owned by the scanner; the evaluator consumes it read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFact {
    /// Repo-relative path with forward slashes.
    pub path: String,
    pub category: FileCategory,
    pub functions: Vec<FunctionSig>,
    pub handlers: Vec<ExceptionHandler>,
    pub console_calls: Vec<ConsoleCall>,
    pub deps: Vec<DepDecl>,
    /// Set when a dependency manifest could not be parsed. Surfaced by the
    /// deps rule as a recovered evaluation failure.
    pub manifest_error: Option<String>,
}

impl SourceFact {
    pub fn empty(path: impl Into<String>, category: FileCategory) -> Self {
        Self {
            path: path.into(),
            category,
            functions: Vec::new(),
            handlers: Vec::new(),
            console_calls: Vec::new(),
            deps: Vec::new(),
            manifest_error: None,
        }
    }
}

fn def_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("valid regex")
    })
}

fn bare_except_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*except\s*:").expect("valid regex"))
}

fn typed_except_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*except\b").expect("valid regex"))
}

fn print_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|[^\w.])print\s*\(").expect("valid regex"))
}

fn stdout_write_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"sys\.std(?:out|err)\.write\s*\(").expect("valid regex"))
}

fn docstring_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^[rRbBuUfF]{0,2}("""|'''|"|')"#).expect("valid regex"))
}

/// Masks Python string and comment content so pattern checks only see code.
///
/// Tracks triple-quoted strings across lines; the masker keeps line length
/// so byte offsets still map back to the original text.
#[derive(Debug, Default)]
struct StringMasker {
    /// Open triple-quote delimiter carried over from a previous line.
    in_triple: Option<char>,
}

impl StringMasker {
    fn mask_line(&mut self, line: &str) -> String {
        let chars: Vec<char> = line.chars().collect();
        let mut out = String::with_capacity(line.len());
        let mut i = 0;

        while i < chars.len() {
            if let Some(quote) = self.in_triple {
                if chars[i] == quote && chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote) {
                    self.in_triple = None;
                    out.push_str("   ");
                    i += 3;
                } else {
                    out.push(' ');
                    i += 1;
                }
                continue;
            }

            let c = chars[i];
            match c {
                '#' => {
                    // Rest of the line is a comment.
                    for _ in i..chars.len() {
                        out.push(' ');
                    }
                    break;
                }
                '"' | '\'' => {
                    if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                        self.in_triple = Some(c);
                        out.push_str("   ");
                        i += 3;
                    } else {
                        // Single-line string: consume to the closing quote.
                        out.push(' ');
                        i += 1;
                        while i < chars.len() {
                            if chars[i] == '\\' {
                                out.push_str("  ");
                                i += 2;
                                continue;
                            }
                            let done = chars[i] == c;
                            out.push(' ');
                            i += 1;
                            if done {
                                break;
                            }
                        }
                    }
                }
                _ => {
                    out.push(c);
                    i += 1;
                }
            }
        }

        out
    }
}

/// Signature accumulation state for (possibly multi-line) `def` headers.
struct PendingSignature {
    name: String,
    line: u32,
    buffer: String,
}

/// Index of a function in `functions` waiting for its docstring check.
struct PendingDocstring {
    index: usize,
}

pub fn extract_python_facts(path: &str, category: FileCategory, text: &str) -> SourceFact {
    let mut fact = SourceFact::empty(path, category);
    let mut masker = StringMasker::default();
    let mut pending_sig: Option<PendingSignature> = None;
    let mut pending_doc: Option<PendingDocstring> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = (idx + 1) as u32;
        let was_in_string = masker.in_triple.is_some();
        let masked = masker.mask_line(raw);
        let trimmed_raw = raw.trim();

        // Resolve a docstring check before anything else on this line.
        if let Some(pending) = pending_doc.take() {
            if trimmed_raw.is_empty() || (!was_in_string && masked.trim().is_empty() && trimmed_raw.starts_with('#')) {
                // Blank or comment line: keep waiting.
                pending_doc = Some(pending);
            } else {
                fact.functions[pending.index].has_docstring =
                    docstring_start_re().is_match(trimmed_raw);
            }
        }

        if let Some(mut sig) = pending_sig.take() {
            sig.buffer.push(' ');
            sig.buffer.push_str(&masked);
            if signature_complete(&sig) {
                finish_signature(&mut fact, sig, &mut pending_doc);
            } else {
                pending_sig = Some(sig);
            }
            continue;
        }

        if let Some(caps) = def_re().captures(&masked) {
            let name = caps[1].to_string();
            let sig = PendingSignature {
                name,
                line: line_no,
                buffer: masked.clone(),
            };
            if signature_complete(&sig) {
                finish_signature(&mut fact, sig, &mut pending_doc);
            } else {
                pending_sig = Some(sig);
            }
            continue;
        }

        if bare_except_re().is_match(&masked) {
            fact.handlers.push(ExceptionHandler {
                line: line_no,
                bare: true,
            });
        } else if typed_except_re().is_match(&masked) {
            fact.handlers.push(ExceptionHandler {
                line: line_no,
                bare: false,
            });
        }

        if print_re().is_match(&masked) {
            fact.console_calls.push(ConsoleCall {
                line: line_no,
                callee: "print".to_string(),
            });
        }
        if stdout_write_re().is_match(&masked) {
            fact.console_calls.push(ConsoleCall {
                line: line_no,
                callee: "sys.stdout.write".to_string(),
            });
        }
    }

    fact
}

/// Byte offset of the `)` closing the parameter list, once brackets balance.
fn matching_close(buffer: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut seen_open = false;
    for (i, c) in buffer.char_indices() {
        match c {
            '(' | '[' | '{' => {
                depth += 1;
                seen_open = true;
            }
            ')' | ']' | '}' => {
                depth -= 1;
                if seen_open && depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn signature_complete(sig: &PendingSignature) -> bool {
    // The header is complete once brackets are balanced and the trailing
    // colon is present (masked text, so strings cannot fake it).
    match matching_close(&sig.buffer) {
        Some(close) => sig.buffer[close..].contains(':'),
        None => false,
    }
}

fn finish_signature(
    fact: &mut SourceFact,
    sig: PendingSignature,
    pending_doc: &mut Option<PendingDocstring>,
) {
    let annotated = signature_fully_annotated(&sig.buffer);
    let public = !sig.name.starts_with('_');
    fact.functions.push(FunctionSig {
        name: sig.name,
        line: sig.line,
        public,
        annotated,
        has_docstring: false,
    });

    let index = fact.functions.len() - 1;

    // One-line bodies (`def f() -> int: return 1`) resolve immediately.
    let body = one_line_body(&sig.buffer);
    match body {
        Some(body) if !body.trim().is_empty() => {
            // Masked text: any non-blank body here is code, not a docstring.
            fact.functions[index].has_docstring = false;
        }
        _ => {
            *pending_doc = Some(PendingDocstring { index });
        }
    }
}

/// Text after the header's closing `:`, if the header holds a body too.
fn one_line_body(buffer: &str) -> Option<&str> {
    let close = matching_close(buffer)?;
    let colon = buffer[close..].find(':')? + close;
    Some(&buffer[colon + 1..])
}

fn signature_fully_annotated(buffer: &str) -> bool {
    let open = match buffer.find('(') {
        Some(i) => i,
        None => return false,
    };
    let close = match matching_close(buffer) {
        Some(i) if i > open => i,
        _ => return false,
    };

    let tail_end = buffer[close..]
        .find(':')
        .map(|c| close + c)
        .unwrap_or(buffer.len());
    if !buffer[close..tail_end].contains("->") {
        return false;
    }

    for (pos, param) in split_top_level(&buffer[open + 1..close]).iter().enumerate() {
        let p = param.trim();
        if p.is_empty() || p == "*" || p == "/" {
            continue;
        }
        let bare = p.trim_start_matches('*').trim();
        if pos == 0 && (bare == "self" || bare == "cls") {
            continue;
        }
        if !p.contains(':') {
            return false;
        }
    }

    true
}

/// Splits on commas outside nested brackets. Strings are already masked.
fn split_top_level(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0;

    for c in s.chars() {
        match c {
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

/// Extracts dependency pin facts from a `requirements*.txt` file.
pub fn extract_requirements_facts(path: &str, text: &str) -> SourceFact {
    let mut fact = SourceFact::empty(path, FileCategory::Config);

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty()
            || line.starts_with('#')
            || line.starts_with('-')
            || line.contains("://")
        {
            continue;
        }

        let name: String = line
            .chars()
            .take_while(|c| !matches!(c, '=' | '<' | '>' | '!' | '~' | '[' | ' ' | ';'))
            .collect();
        if name.is_empty() {
            continue;
        }

        fact.deps.push(DepDecl {
            name,
            line: Some((idx + 1) as u32),
            pinned: line.contains("=="),
        });
    }

    fact
}

/// Extracts dependency pin facts from a `pyproject.toml` file.
///
/// A manifest that fails to parse yields a fact with `manifest_error` set;
/// the deps rule reports it as a recovered evaluation failure.
pub fn extract_pyproject_facts(path: &str, text: &str) -> SourceFact {
    let mut fact = SourceFact::empty(path, FileCategory::Config);

    let value: toml::Value = match toml::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            fact.manifest_error = Some(e.to_string());
            return fact;
        }
    };

    let Some(project) = value.get("project") else {
        return fact;
    };

    if let Some(deps) = project.get("dependencies").and_then(|d| d.as_array()) {
        collect_pyproject_deps(deps, &mut fact);
    }
    if let Some(groups) = project
        .get("optional-dependencies")
        .and_then(|g| g.as_table())
    {
        for deps in groups.values() {
            if let Some(deps) = deps.as_array() {
                collect_pyproject_deps(deps, &mut fact);
            }
        }
    }

    fact
}

fn collect_pyproject_deps(deps: &[toml::Value], fact: &mut SourceFact) {
    for dep in deps {
        let Some(spec) = dep.as_str() else { continue };
        let name: String = spec
            .trim()
            .chars()
            .take_while(|c| !matches!(c, '=' | '<' | '>' | '!' | '~' | '[' | ' ' | ';'))
            .collect();
        if name.is_empty() {
            continue;
        }
        fact.deps.push(DepDecl {
            name,
            line: None,
            pinned: spec.contains("=="),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_fact(text: &str) -> SourceFact {
        extract_python_facts("src/app.py", FileCategory::Module, text)
    }

    #[test]
    fn annotated_function_with_docstring() {
        let fact = module_fact(
            "def load(path: str) -> dict:\n    \"\"\"Load config.\"\"\"\n    return {}\n",
        );
        assert_eq!(fact.functions.len(), 1);
        let f = &fact.functions[0];
        assert_eq!(f.name, "load");
        assert_eq!(f.line, 1);
        assert!(f.public);
        assert!(f.annotated);
        assert!(f.has_docstring);
    }

    #[test]
    fn unannotated_params_or_missing_return_fail_annotation() {
        let fact = module_fact("def a(x) -> int:\n    return x\n");
        assert!(!fact.functions[0].annotated);

        let fact = module_fact("def b(x: int):\n    return x\n");
        assert!(!fact.functions[0].annotated);
    }

    #[test]
    fn self_and_star_markers_are_exempt_from_annotation() {
        let fact = module_fact(
            "def m(self, x: int, *, y: str = \"a\") -> None:\n    \"\"\"Doc.\"\"\"\n",
        );
        assert!(fact.functions[0].annotated);
    }

    #[test]
    fn multiline_signature_is_joined_before_parsing() {
        let fact = module_fact(
            "def pack(\n    a: int,\n    b: dict[str, int],\n) -> bytes:\n    \"\"\"Doc.\"\"\"\n",
        );
        assert_eq!(fact.functions.len(), 1);
        assert!(fact.functions[0].annotated);
        assert!(fact.functions[0].has_docstring);
        assert_eq!(fact.functions[0].line, 1);
    }

    #[test]
    fn private_functions_are_not_public() {
        let fact = module_fact("def _helper() -> None:\n    pass\n");
        assert!(!fact.functions[0].public);
        assert!(!fact.functions[0].has_docstring);
    }

    #[test]
    fn docstring_check_skips_blank_and_comment_lines() {
        let fact = module_fact("def f() -> None:\n\n    # setup\n    \"\"\"Doc.\"\"\"\n");
        assert!(fact.functions[0].has_docstring);
    }

    #[test]
    fn one_line_body_has_no_docstring() {
        let fact = module_fact("def f() -> int: return 1\n");
        assert!(!fact.functions[0].has_docstring);
    }

    #[test]
    fn bare_and_typed_except_are_distinguished() {
        let fact = module_fact(
            "try:\n    go()\nexcept ValueError:\n    pass\nexcept:\n    pass\n",
        );
        assert_eq!(fact.handlers.len(), 2);
        assert!(!fact.handlers[0].bare);
        assert_eq!(fact.handlers[0].line, 3);
        assert!(fact.handlers[1].bare);
        assert_eq!(fact.handlers[1].line, 5);
    }

    #[test]
    fn print_calls_are_recorded_outside_strings_and_comments() {
        let fact = module_fact(
            "print(\"hi\")\n# print(no)\nmsg = \"print(nope)\"\nlogger.print_state()\nsys.stdout.write(msg)\n",
        );
        let callees: Vec<(&str, u32)> = fact
            .console_calls
            .iter()
            .map(|c| (c.callee.as_str(), c.line))
            .collect();
        assert_eq!(callees, vec![("print", 1), ("sys.stdout.write", 5)]);
    }

    #[test]
    fn triple_quoted_blocks_mask_code_lookalikes() {
        let fact = module_fact(
            "DOC = \"\"\"\nprint(\"inside\")\nexcept:\n\"\"\"\nprint(\"outside\")\n",
        );
        assert_eq!(fact.console_calls.len(), 1);
        assert_eq!(fact.console_calls[0].line, 5);
        assert!(fact.handlers.is_empty());
    }

    #[test]
    fn requirements_lines_classify_pins() {
        let fact = extract_requirements_facts(
            "requirements.txt",
            "# deps\nrequests==2.31.0\nflask>=2.0\n-r base.txt\nhttps://example.com/pkg.whl\npydantic[email]==2.5.0\n",
        );
        let deps: Vec<(&str, bool)> = fact
            .deps
            .iter()
            .map(|d| (d.name.as_str(), d.pinned))
            .collect();
        assert_eq!(
            deps,
            vec![("requests", true), ("flask", false), ("pydantic", true)]
        );
        assert_eq!(fact.deps[0].line, Some(2));
    }

    #[test]
    fn pyproject_dependency_tables_are_collected() {
        let fact = extract_pyproject_facts(
            "pyproject.toml",
            r#"
            [project]
            name = "demo"
            dependencies = ["httpx==0.27.0", "rich>=13"]

            [project.optional-dependencies]
            dev = ["pytest==8.0.0"]
            "#,
        );
        let deps: Vec<(&str, bool)> = fact
            .deps
            .iter()
            .map(|d| (d.name.as_str(), d.pinned))
            .collect();
        assert_eq!(
            deps,
            vec![("httpx", true), ("rich", false), ("pytest", true)]
        );
        assert!(fact.manifest_error.is_none());
    }

    #[test]
    fn malformed_pyproject_sets_manifest_error() {
        let fact = extract_pyproject_facts("pyproject.toml", "[project\nname = oops");
        assert!(fact.manifest_error.is_some());
        assert!(fact.deps.is_empty());
    }
}
