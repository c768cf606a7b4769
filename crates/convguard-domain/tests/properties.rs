//! Property-based tests for convguard-domain.

use proptest::prelude::*;

use convguard_domain::facts::{ConsoleCall, FunctionSig, SourceFact};
use convguard_domain::{compile_ruleset, evaluate_facts, CompiledRule};
use convguard_types::{built_in_rules, FileCategory, RULE_DOCSTRINGS};

fn default_rules() -> Vec<CompiledRule> {
    compile_ruleset(&[]).expect("built-in catalog compiles")
}

/// Strategy for relative module paths under src/.
fn module_path_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("src/[a-z][a-z0-9_]{0,15}\\.py").expect("valid regex")
}

fn function_strategy() -> impl Strategy<Value = FunctionSig> {
    (
        prop::string::string_regex("_{0,1}[a-z][a-z0-9_]{0,12}").expect("valid regex"),
        1u32..500,
        prop::bool::ANY,
        prop::bool::ANY,
    )
        .prop_map(|(name, line, annotated, has_docstring)| {
            let public = !name.starts_with('_');
            FunctionSig {
                name,
                line,
                public,
                annotated,
                has_docstring,
            }
        })
}

fn console_call_strategy() -> impl Strategy<Value = ConsoleCall> {
    (1u32..500, prop::sample::select(vec!["print", "sys.stdout.write"])).prop_map(|(line, callee)| {
        ConsoleCall {
            line,
            callee: callee.to_string(),
        }
    })
}

fn fact_strategy() -> impl Strategy<Value = SourceFact> {
    (
        module_path_strategy(),
        prop::collection::vec(function_strategy(), 0..6),
        prop::collection::vec(console_call_strategy(), 0..4),
    )
        .prop_map(|(path, functions, console_calls)| {
            let mut fact = SourceFact::empty(path, FileCategory::Module);
            fact.functions = functions;
            fact.console_calls = console_calls;
            fact
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Evaluating the same facts twice must produce identical output, which
    // is what makes report bytes reproducible run-to-run.
    #[test]
    fn property_evaluation_is_deterministic(
        facts in prop::collection::vec(fact_strategy(), 0..8),
    ) {
        let rules = default_rules();
        let a = evaluate_facts(&facts, &rules, 1000);
        let b = evaluate_facts(&facts, &rules, 1000);
        prop_assert_eq!(a, b);
    }

    // Input order of facts must not affect output order. Paths are
    // deduplicated first: the scanner never yields the same path twice.
    #[test]
    fn property_fact_order_is_irrelevant(
        raw in prop::collection::vec(fact_strategy(), 0..8),
    ) {
        let mut facts = raw;
        let mut seen = std::collections::HashSet::new();
        facts.retain(|f| seen.insert(f.path.clone()));

        let rules = default_rules();
        let forward = evaluate_facts(&facts, &rules, 1000);
        let mut reversed = facts;
        reversed.reverse();
        let backward = evaluate_facts(&reversed, &rules, 1000);
        prop_assert_eq!(forward, backward);
    }

    // Exactly one docstring finding per public function without one.
    #[test]
    fn property_one_finding_per_undocumented_public_function(
        fact in fact_strategy(),
    ) {
        let expected = fact
            .functions
            .iter()
            .filter(|f| f.public && !f.has_docstring)
            .count();
        let eval = evaluate_facts(std::slice::from_ref(&fact), &default_rules(), 10_000);
        let actual = eval
            .findings
            .iter()
            .filter(|f| f.rule_id == RULE_DOCSTRINGS)
            .count();
        prop_assert_eq!(actual, expected);
    }

    // Findings come out grouped by rule in catalog order, and within a
    // rule sorted by path then line.
    #[test]
    fn property_findings_are_rule_major_path_line_ordered(
        facts in prop::collection::vec(fact_strategy(), 0..8),
    ) {
        let rules = default_rules();
        let eval = evaluate_facts(&facts, &rules, 10_000);

        let rank = |id: &str| rules.iter().position(|r| r.id == id).expect("known rule");
        for pair in eval.findings.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let ka = (rank(&a.rule_id), a.path.as_str(), a.line.unwrap_or(0));
            let kb = (rank(&b.rule_id), b.path.as_str(), b.line.unwrap_or(0));
            prop_assert!(ka <= kb, "out of order: {:?} > {:?}", ka, kb);
        }
    }

    // The cap bounds the stored findings while counts stay exact.
    #[test]
    fn property_cap_respected_and_counts_exact(
        facts in prop::collection::vec(fact_strategy(), 0..8),
        max_findings in 0usize..10,
    ) {
        let eval = evaluate_facts(&facts, &default_rules(), max_findings);

        prop_assert!(eval.findings.len() <= max_findings);
        prop_assert_eq!(
            eval.findings.len() as u32 + eval.truncated,
            eval.total,
        );
        let per_rule_total: u32 = eval.per_rule.iter().map(|c| c.count).sum();
        prop_assert_eq!(per_rule_total, eval.total);
    }

    // Every finding references a rule in the compiled catalog.
    #[test]
    fn property_every_finding_references_a_known_rule(
        facts in prop::collection::vec(fact_strategy(), 0..8),
    ) {
        let rules = default_rules();
        let eval = evaluate_facts(&facts, &rules, 10_000);
        for finding in &eval.findings {
            prop_assert!(rules.iter().any(|r| r.id == finding.rule_id));
        }
    }
}

// The built-in catalog must always compile, with every override-free
// rule present and enabled.
#[test]
fn builtin_catalog_compiles_with_all_rules_enabled() {
    let rules = default_rules();
    assert_eq!(rules.len(), built_in_rules().len());
    assert!(rules.iter().all(|r| r.enabled));
}
