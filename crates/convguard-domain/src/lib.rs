//! Pure convention-checking domain: source facts, the compiled rule
//! catalog, and the rule-major evaluator.
//!
//! Nothing in this crate touches the filesystem or the process
//! environment. Callers hand in extracted [`facts::SourceFact`]s and a
//! compiled rule set, and get back an ordered list of findings. That
//! keeps every policy decision unit-testable without temp directories.

pub mod evaluate;
pub mod facts;
pub mod rules;

pub use evaluate::{evaluate_facts, Evaluation, PredicateError};
pub use facts::{
    extract_pyproject_facts, extract_python_facts, extract_requirements_facts, ConsoleCall,
    DepDecl, ExceptionHandler, FunctionSig, SourceFact,
};
pub use rules::{compile_ruleset, CompiledRule, ConfigError};
