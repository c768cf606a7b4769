//! Check orchestration for convguard: filesystem scanning, the end-to-end
//! check pipeline, report rendering and finding fingerprints.

pub mod check;
pub mod fingerprint;
pub mod render;
pub mod scan;

pub use check::{run_check, CheckPlan, CheckRun, PathFilterError, DEFAULT_MAX_FINDINGS};
pub use fingerprint::compute_fingerprint;
pub use render::{render_annotations, render_markdown};
pub use scan::{scan_tree, ScanError, ScanOutcome};
