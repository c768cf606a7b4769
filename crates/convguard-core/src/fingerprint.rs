use convguard_types::Finding;
use sha2::{Digest, Sha256};

/// Stable identity for a finding, derived from rule, path and line.
/// 16 hex chars keeps it short enough for suppression lists while
/// staying collision-safe at any plausible finding volume.
pub fn compute_fingerprint(finding: &Finding) -> String {
    let mut hasher = Sha256::new();
    hasher.update(finding.rule_id.as_bytes());
    hasher.update(b":");
    hasher.update(finding.path.as_bytes());
    hasher.update(b":");
    if let Some(line) = finding.line {
        hasher.update(line.to_string().as_bytes());
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}
