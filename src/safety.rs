//! Pure safety predicate over a microstructure Snapshot.

use crate::microstructure::Snapshot;

/// Outcome of evaluating the safety gate.
pub struct SafetyVerdict {
    pub passed: bool,
    pub reason: Option<&'static str>,
    pub satisfied_rules: Vec<&'static str>,
}

/// Evaluate `buyers<4`, `sameFunderRatio>0.70`, `depthEst<0.15`, in that order.
pub fn evaluate(snapshot: &Snapshot) -> SafetyVerdict {
    if snapshot.buyers < 4 {
        return SafetyVerdict { passed: false, reason: Some("buyers<4"), satisfied_rules: vec![] };
    }
    if snapshot.same_funder_ratio > 0.70 {
        return SafetyVerdict { passed: false, reason: Some("sameFunderRatio>0.70"), satisfied_rules: vec![] };
    }
    if snapshot.depth_est < 0.15 {
        return SafetyVerdict { passed: false, reason: Some("depthEst<0.15"), satisfied_rules: vec![] };
    }
    SafetyVerdict {
        passed: true,
        reason: None,
        satisfied_rules: vec!["buyers>=4", "sameFunderRatio<=0.70", "depthEst>=0.15"],
    }
}

/// Sticky-fatal threshold, checked separately by `EntryEngine` before the soft gate.
pub fn is_fatal(snapshot: &Snapshot) -> bool {
    snapshot.same_funder_ratio > 0.75
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(buyers: usize, same_funder_ratio: f64, depth_est: f64) -> Snapshot {
        Snapshot { buyers, unique_funders: buyers, same_funder_ratio, price_jumps: 0, depth_est, last_ts: 0 }
    }

    #[test]
    fn buyers_boundary() {
        assert!(!evaluate(&snap(3, 0.0, 1.0)).passed);
        assert!(evaluate(&snap(4, 0.0, 1.0)).passed);
    }

    #[test]
    fn same_funder_ratio_boundary() {
        assert!(evaluate(&snap(4, 0.70, 1.0)).passed);
        assert!(!evaluate(&snap(4, 0.71, 1.0)).passed);
    }

    #[test]
    fn depth_est_boundary() {
        assert!(evaluate(&snap(4, 0.0, 0.15)).passed);
        assert!(!evaluate(&snap(4, 0.0, 0.149)).passed);
    }

    #[test]
    fn fatal_threshold() {
        assert!(!is_fatal(&snap(4, 0.75, 1.0)));
        assert!(is_fatal(&snap(4, 0.76, 1.0)));
    }

    #[test]
    fn reports_satisfied_rules_on_pass() {
        let verdict = evaluate(&snap(10, 0.2, 0.5));
        assert!(verdict.passed);
        assert_eq!(verdict.satisfied_rules.len(), 3);
    }
}
