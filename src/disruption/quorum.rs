//! Quorum consistency checks for the monitor disruption budget
//!
//! A monitor quorum of `n` keeps a simple majority as long as
//! `floor(n / 2) + 1` monitors stay up, so that is the minimum the monitor
//! budget may guarantee while still allowing the rest to be drained.

use tracing::{debug, warn};

use crate::domain::ports::{ClusterReference, DisruptionBudget};
use crate::error::{Error, Result};

/// Result of comparing a budget against the quorum size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    Valid,
    Invalid,
    /// Quorum size not known yet; no judgment is made
    Unknown,
}

impl Consistency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Consistency::Valid => "valid",
            Consistency::Invalid => "invalid",
            Consistency::Unknown => "unknown",
        }
    }
}

/// Majority threshold for a quorum, `None` while the size is unknown
pub fn threshold(quorum_size: u32) -> Option<u32> {
    if quorum_size == 0 {
        return None;
    }
    Some(quorum_size / 2 + 1)
}

/// Check whether `min_available` preserves a majority of `quorum_size`
pub fn is_consistent(quorum_size: u32, min_available: i32) -> Consistency {
    match threshold(quorum_size) {
        None => Consistency::Unknown,
        Some(expected) if i64::from(expected) == i64::from(min_available) => Consistency::Valid,
        Some(_) => Consistency::Invalid,
    }
}

/// Validates the well-known monitor budget against a cluster's quorum
#[derive(Debug, Clone)]
pub struct QuorumValidator {
    budget_name: String,
}

impl QuorumValidator {
    pub fn new(budget_name: impl Into<String>) -> Self {
        Self {
            budget_name: budget_name.into(),
        }
    }

    /// Name of the budget this validator is responsible for
    pub fn budget_name(&self) -> &str {
        &self.budget_name
    }

    /// Threshold the monitor budget must carry for this cluster, `None` while
    /// the quorum size is unknown. Fails when the threshold does not fit the
    /// budget's `minAvailable`.
    pub fn threshold(&self, cluster: &ClusterReference) -> Result<Option<i32>> {
        let Some(expected) = threshold(cluster.quorum_size) else {
            return Ok(None);
        };
        i32::try_from(expected).map(Some).map_err(|_| Error::InvalidResource {
            kind: "StorageCluster".into(),
            name: format!("{}/{}", cluster.namespace, cluster.name),
            reason: format!("monitor count {} exceeds the budget range", cluster.quorum_size),
        })
    }

    /// Validate a budget; `None` if the budget is not the monitor budget.
    pub fn validate(
        &self,
        cluster: &ClusterReference,
        budget: &DisruptionBudget,
    ) -> Option<Consistency> {
        if budget.name != self.budget_name {
            return None;
        }

        let outcome = is_consistent(cluster.quorum_size, budget.min_available);
        match outcome {
            Consistency::Valid => debug!(
                namespace = %budget.namespace,
                quorum_size = cluster.quorum_size,
                min_available = budget.min_available,
                "monitor budget consistent with quorum"
            ),
            Consistency::Invalid => warn!(
                namespace = %budget.namespace,
                quorum_size = cluster.quorum_size,
                min_available = budget.min_available,
                "monitor count not consistent with minAvailable in monitor budget"
            ),
            Consistency::Unknown => debug!(
                namespace = %budget.namespace,
                cluster = %cluster.name,
                "quorum size not yet known, skipping validation"
            ),
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn cluster(quorum_size: u32) -> ClusterReference {
        ClusterReference {
            namespace: "storage".into(),
            name: "storage".into(),
            quorum_size,
        }
    }

    fn budget(name: &str, min_available: i32) -> DisruptionBudget {
        DisruptionBudget {
            namespace: "storage".into(),
            name: name.into(),
            min_available,
            selector: BTreeMap::new(),
            resource_version: None,
        }
    }

    #[test]
    fn test_thresholds() {
        let expected: [(u32, i32); 7] = [(1, 1), (2, 2), (3, 2), (4, 3), (5, 3), (6, 4), (7, 4)];
        for (quorum, min) in expected {
            assert_eq!(threshold(quorum), u32::try_from(min).ok(), "quorum {}", quorum);
            assert_eq!(is_consistent(quorum, min), Consistency::Valid);
        }
    }

    #[test]
    fn test_zero_quorum_is_unknown() {
        assert_eq!(threshold(0), None);
        for min in [-1, 0, 1, 2, 100] {
            assert_eq!(is_consistent(0, min), Consistency::Unknown);
        }
    }

    #[test]
    fn test_mismatch_is_invalid() {
        assert_eq!(is_consistent(3, 1), Consistency::Invalid);
        assert_eq!(is_consistent(3, 3), Consistency::Invalid);
        assert_eq!(is_consistent(6, 3), Consistency::Invalid);
        assert_eq!(is_consistent(4, 3), Consistency::Valid);
    }

    #[test]
    fn test_huge_quorum_has_no_threshold_overflow() {
        assert_eq!(threshold(u32::MAX), Some(u32::MAX / 2 + 1));
        assert_eq!(is_consistent(u32::MAX - 1, i32::MAX), Consistency::Invalid);
        assert_eq!(is_consistent(u32::MAX, i32::MAX), Consistency::Invalid);
        assert_eq!(is_consistent(u32::MAX - 2, i32::MAX), Consistency::Valid);
    }

    #[test]
    fn test_validator_threshold_range() {
        let validator = QuorumValidator::new("mon-pdb");
        assert_eq!(validator.threshold(&cluster(0)).unwrap(), None);
        assert_eq!(validator.threshold(&cluster(5)).unwrap(), Some(3));
        assert_eq!(validator.threshold(&cluster(u32::MAX - 2)).unwrap(), Some(i32::MAX));

        let err = validator.threshold(&cluster(u32::MAX - 1)).unwrap_err();
        assert!(matches!(err, Error::InvalidResource { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_validator_ignores_other_budgets() {
        let validator = QuorumValidator::new("mon-pdb");
        assert_eq!(validator.validate(&cluster(6), &budget("test", 3)), None);
        assert_eq!(
            validator.validate(&cluster(6), &budget("mon-pdb", 3)),
            Some(Consistency::Invalid)
        );
        assert_eq!(
            validator.validate(&cluster(4), &budget("mon-pdb", 3)),
            Some(Consistency::Valid)
        );
        assert_eq!(
            validator.validate(&cluster(0), &budget("mon-pdb", 3)),
            Some(Consistency::Unknown)
        );
    }
}
