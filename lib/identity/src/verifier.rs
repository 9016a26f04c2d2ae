//! Gate applied to an external profile before any directory access.

use crate::profile::ExternalProfile;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a profile was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// The profile belongs to a different organization than the one logins
    /// are restricted to.
    WrongOrganization {
        expected: String,
        actual: Option<String>,
    },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongOrganization { .. } => write!(f, "wrong organization"),
        }
    }
}

/// Outcome of [`verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

impl Verdict {
    /// Returns true if the profile may proceed to reconciliation.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Checks a profile against an optional organization restriction.
///
/// A profile without an organization never satisfies a restriction.
#[must_use]
pub fn verify(profile: &ExternalProfile, required_organization: Option<&str>) -> Verdict {
    match required_organization {
        Some(expected) if profile.organization_id() != Some(expected) => {
            Verdict::Reject(RejectReason::WrongOrganization {
                expected: expected.to_string(),
                actual: profile.organization_id().map(str::to_string),
            })
        }
        _ => Verdict::Accept,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(org: Option<&str>) -> ExternalProfile {
        ExternalProfile::new("U1", "alice").with_organization(org.map(str::to_string))
    }

    #[test]
    fn accepts_without_restriction() {
        assert!(verify(&profile(None), None).is_accepted());
        assert!(verify(&profile(Some("T1")), None).is_accepted());
    }

    #[test]
    fn accepts_matching_organization() {
        assert_eq!(verify(&profile(Some("T1")), Some("T1")), Verdict::Accept);
    }

    #[test]
    fn rejects_other_organization() {
        let verdict = verify(&profile(Some("T2")), Some("T1"));
        assert_eq!(
            verdict,
            Verdict::Reject(RejectReason::WrongOrganization {
                expected: "T1".to_string(),
                actual: Some("T2".to_string()),
            })
        );
    }

    #[test]
    fn rejects_missing_organization() {
        let verdict = verify(&profile(None), Some("T1"));
        assert!(!verdict.is_accepted());
    }

    #[test]
    fn verdict_is_stable_across_calls() {
        let p = profile(Some("T2"));
        assert_eq!(verify(&p, Some("T1")), verify(&p, Some("T1")));
    }

    #[test]
    fn reason_display() {
        let reason = RejectReason::WrongOrganization {
            expected: "T1".to_string(),
            actual: None,
        };
        assert_eq!(reason.to_string(), "wrong organization");
    }
}
