// ABOUTME: Chooses between canary rollout and direct start for one service.
// ABOUTME: Combines the configured preference with canary eligibility.

use serde::Serialize;

use crate::stack::StrategyPreference;

/// Direct-start reason when the service has never run.
pub const REASON_FIRST_DEPLOY: &str = "no running primary (first deploy)";

/// How a service gets onto its new version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStrategy {
    /// Start a health-gated canary next to the primary, then promote.
    Canary,
    /// Recreate the primary directly, accepting a brief gap.
    Direct,
}

/// Facts that decide whether a canary is possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eligibility {
    /// The primary container is currently running.
    pub primary_running: bool,
    /// This pass only builds images and starts nothing.
    pub build_only: bool,
    /// Every sibling descriptor of the stack is known.
    pub siblings_available: bool,
}

impl Eligibility {
    /// All conditions for a canary hold.
    pub fn canary_eligible(&self) -> bool {
        self.primary_running && !self.build_only && self.siblings_available
    }

    /// First condition ruling out a canary, if any.
    fn blocker(&self) -> Option<&'static str> {
        if self.build_only {
            Some("build-only pass")
        } else if !self.siblings_available {
            Some("sibling services unknown")
        } else if !self.primary_running {
            Some(REASON_FIRST_DEPLOY)
        } else {
            None
        }
    }
}

impl DeployStrategy {
    /// Pick the strategy for a deploy.
    /// Returns the strategy and, for direct starts, the reason a canary was not used.
    ///
    /// Priority:
    /// 1. `recreate` always starts directly
    /// 2. `rollout` forces a canary, needing only siblings and a start phase
    /// 3. `auto` uses a canary exactly when eligible
    pub fn select(
        preference: StrategyPreference,
        eligibility: &Eligibility,
    ) -> (Self, Option<&'static str>) {
        match preference {
            StrategyPreference::Recreate => (DeployStrategy::Direct, Some("recreate strategy configured")),
            StrategyPreference::Rollout => {
                let forced = Eligibility {
                    primary_running: true,
                    ..*eligibility
                };
                match forced.blocker() {
                    None => (DeployStrategy::Canary, None),
                    Some(reason) => (DeployStrategy::Direct, Some(reason)),
                }
            }
            StrategyPreference::Auto => match eligibility.blocker() {
                None => (DeployStrategy::Canary, None),
                Some(reason) => (DeployStrategy::Direct, Some(reason)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eligibility(primary_running: bool, build_only: bool, siblings_available: bool) -> Eligibility {
        Eligibility {
            primary_running,
            build_only,
            siblings_available,
        }
    }

    #[test]
    fn eligible_only_when_all_conditions_hold() {
        for primary in [false, true] {
            for build_only in [false, true] {
                for siblings in [false, true] {
                    let e = eligibility(primary, build_only, siblings);
                    assert_eq!(e.canary_eligible(), primary && !build_only && siblings);
                }
            }
        }
    }

    #[test]
    fn auto_follows_eligibility() {
        let (strategy, reason) =
            DeployStrategy::select(StrategyPreference::Auto, &eligibility(true, false, true));
        assert_eq!(strategy, DeployStrategy::Canary);
        assert!(reason.is_none());

        let (strategy, reason) =
            DeployStrategy::select(StrategyPreference::Auto, &eligibility(false, false, true));
        assert_eq!(strategy, DeployStrategy::Direct);
        assert!(reason.unwrap().contains("first deploy"));
    }

    #[test]
    fn explicit_recreate_overrides_eligibility() {
        let (strategy, _) =
            DeployStrategy::select(StrategyPreference::Recreate, &eligibility(true, false, true));
        assert_eq!(strategy, DeployStrategy::Direct);
    }

    #[test]
    fn explicit_rollout_overrides_missing_primary() {
        let (strategy, reason) =
            DeployStrategy::select(StrategyPreference::Rollout, &eligibility(false, false, true));
        assert_eq!(strategy, DeployStrategy::Canary);
        assert!(reason.is_none());
    }

    #[test]
    fn explicit_rollout_still_needs_siblings() {
        let (strategy, reason) =
            DeployStrategy::select(StrategyPreference::Rollout, &eligibility(true, false, false));
        assert_eq!(strategy, DeployStrategy::Direct);
        assert_eq!(reason, Some("sibling services unknown"));
    }
}
