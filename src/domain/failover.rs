//! Failover Decision Table - Per-Pair Health and Alert Rules
//!
//! Pure function of one node pair's probe results and its previous
//! state. It never talks to the pool: when a rule needs a promotion
//! or demotion it returns `Verdict::Swap` carrying both possible
//! outcomes, and the caller picks one after attempting the swap.
//!
//! Rules (first match wins). Only slot errors count in rules 2 to 7;
//! pair-level errors never disqualify a slot.
//! 1. no connected client → both slots unavailable
//! 2. no slot errors, ACTIVE connected → healthy, latches cleared
//! 3. no slot errors, PASSIVE connected → promote back to ACTIVE when
//!    it is in the pool, latches cleared either way
//! 4. both slots failed → fully down
//! 5. ACTIVE failed while serving → fail over to PASSIVE
//! 6. PASSIVE failed while serving → fail over to ACTIVE
//! 7. PASSIVE failed, ACTIVE serving → standby lost
//! 8. anything else → health unchanged, latches cleared

use serde::{Deserialize, Serialize};

use super::node::{MailFlags, NodeError, NodeHealth, NodeMode, NodePairHealth, NodeType, PairHealth};

/// Severity of an alert line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertLevel {
    Info,
    Warn,
    Alert,
}

/// One line of operator mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
}

impl Alert {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Info,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Warn,
            message: message.into(),
        }
    }

    pub fn alert(message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Alert,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            AlertLevel::Info => "OK.",
            AlertLevel::Warn => "WARN.",
            AlertLevel::Alert => "ALERT!",
        };
        write!(f, "{prefix} {}", self.message)
    }
}

/// Failure conditions that alert at most once until resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Latch {
    BothNodesDown,
    ActiveDownPassiveNotConfigured,
    PassiveDownActiveNotConfigured,
    PassiveDownActiveRemainsUp,
}

impl MailFlags {
    pub const fn is_set(&self, latch: Latch) -> bool {
        match latch {
            Latch::BothNodesDown => self.both_nodes_down,
            Latch::ActiveDownPassiveNotConfigured => self.active_down_passive_not_configured,
            Latch::PassiveDownActiveNotConfigured => self.passive_down_active_not_configured,
            Latch::PassiveDownActiveRemainsUp => self.passive_down_active_remains_up,
        }
    }

    pub fn set(&mut self, latch: Latch) {
        match latch {
            Latch::BothNodesDown => self.both_nodes_down = true,
            Latch::ActiveDownPassiveNotConfigured => self.active_down_passive_not_configured = true,
            Latch::PassiveDownActiveNotConfigured => self.passive_down_active_not_configured = true,
            Latch::PassiveDownActiveRemainsUp => self.passive_down_active_remains_up = true,
        }
    }
}

/// What the pool reported about one node pair this tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairProbe {
    /// Mode of the client currently serving traffic.
    pub connected: Option<NodeMode>,
    pub active_configured: bool,
    pub passive_configured: bool,
    /// All errors of this node type, including pair-level ones.
    pub errors: Vec<NodeError>,
}

impl PairProbe {
    /// First error reported for the given slot.
    pub fn error_for(&self, mode: NodeMode) -> Option<&NodeError> {
        self.errors.iter().find(|e| e.mode == Some(mode))
    }
}

/// Resulting pair state plus the mail line to queue, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub pair: NodePairHealth,
    pub alert: Option<Alert>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No pool action needed.
    Settled(Outcome),
    /// Swap the pair to `target`, then apply the matching branch.
    Swap {
        target: NodeMode,
        on_success: Outcome,
        on_failure: Outcome,
    },
}

impl Verdict {
    /// Resolve a swap verdict with its result; settled verdicts pass through.
    pub fn resolve(self, swapped: bool) -> Outcome {
        match self {
            Self::Settled(outcome) => outcome,
            Self::Swap {
                on_success,
                on_failure,
                ..
            } => {
                if swapped {
                    on_success
                } else {
                    on_failure
                }
            }
        }
    }
}

/// Apply the decision table to one node pair.
pub fn evaluate(node_type: NodeType, probe: &PairProbe, previous: &NodePairHealth) -> Verdict {
    let mails = previous.mails;

    let Some(connected) = probe.connected else {
        return settled(
            mails,
            NodeHealth::unavailable(probe.active_configured),
            NodeHealth::unavailable(probe.passive_configured),
            None,
        );
    };

    let active_error = probe.error_for(NodeMode::Active).cloned();
    let passive_error = probe.error_for(NodeMode::Passive).cloned();

    if active_error.is_none() && passive_error.is_none() {
        let recovered = |serving: NodeMode| {
            mails.any().then(|| {
                Alert::info(format!("Node '{node_type}' recovered, {serving} is up and running again."))
            })
        };

        return match connected {
            NodeMode::Active => settled(
                MailFlags::default(),
                NodeHealth::up(),
                NodeHealth::standby(probe.passive_configured),
                recovered(NodeMode::Active),
            ),
            NodeMode::Passive if !probe.active_configured => settled(
                MailFlags::default(),
                NodeHealth::unavailable(false),
                NodeHealth::up(),
                recovered(NodeMode::Passive),
            ),
            NodeMode::Passive => Verdict::Swap {
                target: NodeMode::Active,
                on_success: outcome(
                    MailFlags::default(),
                    NodeHealth::up(),
                    NodeHealth::up(),
                    Some(Alert::info(format!(
                        "Node '{node_type}' switched back to Active, Passive remains up."
                    ))),
                ),
                on_failure: outcome(
                    MailFlags::default(),
                    NodeHealth::unavailable(true),
                    NodeHealth::up(),
                    recovered(NodeMode::Passive),
                ),
            },
        };
    }

    match (active_error, passive_error, connected) {
        (Some(active), Some(passive), _) => {
            let (mails, alert) = latch(
                mails,
                Latch::BothNodesDown,
                Alert::alert(format!("Node '{node_type}' is fully down, both Active and Passive.")),
            );
            settled(mails, NodeHealth::down(active), NodeHealth::down(passive), alert)
        }
        (Some(active), None, NodeMode::Active) => {
            let (failed_mails, alert) = latch(
                mails,
                Latch::ActiveDownPassiveNotConfigured,
                Alert::alert(format!(
                    "Node '{node_type}' is fully down. Active is down, Passive is not available in the node pool."
                )),
            );
            Verdict::Swap {
                target: NodeMode::Passive,
                on_success: outcome(
                    mails,
                    NodeHealth::down(active.clone()),
                    NodeHealth::up(),
                    Some(Alert::warn(format!(
                        "Node '{node_type}' switched to Passive, Active is down."
                    ))),
                ),
                on_failure: outcome(
                    failed_mails,
                    NodeHealth::down(active),
                    NodeHealth::unavailable(probe.passive_configured),
                    alert,
                ),
            }
        }
        (_, Some(passive), NodeMode::Passive) => {
            let (failed_mails, alert) = latch(
                mails,
                Latch::PassiveDownActiveNotConfigured,
                Alert::alert(format!(
                    "Node '{node_type}' is fully down. Passive is down, Active is not available in the node pool."
                )),
            );
            Verdict::Swap {
                target: NodeMode::Active,
                on_success: outcome(
                    mails,
                    NodeHealth::up(),
                    NodeHealth::down(passive.clone()),
                    Some(Alert::warn(format!(
                        "Node '{node_type}' switched to Active, Passive is down."
                    ))),
                ),
                on_failure: outcome(
                    failed_mails,
                    NodeHealth::unavailable(probe.active_configured),
                    NodeHealth::down(passive),
                    alert,
                ),
            }
        }
        (None, Some(passive), NodeMode::Active) => {
            let (mails, alert) = latch(
                mails,
                Latch::PassiveDownActiveRemainsUp,
                Alert::warn(format!("Node '{node_type}' Passive is down. Active remains up.")),
            );
            settled(mails, NodeHealth::up(), NodeHealth::down(passive), alert)
        }
        _ => Verdict::Settled(Outcome {
            pair: NodePairHealth {
                mails: MailFlags::default(),
                health: previous.health.clone(),
            },
            alert: None,
        }),
    }
}

/// Set `latch`, returning `alert` only if it was not set before.
fn latch(mut mails: MailFlags, latch: Latch, alert: Alert) -> (MailFlags, Option<Alert>) {
    let already = mails.is_set(latch);
    mails.set(latch);
    (mails, (!already).then_some(alert))
}

fn outcome(mails: MailFlags, active: NodeHealth, passive: NodeHealth, alert: Option<Alert>) -> Outcome {
    Outcome {
        pair: NodePairHealth {
            mails,
            health: PairHealth { active, passive },
        },
        alert,
    }
}

fn settled(mails: MailFlags, active: NodeHealth, passive: NodeHealth, alert: Option<Alert>) -> Verdict {
    Verdict::Settled(outcome(mails, active, passive, alert))
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: NodeType = NodeType::Dex;

    fn observed(connected: Option<NodeMode>, active_err: bool, passive_err: bool) -> PairProbe {
        let mut errors = Vec::new();
        if active_err {
            errors.push(NodeError::new(T, Some(NodeMode::Active), "active unreachable"));
        }
        if passive_err {
            errors.push(NodeError::new(T, Some(NodeMode::Passive), "passive unreachable"));
        }
        PairProbe {
            connected,
            active_configured: true,
            passive_configured: true,
            errors,
        }
    }

    fn text(outcome: &Outcome) -> String {
        outcome.alert.as_ref().map(ToString::to_string).unwrap_or_default()
    }

    #[test]
    fn test_no_connected_node_marks_both_unavailable() {
        for (a, p) in [(false, false), (true, false), (false, true), (true, true)] {
            let verdict = evaluate(T, &observed(None, a, p), &NodePairHealth::default());
            let Verdict::Settled(outcome) = verdict else {
                panic!("no swap without a connected node");
            };
            assert!(!outcome.pair.health.active.available);
            assert!(!outcome.pair.health.passive.available);
            assert!(outcome.alert.is_none());
        }
    }

    #[test]
    fn test_clean_active_is_healthy_and_silent() {
        let Verdict::Settled(outcome) = evaluate(T, &observed(Some(NodeMode::Active), false, false), &NodePairHealth::default())
        else {
            panic!("expected settled");
        };
        assert!(outcome.pair.health.active.available);
        assert!(outcome.pair.health.passive.available);
        assert!(outcome.alert.is_none());
    }

    #[test]
    fn test_clean_active_without_passive_client() {
        let mut p = observed(Some(NodeMode::Active), false, false);
        p.passive_configured = false;
        let outcome = evaluate(T, &p, &NodePairHealth::default()).resolve(false);
        assert!(!outcome.pair.health.passive.configured);
        assert!(!outcome.pair.health.passive.available);
    }

    #[test]
    fn test_clean_active_after_alert_sends_recovery_and_clears() {
        let previous = NodePairHealth {
            mails: MailFlags {
                passive_down_active_remains_up: true,
                ..MailFlags::default()
            },
            ..NodePairHealth::default()
        };
        let outcome = evaluate(T, &observed(Some(NodeMode::Active), false, false), &previous).resolve(false);
        assert!(!outcome.pair.mails.any());
        assert_eq!(outcome.alert.map(|a| a.level), Some(AlertLevel::Info));
    }

    #[test]
    fn test_clean_passive_promotes_back() {
        let verdict = evaluate(T, &observed(Some(NodeMode::Passive), false, false), &NodePairHealth::default());
        let Verdict::Swap {
            target,
            on_success,
            on_failure,
        } = verdict
        else {
            panic!("expected swap");
        };
        assert_eq!(target, NodeMode::Active);
        assert!(text(&on_success).contains("switched back to Active"));
        assert!(on_failure.alert.is_none());
        assert!(!on_failure.pair.health.active.available);
        assert!(on_failure.pair.health.passive.available);
    }

    #[test]
    fn test_both_down_alerts_once() {
        let first = evaluate(T, &observed(Some(NodeMode::Active), true, true), &NodePairHealth::default()).resolve(false);
        assert!(first.pair.mails.both_nodes_down);
        assert!(text(&first).starts_with("ALERT!"));
        assert_eq!(first.pair.health.active.errors.len(), 1);

        let second = evaluate(T, &observed(Some(NodeMode::Active), true, true), &first.pair).resolve(false);
        assert!(second.pair.mails.both_nodes_down);
        assert!(second.alert.is_none());
    }

    #[test]
    fn test_active_down_fails_over_to_passive() {
        let verdict = evaluate(T, &observed(Some(NodeMode::Active), true, false), &NodePairHealth::default());
        let Verdict::Swap {
            target,
            on_success,
            on_failure,
        } = verdict
        else {
            panic!("expected swap");
        };
        assert_eq!(target, NodeMode::Passive);
        assert!(!on_success.pair.health.active.available);
        assert!(on_success.pair.health.passive.available);
        assert_eq!(on_success.alert.as_ref().map(|a| a.level), Some(AlertLevel::Warn));
        assert!(text(&on_success).contains("switched to Passive"));

        assert!(on_failure.pair.mails.active_down_passive_not_configured);
        assert_eq!(on_failure.alert.as_ref().map(|a| a.level), Some(AlertLevel::Alert));
    }

    #[test]
    fn test_active_down_failed_swap_stays_latched() {
        let first = evaluate(T, &observed(Some(NodeMode::Active), true, false), &NodePairHealth::default()).resolve(false);
        let second = evaluate(T, &observed(Some(NodeMode::Active), true, false), &first.pair).resolve(false);
        assert!(second.alert.is_none());
        assert!(second.pair.mails.active_down_passive_not_configured);
    }

    #[test]
    fn test_passive_down_while_serving_fails_over_to_active() {
        let verdict = evaluate(T, &observed(Some(NodeMode::Passive), false, true), &NodePairHealth::default());
        let Verdict::Swap {
            target,
            on_success,
            on_failure,
        } = verdict
        else {
            panic!("expected swap");
        };
        assert_eq!(target, NodeMode::Active);
        assert!(text(&on_success).contains("switched to Active, Passive is down"));
        assert!(on_success.pair.health.active.available);
        assert!(on_failure.pair.mails.passive_down_active_not_configured);
        assert!(text(&on_failure).contains("Active is not available"));
    }

    #[test]
    fn test_passive_down_while_active_serves() {
        let outcome = evaluate(T, &observed(Some(NodeMode::Active), false, true), &NodePairHealth::default()).resolve(true);
        assert!(outcome.pair.health.active.available);
        assert!(!outcome.pair.health.passive.available);
        assert!(outcome.pair.mails.passive_down_active_remains_up);
        assert!(text(&outcome).contains("Active remains up"));
    }

    #[test]
    fn test_active_down_while_passive_serves_keeps_health() {
        let previous = NodePairHealth {
            mails: MailFlags {
                both_nodes_down: true,
                ..MailFlags::default()
            },
            health: PairHealth {
                active: NodeHealth::unavailable(true),
                passive: NodeHealth::up(),
            },
        };
        let outcome = evaluate(T, &observed(Some(NodeMode::Passive), true, false), &previous).resolve(false);
        assert_eq!(outcome.pair.health, previous.health);
        assert!(!outcome.pair.mails.any());
        assert!(outcome.alert.is_none());
    }

    #[test]
    fn test_pair_level_error_keeps_active_healthy() {
        let mut p = observed(Some(NodeMode::Active), false, false);
        p.errors.push(NodeError::new(T, None, "dex nodes not in sync"));
        let verdict = evaluate(T, &p, &NodePairHealth::default());
        let Verdict::Settled(outcome) = verdict else {
            panic!("expected settled");
        };
        assert!(outcome.alert.is_none());
        assert!(outcome.pair.health.active.available);
    }

    #[test]
    fn test_recovery_line_survives_pair_level_error() {
        // Passive down while Active serves, then only header drift, then clean.
        let down = evaluate(T, &observed(Some(NodeMode::Active), false, true), &NodePairHealth::default()).resolve(true);
        assert!(down.pair.mails.passive_down_active_remains_up);

        let mut drift = observed(Some(NodeMode::Active), false, false);
        drift.errors.push(NodeError::new(T, None, "dex nodes not in sync"));
        let drifting = evaluate(T, &drift, &down.pair).resolve(false);
        assert!(!drifting.pair.mails.any());
        assert_eq!(drifting.alert.as_ref().map(|a| a.level), Some(AlertLevel::Info));
        assert!(text(&drifting).contains("recovered, Active is up"));
        assert!(drifting.pair.health.passive.available);

        let clean = evaluate(T, &observed(Some(NodeMode::Active), false, false), &drifting.pair).resolve(false);
        assert!(clean.alert.is_none());
    }

    #[test]
    fn test_passive_only_pair_alerts_again_after_recovering() {
        let mut failing = observed(Some(NodeMode::Passive), false, true);
        failing.active_configured = false;
        let mut clean = observed(Some(NodeMode::Passive), false, false);
        clean.active_configured = false;

        let first = evaluate(T, &failing, &NodePairHealth::default()).resolve(false);
        assert!(first.pair.mails.passive_down_active_not_configured);
        assert_eq!(first.alert.as_ref().map(|a| a.level), Some(AlertLevel::Alert));

        let verdict = evaluate(T, &clean, &first.pair);
        let Verdict::Settled(recovered) = verdict else {
            panic!("no promotion without an Active client");
        };
        assert!(!recovered.pair.mails.any());
        assert!(text(&recovered).contains("recovered, Passive is up"));
        assert!(recovered.pair.health.passive.available);
        assert!(!recovered.pair.health.active.configured);

        let again = evaluate(T, &failing, &recovered.pair).resolve(false);
        assert!(again.pair.mails.passive_down_active_not_configured);
        assert_eq!(again.alert.as_ref().map(|a| a.level), Some(AlertLevel::Alert));
    }

    #[test]
    fn test_failed_promotion_clears_latches_with_recovery() {
        let previous = NodePairHealth {
            mails: MailFlags {
                passive_down_active_not_configured: true,
                ..MailFlags::default()
            },
            ..NodePairHealth::default()
        };
        let outcome = evaluate(T, &observed(Some(NodeMode::Passive), false, false), &previous).resolve(false);
        assert!(!outcome.pair.mails.any());
        assert!(text(&outcome).contains("recovered, Passive is up"));
        assert!(!outcome.pair.health.active.available);
        assert!(outcome.pair.health.passive.available);

        let retry = evaluate(T, &observed(Some(NodeMode::Passive), false, false), &outcome.pair).resolve(false);
        assert!(retry.alert.is_none());
    }
}
