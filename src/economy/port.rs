//! Seams to the chat platform: event announcements, permission lookups and
//! yes/no confirmations.

use std::collections::BTreeSet;
use std::fmt;

use log::info;
use tokio::sync::oneshot;

use crate::logutil::escape_log;

/// Something players should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    CraftCompleted {
        character: String,
        item: String,
        outputs: Vec<(String, u32)>,
    },
    DisassembleCompleted {
        character: String,
        item: String,
        components: Vec<(String, u32)>,
    },
    ScavengeCompleted {
        character: String,
        group: Option<String>,
        found: Vec<String>,
    },
    LaborCompleted {
        character: String,
        project_id: u64,
        hours: u32,
        applied: bool,
    },
    TradeSettled {
        trade_id: String,
        proposer: String,
        acceptor: String,
    },
    TradeExpired {
        trade_id: String,
        character: String,
    },
    PhaseAdvanced {
        project_id: u64,
        project: String,
        phase: String,
    },
    ProjectCompleted {
        project_id: u64,
        project: String,
        reward: String,
    },
}

fn join_counts(items: &[(String, u32)]) -> String {
    items
        .iter()
        .map(|(item, qty)| format!("{} x{}", item, qty))
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for GameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameEvent::CraftCompleted { character, item, outputs } => {
                write!(f, "{} finished crafting {} ({})", character, item, join_counts(outputs))
            }
            GameEvent::DisassembleCompleted { character, item, components } => {
                write!(f, "{} took apart {} ({})", character, item, join_counts(components))
            }
            GameEvent::ScavengeCompleted { character, found, .. } if found.is_empty() => {
                write!(f, "{} scavenged but found nothing", character)
            }
            GameEvent::ScavengeCompleted { character, found, .. } => {
                write!(f, "{} finished scavenging and found: {}", character, found.join(", "))
            }
            GameEvent::LaborCompleted { character, project_id, hours, applied: true } => {
                write!(f, "{} completed {} hours of labor on project {}", character, hours, project_id)
            }
            GameEvent::LaborCompleted { character, project_id, hours, applied: false } => write!(
                f,
                "{} finished {} hours of labor but project {} is no longer active",
                character, hours, project_id
            ),
            GameEvent::TradeSettled { trade_id, proposer, acceptor } => {
                write!(f, "trade {} settled between {} and {}", trade_id, proposer, acceptor)
            }
            GameEvent::TradeExpired { trade_id, character } => {
                write!(f, "trade {} from {} expired", trade_id, character)
            }
            GameEvent::PhaseAdvanced { project_id, project, phase } => {
                write!(f, "project {} ({}) advanced to phase {}", project, project_id, phase)
            }
            GameEvent::ProjectCompleted { project_id, project, reward } => {
                write!(f, "project {} ({}) is COMPLETED! Reward: {}", project, project_id, reward)
            }
        }
    }
}

/// Outbound announcements.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &GameEvent);
}

/// Permission lookups and interactive confirmations.
pub trait IdentityPort: Send + Sync {
    fn is_superuser(&self, identity: &str) -> bool;

    fn can_award_honor(&self, identity: &str) -> bool;

    /// Ask `identity` a yes/no question. The answer arrives on the returned
    /// channel; a dropped sender counts as "no".
    fn request_confirmation(&self, identity: &str, prompt: &str) -> oneshot::Receiver<bool>;
}

/// Notifier that writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &GameEvent) {
        info!("event: {}", escape_log(&event.to_string()));
    }
}

/// Identity port backed by fixed permission lists, answering every
/// confirmation with the same preset value.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    superusers: BTreeSet<String>,
    honor_admins: BTreeSet<String>,
    auto_confirm: bool,
}

impl StaticIdentity {
    pub fn new<I, J>(superusers: I, honor_admins: J, auto_confirm: bool) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        Self {
            superusers: superusers.into_iter().collect(),
            honor_admins: honor_admins.into_iter().collect(),
            auto_confirm,
        }
    }
}

impl IdentityPort for StaticIdentity {
    fn is_superuser(&self, identity: &str) -> bool {
        self.superusers.contains(identity)
    }

    fn can_award_honor(&self, identity: &str) -> bool {
        self.superusers.contains(identity) || self.honor_admins.contains(identity)
    }

    fn request_confirmation(&self, identity: &str, prompt: &str) -> oneshot::Receiver<bool> {
        info!(
            "confirmation for {}: {} -> {}",
            escape_log(identity),
            escape_log(prompt),
            if self.auto_confirm { "yes" } else { "no" }
        );
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(self.auto_confirm);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_render_for_players() {
        let event = GameEvent::ProjectCompleted {
            project_id: 3,
            project: "River Bridge".into(),
            reward: "Safe crossing".into(),
        };
        assert_eq!(event.to_string(), "project River Bridge (3) is COMPLETED! Reward: Safe crossing");

        let empty = GameEvent::ScavengeCompleted {
            character: "Taco".into(),
            group: None,
            found: vec![],
        };
        assert_eq!(empty.to_string(), "Taco scavenged but found nothing");
    }

    #[tokio::test]
    async fn static_identity_answers_preset() {
        let port = StaticIdentity::new(vec!["root".to_string()], vec!["judge".to_string()], false);
        assert!(port.is_superuser("root"));
        assert!(port.can_award_honor("judge"));
        assert!(port.can_award_honor("root"));
        assert!(!port.can_award_honor("player"));
        let answer = port.request_confirmation("player", "delete?").await.expect("answer");
        assert!(!answer);
    }
}
