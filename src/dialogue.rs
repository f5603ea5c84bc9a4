//! Debt disambiguation dialogue: holds a parsed debt while the user picks the counterparty.

use serde::{Deserialize, Serialize};
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};

use crate::contact_resolver::ContactCandidate;
use crate::debt_parser::ParsedDebt;

/// Represents the conversation state of a user recording debts
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub enum DebtDialogueState {
    #[default]
    Start,
    /// The typed name matched several contacts; waiting for a button tap
    AwaitingCounterparty {
        parsed: ParsedDebt,
        candidates: Vec<ContactCandidate>,
        language_code: Option<String>,
    },
}

/// Type alias for the debt dialogue
pub type DebtDialogue = Dialogue<DebtDialogueState, InMemStorage<DebtDialogueState>>;

impl DebtDialogueState {
    /// Look up the picked candidate while awaiting a counterparty
    ///
    /// Returns `None` when no pick is pending or `contact_id` was not offered.
    pub fn picked(&self, contact_id: i64) -> Option<(&ParsedDebt, &ContactCandidate)> {
        match self {
            DebtDialogueState::AwaitingCounterparty {
                parsed, candidates, ..
            } => candidates
                .iter()
                .find(|candidate| candidate.contact_id == contact_id)
                .map(|candidate| (parsed, candidate)),
            DebtDialogueState::Start => None,
        }
    }
}
