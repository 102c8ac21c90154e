//! Change set construction
//!
//! A cycle folds every retained transaction past the checkpoint into one
//! change set: the ascending token range plus each affected identity
//! exactly once, in first-touch order. Later touches of the same identity
//! are redundant because projection refetches the current value anyway.

use std::collections::HashSet;

use crate::history::{RecordId, SequenceToken, Transaction};

/// The union of all transactions one merge cycle consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    first_token: SequenceToken,
    last_token: SequenceToken,
    transactions: usize,
    identities: Vec<RecordId>,
}

impl ChangeSet {
    /// Folds `transactions` into a change set, or `None` when there is
    /// nothing to fold. The slice must already be in ascending token order,
    /// which is what the log reader yields.
    pub fn from_transactions(transactions: &[Transaction]) -> Option<Self> {
        let first = transactions.first()?;
        let last = transactions.last()?;
        debug_assert!(transactions.windows(2).all(|w| w[0].token < w[1].token));

        let mut seen = HashSet::new();
        let mut identities = Vec::new();
        for txn in transactions {
            for id in &txn.affected {
                if seen.insert(id.clone()) {
                    identities.push(id.clone());
                }
            }
        }

        Some(Self {
            first_token: first.token,
            last_token: last.token,
            transactions: transactions.len(),
            identities,
        })
    }

    /// Oldest token folded in.
    pub fn first_token(&self) -> SequenceToken {
        self.first_token
    }

    /// Newest token folded in; the checkpoint advances here once the batch
    /// is in the view.
    pub fn last_token(&self) -> SequenceToken {
        self.last_token
    }

    /// Number of transactions folded in.
    pub fn transaction_count(&self) -> usize {
        self.transactions
    }

    /// Affected identities, each once, in first-touch order.
    pub fn identities(&self) -> &[RecordId] {
        &self.identities
    }
}
