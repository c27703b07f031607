//! Most-recent vote per participant.

use std::collections::BTreeMap;

use frames::{Estimate, UserId};

/// Last-write-wins vote table keyed by user.
///
/// A vote for a user absent from the roster is kept; roster membership and
/// votes reconcile independently.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VoteAggregator {
    votes: BTreeMap<UserId, Estimate>,
}

impl VoteAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` for `user_id`, returning the value it replaced.
    pub fn upsert(&mut self, user_id: UserId, value: Estimate) -> Option<Estimate> {
        self.votes.insert(user_id, value)
    }

    pub fn remove(&mut self, user_id: UserId) -> Option<Estimate> {
        self.votes.remove(&user_id)
    }

    pub fn clear(&mut self) {
        self.votes.clear();
    }

    #[must_use]
    pub fn get(&self, user_id: UserId) -> Option<Estimate> {
        self.votes.get(&user_id).copied()
    }

    /// All votes, ordered by user id.
    #[must_use]
    pub fn all(&self) -> &BTreeMap<UserId, Estimate> {
        &self.votes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }
}

#[cfg(test)]
#[path = "votes_test.rs"]
mod tests;
