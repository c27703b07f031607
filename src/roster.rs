//! Participant roster.
//!
//! The authority always sends the full membership, so the roster is only
//! ever replaced, never patched. Display names seen on vote payloads are
//! remembered separately so votes from users outside the roster still
//! render with a name.

use std::collections::{HashMap, HashSet};

use frames::{UserId, UserInfo};
use serde::Serialize;

/// One connected participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub user_id: UserId,
    pub display_name: String,
    pub initials: String,
    pub is_self: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Roster {
    participants: Vec<Participant>,
    names: HashMap<UserId, String>,
}

impl Roster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace membership with `users`, keeping payload order and dropping
    /// repeated ids.
    pub fn replace(&mut self, users: &[UserInfo], self_id: UserId) {
        let mut seen = HashSet::with_capacity(users.len());
        self.participants.clear();
        for user in users {
            if !seen.insert(user.id) {
                continue;
            }
            self.remember(user);
            self.participants.push(Participant {
                user_id: user.id,
                display_name: user.display_name(),
                initials: user.initials(),
                is_self: user.id == self_id,
            });
        }
    }

    /// List the local user alone until the first roster arrives.
    pub fn seed_self(&mut self, user_id: UserId, display_name: &str) {
        let display_name = display_name.trim();
        if !display_name.is_empty() {
            self.names.insert(user_id, display_name.to_owned());
        }
        self.participants = vec![Participant {
            user_id,
            display_name: display_name.to_owned(),
            initials: initials_of(display_name),
            is_self: true,
        }];
    }

    /// Record display data for a user without touching membership.
    pub fn remember(&mut self, user: &UserInfo) {
        let name = user.display_name();
        if !name.is_empty() {
            self.names.insert(user.id, name);
        }
    }

    /// Best known display name for `user_id`, member or not.
    #[must_use]
    pub fn name_of(&self, user_id: UserId) -> Option<&str> {
        self.names.get(&user_id).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, user_id: UserId) -> bool {
        self.participants.iter().any(|p| p.user_id == user_id)
    }

    #[must_use]
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

/// First letters of the first and last words, uppercased.
fn initials_of(name: &str) -> String {
    let mut words = name.split_whitespace();
    let first = words.next();
    let last = words.next_back();
    first
        .into_iter()
        .chain(last)
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: UserId, first: &str, last: &str) -> UserInfo {
        UserInfo { id, first_name: first.into(), last_name: last.into(), email: None }
    }

    #[test]
    fn replace_is_full_snapshot() {
        let mut roster = Roster::new();
        roster.replace(&[user(1, "Ada", "Lovelace"), user(2, "Bob", "Ross")], 1);
        roster.replace(&[user(2, "Bob", "Ross")], 1);
        assert_eq!(roster.len(), 1);
        assert!(!roster.contains(1));
        assert!(roster.contains(2));
    }

    #[test]
    fn replace_collapses_duplicate_ids_and_marks_self() {
        let mut roster = Roster::new();
        roster.replace(&[user(3, "Cy", "Young"), user(1, "Ada", "Lovelace"), user(3, "Cy", "Young")], 1);
        let ids: Vec<_> = roster.participants().iter().map(|p| p.user_id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert!(roster.participants()[1].is_self);
        assert!(!roster.participants()[0].is_self);
        assert_eq!(roster.participants()[0].initials, "CY");
    }

    #[test]
    fn names_outlive_membership() {
        let mut roster = Roster::new();
        roster.replace(&[user(1, "Ada", "Lovelace")], 9);
        roster.replace(&[], 9);
        assert!(roster.is_empty());
        assert_eq!(roster.name_of(1), Some("Ada Lovelace"));
    }

    #[test]
    fn remember_ignores_nameless_users() {
        let mut roster = Roster::new();
        roster.remember(&user(4, "", ""));
        assert_eq!(roster.name_of(4), None);
        assert!(!roster.contains(4));
    }

    #[test]
    fn seeded_self_is_replaced_by_first_roster() {
        let mut roster = Roster::new();
        roster.seed_self(1, " Ada King Lovelace ");
        assert_eq!(roster.participants()[0].initials, "AL");
        assert!(roster.participants()[0].is_self);
        assert_eq!(roster.name_of(1), Some("Ada King Lovelace"));

        roster.replace(&[user(2, "Bob", "Ross")], 1);
        assert!(!roster.contains(1));
        assert_eq!(roster.name_of(1), Some("Ada King Lovelace"));
    }
}
