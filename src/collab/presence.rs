use std::collections::{BTreeMap, HashSet};

use uuid::Uuid;

use crate::models::{ActiveUser, Principal};

/// Who is active on one document: user id → live connection set. An entry
/// exists iff its connection set is non-empty; a user with three tabs open
/// is still one entry.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    users: BTreeMap<String, PresenceEntry>,
}

#[derive(Debug)]
struct PresenceEntry {
    username: String,
    conns: HashSet<Uuid>,
}

/// Outcome of removing a connection from the registry.
#[derive(Debug, PartialEq, Eq)]
pub struct RemovedConnection {
    pub user_id: String,
    pub username: String,
    /// True when this was the user's last connection and their entry was
    /// dropped.
    pub user_gone: bool,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection for a user. Idempotent for a repeated conn_id.
    pub fn add_connection(&mut self, principal: &Principal, conn_id: Uuid) {
        let entry = self
            .users
            .entry(principal.user_id.clone())
            .or_insert_with(|| PresenceEntry {
                username: principal.username.clone(),
                conns: HashSet::new(),
            });
        entry.conns.insert(conn_id);
    }

    /// Remove a connection from whichever user holds it. A connection maps
    /// to exactly one user, so the scan stops at the first hit.
    pub fn remove_connection(&mut self, conn_id: Uuid) -> Option<RemovedConnection> {
        let user_id = self
            .users
            .iter()
            .find(|(_, entry)| entry.conns.contains(&conn_id))
            .map(|(user_id, _)| user_id.clone())?;

        let entry = self.users.get_mut(&user_id)?;
        entry.conns.remove(&conn_id);
        let username = entry.username.clone();
        let user_gone = entry.conns.is_empty();
        if user_gone {
            self.users.remove(&user_id);
        }
        Some(RemovedConnection {
            user_id,
            username,
            user_gone,
        })
    }

    /// One row per distinct active user. BTreeMap iteration keeps the
    /// ordering stable across repeated calls with no intervening mutation.
    pub fn list_active(&self) -> Vec<ActiveUser> {
        self.users
            .iter()
            .map(|(user_id, entry)| ActiveUser {
                user_id: user_id.clone(),
                username: entry.username.clone(),
            })
            .collect()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(user_id: &str, username: &str) -> Principal {
        Principal {
            user_id: user_id.to_string(),
            username: username.to_string(),
        }
    }

    #[test]
    fn lists_one_row_per_user_not_per_connection() {
        let mut registry = PresenceRegistry::new();
        let ada = principal("u1", "ada");
        registry.add_connection(&ada, Uuid::new_v4());
        registry.add_connection(&ada, Uuid::new_v4());
        registry.add_connection(&principal("u2", "bob"), Uuid::new_v4());

        let active = registry.list_active();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].username, "ada");
        assert_eq!(active[1].username, "bob");
    }

    #[test]
    fn add_is_idempotent_for_same_connection() {
        let mut registry = PresenceRegistry::new();
        let conn = Uuid::new_v4();
        registry.add_connection(&principal("u1", "ada"), conn);
        registry.add_connection(&principal("u1", "ada"), conn);

        let removed = registry.remove_connection(conn).expect("known connection");
        assert!(removed.user_gone);
        assert_eq!(registry.user_count(), 0);
    }

    #[test]
    fn user_survives_until_last_connection_closes() {
        let mut registry = PresenceRegistry::new();
        let ada = principal("u1", "ada");
        let conns: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for conn in &conns {
            registry.add_connection(&ada, *conn);
        }

        for conn in &conns[..2] {
            let removed = registry.remove_connection(*conn).expect("known connection");
            assert!(!removed.user_gone);
            assert_eq!(registry.list_active().len(), 1);
        }

        let removed = registry
            .remove_connection(conns[2])
            .expect("known connection");
        assert!(removed.user_gone);
        assert_eq!(registry.user_count(), 0);
    }

    #[test]
    fn removing_unknown_connection_is_a_noop() {
        let mut registry = PresenceRegistry::new();
        registry.add_connection(&principal("u1", "ada"), Uuid::new_v4());
        assert_eq!(registry.remove_connection(Uuid::new_v4()), None);
        assert_eq!(registry.user_count(), 1);
    }

    #[test]
    fn ordering_is_stable_across_calls() {
        let mut registry = PresenceRegistry::new();
        registry.add_connection(&principal("u3", "cyd"), Uuid::new_v4());
        registry.add_connection(&principal("u1", "ada"), Uuid::new_v4());
        registry.add_connection(&principal("u2", "bob"), Uuid::new_v4());

        let first = registry.list_active();
        let second = registry.list_active();
        assert_eq!(first, second);
    }
}
