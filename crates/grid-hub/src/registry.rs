//! Scope Registry.
//!
//! Maps connections to the interest scopes they joined. The registry is a
//! plain owned value with `&mut self` mutators; the hub task is its only
//! owner, so every operation is atomic with respect to the sets it touches
//! without any locking.
//!
//! Two indexes are kept in step: scope -> members (for fan-out) and
//! connection -> scopes (so removing a connection costs only the scopes it
//! was in). Empty member sets are discarded immediately because scope
//! names embed unbounded session and node ids.

use std::collections::{BTreeMap, BTreeSet};

use grid_types::{ConnectionId, ScopeName};

/// In-memory scope membership.
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    scopes: BTreeMap<ScopeName, BTreeSet<ConnectionId>>,
    memberships: BTreeMap<ConnectionId, BTreeSet<ScopeName>>,
}

impl ScopeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `connection` to `scope`. Returns `false` if it was already a
    /// member.
    pub fn join(&mut self, connection: ConnectionId, scope: ScopeName) -> bool {
        let added = self
            .scopes
            .entry(scope.clone())
            .or_default()
            .insert(connection);
        if added {
            self.memberships.entry(connection).or_default().insert(scope);
        }
        added
    }

    /// Remove `connection` from `scope`. Returns `false` if it was not a
    /// member (including when the scope does not exist).
    pub fn leave(&mut self, connection: ConnectionId, scope: &ScopeName) -> bool {
        let removed = self
            .scopes
            .get_mut(scope)
            .is_some_and(|members| members.remove(&connection));
        if !removed {
            return false;
        }

        if self.scopes.get(scope).is_some_and(BTreeSet::is_empty) {
            self.scopes.remove(scope);
        }
        if let Some(joined) = self.memberships.get_mut(&connection) {
            joined.remove(scope);
            if joined.is_empty() {
                self.memberships.remove(&connection);
            }
        }
        true
    }

    /// Snapshot of the current members of `scope`; empty when the scope
    /// does not exist.
    pub fn members_of(&self, scope: &ScopeName) -> BTreeSet<ConnectionId> {
        self.scopes.get(scope).cloned().unwrap_or_default()
    }

    /// Scopes `connection` currently belongs to.
    pub fn scopes_of(&self, connection: ConnectionId) -> BTreeSet<ScopeName> {
        self.memberships
            .get(&connection)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove `connection` from every scope it belongs to and return those
    /// scopes.
    pub fn remove_connection(&mut self, connection: ConnectionId) -> BTreeSet<ScopeName> {
        let joined = self.memberships.remove(&connection).unwrap_or_default();
        for scope in &joined {
            let now_empty = self.scopes.get_mut(scope).is_some_and(|members| {
                members.remove(&connection);
                members.is_empty()
            });
            if now_empty {
                self.scopes.remove(scope);
            }
        }
        joined
    }

    /// Number of non-empty scopes.
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Every non-empty scope with its member count, sessions before
    /// nodes, each ordered by id.
    pub fn scope_sizes(&self) -> Vec<(ScopeName, usize)> {
        self.scopes
            .iter()
            .map(|(scope, members)| (scope.clone(), members.len()))
            .collect()
    }

    /// Drop all memberships.
    pub fn clear(&mut self) {
        self.scopes.clear();
        self.memberships.clear();
    }
}
