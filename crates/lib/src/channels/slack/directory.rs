//! Directory cache: name ↔ id tables for rooms, users and user groups.
//!
//! Tables are read concurrently by request handlers and the normalizer and written by the
//! ingestion handlers. Locks are never held across an await; whole-table rebuilds are built
//! off-lock and swapped in.

use super::api::{ConversationScope, SlackApi};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// One name → id table.
#[derive(Debug, Default)]
pub struct DirectoryTable {
    entries: RwLock<HashMap<String, String>>,
}

impl DirectoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward lookup by exact name.
    pub fn id_of(&self, name: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Reverse lookup: the name of some entry whose id equals `id`.
    /// With duplicate mappings for the same id, which name is returned is unspecified.
    pub fn name_of(&self, id: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(_, v)| v.as_str() == id)
            .map(|(k, _)| k.clone())
    }

    /// Add `name → id` unless the name is already mapped. Returns true when inserted.
    pub fn insert_if_absent(&self, name: impl Into<String>, id: impl Into<String>) -> bool {
        let mut g = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let name = name.into();
        if g.contains_key(&name) {
            return false;
        }
        g.insert(name, id.into());
        true
    }

    /// Remove every entry pointing at `id`. Returns the removed names.
    pub fn remove_by_id(&self, id: &str) -> Vec<String> {
        let mut g = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let names: Vec<String> = g
            .iter()
            .filter(|(_, v)| v.as_str() == id)
            .map(|(k, _)| k.clone())
            .collect();
        for name in &names {
            g.remove(name);
        }
        names
    }

    /// Swap in a freshly built table.
    pub fn replace_all(&self, entries: HashMap<String, String>) {
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = entries;
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rooms (channel name → id), users (handle → id) and user groups (handle → id).
#[derive(Debug, Default)]
pub struct DirectoryCache {
    rooms: DirectoryTable,
    users: DirectoryTable,
    user_groups: DirectoryTable,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rooms(&self) -> &DirectoryTable {
        &self.rooms
    }

    pub fn users(&self) -> &DirectoryTable {
        &self.users
    }

    pub fn user_groups(&self) -> &DirectoryTable {
        &self.user_groups
    }

    /// Rebuild all tables from the platform. Each fetch is best-effort: a failure is logged and
    /// that table keeps its previous contents. Rooms are rebuilt from whichever of the public
    /// and private listings succeeded. User groups are only fetched when `with_user_groups`.
    pub async fn rebuild(&self, api: &dyn SlackApi, with_user_groups: bool) {
        let (public, private, users, groups) = tokio::join!(
            api.list_conversations(ConversationScope::Public),
            api.list_conversations(ConversationScope::Private),
            api.list_users(),
            async {
                if with_user_groups {
                    Some(api.list_user_groups().await)
                } else {
                    None
                }
            }
        );

        let mut rooms = HashMap::new();
        let mut any_rooms = false;
        for (scope, listing) in [("public", public), ("private", private)] {
            match listing {
                Ok(channels) => {
                    any_rooms = true;
                    rooms.extend(channels.into_iter().map(|c| (c.name, c.id)));
                }
                Err(e) => log::error!("directory: fetching {} rooms failed: {}", scope, e),
            }
        }
        if any_rooms {
            self.rooms.replace_all(rooms);
        }

        match users {
            Ok(users) => self
                .users
                .replace_all(users.into_iter().map(|u| (u.name, u.id)).collect()),
            Err(e) => log::error!("directory: fetching users failed: {}", e),
        }

        match groups {
            Some(Ok(groups)) => self
                .user_groups
                .replace_all(groups.into_iter().map(|g| (g.handle, g.id)).collect()),
            Some(Err(e)) => {
                log::debug!("directory: unable to retrieve user groups: {}", e);
                log::debug!("directory: double check the workspace token");
            }
            None => {}
        }

        log::debug!(
            "directory rebuilt: {} rooms, {} users, {} user groups",
            self.rooms.len(),
            self.users.len(),
            self.user_groups.len()
        );
    }
}
