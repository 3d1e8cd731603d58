//! Session Store
//! Mission: Hold the server-side mirror of authenticated identities

use crate::auth::models::SessionContext;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// In-memory session table, one entry per authenticated user. Contexts are
/// immutable values: establish/refresh swap the whole entry, logout removes
/// it. Independent of token possession.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionContext>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the session for a user.
    pub fn establish(&self, ctx: SessionContext) {
        self.sessions.write().insert(ctx.user_id, ctx);
    }

    /// Replace the session only if one already exists (the refresh path:
    /// a token refresh does not create a session out of thin air).
    pub fn refresh(&self, ctx: SessionContext) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get(&ctx.user_id) {
            Some(_) => {
                sessions.insert(ctx.user_id, ctx);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, user_id: &Uuid) -> Option<SessionContext> {
        self.sessions.read().get(user_id).cloned()
    }

    /// Remove a user's session. Returns whether one existed.
    pub fn destroy(&self, user_id: &Uuid) -> bool {
        self.sessions.write().remove(user_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
