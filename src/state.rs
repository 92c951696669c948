use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::AnalysisConfig;
use crate::sessions::{SessionRecord, SessionRunner, SessionStore};

pub struct AppState {
    pub store: Arc<SessionStore>,
    pub runner: SessionRunner,
    pub admin_ids: HashSet<u64>,
    /// Analysis tunables (admins can modify at runtime). Runs snapshot it at start.
    pub config: Arc<RwLock<AnalysisConfig>>,
}

impl AppState {
    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_ids.contains(&user_id)
    }

    /// Owners and admins may read or delete a session.
    pub fn can_access(&self, record: &SessionRecord, user_id: u64) -> bool {
        record.owner_id == user_id || self.is_admin(user_id)
    }
}

pub type Context<'a> = poise::Context<'a, AppState, anyhow::Error>;
