//! Guild-to-session lookup.
//!
//! Sessions are created on first use and live until the guild is evicted.
//! Evicting only drops the registry's handle; the session task stops on
//! its own once every outstanding handle is gone.

use dashmap::DashMap;
use serenity::model::id::GuildId;
use tracing::{debug, info};

use super::{
    controller::AudioController,
    session::{SessionDeps, SessionHandle},
};

pub struct GuildRegistry {
    sessions: DashMap<GuildId, SessionHandle>,
    deps: SessionDeps,
}

impl GuildRegistry {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            sessions: DashMap::new(),
            deps,
        }
    }

    /// Sesión de la guild, creándola si no existe o si su tarea terminó
    pub fn session(&self, guild_id: GuildId) -> SessionHandle {
        let mut entry = self.sessions.entry(guild_id).or_insert_with(|| {
            debug!("Creando sesión de audio para guild {}", guild_id);
            SessionHandle::spawn(guild_id, self.deps.clone())
        });

        if entry.is_closed() {
            info!("🔁 Recreando sesión de audio cerrada para guild {}", guild_id);
            *entry = SessionHandle::spawn(guild_id, self.deps.clone());
        }

        entry.clone()
    }

    pub fn controller(&self, guild_id: GuildId) -> AudioController {
        AudioController::new(self.session(guild_id))
    }

    /// Sesión existente, sin crear una nueva
    pub fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions
            .get(&guild_id)
            .map(|entry| entry.value().clone())
            .filter(|session| !session.is_closed())
    }

    /// Olvida la sesión de una guild (por ejemplo al salir del servidor)
    pub fn evict(&self, guild_id: GuildId) -> bool {
        let removed = self.sessions.remove(&guild_id).is_some();
        if removed {
            info!("🗑️ Sesión de audio eliminada para guild {}", guild_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
