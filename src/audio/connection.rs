//! Voice connection seam and the per-guild connection supervisor.
//!
//! The engine never talks to songbird directly: everything goes through
//! [`VoiceGateway`] (join / leave / current connection of a guild),
//! [`VoiceConnection`] (play a stream on a joined channel) and
//! [`StreamHandle`] (control one playing stream). The songbird
//! implementations live in [`super::songbird_driver`].
//!
//! [`ConnectionSupervisor::create_connection`] is the only code path that
//! creates or replaces a guild's voice connection.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::input::Input;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    error::{ConnectionError, PlaybackError},
    queue::QueueManager,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEventKind {
    Started,
    Finished,
    Failed(String),
}

/// Evento de un stream, etiquetado con la generación que lo originó
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackEvent {
    pub generation: u64,
    pub kind: PlaybackEventKind,
}

/// Canal de vuelta desde la plataforma de voz hacia la sesión de la guild
#[derive(Debug, Clone)]
pub struct PlaybackNotifier {
    generation: u64,
    tx: mpsc::UnboundedSender<PlaybackEvent>,
}

impl PlaybackNotifier {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<PlaybackEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn started(&self) {
        self.send(PlaybackEventKind::Started);
    }

    pub fn finished(&self) {
        self.send(PlaybackEventKind::Finished);
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.send(PlaybackEventKind::Failed(reason.into()));
    }

    fn send(&self, kind: PlaybackEventKind) {
        // La sesión puede haber terminado; no hay nadie a quien avisar
        if self
            .tx
            .send(PlaybackEvent {
                generation: self.generation,
                kind,
            })
            .is_err()
        {
            debug!("Evento de reproducción descartado (sesión cerrada)");
        }
    }
}

/// Control sobre un stream que está sonando
pub trait StreamHandle: Send + Sync {
    fn pause(&self) -> Result<(), PlaybackError>;
    fn resume(&self) -> Result<(), PlaybackError>;
    /// Termina el stream; la plataforma debe emitir `Finished`
    fn stop(&self) -> Result<(), PlaybackError>;
    fn set_volume(&self, volume: f32) -> Result<(), PlaybackError>;
}

/// Conexión de voz activa de una guild
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn channel_id(&self) -> ChannelId;

    async fn play(
        &self,
        source: Input,
        volume: f32,
        notifier: PlaybackNotifier,
    ) -> Result<Box<dyn StreamHandle>, PlaybackError>;
}

/// Plataforma de voz: dueña real de las conexiones por guild
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, ConnectionError>;

    async fn current(&self, guild_id: GuildId) -> Option<Arc<dyn VoiceConnection>>;

    async fn leave(&self, guild_id: GuildId) -> Result<(), ConnectionError>;
}

pub struct ConnectOutcome {
    pub connection: Arc<dyn VoiceConnection>,
    /// La conexión existente se reutilizó sin tocar la cola
    pub reused: bool,
}

pub struct ConnectionSupervisor {
    guild_id: GuildId,
    gateway: Arc<dyn VoiceGateway>,
    settle_delay: Duration,
}

impl ConnectionSupervisor {
    pub fn new(guild_id: GuildId, gateway: Arc<dyn VoiceGateway>, settle_delay: Duration) -> Self {
        Self {
            guild_id,
            gateway,
            settle_delay,
        }
    }

    /// Obtiene una conexión al canal indicado, reutilizando la actual si es posible.
    ///
    /// Si hay que crear una nueva, la cola de la guild se reinicia (loop y
    /// autoplay desactivados, todos los items eliminados) antes de unirse.
    pub async fn create_connection(
        &self,
        current: Option<Arc<dyn VoiceConnection>>,
        queue: &mut QueueManager,
        channel_id: ChannelId,
        force_new: bool,
    ) -> Result<ConnectOutcome, ConnectionError> {
        let existing = match current {
            Some(connection) => Some(connection),
            None => self.gateway.current(self.guild_id).await,
        };

        if let Some(connection) = existing.as_ref() {
            if !force_new && connection.channel_id() == channel_id {
                debug!("♻️ Reutilizando conexión de voz en guild {}", self.guild_id);
                return Ok(ConnectOutcome {
                    connection: connection.clone(),
                    reused: true,
                });
            }
        }

        if force_new {
            if existing.is_some() {
                if let Err(e) = self.gateway.leave(self.guild_id).await {
                    warn!("⚠️ Error al desconectar antes de reconectar en guild {}: {}", self.guild_id, e);
                }
            }
            tokio::time::sleep(self.settle_delay).await;
        }

        queue.toggle_loop(Some(false));
        queue.toggle_autoplay(Some(false));
        queue.clear_items(true);

        let connection = self.gateway.join(self.guild_id, channel_id).await?;
        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, self.guild_id);

        Ok(ConnectOutcome {
            connection,
            reused: false,
        })
    }

    /// Sale del canal de voz de la guild
    pub async fn disconnect(&self) -> Result<(), ConnectionError> {
        self.gateway.leave(self.guild_id).await?;
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{test_item, FakeGateway, GUILD};
    use pretty_assertions::assert_eq;

    fn supervisor(gateway: &Arc<FakeGateway>) -> ConnectionSupervisor {
        ConnectionSupervisor::new(GUILD, gateway.clone(), Duration::from_millis(500))
    }

    fn busy_queue() -> QueueManager {
        let mut queue = QueueManager::new();
        queue.add_item(test_item("a"), None).unwrap();
        queue.add_item(test_item("b"), None).unwrap();
        queue.toggle_loop(Some(true));
        queue.toggle_autoplay(Some(true));
        queue
    }

    #[tokio::test]
    async fn reuses_connection_to_same_channel() {
        let gateway = Arc::new(FakeGateway::default());
        let supervisor = supervisor(&gateway);
        let mut queue = QueueManager::new();
        let channel = ChannelId::new(10);

        let first = supervisor
            .create_connection(None, &mut queue, channel, false)
            .await
            .unwrap();
        assert!(!first.reused);

        queue.add_item(test_item("a"), None).unwrap();
        let second = supervisor
            .create_connection(Some(first.connection.clone()), &mut queue, channel, false)
            .await
            .unwrap();

        assert!(second.reused);
        assert!(Arc::ptr_eq(&first.connection, &second.connection));
        assert_eq!(queue.len(), 1);
        assert_eq!(gateway.joins(), 1);
    }

    #[tokio::test]
    async fn falls_back_to_platform_view_of_current_connection() {
        let gateway = Arc::new(FakeGateway::default());
        let supervisor = supervisor(&gateway);
        let mut queue = QueueManager::new();
        let channel = ChannelId::new(10);

        let first = supervisor
            .create_connection(None, &mut queue, channel, false)
            .await
            .unwrap();
        let second = supervisor
            .create_connection(None, &mut queue, channel, false)
            .await
            .unwrap();

        assert!(second.reused);
        assert!(Arc::ptr_eq(&first.connection, &second.connection));
    }

    #[tokio::test(start_paused = true)]
    async fn forced_reconnection_resets_queue() {
        let gateway = Arc::new(FakeGateway::default());
        let supervisor = supervisor(&gateway);
        let mut queue = QueueManager::new();
        let channel = ChannelId::new(10);

        let first = supervisor
            .create_connection(None, &mut queue, channel, false)
            .await
            .unwrap();
        let mut queue = busy_queue();

        let second = supervisor
            .create_connection(Some(first.connection.clone()), &mut queue, channel, true)
            .await
            .unwrap();

        assert!(!second.reused);
        assert!(!Arc::ptr_eq(&first.connection, &second.connection));
        assert!(queue.is_empty());
        assert!(!queue.loop_enabled());
        assert!(!queue.autoplay_enabled());
        assert_eq!(gateway.leaves(), 1);
        assert_eq!(gateway.joins(), 2);
    }

    #[tokio::test]
    async fn moving_to_another_channel_resets_queue_without_leaving() {
        let gateway = Arc::new(FakeGateway::default());
        let supervisor = supervisor(&gateway);
        let mut queue = QueueManager::new();

        let first = supervisor
            .create_connection(None, &mut queue, ChannelId::new(10), false)
            .await
            .unwrap();
        let mut queue = busy_queue();

        let second = supervisor
            .create_connection(Some(first.connection), &mut queue, ChannelId::new(11), false)
            .await
            .unwrap();

        assert_eq!(second.connection.channel_id(), ChannelId::new(11));
        assert!(queue.is_empty());
        assert_eq!(gateway.leaves(), 0);
    }

    #[tokio::test]
    async fn join_failure_is_reported() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.fail_joins("missing permissions");
        let supervisor = supervisor(&gateway);
        let mut queue = QueueManager::new();

        let result = supervisor
            .create_connection(None, &mut queue, ChannelId::new(10), false)
            .await;

        assert_eq!(
            result.err().map(|e| e.to_string()),
            Some("unable to join voice channel 10: missing permissions".to_string())
        );
    }
}
