use serenity::model::id::GuildId;
use tracing::info;

use super::{error::AudioError, session::SessionHandle};

/// Controles de reproducción expuestos a los comandos
#[derive(Clone)]
pub struct AudioController {
    session: SessionHandle,
}

impl AudioController {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    pub fn guild_id(&self) -> GuildId {
        self.session.guild_id()
    }

    /// Pausa el stream actual
    pub async fn pause(&self) -> Result<(), AudioError> {
        self.session.pause().await?;
        info!("⏸️ Pausado en guild {}", self.guild_id());
        Ok(())
    }

    /// Reanuda el stream pausado
    pub async fn resume(&self) -> Result<(), AudioError> {
        self.session.resume().await?;
        info!("▶️ Reanudado en guild {}", self.guild_id());
        Ok(())
    }

    /// Salta al siguiente item de la cola.
    ///
    /// Falla con `NotConnected` si no hay conexión de voz y con
    /// `NothingPlaying` si la cola está vacía.
    pub async fn skip(&self) -> Result<(), AudioError> {
        self.session.skip().await?;
        info!("⏭️ Item saltado en guild {}", self.guild_id());
        Ok(())
    }

    /// Detiene todo y sale del canal de voz
    pub async fn disconnect(&self) -> Result<(), AudioError> {
        self.session.disconnect().await?;
        info!("👋 Desconectado de guild {}", self.guild_id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{logged_item, session_deps, FakeGateway, PlayLog, GUILD};
    use pretty_assertions::assert_eq;
    use serenity::model::id::ChannelId;
    use std::{sync::Arc, time::Duration};

    const CHANNEL: ChannelId = ChannelId::new(10);

    fn controller(gateway: &Arc<FakeGateway>) -> (AudioController, SessionHandle) {
        let session = SessionHandle::spawn(GUILD, session_deps(gateway.clone()));
        (AudioController::new(session.clone()), session)
    }

    #[tokio::test(start_paused = true)]
    async fn errors_tell_disconnected_from_idle() {
        let gateway = Arc::new(FakeGateway::default());
        let (controller, session) = controller(&gateway);

        assert_eq!(controller.skip().await, Err(AudioError::NotConnected));
        assert_eq!(controller.disconnect().await, Err(AudioError::NotConnected));

        session.connect(CHANNEL, false).await.unwrap();

        assert_eq!(controller.skip().await, Err(AudioError::NothingPlaying));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_reach_the_stream() {
        let gateway = Arc::new(FakeGateway::default());
        let (controller, session) = controller(&gateway);
        session.connect(CHANNEL, false).await.unwrap();
        session
            .enqueue(logged_item("A", &PlayLog::default()), None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        controller.pause().await.unwrap();
        assert!(gateway.connection().last_stream().is_paused());

        controller.resume().await.unwrap();
        assert!(!gateway.connection().last_stream().is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_leaves_the_channel() {
        let gateway = Arc::new(FakeGateway::default());
        let (controller, session) = controller(&gateway);
        session.connect(CHANNEL, false).await.unwrap();

        controller.disconnect().await.unwrap();

        assert_eq!(gateway.leaves(), 1);
        assert!(!gateway.is_connected());
        assert_eq!(controller.guild_id(), GUILD);
    }
}
