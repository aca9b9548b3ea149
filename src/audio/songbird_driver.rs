//! songbird implementation of the voice platform seam.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError,
    input::Input,
    tracks::{PlayMode, Track, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    connection::{PlaybackNotifier, StreamHandle, VoiceConnection, VoiceGateway},
    error::{ConnectionError, PlaybackError},
};

/// Conexiones de voz administradas por songbird
pub struct SongbirdGateway {
    manager: Arc<Songbird>,
}

impl SongbirdGateway {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, ConnectionError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| ConnectionError::Join {
                channel: channel_id,
                reason: e.to_string(),
            })?;

        info!("🔊 songbird conectado a {} en guild {}", channel_id, guild_id);
        Ok(Arc::new(SongbirdConnection { call, channel_id }))
    }

    async fn current(&self, guild_id: GuildId) -> Option<Arc<dyn VoiceConnection>> {
        let call = self.manager.get(guild_id)?;
        let channel = call.lock().await.current_channel()?;

        Some(Arc::new(SongbirdConnection {
            call,
            channel_id: ChannelId::from(channel.0),
        }))
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), ConnectionError> {
        match self.manager.remove(guild_id).await {
            Ok(()) => Ok(()),
            Err(JoinError::NoCall) => {
                debug!("Guild {} no tenía llamada activa", guild_id);
                Ok(())
            }
            Err(e) => Err(ConnectionError::Leave(e.to_string())),
        }
    }
}

pub struct SongbirdConnection {
    call: Arc<Mutex<Call>>,
    channel_id: ChannelId,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn play(
        &self,
        source: Input,
        volume: f32,
        notifier: PlaybackNotifier,
    ) -> Result<Box<dyn StreamHandle>, PlaybackError> {
        let handle = {
            let mut call = self.call.lock().await;
            call.play(Track::from(source).volume(volume))
        };

        let forwarders = [
            (TrackEvent::Play, Forward::Started),
            (TrackEvent::End, Forward::Finished),
            (TrackEvent::Error, Forward::Failed),
        ];
        for (event, forward) in forwarders {
            handle
                .add_event(
                    Event::Track(event),
                    TrackEventForwarder {
                        notifier: notifier.clone(),
                        forward,
                    },
                )
                .map_err(|e| PlaybackError::Control(e.to_string()))?;
        }

        Ok(Box::new(SongbirdStream(handle)))
    }
}

struct SongbirdStream(TrackHandle);

impl StreamHandle for SongbirdStream {
    fn pause(&self) -> Result<(), PlaybackError> {
        self.0.pause().map_err(|e| PlaybackError::Control(e.to_string()))
    }

    fn resume(&self) -> Result<(), PlaybackError> {
        self.0.play().map_err(|e| PlaybackError::Control(e.to_string()))
    }

    fn stop(&self) -> Result<(), PlaybackError> {
        self.0.stop().map_err(|e| PlaybackError::Control(e.to_string()))
    }

    fn set_volume(&self, volume: f32) -> Result<(), PlaybackError> {
        self.0
            .set_volume(volume)
            .map_err(|e| PlaybackError::Control(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
enum Forward {
    Started,
    Finished,
    Failed,
}

/// Reenvía los eventos del track a la sesión de la guild
struct TrackEventForwarder {
    notifier: PlaybackNotifier,
    forward: Forward,
}

#[async_trait]
impl VoiceEventHandler for TrackEventForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match self.forward {
            Forward::Started => self.notifier.started(),
            Forward::Finished => self.notifier.finished(),
            Forward::Failed => self.notifier.failed(error_reason(ctx)),
        }

        None
    }
}

fn error_reason(ctx: &EventContext<'_>) -> String {
    if let EventContext::Track(tracks) = ctx {
        if let Some((state, _)) = tracks.first() {
            if let PlayMode::Errored(e) = &state.playing {
                return e.to_string();
            }
        }
    }
    "unknown playback error".to_string()
}
