//! Per-guild audio session.
//!
//! One [`GuildSession`] task per guild owns the queue, the volume, the
//! voice connection, the stream that is currently sounding and the idle
//! disconnect timer. Nothing else mutates that state: command handlers
//! talk to the task through a cloneable [`SessionHandle`], and the voice
//! platform reports stream events through a [`PlaybackNotifier`] tagged
//! with the generation of the stream that produced them.
//!
//! Events from a stream that is no longer the active one are dropped,
//! which is what keeps at most one item player running per guild.

use rand::{rngs::StdRng, SeedableRng};
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    connection::{
        ConnectionSupervisor, PlaybackEvent, PlaybackEventKind, PlaybackNotifier, StreamHandle,
        VoiceConnection, VoiceGateway,
    },
    error::{AudioError, PlaybackError},
    player::{plan_advance, Advance},
    queue::{AddOutcome, ItemKind, LoopType, QueueItem, QueueManager, QueueSnapshot},
    volume::{VolumeManager, VolumeOutput, VolumeSettings},
};
use crate::{
    sources::youtube::AutoplaySource,
    speech::SpeechSynthesizer,
    storage::{GuildConfig, GuildConfigStore},
};

const COMMAND_BUFFER: usize = 64;

/// Parámetros del motor de audio (antes constantes fijas)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Tiempo con la cola vacía antes de desconectar
    pub idle_timeout: Duration,
    /// Pausa entre salir del canal y volver a entrar al forzar reconexión
    pub settle_delay: Duration,
    pub announcement_volume_ratio: f32,
    pub volume: VolumeSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(500),
            announcement_volume_ratio: 15.0,
            volume: VolumeSettings::default(),
        }
    }
}

/// Colaboradores externos compartidos por todas las sesiones
#[derive(Clone)]
pub struct SessionDeps {
    pub gateway: Arc<dyn VoiceGateway>,
    pub configs: Arc<dyn GuildConfigStore>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub autoplay: Option<Arc<dyn AutoplaySource>>,
    pub settings: EngineSettings,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VolumeChange {
    Set(f32),
    Increase(f32),
    Decrease(f32),
}

pub enum SessionCommand {
    Connect {
        channel_id: ChannelId,
        force_new: bool,
        reply: oneshot::Sender<Result<bool, AudioError>>,
    },
    Enqueue {
        item: QueueItem,
        position: Option<usize>,
        reply: oneshot::Sender<Result<AddOutcome, AudioError>>,
    },
    Remove {
        index: usize,
        reply: oneshot::Sender<Result<QueueItem, AudioError>>,
    },
    Shuffle {
        reply: oneshot::Sender<()>,
    },
    Clear {
        all: bool,
        reply: oneshot::Sender<()>,
    },
    ToggleLoop {
        value: Option<bool>,
        reply: oneshot::Sender<bool>,
    },
    SetLoopType {
        loop_type: LoopType,
        reply: oneshot::Sender<()>,
    },
    ToggleAutoplay {
        value: Option<bool>,
        reply: oneshot::Sender<bool>,
    },
    Pause {
        reply: oneshot::Sender<Result<(), AudioError>>,
    },
    Resume {
        reply: oneshot::Sender<Result<(), AudioError>>,
    },
    Skip {
        reply: oneshot::Sender<Result<(), AudioError>>,
    },
    Disconnect {
        reply: oneshot::Sender<Result<(), AudioError>>,
    },
    Volume {
        change: VolumeChange,
        reply: oneshot::Sender<Result<f32, AudioError>>,
    },
    ToggleMute {
        value: Option<bool>,
        reply: oneshot::Sender<Result<bool, AudioError>>,
    },
    ConnectionLost {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Estado visible de la sesión, para mostrar
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub queue: QueueSnapshot,
    pub volume: f32,
    pub muted: bool,
    pub channel_id: Option<ChannelId>,
    pub streaming: bool,
}

/// Extremo cliente de la sesión de una guild
#[derive(Clone)]
pub struct SessionHandle {
    guild_id: GuildId,
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Lanza la tarea de la sesión y devuelve su handle
    pub fn spawn(guild_id: GuildId, deps: SessionDeps) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (session, events, internal) = GuildSession::new(guild_id, deps);
        tokio::spawn(session.run(rx, events, internal));

        Self { guild_id, tx }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, AudioError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| AudioError::SessionClosed)?;
        response.await.map_err(|_| AudioError::SessionClosed)
    }

    /// Conecta al canal; devuelve `true` si se reutilizó la conexión
    pub async fn connect(&self, channel_id: ChannelId, force_new: bool) -> Result<bool, AudioError> {
        self.request(|reply| SessionCommand::Connect {
            channel_id,
            force_new,
            reply,
        })
        .await?
    }

    pub async fn enqueue(&self, item: QueueItem, position: Option<usize>) -> Result<AddOutcome, AudioError> {
        self.request(|reply| SessionCommand::Enqueue { item, position, reply })
            .await?
    }

    pub async fn remove(&self, index: usize) -> Result<QueueItem, AudioError> {
        self.request(|reply| SessionCommand::Remove { index, reply }).await?
    }

    pub async fn shuffle(&self) -> Result<(), AudioError> {
        self.request(|reply| SessionCommand::Shuffle { reply }).await
    }

    pub async fn clear(&self, all: bool) -> Result<(), AudioError> {
        self.request(|reply| SessionCommand::Clear { all, reply }).await
    }

    pub async fn toggle_loop(&self, value: Option<bool>) -> Result<bool, AudioError> {
        self.request(|reply| SessionCommand::ToggleLoop { value, reply }).await
    }

    pub async fn set_loop_type(&self, loop_type: LoopType) -> Result<(), AudioError> {
        self.request(|reply| SessionCommand::SetLoopType { loop_type, reply })
            .await
    }

    pub async fn toggle_autoplay(&self, value: Option<bool>) -> Result<bool, AudioError> {
        self.request(|reply| SessionCommand::ToggleAutoplay { value, reply })
            .await
    }

    pub async fn pause(&self) -> Result<(), AudioError> {
        self.request(|reply| SessionCommand::Pause { reply }).await?
    }

    pub async fn resume(&self) -> Result<(), AudioError> {
        self.request(|reply| SessionCommand::Resume { reply }).await?
    }

    pub async fn skip(&self) -> Result<(), AudioError> {
        self.request(|reply| SessionCommand::Skip { reply }).await?
    }

    pub async fn disconnect(&self) -> Result<(), AudioError> {
        self.request(|reply| SessionCommand::Disconnect { reply }).await?
    }

    pub async fn set_volume(&self, value: f32) -> Result<f32, AudioError> {
        self.change_volume(VolumeChange::Set(value)).await
    }

    pub async fn increase_volume(&self, amount: f32) -> Result<f32, AudioError> {
        self.change_volume(VolumeChange::Increase(amount)).await
    }

    pub async fn decrease_volume(&self, amount: f32) -> Result<f32, AudioError> {
        self.change_volume(VolumeChange::Decrease(amount)).await
    }

    async fn change_volume(&self, change: VolumeChange) -> Result<f32, AudioError> {
        self.request(|reply| SessionCommand::Volume { change, reply }).await?
    }

    pub async fn toggle_mute(&self, value: Option<bool>) -> Result<bool, AudioError> {
        self.request(|reply| SessionCommand::ToggleMute { value, reply })
            .await?
    }

    /// La plataforma nos sacó del canal de voz
    pub async fn connection_lost(&self) -> Result<(), AudioError> {
        self.request(|reply| SessionCommand::ConnectionLost { reply }).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, AudioError> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamPurpose {
    /// El item en la cabeza de la cola
    Item,
    /// "Now playing: ..." antes del siguiente item
    Announcement,
    /// "Disconnecting..." antes de salir por inactividad
    Farewell,
}

struct ActiveStream {
    generation: u64,
    purpose: StreamPurpose,
    handle: Box<dyn StreamHandle>,
    volume_ratio: f32,
    started: bool,
}

impl VolumeOutput for ActiveStream {
    fn apply_volume(&self, level: f32) -> Result<(), PlaybackError> {
        self.handle.set_volume(level * self.volume_ratio)
    }
}

enum InternalEvent {
    IdleElapsed(u64),
    AutoplayReady(QueueItem),
}

pub struct GuildSession {
    guild_id: GuildId,
    deps: SessionDeps,
    supervisor: ConnectionSupervisor,
    queue: QueueManager,
    volume: VolumeManager,
    connection: Option<Arc<dyn VoiceConnection>>,
    active: Option<ActiveStream>,
    generation: u64,
    idle: Option<CancellationToken>,
    idle_epoch: u64,
    rng: StdRng,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    internal: mpsc::UnboundedSender<InternalEvent>,
}

impl GuildSession {
    fn new(
        guild_id: GuildId,
        deps: SessionDeps,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<PlaybackEvent>,
        mpsc::UnboundedReceiver<InternalEvent>,
    ) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (internal, internal_rx) = mpsc::unbounded_channel();
        let settings = deps.settings;

        let session = Self {
            guild_id,
            supervisor: ConnectionSupervisor::new(guild_id, deps.gateway.clone(), settings.settle_delay),
            queue: QueueManager::new(),
            volume: VolumeManager::new(guild_id, deps.configs.clone(), settings.volume),
            deps,
            connection: None,
            active: None,
            generation: 0,
            idle: None,
            idle_epoch: 0,
            rng: StdRng::from_entropy(),
            events,
            internal,
        };

        (session, events_rx, internal_rx)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut events: mpsc::UnboundedReceiver<PlaybackEvent>,
        mut internal: mpsc::UnboundedReceiver<InternalEvent>,
    ) {
        info!("🎛️ Sesión de audio iniciada para guild {}", self.guild_id);

        loop {
            // Los eventos de la plataforma se atienden antes que los comandos
            tokio::select! {
                biased;
                Some(event) = events.recv() => self.on_playback(event).await,
                Some(event) = internal.recv() => self.on_internal(event).await,
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
            }
        }

        self.cancel_idle();
        self.stop_active();
        info!("🛑 Sesión de audio cerrada para guild {}", self.guild_id);
    }

    async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect {
                channel_id,
                force_new,
                reply,
            } => {
                let _ = reply.send(self.connect(channel_id, force_new).await);
            }
            SessionCommand::Enqueue { item, position, reply } => {
                let _ = reply.send(self.enqueue(item, position).await);
            }
            SessionCommand::Remove { index, reply } => {
                let _ = reply.send(self.remove(index).await);
            }
            SessionCommand::Shuffle { reply } => {
                self.queue.shuffle_items_with(&mut self.rng);
                let _ = reply.send(());
            }
            SessionCommand::Clear { all, reply } => {
                self.clear(all);
                let _ = reply.send(());
            }
            SessionCommand::ToggleLoop { value, reply } => {
                let _ = reply.send(self.queue.toggle_loop(value));
            }
            SessionCommand::SetLoopType { loop_type, reply } => {
                self.queue.set_loop_type(loop_type);
                let _ = reply.send(());
            }
            SessionCommand::ToggleAutoplay { value, reply } => {
                let _ = reply.send(self.queue.toggle_autoplay(value));
            }
            SessionCommand::Pause { reply } => {
                let _ = reply.send(self.pause());
            }
            SessionCommand::Resume { reply } => {
                let _ = reply.send(self.resume());
            }
            SessionCommand::Skip { reply } => {
                let _ = reply.send(self.skip().await);
            }
            SessionCommand::Disconnect { reply } => {
                let _ = reply.send(self.disconnect().await);
            }
            SessionCommand::Volume { change, reply } => {
                let _ = reply.send(self.change_volume(change).await);
            }
            SessionCommand::ToggleMute { value, reply } => {
                let output = self.active.as_ref().map(|active| active as &dyn VolumeOutput);
                let _ = reply.send(self.volume.toggle_mute(value, output).await);
            }
            SessionCommand::ConnectionLost { reply } => {
                self.connection_lost().await;
                let _ = reply.send(());
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn connect(&mut self, channel_id: ChannelId, force_new: bool) -> Result<bool, AudioError> {
        let result = self
            .supervisor
            .create_connection(self.connection.clone(), &mut self.queue, channel_id, force_new)
            .await;

        match result {
            Ok(outcome) => {
                if !outcome.reused {
                    self.cancel_idle();
                    self.stop_active();
                }
                self.connection = Some(outcome.connection);
                Ok(outcome.reused)
            }
            Err(e) => {
                error!("❌ Error conectando en guild {}: {}", self.guild_id, e);
                if self.queue.is_empty() {
                    self.stop_active();
                }
                self.connection = self.deps.gateway.current(self.guild_id).await;
                Err(e.into())
            }
        }
    }

    async fn enqueue(&mut self, item: QueueItem, position: Option<usize>) -> Result<AddOutcome, AudioError> {
        // Lo que suena se queda en la cabeza: "posición 1" pasa a ser "lo siguiente"
        let position = match position {
            Some(1) if self.head_is_sounding() => Some(2),
            other => other,
        };

        let outcome = self.queue.add_item(item, position)?;
        self.cancel_idle();

        if outcome.starts_playback {
            self.play_head().await;
        }
        Ok(outcome)
    }

    async fn remove(&mut self, index: usize) -> Result<QueueItem, AudioError> {
        let removed = self.queue.remove_item(index)?;

        if index == 1 {
            if self.active.as_ref().map(|a| a.purpose) != Some(StreamPurpose::Farewell) {
                self.stop_active();
            }
            if self.queue.is_empty() {
                self.schedule_idle();
            } else {
                self.play_head().await;
            }
        }
        Ok(removed)
    }

    fn clear(&mut self, all: bool) {
        self.queue.clear_items(all);

        if self.queue.is_empty() {
            self.stop_active();
            self.schedule_idle();
        }
    }

    fn pause(&mut self) -> Result<(), AudioError> {
        self.ensure_connected()?;
        let active = self.active.as_ref().ok_or(AudioError::NothingPlaying)?;
        active.handle.pause()?;
        info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        self.ensure_connected()?;
        let active = self.active.as_ref().ok_or(AudioError::NothingPlaying)?;
        active.handle.resume()?;
        info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        Ok(())
    }

    /// Termina el stream actual; el evento de fin hace avanzar la cola
    async fn skip(&mut self) -> Result<(), AudioError> {
        self.ensure_connected()?;
        if self.queue.is_empty() {
            return Err(AudioError::NothingPlaying);
        }

        match self.active.as_ref().map(|active| active.purpose) {
            Some(StreamPurpose::Item) => {
                if let Some(active) = self.active.as_ref() {
                    active.handle.stop()?;
                }
            }
            // Se corta solo el anuncio; la cabeza todavía no sonó
            Some(StreamPurpose::Announcement) => self.play_head().await,
            // Cabeza detenida por un error: no hay stream que termine
            Some(StreamPurpose::Farewell) | None => self.complete_item().await,
        }

        info!("⏭️ Item saltado en guild {}", self.guild_id);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AudioError> {
        if self.connection.is_none() && self.deps.gateway.current(self.guild_id).await.is_none() {
            return Err(AudioError::NotConnected);
        }

        self.queue.clear_items(true);
        self.cancel_idle();
        self.stop_active();
        self.connection = None;
        self.supervisor.disconnect().await?;
        Ok(())
    }

    async fn connection_lost(&mut self) {
        if self.connection.is_none() {
            return;
        }
        // Aviso tardío de una reconexión forzada: la plataforma ya tiene otra llamada
        if self.deps.gateway.current(self.guild_id).await.is_some() {
            debug!("Aviso de desconexión ignorado en guild {}: sigue conectado", self.guild_id);
            return;
        }

        warn!("⚠️ Conexión de voz perdida en guild {}", self.guild_id);
        self.queue.clear_items(true);
        self.cancel_idle();
        self.stop_active();
        self.connection = None;
    }

    async fn change_volume(&mut self, change: VolumeChange) -> Result<f32, AudioError> {
        let output = self.active.as_ref().map(|active| active as &dyn VolumeOutput);
        match change {
            VolumeChange::Set(value) => self.volume.set_volume(value, true, true, output).await,
            VolumeChange::Increase(amount) => self.volume.increase_volume(amount, output).await,
            VolumeChange::Decrease(amount) => self.volume.decrease_volume(amount, output).await,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            queue: self.queue.snapshot(),
            volume: self.volume.volume(),
            muted: self.volume.muted(),
            channel_id: self.connection.as_ref().map(|c| c.channel_id()),
            streaming: self.active.is_some(),
        }
    }

    async fn on_playback(&mut self, event: PlaybackEvent) {
        let purpose = match self.active.as_ref() {
            Some(active) if active.generation == event.generation => active.purpose,
            _ => {
                debug!("Evento {:?} de un stream anterior ignorado", event);
                return;
            }
        };

        match event.kind {
            PlaybackEventKind::Started => self.on_started(purpose).await,
            PlaybackEventKind::Finished => {
                self.active = None;
                match purpose {
                    StreamPurpose::Item => self.complete_item().await,
                    StreamPurpose::Announcement => self.play_head().await,
                    StreamPurpose::Farewell => self.farewell_done().await,
                }
            }
            PlaybackEventKind::Failed(reason) => {
                self.active = None;
                match purpose {
                    StreamPurpose::Item => {
                        let error = PlaybackError::Stream(reason);
                        error!("❌ Error de reproducción en guild {}: {}", self.guild_id, error);
                        if let Some(head) = self.queue.head() {
                            head.player.failed(&error);
                        }
                    }
                    StreamPurpose::Announcement => {
                        warn!("⚠️ Falló el anuncio en guild {}: {}", self.guild_id, reason);
                        self.play_head().await;
                    }
                    StreamPurpose::Farewell => {
                        warn!("⚠️ Falló el anuncio de salida en guild {}: {}", self.guild_id, reason);
                        self.farewell_done().await;
                    }
                }
            }
        }
    }

    async fn on_started(&mut self, purpose: StreamPurpose) {
        match self.active.as_mut() {
            // songbird también avisa Play al reanudar
            Some(active) if !active.started => active.started = true,
            _ => return,
        }

        if purpose == StreamPurpose::Item {
            self.cancel_idle();
            if let Some(head) = self.queue.head() {
                info!("🎵 Reproduciendo en guild {}: {}", self.guild_id, head.description);
                head.player.started();
            }
        }

        let level = self.volume.output_level().await;
        if let Some(active) = self.active.as_ref() {
            if let Err(e) = active.apply_volume(level) {
                warn!("⚠️ No se pudo aplicar el volumen en guild {}: {}", self.guild_id, e);
            }
        }
    }

    async fn on_internal(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::IdleElapsed(epoch) => self.on_idle(epoch).await,
            InternalEvent::AutoplayReady(item) => {
                if !self.queue.autoplay_enabled() {
                    debug!("Autoplay desactivado, descartando {}", item.description);
                    return;
                }
                if !self.queue.is_empty() {
                    debug!("La cola ya tiene items, descartando {}", item.description);
                    return;
                }
                info!("📻 Autoplay agrega: {}", item.description);
                if let Err(e) = self.enqueue(item, None).await {
                    warn!("⚠️ Autoplay no pudo agregar el item: {}", e);
                }
            }
        }
    }

    /// Quita el item terminado y decide qué sigue
    async fn complete_item(&mut self) {
        let finished = match self.queue.remove_item(1) {
            Ok(item) => item,
            Err(e) => {
                debug!("Nada que completar en guild {}: {}", self.guild_id, e);
                return;
            }
        };
        finished.player.ended();
        self.request_autoplay(&finished);

        match plan_advance(&mut self.queue, &mut self.rng) {
            Advance::Idle => self.schedule_idle(),
            Advance::PlayNext => self.announce_or_play().await,
        }
    }

    fn request_autoplay(&self, finished: &QueueItem) {
        if !self.queue.autoplay_enabled() || self.queue.loop_enabled() || !self.queue.is_empty() {
            return;
        }
        let ItemKind::Youtube(video) = &finished.kind else {
            return;
        };
        let Some(source) = self.deps.autoplay.clone() else {
            debug!("Autoplay sin fuente configurada en guild {}", self.guild_id);
            return;
        };

        let video = video.clone();
        let internal = self.internal.clone();
        let guild_id = self.guild_id;
        tokio::spawn(async move {
            match source.related_item(&video).await {
                Ok(Some(item)) => {
                    let _ = internal.send(InternalEvent::AutoplayReady(item));
                }
                Ok(None) => info!("📻 Sin videos relacionados para {} en guild {}", video.id, guild_id),
                Err(e) => warn!("⚠️ Error buscando autoplay para guild {}: {}", guild_id, e),
            }
        });
    }

    async fn announce_or_play(&mut self) {
        let Some(head) = self.queue.head() else {
            return;
        };
        let text = format!("Now playing: {}", head.description);

        let config = self.guild_config().await;
        if config.queue_tts_voice
            && self
                .play_announcement(&text, StreamPurpose::Announcement, &config)
                .await
        {
            return;
        }
        self.play_head().await;
    }

    async fn play_head(&mut self) {
        let Some(item) = self.queue.head().cloned() else {
            return;
        };
        self.stop_active();
        self.cancel_idle();

        let Some(connection) = self.connection.clone() else {
            warn!("⚠️ Sin conexión de voz en guild {}, no se puede reproducir {}", self.guild_id, item.description);
            item.player.failed(&PlaybackError::NotConnected);
            return;
        };

        let generation = self.next_generation();
        let notifier = PlaybackNotifier::new(generation, self.events.clone());
        let level = self.volume.output_level().await;

        match item.player.play(connection.as_ref(), level, notifier).await {
            Ok(handle) => {
                debug!("Stream {} iniciado en guild {}: {}", generation, self.guild_id, item.description);
                self.active = Some(ActiveStream {
                    generation,
                    purpose: StreamPurpose::Item,
                    handle,
                    volume_ratio: item.player.volume_ratio(),
                    started: false,
                });
            }
            Err(e) => {
                error!("❌ No se pudo reproducir {} en guild {}: {}", item.description, self.guild_id, e);
                item.player.failed(&e);
            }
        }
    }

    /// Reproduce un anuncio hablado; `false` si no se pudo
    async fn play_announcement(&mut self, text: &str, purpose: StreamPurpose, config: &GuildConfig) -> bool {
        let Some(connection) = self.connection.clone() else {
            return false;
        };

        let source = match self
            .deps
            .speech
            .synthesize(text, config.tts_provider, config.tts_voice())
            .await
        {
            Ok(source) => source,
            Err(e) => {
                warn!("⚠️ No se pudo sintetizar \"{}\" en guild {}: {}", text, self.guild_id, e);
                return false;
            }
        };

        self.stop_active();
        let generation = self.next_generation();
        let ratio = self.deps.settings.announcement_volume_ratio;
        let level = self.volume.output_level().await * ratio;
        let notifier = PlaybackNotifier::new(generation, self.events.clone());

        match connection.play(source, level, notifier).await {
            Ok(handle) => {
                debug!("🗣️ Anuncio en guild {}: {}", self.guild_id, text);
                self.active = Some(ActiveStream {
                    generation,
                    purpose,
                    handle,
                    volume_ratio: ratio,
                    started: false,
                });
                true
            }
            Err(e) => {
                warn!("⚠️ No se pudo reproducir el anuncio en guild {}: {}", self.guild_id, e);
                false
            }
        }
    }

    fn schedule_idle(&mut self) {
        self.cancel_idle();
        if self.connection.is_none() {
            return;
        }

        self.idle_epoch += 1;
        let epoch = self.idle_epoch;
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let internal = self.internal.clone();
        let timeout = self.deps.settings.idle_timeout;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    let _ = internal.send(InternalEvent::IdleElapsed(epoch));
                }
            }
        });

        self.idle = Some(token);
        debug!("⏲️ Desconexión por inactividad programada en {:?} para guild {}", timeout, self.guild_id);
    }

    fn cancel_idle(&mut self) {
        if let Some(token) = self.idle.take() {
            token.cancel();
            debug!("⏲️ Desconexión por inactividad cancelada en guild {}", self.guild_id);
        }
    }

    async fn on_idle(&mut self, epoch: u64) {
        if self.idle.is_none() || epoch != self.idle_epoch {
            debug!("Temporizador de inactividad obsoleto ignorado");
            return;
        }
        self.idle = None;

        if !self.queue.is_empty() || self.active.is_some() || self.connection.is_none() {
            debug!("Guild {} volvió a estar activa, no se desconecta", self.guild_id);
            return;
        }

        info!("💤 Guild {} inactiva, desconectando", self.guild_id);
        let config = self.guild_config().await;
        if config.disconnect_tts_voice
            && self
                .play_announcement("Disconnecting...", StreamPurpose::Farewell, &config)
                .await
        {
            return;
        }
        self.farewell_done().await;
    }

    async fn farewell_done(&mut self) {
        if let Err(e) = self.disconnect().await {
            warn!("⚠️ Error al desconectar guild {}: {}", self.guild_id, e);
        }
    }

    async fn guild_config(&self) -> GuildConfig {
        match self.deps.configs.fetch(self.guild_id).await {
            Ok(config) => config,
            Err(e) => {
                warn!("⚠️ Configuración de guild {} no disponible: {}", self.guild_id, e);
                GuildConfig::default()
            }
        }
    }

    fn stop_active(&mut self) {
        if let Some(active) = self.active.take() {
            if let Err(e) = active.handle.stop() {
                debug!("Error deteniendo stream {}: {}", active.generation, e);
            }
        }
    }

    fn head_is_sounding(&self) -> bool {
        matches!(
            self.active.as_ref().map(|active| active.purpose),
            Some(StreamPurpose::Item)
        )
    }

    fn ensure_connected(&self) -> Result<(), AudioError> {
        if self.connection.is_none() {
            return Err(AudioError::NotConnected);
        }
        Ok(())
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}
