//! Test doubles for the voice platform and queue items.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::input::Input;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use super::{
    connection::{PlaybackNotifier, StreamHandle, VoiceConnection, VoiceGateway},
    error::{ConnectionError, PlaybackError},
    player::ItemPlayer,
    queue::{ItemKind, QueueItem, QueueManager, VideoInfo},
    session::{EngineSettings, SessionDeps},
};
use crate::{
    sources::youtube::AutoplaySource,
    speech::{SpeechError, SpeechSynthesizer, TtsProvider},
    storage::{GuildConfig, GuildConfigStore},
};

pub const GUILD: GuildId = GuildId::new(1);

/// Registro compartido de lo que sonó, en orden
#[derive(Clone, Default)]
pub struct PlayLog(Arc<Mutex<Vec<String>>>);

impl PlayLog {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }
}

/// Player de prueba: anota cada evento en un `PlayLog`
pub struct RecordingPlayer {
    name: String,
    log: PlayLog,
    fail_source: AtomicBool,
    plays: AtomicUsize,
}

impl RecordingPlayer {
    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn fail_source(&self, fail: bool) {
        self.fail_source.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ItemPlayer for RecordingPlayer {
    async fn play(
        &self,
        connection: &dyn VoiceConnection,
        output_volume: f32,
        notifier: PlaybackNotifier,
    ) -> Result<Box<dyn StreamHandle>, PlaybackError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        if self.fail_source.load(Ordering::SeqCst) {
            return Err(PlaybackError::Source(format!("{} unavailable", self.name)));
        }

        self.log.push(format!("play {}", self.name));
        connection
            .play(Input::from(Vec::<u8>::new()), output_volume, notifier)
            .await
    }

    fn started(&self) {
        self.log.push(format!("start {}", self.name));
    }

    fn ended(&self) {
        self.log.push(format!("end {}", self.name));
    }

    fn failed(&self, error: &PlaybackError) {
        self.log.push(format!("fail {}: {}", self.name, error));
    }
}

fn recording_player(name: &str, log: &PlayLog) -> Arc<RecordingPlayer> {
    Arc::new(RecordingPlayer {
        name: name.to_string(),
        log: log.clone(),
        fail_source: AtomicBool::new(false),
        plays: AtomicUsize::new(0),
    })
}

pub fn test_item(name: &str) -> QueueItem {
    logged_item(name, &PlayLog::default())
}

pub fn logged_item(name: &str, log: &PlayLog) -> QueueItem {
    QueueItem::new(ItemKind::Other, name, recording_player(name, log))
}

/// Item cuyo player queda accesible para el test
pub fn observed_item(name: &str, log: &PlayLog) -> (QueueItem, Arc<RecordingPlayer>) {
    let player = recording_player(name, log);
    (QueueItem::new(ItemKind::Other, name, player.clone()), player)
}

pub fn youtube_item(id: &str, log: &PlayLog) -> QueueItem {
    let video = VideoInfo {
        id: id.to_string(),
        title: id.to_string(),
        url: format!("https://www.youtube.com/watch?v={}", id),
        channel: None,
        duration: None,
    };
    QueueItem::new(ItemKind::Youtube(video), id, recording_player(id, log))
}

pub fn descriptions(queue: &QueueManager) -> Vec<String> {
    queue.items().iter().map(|item| item.description.clone()).collect()
}

pub struct FakeStream {
    notifier: PlaybackNotifier,
    volumes: Mutex<Vec<f32>>,
    paused: AtomicBool,
    stopped: AtomicBool,
}

impl FakeStream {
    pub fn initial_volume(&self) -> f32 {
        self.volumes.lock()[0]
    }

    pub fn last_volume(&self) -> f32 {
        self.volumes.lock().last().copied().unwrap_or_default()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// El stream llega a su fin por sí solo
    pub fn finish(&self) {
        self.notifier.finished();
    }

    pub fn fail(&self, reason: &str) {
        self.notifier.failed(reason);
    }
}

impl StreamHandle for Arc<FakeStream> {
    fn pause(&self) -> Result<(), PlaybackError> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<(), PlaybackError> {
        self.paused.store(false, Ordering::SeqCst);
        // songbird vuelve a emitir Play al reanudar
        self.notifier.started();
        Ok(())
    }

    fn stop(&self) -> Result<(), PlaybackError> {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.notifier.finished();
        }
        Ok(())
    }

    fn set_volume(&self, volume: f32) -> Result<(), PlaybackError> {
        self.volumes.lock().push(volume);
        Ok(())
    }
}

pub struct FakeConnection {
    channel_id: ChannelId,
    streams: Mutex<Vec<Arc<FakeStream>>>,
    fail_plays: AtomicBool,
}

impl FakeConnection {
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            streams: Mutex::new(Vec::new()),
            fail_plays: AtomicBool::new(false),
        }
    }

    pub fn streams(&self) -> Vec<Arc<FakeStream>> {
        self.streams.lock().clone()
    }

    pub fn last_stream(&self) -> Arc<FakeStream> {
        self.streams.lock().last().cloned().expect("no stream was played")
    }

    pub fn fail_plays(&self, fail: bool) {
        self.fail_plays.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn play(
        &self,
        _source: Input,
        volume: f32,
        notifier: PlaybackNotifier,
    ) -> Result<Box<dyn StreamHandle>, PlaybackError> {
        if self.fail_plays.load(Ordering::SeqCst) {
            return Err(PlaybackError::Stream("driver refused track".to_string()));
        }

        let stream = Arc::new(FakeStream {
            notifier: notifier.clone(),
            volumes: Mutex::new(vec![volume]),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        });
        self.streams.lock().push(stream.clone());
        notifier.started();

        Ok(Box::new(stream))
    }
}

#[derive(Default)]
pub struct FakeGateway {
    joins: AtomicUsize,
    leaves: AtomicUsize,
    join_error: Mutex<Option<String>>,
    current: Mutex<Option<Arc<FakeConnection>>>,
    connections: Mutex<Vec<Arc<FakeConnection>>>,
}

impl FakeGateway {
    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub fn leaves(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }

    pub fn fail_joins(&self, reason: &str) {
        *self.join_error.lock() = Some(reason.to_string());
    }

    /// Última conexión creada por `join`
    pub fn connection(&self) -> Arc<FakeConnection> {
        self.connections.lock().last().cloned().expect("never joined")
    }

    pub fn is_connected(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Simula que la plataforma perdió la conexión
    pub fn drop_connection(&self) {
        self.current.lock().take();
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn join(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, ConnectionError> {
        let join_error = self.join_error.lock().clone();
        if let Some(reason) = join_error {
            return Err(ConnectionError::Join {
                channel: channel_id,
                reason,
            });
        }

        self.joins.fetch_add(1, Ordering::SeqCst);
        let connection = Arc::new(FakeConnection::new(channel_id));
        self.connections.lock().push(connection.clone());
        *self.current.lock() = Some(connection.clone());
        Ok(connection)
    }

    async fn current(&self, _guild_id: GuildId) -> Option<Arc<dyn VoiceConnection>> {
        self.current
            .lock()
            .clone()
            .map(|connection| connection as Arc<dyn VoiceConnection>)
    }

    async fn leave(&self, _guild_id: GuildId) -> Result<(), ConnectionError> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        self.current.lock().take();
        Ok(())
    }
}

/// Configuración en memoria, modificable durante el test
#[derive(Default)]
pub struct MemoryConfigs {
    config: Mutex<GuildConfig>,
}

impl MemoryConfigs {
    pub fn with(config: GuildConfig) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }

    pub fn update(&self, change: impl FnOnce(&mut GuildConfig)) {
        change(&mut *self.config.lock());
    }
}

#[async_trait]
impl GuildConfigStore for MemoryConfigs {
    async fn fetch(&self, _guild_id: GuildId) -> anyhow::Result<GuildConfig> {
        Ok(self.config.lock().clone())
    }
}

/// Dependencias de sesión sobre fakes, sin autoplay ni despedida hablada
pub fn session_deps(gateway: Arc<FakeGateway>) -> SessionDeps {
    let config = GuildConfig {
        disconnect_tts_voice: false,
        ..GuildConfig::default()
    };

    SessionDeps {
        gateway,
        configs: Arc::new(MemoryConfigs::with(config)),
        speech: Arc::new(FakeSpeech::default()),
        autoplay: None,
        settings: EngineSettings::default(),
    }
}

/// Sintetizador que anota los textos pedidos
#[derive(Default)]
pub struct FakeSpeech {
    spoken: Mutex<Vec<String>>,
    broken: AtomicBool,
}

impl FakeSpeech {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }

    pub fn break_api(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, text: &str, _provider: TtsProvider, _voice: &str) -> Result<Input, SpeechError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(SpeechError::Empty);
        }
        self.spoken.lock().push(text.to_string());
        Ok(Input::from(Vec::<u8>::new()))
    }
}

/// Fuente de autoplay con respuestas preparadas
#[derive(Default)]
pub struct FakeAutoplay {
    items: Mutex<std::collections::VecDeque<QueueItem>>,
    requests: Mutex<Vec<String>>,
    delay: Mutex<std::time::Duration>,
}

impl FakeAutoplay {
    pub fn push(&self, item: QueueItem) {
        self.items.lock().push_back(item);
    }

    pub fn delay(&self, delay: std::time::Duration) {
        *self.delay.lock() = delay;
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl AutoplaySource for FakeAutoplay {
    async fn related_item(&self, video: &VideoInfo) -> anyhow::Result<Option<QueueItem>> {
        self.requests.lock().push(video.id.clone());
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.items.lock().pop_front())
    }
}
