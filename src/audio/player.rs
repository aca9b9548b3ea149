use async_trait::async_trait;
use futures::future::BoxFuture;
use rand::Rng;
use songbird::input::Input;
use std::{future::Future, sync::Arc};
use tracing::{debug, warn};

use super::{
    connection::{PlaybackNotifier, StreamHandle, VoiceConnection},
    error::PlaybackError,
    queue::{LoopType, QueueManager},
};

/// Fábrica de streams: se invoca de nuevo en cada reproducción
pub type StreamMaker = Arc<dyn Fn() -> BoxFuture<'static, Result<Input, PlaybackError>> + Send + Sync>;

type Callback = Arc<dyn Fn() + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&PlaybackError) + Send + Sync>;

/// Cómo suena un item de la cola.
///
/// La sesión de la guild entrega la conexión y el volumen de salida al
/// momento de reproducir, y notifica los callbacks según los eventos del
/// stream.
#[async_trait]
pub trait ItemPlayer: Send + Sync {
    async fn play(
        &self,
        connection: &dyn VoiceConnection,
        output_volume: f32,
        notifier: PlaybackNotifier,
    ) -> Result<Box<dyn StreamHandle>, PlaybackError>;

    fn volume_ratio(&self) -> f32 {
        1.0
    }

    fn started(&self) {}

    fn ended(&self) {}

    fn failed(&self, _error: &PlaybackError) {}
}

pub struct QueueItemPlayer {
    make_stream: StreamMaker,
    volume_ratio: f32,
    on_start: Option<Callback>,
    on_end: Option<Callback>,
    on_error: Option<ErrorCallback>,
}

impl QueueItemPlayer {
    pub fn new<F, Fut>(make_stream: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Input, PlaybackError>> + Send + 'static,
    {
        Self {
            make_stream: Arc::new(move || -> BoxFuture<'static, Result<Input, PlaybackError>> {
                Box::pin(make_stream())
            }),
            volume_ratio: 1.0,
            on_start: None,
            on_end: None,
            on_error: None,
        }
    }

    pub fn with_volume_ratio(mut self, volume_ratio: f32) -> Self {
        self.volume_ratio = volume_ratio;
        self
    }

    pub fn on_start(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(callback));
        self
    }

    pub fn on_end(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_end = Some(Arc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&PlaybackError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }
}

#[async_trait]
impl ItemPlayer for QueueItemPlayer {
    async fn play(
        &self,
        connection: &dyn VoiceConnection,
        output_volume: f32,
        notifier: PlaybackNotifier,
    ) -> Result<Box<dyn StreamHandle>, PlaybackError> {
        let source = (self.make_stream)().await?;
        debug!("Stream creado (generación {})", notifier.generation());

        connection
            .play(source, output_volume * self.volume_ratio, notifier)
            .await
    }

    fn volume_ratio(&self) -> f32 {
        self.volume_ratio
    }

    fn started(&self) {
        if let Some(callback) = &self.on_start {
            callback();
        }
    }

    fn ended(&self) {
        if let Some(callback) = &self.on_end {
            callback();
        }
    }

    fn failed(&self, error: &PlaybackError) {
        if let Some(callback) = &self.on_error {
            callback(error);
        }
    }
}

/// Qué hacer después de quitar el item que terminó
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Idle,
    PlayNext,
}

/// Aplica la política de loop sobre la cola y decide cómo continuar.
///
/// Se llama justo después de `remove_item(1)`, así que `last_removed` es
/// el item que acaba de terminar.
pub fn plan_advance<R: Rng + ?Sized>(queue: &mut QueueManager, rng: &mut R) -> Advance {
    if queue.loop_enabled() {
        if let Some(item) = queue.last_removed().cloned() {
            let position = match queue.loop_type() {
                LoopType::Single => Some(1),
                LoopType::Multiple => None,
                LoopType::Shuffle => Some(rng.gen_range(1..=queue.len() + 1)),
            };

            if let Err(e) = queue.insert_item(item, position) {
                warn!("⚠️ No se pudo reinsertar el item en loop: {}", e);
            }
        }
    }

    if queue.is_empty() {
        Advance::Idle
    } else {
        Advance::PlayNext
    }
}
