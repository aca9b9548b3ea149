use serenity::model::id::ChannelId;
use thiserror::Error;

/// Errores de validación de la cola. Siempre son locales y síncronos.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("invalid loop type `{0}` (expected single, multiple or shuffle)")]
    InvalidLoopType(String),
    #[error("queue positions start at 1")]
    InvalidPosition,
    #[error("no item at position {index} (queue has {len} items)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Errores al crear o usar la conexión de voz de una guild.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("unable to join voice channel {channel}: {reason}")]
    Join { channel: ChannelId, reason: String },
    #[error("unable to leave voice channel: {0}")]
    Leave(String),
}

/// Errores de reproducción de un stream concreto.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("unable to create audio stream: {0}")]
    Source(String),
    #[error("stream failed mid-playback: {0}")]
    Stream(String),
    #[error("track control failed: {0}")]
    Control(String),
    #[error("no voice connection for this guild")]
    NotConnected,
}

/// Errores visibles desde la fachada de la sesión de audio.
///
/// Cada variante corresponde a una condición que la capa de comandos
/// necesita distinguir: conexión ausente, cola vacía o fallo del stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error("not connected to a voice channel")]
    NotConnected,
    #[error("nothing is playing")]
    NothingPlaying,
    #[error("volume could not be applied: {0}")]
    Volume(String),
    #[error("the guild audio session has shut down")]
    SessionClosed,
}
