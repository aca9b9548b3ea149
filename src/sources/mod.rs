//! Builders that turn a user request into a ready-to-enqueue [`QueueItem`].
//!
//! Every builder wires a [`QueueItemPlayer`] whose stream maker produces a
//! fresh songbird [`Input`] on each play, so looping items never reuse a
//! consumed stream.

pub mod youtube;

use anyhow::Result;
use songbird::input::{File, Input};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::error;

use crate::{
    audio::{
        error::PlaybackError,
        player::QueueItemPlayer,
        queue::{ItemKind, QueueItem, VideoInfo},
    },
    speech::{SpeechSynthesizer, TtsProvider},
};

pub use youtube::{AutoplaySource, YouTubeClient};

/// Aviso de texto cuando un item empieza a sonar (recibe la descripción)
pub type Announcer = Arc<dyn Fn(&str) + Send + Sync>;

/// Item de YouTube reproducido vía yt-dlp
pub fn youtube_item(client: YouTubeClient, video: VideoInfo, announcer: Option<Announcer>) -> QueueItem {
    let url = video.url.clone();
    let description = video.title.clone();

    let player = QueueItemPlayer::new(move || {
        let input = client.input(&url);
        async move { Ok::<_, PlaybackError>(input) }
    });

    QueueItem::new(
        ItemKind::Youtube(video),
        description.clone(),
        Arc::new(with_hooks(player, description, announcer)),
    )
}

/// Item de texto a voz; el audio se sintetiza en cada reproducción
pub fn tts_item(
    speech: Arc<dyn SpeechSynthesizer>,
    text: String,
    provider: TtsProvider,
    voice: String,
    announcer: Option<Announcer>,
) -> QueueItem {
    let description = format!("TTS: {}", text);
    let kind = ItemKind::Tts {
        text: text.clone(),
        provider,
        voice: voice.clone(),
    };

    let player = QueueItemPlayer::new(move || {
        let speech = speech.clone();
        let text = text.clone();
        let voice = voice.clone();
        async move {
            speech
                .synthesize(&text, provider, &voice)
                .await
                .map_err(|e| PlaybackError::Source(e.to_string()))
        }
    });

    QueueItem::new(kind, description.clone(), Arc::new(with_hooks(player, description, announcer)))
}

/// Item de un archivo mp3 dentro del directorio de sonidos
pub fn mp3_item(sounds_dir: &Path, name: &str, announcer: Option<Announcer>) -> Result<QueueItem> {
    let filename = sound_path(sounds_dir, name)?;
    let description = name.to_string();

    let path = filename.clone();
    let player = QueueItemPlayer::new(move || {
        let input: Input = File::new(path.clone()).into();
        async move { Ok::<_, PlaybackError>(input) }
    });

    Ok(QueueItem::new(
        ItemKind::Mp3 { filename },
        description.clone(),
        Arc::new(with_hooks(player, description, announcer)),
    ))
}

/// Resuelve el nombre de un sonido sin permitir salir del directorio
fn sound_path(sounds_dir: &Path, name: &str) -> Result<PathBuf> {
    let name = name.trim();
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        anyhow::bail!("Nombre de sonido inválido: {}", name);
    }

    let file_name = if name.ends_with(".mp3") {
        name.to_string()
    } else {
        format!("{}.mp3", name)
    };
    let path = sounds_dir.join(file_name);

    if !path.is_file() {
        anyhow::bail!("No existe el sonido: {}", name);
    }
    Ok(path)
}

fn with_hooks(player: QueueItemPlayer, description: String, announcer: Option<Announcer>) -> QueueItemPlayer {
    let failed = description.clone();
    let player = player.on_error(move |e| error!("❌ Error reproduciendo {}: {}", failed, e));

    match announcer {
        Some(announce) => player.on_start(move || announce(&description)),
        None => player,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::player::ItemPlayer;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    fn sounds_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("disbot-sounds-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("airhorn.mp3"), b"ID3").unwrap();
        dir
    }

    #[test]
    fn mp3_names_resolve_inside_sounds_dir() {
        let dir = sounds_dir("resolve");

        let item = mp3_item(&dir, "airhorn", None).unwrap();

        assert_eq!(item.description, "airhorn");
        assert_eq!(
            item.kind,
            ItemKind::Mp3 {
                filename: dir.join("airhorn.mp3")
            }
        );
        assert!(mp3_item(&dir, "airhorn.mp3", None).is_ok());
    }

    #[test]
    fn mp3_names_cannot_escape_or_be_missing() {
        let dir = sounds_dir("escape");

        assert!(mp3_item(&dir, "../secret", None).is_err());
        assert!(mp3_item(&dir, ".hidden", None).is_err());
        assert!(mp3_item(&dir, "", None).is_err());
        assert!(mp3_item(&dir, "missing", None).is_err());
    }

    #[test]
    fn youtube_items_carry_video_metadata() {
        let client = YouTubeClient::new(None).unwrap();
        let video = VideoInfo {
            id: "dQw4w9WgXcQ".to_string(),
            title: "Never Gonna Give You Up".to_string(),
            url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
            channel: Some("Rick Astley".to_string()),
            duration: None,
        };

        let item = youtube_item(client, video.clone(), None);

        assert_eq!(item.description, "Never Gonna Give You Up");
        assert_eq!(item.kind, ItemKind::Youtube(video));
    }

    #[test]
    fn announcer_receives_description_on_start() {
        let dir = sounds_dir("announce");
        let heard = Arc::new(Mutex::new(Vec::new()));
        let sink = heard.clone();
        let announcer: Announcer = Arc::new(move |description| sink.lock().push(description.to_string()));

        let item = mp3_item(&dir, "airhorn", Some(announcer)).unwrap();
        item.player.started();
        item.player.failed(&PlaybackError::NotConnected);

        assert_eq!(heard.lock().clone(), vec!["airhorn".to_string()]);
    }
}
