use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use regex::Regex;
use serde::Deserialize;
use songbird::input::{Input, YoutubeDl};
use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::audio::queue::{QueueItem, VideoInfo};

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";

/// Cuántos de los primeros relacionados se consideran para autoplay
const AUTOPLAY_CANDIDATES: usize = 3;

/// Busca con qué seguir cuando la cola se queda sin items
#[async_trait]
pub trait AutoplaySource: Send + Sync {
    async fn related_item(&self, video: &VideoInfo) -> Result<Option<QueueItem>>;
}

/// Cliente para interactuar con YouTube/yt-dlp
#[derive(Clone)]
pub struct YouTubeClient {
    http: reqwest::Client,
    api_key: Option<String>,
    // Limitar procesos yt-dlp concurrentes
    rate_limiter: Arc<Semaphore>,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: String,
    duration: Option<f64>,
    uploader: Option<String>,
    webpage_url: String,
    is_live: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: SearchSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchSnippet {
    title: String,
    channel_title: Option<String>,
}

impl YouTubeClient {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("No se pudo crear el cliente HTTP")?;

        Ok(Self {
            http,
            api_key,
            rate_limiter: Arc::new(Semaphore::new(3)),
        })
    }

    /// Obtiene la metadata de una URL o de la primera coincidencia de una búsqueda
    pub async fn video_info(&self, query: &str) -> Result<VideoInfo> {
        let _permit = self.rate_limiter.acquire().await?;

        let target = if Self::is_youtube_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        };
        debug!("📊 Obteniendo info de: {}", target);

        let output = Command::new("yt-dlp")
            .args(["--no-playlist", "--dump-json", "--no-warnings", target.as_str()])
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .find(|line| !line.trim().is_empty())
            .with_context(|| format!("Sin resultados para \"{}\"", query))?;
        let info: YtDlpInfo = serde_json::from_str(line).context("Error al parsear respuesta de yt-dlp")?;

        info_to_video(info)
    }

    /// Crea un Input de Songbird para reproducción
    pub fn input(&self, url: &str) -> Input {
        YoutubeDl::new(self.http.clone(), url.to_string()).into()
    }

    /// Videos parecidos según la YouTube Data API, sin incluir el original
    pub async fn related_videos(&self, video: &VideoInfo, limit: usize) -> Result<Vec<VideoInfo>> {
        let Some(api_key) = self.api_key.as_deref() else {
            anyhow::bail!("YOUTUBE_API_KEY no configurada");
        };

        let query = match &video.channel {
            Some(channel) => format!("{} {}", video.title, channel),
            None => video.title.clone(),
        };
        let max_results = (limit + 1).to_string();

        let response = self
            .http
            .get(SEARCH_URL)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("videoEmbeddable", "true"),
                ("maxResults", max_results.as_str()),
                ("q", query.as_str()),
                ("key", api_key),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("YouTube API error: {} - {}", status, error_text);
        }

        let body = response.text().await?;
        let mut related = parse_search_response(&body)?;
        related.retain(|candidate| candidate.id != video.id);
        related.truncate(limit);

        Ok(related)
    }

    /// Verifica si una URL es válida para YouTube
    pub fn is_youtube_url(url: &str) -> bool {
        static YOUTUBE_URL: OnceLock<Regex> = OnceLock::new();
        YOUTUBE_URL
            .get_or_init(|| {
                Regex::new(r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?v=|embed/|v/|shorts/)|youtu\.be/|music\.youtube\.com/)")
                    .unwrap()
            })
            .is_match(url)
    }

    /// Extrae el id de 11 caracteres de una URL de YouTube
    pub fn extract_video_id(url: &str) -> Option<String> {
        static VIDEO_ID: OnceLock<Regex> = OnceLock::new();
        VIDEO_ID
            .get_or_init(|| {
                Regex::new(r"(?:youtube\.com/watch\?(?:.*&)?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/shorts/)([a-zA-Z0-9_-]{11})")
                    .unwrap()
            })
            .captures(url)
            .and_then(|captures| captures.get(1))
            .map(|id| id.as_str().to_string())
    }

    /// Verifica que yt-dlp esté instalado y devuelve su versión
    pub async fn ytdlp_version() -> Result<String> {
        let output = Command::new("yt-dlp")
            .arg("--version")
            .output()
            .await
            .context("yt-dlp no está instalado o no está en el PATH")?;

        if !output.status.success() {
            anyhow::bail!("yt-dlp --version falló: {}", String::from_utf8_lossy(&output.stderr).trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl AutoplaySource for YouTubeClient {
    async fn related_item(&self, video: &VideoInfo) -> Result<Option<QueueItem>> {
        let related = self.related_videos(video, AUTOPLAY_CANDIDATES).await?;
        let next = {
            let mut rng = rand::thread_rng();
            related.choose(&mut rng).cloned()
        };
        let Some(next) = next else {
            warn!("⚠️ YouTube no devolvió relacionados para {}", video.id);
            return Ok(None);
        };

        info!("📻 Autoplay eligió: {}", next.title);
        Ok(Some(super::youtube_item(self.clone(), next, None)))
    }
}

fn info_to_video(info: YtDlpInfo) -> Result<VideoInfo> {
    if info.is_live.unwrap_or(false) {
        anyhow::bail!("Live streams aren't supported: {}", info.title);
    }

    Ok(VideoInfo {
        id: info.id,
        title: info.title,
        url: info.webpage_url,
        channel: info.uploader,
        duration: info.duration.map(Duration::from_secs_f64),
    })
}

fn parse_search_response(body: &str) -> Result<Vec<VideoInfo>> {
    let response: SearchResponse = serde_json::from_str(body).context("Respuesta inválida de YouTube API")?;

    Ok(response
        .items
        .into_iter()
        .filter_map(|item| {
            let id = item.id.video_id?;
            Some(VideoInfo {
                url: format!("https://www.youtube.com/watch?v={}", id),
                id,
                title: item.snippet.title,
                channel: item.snippet.channel_title,
                duration: None,
            })
        })
        .collect())
}
