use chrono::{DateTime, Utc};
use rand::{seq::SliceRandom, Rng};
use serenity::model::id::UserId;
use std::{fmt, path::PathBuf, str::FromStr, sync::Arc, time::Duration};
use tracing::{debug, info};

use super::{error::QueueError, player::ItemPlayer};
use crate::speech::TtsProvider;

/// Metadata de un video de YouTube
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub url: String,
    pub channel: Option<String>,
    pub duration: Option<Duration>,
}

/// Tipo de item en la cola, con su metadata específica
#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Youtube(VideoInfo),
    Tts {
        text: String,
        provider: TtsProvider,
        voice: String,
    },
    Mp3 {
        filename: PathBuf,
    },
    Other,
}

impl ItemKind {
    pub fn label(&self) -> &'static str {
        match self {
            ItemKind::Youtube(_) => "youtube",
            ItemKind::Tts { .. } => "tts",
            ItemKind::Mp3 { .. } => "mp3",
            ItemKind::Other => "other",
        }
    }
}

#[derive(Clone)]
pub struct QueueItem {
    pub kind: ItemKind,
    pub description: String,
    pub player: Arc<dyn ItemPlayer>,
    pub requested_by: Option<UserId>,
    pub added_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(kind: ItemKind, description: impl Into<String>, player: Arc<dyn ItemPlayer>) -> Self {
        Self {
            kind,
            description: description.into(),
            player,
            requested_by: None,
            added_at: Utc::now(),
        }
    }

    pub fn with_requested_by(mut self, user_id: UserId) -> Self {
        self.requested_by = Some(user_id);
        self
    }

    /// Dos items son el mismo si comparten el mismo player
    pub fn same_as(&self, other: &QueueItem) -> bool {
        Arc::ptr_eq(&self.player, &other.player)
    }
}

impl fmt::Debug for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueItem")
            .field("kind", &self.kind.label())
            .field("description", &self.description)
            .field("requested_by", &self.requested_by)
            .finish_non_exhaustive()
    }
}

/// Cómo se reinserta el último item cuando el loop está activo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopType {
    #[default]
    Single,
    Multiple,
    Shuffle,
}

impl FromStr for LoopType {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(LoopType::Single),
            "multiple" => Ok(LoopType::Multiple),
            "shuffle" => Ok(LoopType::Shuffle),
            other => Err(QueueError::InvalidLoopType(other.to_string())),
        }
    }
}

impl fmt::Display for LoopType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopType::Single => "single",
            LoopType::Multiple => "multiple",
            LoopType::Shuffle => "shuffle",
        };
        f.write_str(name)
    }
}

/// Resultado de `add_item`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    /// Posición final (empezando en 1)
    pub position: usize,
    /// La cola estaba vacía: el item recién agregado debe empezar a sonar
    pub starts_playback: bool,
}

/// Cola de reproducción de una guild.
///
/// `items[0]` es a la vez "lo que suena ahora" y "lo próximo que se
/// quita". Todas las posiciones públicas empiezan en 1.
#[derive(Debug, Default)]
pub struct QueueManager {
    items: Vec<QueueItem>,
    last_removed: Option<QueueItem>,
    loop_enabled: bool,
    loop_type: LoopType,
    autoplay_enabled: bool,
}

impl QueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un item en la posición indicada (por defecto al final)
    pub fn add_item(&mut self, item: QueueItem, position: Option<usize>) -> Result<AddOutcome, QueueError> {
        let was_empty = self.items.is_empty();
        let position = self.insert_item(item, position)?;

        Ok(AddOutcome {
            position,
            starts_playback: was_empty,
        })
    }

    /// Inserta sin señalar inicio de reproducción (reinserción por loop)
    pub fn insert_item(&mut self, item: QueueItem, position: Option<usize>) -> Result<usize, QueueError> {
        let index = match position {
            Some(0) => return Err(QueueError::InvalidPosition),
            Some(position) => (position - 1).min(self.items.len()),
            None => self.items.len(),
        };

        info!("➕ Agregado a la cola en posición {}: {}", index + 1, item.description);
        self.items.insert(index, item);
        Ok(index + 1)
    }

    /// Elimina el item en la posición indicada
    pub fn remove_item(&mut self, index: usize) -> Result<QueueItem, QueueError> {
        if index == 0 || index > self.items.len() {
            return Err(QueueError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }

        let removed = self.items.remove(index - 1);
        if index == 1 {
            self.last_removed = Some(removed.clone());
        }

        debug!("❌ Item eliminado en posición {}: {}", index, removed.description);
        Ok(removed)
    }

    /// Mezcla la cola sin mover el item actual
    pub fn shuffle_items(&mut self) {
        self.shuffle_items_with(&mut rand::thread_rng());
    }

    pub fn shuffle_items_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.items.len() > 2 {
            self.items[1..].shuffle(rng);
        }
        info!("🔀 Cola mezclada");
    }

    /// Limpia la cola. Desactiva loop y autoplay antes de tocar los items.
    pub fn clear_items(&mut self, all: bool) {
        self.toggle_loop(Some(false));
        self.toggle_autoplay(Some(false));

        if all {
            self.items.clear();
        } else {
            self.items.truncate(1);
        }
        info!("🗑️ Cola limpiada (todo: {})", all);
    }

    pub fn toggle_loop(&mut self, value: Option<bool>) -> bool {
        self.loop_enabled = value.unwrap_or(!self.loop_enabled);
        self.loop_enabled
    }

    pub fn set_loop_type(&mut self, loop_type: LoopType) {
        self.loop_type = loop_type;
        match loop_type {
            LoopType::Single => info!("🔂 Loop de un solo item"),
            LoopType::Multiple => info!("🔁 Loop de toda la cola"),
            LoopType::Shuffle => info!("🔀 Loop aleatorio"),
        }
    }

    pub fn toggle_autoplay(&mut self, value: Option<bool>) -> bool {
        self.autoplay_enabled = value.unwrap_or(!self.autoplay_enabled);
        self.autoplay_enabled
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn head(&self) -> Option<&QueueItem> {
        self.items.first()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn last_removed(&self) -> Option<&QueueItem> {
        self.last_removed.as_ref()
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn loop_type(&self) -> LoopType {
        self.loop_type
    }

    pub fn autoplay_enabled(&self) -> bool {
        self.autoplay_enabled
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            items: self
                .items
                .iter()
                .map(|item| QueueEntry {
                    kind: item.kind.label(),
                    description: item.description.clone(),
                    requested_by: item.requested_by,
                })
                .collect(),
            loop_enabled: self.loop_enabled,
            loop_type: self.loop_type,
            autoplay_enabled: self.autoplay_enabled,
        }
    }
}

/// Copia de solo lectura de la cola, para mostrar
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    pub items: Vec<QueueEntry>,
    pub loop_enabled: bool,
    pub loop_type: LoopType,
    pub autoplay_enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub kind: &'static str,
    pub description: String,
    pub requested_by: Option<UserId>,
}

impl QueueSnapshot {
    /// Obtiene una página específica de la cola
    pub fn page(&self, page: usize, per_page: usize) -> (&[QueueEntry], usize) {
        let per_page = per_page.max(1);
        let total_pages = self.items.len().div_ceil(per_page).max(1);
        let page = page.clamp(1, total_pages);
        let start = ((page - 1) * per_page).min(self.items.len());
        let end = (start + per_page).min(self.items.len());
        (&self.items[start..end], total_pages)
    }
}
