//! Application change events.
//!
//! The store and the source registry publish [`AppEvent`]s on an
//! [`EventBus`]. The broadcast server and every open SSE stream subscribe
//! and project each event into the JSON they send.

use crate::broadcast::MessageType;
use crate::models::{Category, Chapter, Manga};
use serde_json::{json, Map, Value};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

/// Buffered events per subscriber before it starts lagging.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    SourceFiltersUpdated {
        source_id: i64,
        filters: Map<String, Value>,
    },
    /// The manga's `library` flag changed; the value is the updated manga.
    LibraryStatusChanged(Manga),
    MangaDetailsUpdated(Manga),
    ChapterListUpdated(Manga),
    ChapterReadStatusChanged(Chapter),
    CategoryCreated(Category),
    CategoryDeleted(Category),
    CategoryMangaAdded { category: Category, manga: Manga },
    CategoryMangaRemoved { category: Category, manga: Manga },
}

impl AppEvent {
    pub fn message_type(&self) -> MessageType {
        match self {
            AppEvent::SourceFiltersUpdated { .. } => MessageType::SourceFiltersUpdated,
            AppEvent::LibraryStatusChanged(manga) if manga.library => MessageType::LibraryAdd,
            AppEvent::LibraryStatusChanged(_) => MessageType::LibraryRemove,
            AppEvent::MangaDetailsUpdated(_) => MessageType::MangaDetailsUpdate,
            AppEvent::ChapterListUpdated(_) => MessageType::ChapterListUpdate,
            AppEvent::ChapterReadStatusChanged(_) => MessageType::ChapterReadStatusChanged,
            AppEvent::CategoryCreated(_) => MessageType::CategoryCreated,
            AppEvent::CategoryDeleted(_) => MessageType::CategoryDeleted,
            AppEvent::CategoryMangaAdded { .. } => MessageType::CategoryMangaAdded,
            AppEvent::CategoryMangaRemoved { .. } => MessageType::CategoryMangaRemoved,
        }
    }

    /// `data` of the WebSocket envelope.
    pub fn broadcast_payload(&self) -> Value {
        match self {
            AppEvent::SourceFiltersUpdated { source_id, filters } => {
                let mut data = Map::with_capacity(filters.len() + 1);
                data.insert("id".into(), json!(source_id));
                data.extend(filters.iter().map(|(k, v)| (k.clone(), v.clone())));
                Value::Object(data)
            }
            AppEvent::LibraryStatusChanged(manga) if manga.library => to_value(manga),
            AppEvent::LibraryStatusChanged(manga) => json!({ "id": manga.id }),
            AppEvent::MangaDetailsUpdated(manga) => json!({
                "id": manga.id,
                "title": manga.title,
                "description": manga.description,
                "author": manga.author,
                "artist": manga.artist,
                "thumbnail": manga.thumbnail,
                "initialized": manga.initialized,
            }),
            AppEvent::ChapterListUpdated(manga) => json!({ "id": manga.id }),
            AppEvent::ChapterReadStatusChanged(chapter) => json!({ "id": chapter.id }),
            AppEvent::CategoryCreated(category) => to_value(category),
            AppEvent::CategoryDeleted(category) => json!({ "id": category.id }),
            AppEvent::CategoryMangaAdded { category, manga }
            | AppEvent::CategoryMangaRemoved { category, manga } => {
                json!({ "category_id": category.id, "manga_id": manga.id })
            }
        }
    }

    /// `data:` line of the SSE frame. Same as the broadcast projection except
    /// that a manga added to a category carries the whole manga.
    pub fn stream_payload(&self) -> Value {
        match self {
            AppEvent::CategoryMangaAdded { category, manga } => {
                json!({ "category_id": category.id, "manga": to_value(manga) })
            }
            other => other.broadcast_payload(),
        }
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    // Model types are plain structs; serialization cannot fail.
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Publisher side of the application event channel.
///
/// Cheap to clone and `Send`, so collaborators on other threads can publish.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to every current subscriber; returns how many received it.
    pub fn publish(&self, event: AppEvent) -> usize {
        let message_type = event.message_type();
        match self.tx.send(event) {
            Ok(n) => {
                debug!(event = %message_type, subscribers = n, "Event published");
                n
            }
            Err(_) => {
                debug!(event = %message_type, "Event published with no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct EventSubscription {
    rx: broadcast::Receiver<AppEvent>,
}

impl EventSubscription {
    /// Next event, or `None` once every publisher is gone.
    ///
    /// A subscriber that fell behind skips what it missed and keeps going.
    pub async fn recv(&mut self) -> Option<AppEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Event subscriber lagged; events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
