use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Message types pushed to clients, one per application change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    SourceFiltersUpdated,
    LibraryAdd,
    LibraryRemove,
    MangaDetailsUpdate,
    ChapterListUpdate,
    ChapterReadStatusChanged,
    CategoryCreated,
    CategoryDeleted,
    CategoryMangaAdded,
    CategoryMangaRemoved,
}

impl MessageType {
    pub const ALL: [MessageType; 10] = [
        MessageType::SourceFiltersUpdated,
        MessageType::LibraryAdd,
        MessageType::LibraryRemove,
        MessageType::MangaDetailsUpdate,
        MessageType::ChapterListUpdate,
        MessageType::ChapterReadStatusChanged,
        MessageType::CategoryCreated,
        MessageType::CategoryDeleted,
        MessageType::CategoryMangaAdded,
        MessageType::CategoryMangaRemoved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::SourceFiltersUpdated => "SOURCE_FILTERS_UPDATED",
            MessageType::LibraryAdd => "LIBRARY_ADD",
            MessageType::LibraryRemove => "LIBRARY_REMOVE",
            MessageType::MangaDetailsUpdate => "MANGA_DETAILS_UPDATE",
            MessageType::ChapterListUpdate => "CHAPTER_LIST_UPDATE",
            MessageType::ChapterReadStatusChanged => "CHAPTER_READ_STATUS_CHANGED",
            MessageType::CategoryCreated => "CATEGORY_CREATED",
            MessageType::CategoryDeleted => "CATEGORY_DELETED",
            MessageType::CategoryMangaAdded => "CATEGORY_MANGA_ADDED",
            MessageType::CategoryMangaRemoved => "CATEGORY_MANGA_REMOVED",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{"type": ..., "data": ...}` as sent in one text frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub data: Value,
}

impl Envelope {
    pub fn new(message_type: MessageType, data: Value) -> Self {
        Self { message_type, data }
    }

    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serde_names_match_wire_names() {
        for ty in MessageType::ALL {
            assert_eq!(serde_json::to_value(ty).unwrap(), json!(ty.as_str()));
        }
    }

    #[test]
    fn envelope_text() {
        let text = Envelope::new(MessageType::LibraryAdd, json!({"id": 7}))
            .to_text()
            .unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v, json!({"type": "LIBRARY_ADD", "data": {"id": 7}}));
    }
}
