//! In-memory reference collaborators.
//!
//! Enough to run the server standalone and to drive it in tests. A real
//! deployment plugs its own store and sources in through the traits.

use super::network::{NetworkReply, NetworkRequest};
use super::services::{Downloader, Updater};
use super::source::{Source, SourceRegistry};
use super::store::Library;
use crate::events::{AppEvent, EventBus};
use crate::models::{Category, Chapter, Manga, MangaEntry, MangaList, Page, SourceInfo};
use anyhow::{anyhow, bail, Context};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

#[derive(Default)]
struct LibraryState {
    mangas: BTreeMap<i64, Manga>,
    chapters: BTreeMap<i64, Chapter>,
    categories: BTreeMap<i64, Category>,
    members: BTreeMap<i64, BTreeSet<i64>>,
    pages: HashMap<i64, Vec<String>>,
    next_manga_id: i64,
    next_category_id: i64,
}

/// A [`Library`] kept in memory, publishing change events on its bus.
pub struct MemoryLibrary {
    state: RwLock<LibraryState>,
    bus: EventBus,
}

impl MemoryLibrary {
    pub fn new(bus: EventBus) -> Self {
        Self {
            state: RwLock::new(LibraryState {
                next_manga_id: 1,
                next_category_id: 1,
                ..LibraryState::default()
            }),
            bus,
        }
    }

    fn read(&self) -> anyhow::Result<RwLockReadGuard<'_, LibraryState>> {
        self.state.read().map_err(|_| anyhow!("library state poisoned"))
    }

    fn write(&self) -> anyhow::Result<RwLockWriteGuard<'_, LibraryState>> {
        self.state.write().map_err(|_| anyhow!("library state poisoned"))
    }

    /// Seed a manga, keeping its id.
    pub fn insert_manga(&self, manga: Manga) -> anyhow::Result<()> {
        let mut state = self.write()?;
        state.next_manga_id = state.next_manga_id.max(manga.id + 1);
        state.mangas.insert(manga.id, manga);
        Ok(())
    }

    /// Seed a chapter, keeping its id.
    pub fn insert_chapter(&self, chapter: Chapter) -> anyhow::Result<()> {
        self.write()?.chapters.insert(chapter.id, chapter);
        Ok(())
    }
}

impl Library for MemoryLibrary {
    fn get_library(&self) -> anyhow::Result<Vec<Manga>> {
        Ok(self
            .read()?
            .mangas
            .values()
            .filter(|m| m.library)
            .cloned()
            .collect())
    }

    fn get_manga_by_id(&self, id: i64) -> anyhow::Result<Option<Manga>> {
        Ok(self.read()?.mangas.get(&id).cloned())
    }

    fn set_library(&self, manga: &Manga, library: bool) -> anyhow::Result<()> {
        let updated = {
            let mut state = self.write()?;
            let stored = state
                .mangas
                .get_mut(&manga.id)
                .with_context(|| format!("unknown manga {}", manga.id))?;
            if stored.library == library {
                return Ok(());
            }
            stored.library = library;
            stored.clone()
        };
        self.bus.publish(AppEvent::LibraryStatusChanged(updated));
        Ok(())
    }

    fn get_chapters(&self, manga: &Manga) -> anyhow::Result<Vec<Chapter>> {
        Ok(self
            .read()?
            .chapters
            .values()
            .filter(|c| c.manga == manga.id)
            .cloned()
            .collect())
    }

    fn get_chapter_by_id(&self, id: i64) -> anyhow::Result<Option<Chapter>> {
        Ok(self.read()?.chapters.get(&id).cloned())
    }

    fn mark_chapters_read_status(&self, chapters: &[Chapter], read: bool) -> anyhow::Result<()> {
        let changed: Vec<Chapter> = {
            let mut state = self.write()?;
            chapters
                .iter()
                .filter_map(|chapter| {
                    let stored = state.chapters.get_mut(&chapter.id)?;
                    (stored.read != read).then(|| {
                        stored.read = read;
                        stored.clone()
                    })
                })
                .collect()
        };
        for chapter in changed {
            self.bus.publish(AppEvent::ChapterReadStatusChanged(chapter));
        }
        Ok(())
    }

    fn get_categories(&self) -> anyhow::Result<Vec<Category>> {
        Ok(self.read()?.categories.values().cloned().collect())
    }

    fn create_category(&self, name: &str) -> anyhow::Result<Category> {
        let category = {
            let mut state = self.write()?;
            if name.is_empty() {
                bail!("category name is empty");
            }
            if state.categories.values().any(|c| c.name == name) {
                bail!("category `{name}` already exists");
            }
            let category = Category {
                id: state.next_category_id,
                name: name.to_string(),
            };
            state.next_category_id += 1;
            state.categories.insert(category.id, category.clone());
            category
        };
        self.bus.publish(AppEvent::CategoryCreated(category.clone()));
        Ok(category)
    }

    fn delete_category(&self, category: &Category) -> anyhow::Result<()> {
        let removed = {
            let mut state = self.write()?;
            state.members.remove(&category.id);
            state
                .categories
                .remove(&category.id)
                .with_context(|| format!("unknown category {}", category.id))?
        };
        self.bus.publish(AppEvent::CategoryDeleted(removed));
        Ok(())
    }

    fn get_category_mangas(&self, category: &Category) -> anyhow::Result<Vec<Manga>> {
        let state = self.read()?;
        Ok(state
            .members
            .get(&category.id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.mangas.get(id).cloned())
            .collect())
    }

    fn add_manga_to_category(&self, manga: &Manga, category: &Category) -> anyhow::Result<()> {
        let added = {
            let mut state = self.write()?;
            if !state.categories.contains_key(&category.id) {
                bail!("unknown category {}", category.id);
            }
            state.members.entry(category.id).or_default().insert(manga.id)
        };
        if added {
            self.bus.publish(AppEvent::CategoryMangaAdded {
                category: category.clone(),
                manga: manga.clone(),
            });
        }
        Ok(())
    }

    fn remove_manga_from_category(&self, manga: &Manga, category: &Category) -> anyhow::Result<()> {
        let removed = {
            let mut state = self.write()?;
            state
                .members
                .get_mut(&category.id)
                .is_some_and(|members| members.remove(&manga.id))
        };
        if removed {
            self.bus.publish(AppEvent::CategoryMangaRemoved {
                category: category.clone(),
                manga: manga.clone(),
            });
        }
        Ok(())
    }

    fn add_and_get_mangas(&self, source_id: i64, entries: &[MangaEntry]) -> anyhow::Result<Vec<Manga>> {
        let mut state = self.write()?;
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let existing = state
                .mangas
                .values()
                .find(|m| m.source == Some(source_id) && m.url == entry.url)
                .cloned();
            let manga = match existing {
                Some(manga) => manga,
                None => {
                    let manga = Manga {
                        id: state.next_manga_id,
                        source: Some(source_id),
                        title: entry.title.clone(),
                        description: None,
                        author: None,
                        artist: None,
                        thumbnail: entry.thumbnail.clone(),
                        library: false,
                        initialized: false,
                        url: entry.url.clone(),
                    };
                    state.next_manga_id += 1;
                    state.mangas.insert(manga.id, manga.clone());
                    manga
                }
            };
            out.push(manga);
        }
        Ok(out)
    }

    fn set_chapter_pages(&self, chapter: &Chapter, pages: &[Page]) -> anyhow::Result<()> {
        let mut sorted: Vec<&Page> = pages.iter().collect();
        sorted.sort_by_key(|p| p.number);
        let urls = sorted.into_iter().map(|p| p.url.clone()).collect();
        self.write()?.pages.insert(chapter.id, urls);
        Ok(())
    }

    fn chapter_page_url(&self, chapter: &Chapter, index: i64) -> anyhow::Result<Option<String>> {
        let Ok(index) = usize::try_from(index) else {
            return Ok(None);
        };
        Ok(self
            .read()?
            .pages
            .get(&chapter.id)
            .and_then(|urls| urls.get(index))
            .cloned())
    }
}

/// A fixed set of sources plus the user's filter choices.
pub struct MemorySources {
    sources: Vec<Arc<dyn Source>>,
    filters: RwLock<HashMap<i64, Map<String, Value>>>,
    bus: EventBus,
}

impl MemorySources {
    pub fn new(bus: EventBus) -> Self {
        Self {
            sources: Vec::new(),
            filters: RwLock::new(HashMap::new()),
            bus,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn Source>) -> Self {
        self.sources.push(source);
        self
    }

    /// Filters last stored for `source_id`.
    pub fn filters(&self, source_id: i64) -> Option<Map<String, Value>> {
        self.filters.read().ok()?.get(&source_id).cloned()
    }
}

impl SourceRegistry for MemorySources {
    fn sources(&self) -> Vec<Arc<dyn Source>> {
        self.sources.clone()
    }

    fn update_source_filters(&self, source_id: i64, filters: Map<String, Value>) -> anyhow::Result<()> {
        if self.get_source(source_id).is_none() {
            bail!("unknown source {source_id}");
        }
        self.filters
            .write()
            .map_err(|_| anyhow!("filter state poisoned"))?
            .insert(source_id, filters.clone());
        self.bus.publish(AppEvent::SourceFiltersUpdated { source_id, filters });
        Ok(())
    }
}

/// A source backed by JSON files in a directory.
///
/// ```text
/// <root>/icon.png
/// <root>/latest/<page>.json      MangaList
/// <root>/search/<query>.json     MangaList
/// <root>/chapters/<id>.json      [Page]
/// ```
///
/// Thumbnails and pages are fetched from the URLs the listings carry.
pub struct DirectorySource {
    info: SourceInfo,
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(info: SourceInfo, root: impl Into<PathBuf>) -> Self {
        Self {
            info,
            root: root.into(),
        }
    }

    fn file(&self, parts: &[&str]) -> anyhow::Result<NetworkRequest> {
        let path = parts.iter().fold(self.root.clone(), |p, part| p.join(part));
        NetworkRequest::local_file(&path)
    }

    fn parse_json<T: serde::de::DeserializeOwned>(reply: &NetworkReply) -> anyhow::Result<T> {
        serde_json::from_slice(reply.body())
            .with_context(|| format!("invalid listing at {}", reply.url()))
    }
}

impl Source for DirectorySource {
    fn info(&self) -> SourceInfo {
        self.info.clone()
    }

    fn id(&self) -> i64 {
        self.info.id
    }

    fn latest_request(&self, page: i64) -> anyhow::Result<NetworkRequest> {
        self.file(&["latest", &format!("{page}.json")])
    }

    fn search_request(&self, query: &str) -> anyhow::Result<NetworkRequest> {
        self.file(&["search", &format!("{query}.json")])
    }

    fn thumbnail_request(&self, manga: &Manga) -> anyhow::Result<NetworkRequest> {
        NetworkRequest::parse(&manga.thumbnail)
    }

    fn chapter_pages_request(&self, chapter: &Chapter) -> anyhow::Result<NetworkRequest> {
        self.file(&["chapters", &format!("{}.json", chapter.id)])
    }

    fn page_request(&self, page: &Page) -> anyhow::Result<NetworkRequest> {
        NetworkRequest::parse(&page.url)
    }

    fn parse_latest(&self, reply: &NetworkReply) -> anyhow::Result<MangaList> {
        Self::parse_json(reply)
    }

    fn parse_search_results(&self, reply: &NetworkReply) -> anyhow::Result<MangaList> {
        Self::parse_json(reply)
    }

    fn parse_chapter_pages(&self, reply: &NetworkReply, _chapter: &Chapter) -> anyhow::Result<Vec<Page>> {
        Self::parse_json(reply)
    }

    fn icon(&self) -> Option<Vec<u8>> {
        std::fs::read(self.root.join("icon.png")).ok()
    }
}

/// An updater with nothing to update from.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullUpdater;

impl Updater for NullUpdater {
    fn update_manga_details(&self, manga: &Manga) -> bool {
        debug!(manga = manga.id, "No updater configured; details unchanged");
        false
    }

    fn update_manga_chapters(&self, manga: &Manga) -> bool {
        debug!(manga = manga.id, "No updater configured; chapters unchanged");
        false
    }
}

/// Downloads laid out as `<root>/<manga id>/` and `<root>/<manga id>/<chapter id>/`.
#[derive(Debug, Clone)]
pub struct DirDownloader {
    root: PathBuf,
}

impl DirDownloader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Downloader for DirDownloader {
    fn manga_dir(&self, manga: &Manga) -> PathBuf {
        self.root.join(manga.id.to_string())
    }

    fn chapter_dir(&self, chapter: &Chapter) -> PathBuf {
        self.root
            .join(chapter.manga.to_string())
            .join(chapter.id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manga(id: i64, library: bool) -> Manga {
        Manga {
            id,
            source: Some(1),
            title: format!("Manga {id}"),
            description: None,
            author: None,
            artist: None,
            thumbnail: String::new(),
            library,
            initialized: false,
            url: format!("/m/{id}"),
        }
    }

    #[tokio::test]
    async fn set_library_publishes_only_on_change() {
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        let lib = MemoryLibrary::new(bus);
        lib.insert_manga(manga(1, false)).unwrap();

        lib.set_library(&manga(1, false), true).unwrap();
        lib.set_library(&manga(1, true), true).unwrap();
        assert!(lib.get_manga_by_id(1).unwrap().unwrap().library);

        match events.recv().await {
            Some(AppEvent::LibraryStatusChanged(m)) => assert!(m.library),
            other => panic!("unexpected {other:?}"),
        }
        drop(lib);
        assert_eq!(events.recv().await, None);
    }

    #[test]
    fn categories_reject_duplicates_and_track_members() {
        let lib = MemoryLibrary::new(EventBus::default());
        lib.insert_manga(manga(4, true)).unwrap();
        let reading = lib.create_category("Reading").unwrap();
        assert!(lib.create_category("Reading").is_err());

        lib.add_manga_to_category(&manga(4, true), &reading).unwrap();
        assert_eq!(lib.get_category_mangas(&reading).unwrap().len(), 1);
        lib.remove_manga_from_category(&manga(4, true), &reading).unwrap();
        assert!(lib.get_category_mangas(&reading).unwrap().is_empty());

        lib.delete_category(&reading).unwrap();
        assert!(lib.get_category_by_id(reading.id).unwrap().is_none());
        assert!(lib.delete_category(&reading).is_err());
    }

    #[test]
    fn add_and_get_reuses_known_entries() {
        let lib = MemoryLibrary::new(EventBus::default());
        let entry = MangaEntry {
            title: "A".into(),
            url: "/a".into(),
            thumbnail: "file:///a.png".into(),
        };
        let first = lib.add_and_get_mangas(1, &[entry.clone()]).unwrap();
        let second = lib.add_and_get_mangas(1, &[entry.clone()]).unwrap();
        assert_eq!(first[0].id, second[0].id);
        let other_source = lib.add_and_get_mangas(2, &[entry]).unwrap();
        assert_ne!(other_source[0].id, first[0].id);
    }

    #[test]
    fn page_table_is_ordered_by_number() {
        let lib = MemoryLibrary::new(EventBus::default());
        let chapter = Chapter {
            id: 9,
            number: 1,
            manga: 1,
            title: String::new(),
            uploaded: 0,
            downloaded: false,
            read: false,
            url: String::new(),
        };
        let pages = [
            Page { number: 2, url: "c".into() },
            Page { number: 0, url: "a".into() },
            Page { number: 1, url: "b".into() },
        ];
        lib.set_chapter_pages(&chapter, &pages).unwrap();
        assert_eq!(lib.chapter_page_url(&chapter, 1).unwrap().as_deref(), Some("b"));
        assert_eq!(lib.chapter_page_url(&chapter, 3).unwrap(), None);
    }

    #[test]
    fn filter_updates_require_a_known_source() {
        let sources = MemorySources::new(EventBus::default());
        assert!(sources.update_source_filters(1, Map::new()).is_err());
    }
}
