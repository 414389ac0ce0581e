use crate::models::{Category, Chapter, Manga, MangaEntry, Page};

/// The persistence collaborator.
///
/// Lookups return `Ok(None)` for unknown ids. Mutations return `Err` when
/// the store could not apply them; implementations publish the matching
/// [`AppEvent`](crate::events::AppEvent) after a successful change.
pub trait Library: Send + Sync {
    /// Manga flagged as in the library.
    fn get_library(&self) -> anyhow::Result<Vec<Manga>>;
    fn get_manga_by_id(&self, id: i64) -> anyhow::Result<Option<Manga>>;
    fn set_library(&self, manga: &Manga, library: bool) -> anyhow::Result<()>;

    fn get_chapters(&self, manga: &Manga) -> anyhow::Result<Vec<Chapter>>;
    fn get_chapter_by_id(&self, id: i64) -> anyhow::Result<Option<Chapter>>;
    fn mark_chapters_read_status(&self, chapters: &[Chapter], read: bool) -> anyhow::Result<()>;

    fn get_categories(&self) -> anyhow::Result<Vec<Category>>;
    fn create_category(&self, name: &str) -> anyhow::Result<Category>;
    fn delete_category(&self, category: &Category) -> anyhow::Result<()>;
    fn get_category_mangas(&self, category: &Category) -> anyhow::Result<Vec<Manga>>;
    fn add_manga_to_category(&self, manga: &Manga, category: &Category) -> anyhow::Result<()>;
    fn remove_manga_from_category(&self, manga: &Manga, category: &Category) -> anyhow::Result<()>;

    /// Insert scraped entries not seen before and return all of them as
    /// stored manga, in input order.
    fn add_and_get_mangas(&self, source_id: i64, entries: &[MangaEntry]) -> anyhow::Result<Vec<Manga>>;

    /// Replace the page table of a chapter. Page `n` of the table is the
    /// `n`-th page by number.
    fn set_chapter_pages(&self, chapter: &Chapter, pages: &[Page]) -> anyhow::Result<()>;
    fn chapter_page_url(&self, chapter: &Chapter, index: i64) -> anyhow::Result<Option<String>>;

    /// Category lookup by id over [`Library::get_categories`].
    fn get_category_by_id(&self, id: i64) -> anyhow::Result<Option<Category>> {
        Ok(self.get_categories()?.into_iter().find(|c| c.id == id))
    }
}
