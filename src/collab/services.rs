use crate::models::{Chapter, Manga};
use std::path::PathBuf;

/// Refreshes manga metadata from the source.
pub trait Updater: Send + Sync {
    /// True when the details were updated.
    fn update_manga_details(&self, manga: &Manga) -> bool;
    /// True when the chapter list was updated.
    fn update_manga_chapters(&self, manga: &Manga) -> bool;
}

/// Where downloaded content lives on disk.
pub trait Downloader: Send + Sync {
    /// Directory holding `thumbnail.png` and the chapter directories.
    fn manga_dir(&self, manga: &Manga) -> PathBuf;
    /// Directory holding `0.png`, `1.png`, ... for a downloaded chapter.
    fn chapter_dir(&self, chapter: &Chapter) -> PathBuf;
}
