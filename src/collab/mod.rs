//! Narrow seams to the collaborators the server consumes but does not own:
//! the store, the sources, the network fetcher, the updater and the
//! downloader.

pub mod fetch;
pub mod memory;
pub mod network;
mod services;
mod source;
mod store;

pub use fetch::HttpFetcher;
pub use memory::{DirDownloader, DirectorySource, MemoryLibrary, MemorySources, NullUpdater};
pub use network::{
    pending, Network, NetworkReply, NetworkRequest, PendingReply, Priority, ReplyCompleter,
    ReplyError,
};
pub use services::{Downloader, Updater};
pub use source::{RequestKind, Source, SourceRegistry};
pub use store::Library;
