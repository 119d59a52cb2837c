//! Per-character mod folders with a bounded result cache and background
//! enrichment of previews, display names and links.

pub mod app;
pub mod archive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod database;
pub mod download;
pub mod enrich;
pub mod error;
pub mod images;
pub mod library;
pub mod metadata;
pub mod shell;
pub mod watcher;

pub use app::{CollectionView, LoadState, LoadTicket, ManagerEvent, ModManager};
pub use cache::{CollectionSnapshot, ResultCache};
pub use error::ManagerError;
