/// Asynchronous thumbnail pipeline
///
/// This module handles:
/// - Caching generated thumbnails on disk, keyed by a hash of the source path (cache.rs)
/// - Building previews from images and video frames (generator.rs, video.rs)
/// - Running generation jobs on a small fixed-size pool (pool.rs)
/// - LIFO admission of pending requests, dropping rows scrolled out of view (scheduler.rs)
/// - The coordinator task the display surface talks to (service.rs)
use std::path::PathBuf;

use crate::state::data::MediaKind;

pub mod cache;
pub mod generator;
pub mod pool;
pub mod scheduler;
pub mod service;
pub mod video;

pub use service::{ThumbnailHandle, ThumbnailService};

/// A generated preview, longest side at most `Config::thumbnail_size`
pub type Thumbnail = image::RgbImage;

/// Opaque row identifier allocated by the display surface.
/// Stable for one loaded data set; a new data set gets fresh ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(pub u64);

/// One request for a grid cell's thumbnail. Consumed exactly once:
/// either dispatched to a worker or dropped as no longer visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailRequest {
    pub row_id: RowId,
    pub source_path: PathBuf,
    pub media_kind: MediaKind,
}

/// Notifications delivered to the display surface
#[derive(Debug, Clone)]
pub enum ThumbnailEvent {
    /// A dispatched request finished. `None` means generation failed and
    /// the cell should show a generic file-type icon.
    Ready {
        row_id: RowId,
        image: Option<Thumbnail>,
    },
    /// The row was no longer visible at admission; its loading marker
    /// should be cleared so it can be requested again.
    Dropped { row_id: RowId },
}

/// Answers whether a row is on (or near) screen. Owned by the display layer.
pub trait Visibility: Send + Sync {
    fn is_row_visible(&self, row_id: RowId) -> bool;
}

impl<F> Visibility for F
where
    F: Fn(RowId) -> bool + Send + Sync,
{
    fn is_row_visible(&self, row_id: RowId) -> bool {
        self(row_id)
    }
}
