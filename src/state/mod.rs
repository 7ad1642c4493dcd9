/// State management module
///
/// This module handles the media catalog:
/// - Shared data structures (data.rs)
/// - Database connections and queries (library.rs)
/// - Folder scanning and import (scanner.rs)
/// - Disk usage for the stats panel (stats.rs)

pub mod data;
pub mod library;
pub mod scanner;
pub mod stats;
