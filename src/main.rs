use iced::widget::{button, column, container, row, scrollable, text};
use iced::{window, Element, Length, Size, Subscription, Task, Theme};
use rfd::FileDialog;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod launch;
mod state;
mod thumbnail;
mod ui;

use config::{Config, LastScan};
use state::data::MediaEntry;
use state::library::MediaIndex;
use state::scanner::{self, ScanSummary};
use state::stats::{format_size, LibraryStats};
use thumbnail::cache::CacheStore;
use thumbnail::{ThumbnailEvent, ThumbnailHandle, ThumbnailService};
use ui::grid::{self, Decoration};
use ui::sidebar::{self, FolderRow};
use ui::viewport::{GridGeometry, SharedViewport};

const SIDEBAR_WIDTH: f32 = 240.0;
const TOP_BAR_HEIGHT: f32 = 60.0;
const INITIAL_WINDOW: Size = Size::new(1280.0, 800.0);

/// Main application state
struct Gallery {
    config: Config,
    /// The media catalog
    index: MediaIndex,
    thumbnails: ThumbnailHandle,
    /// Grid layout, also read by the thumbnail coordinator for visibility
    viewport: SharedViewport,
    /// Current data set, in grid order
    entries: Vec<MediaEntry>,
    /// Per-cell decoration, keyed by index into `entries`
    decorations: HashMap<usize, Decoration>,
    /// Sidebar tree of indexed folders
    folders: Vec<FolderRow>,
    selected_folder: Option<PathBuf>,
    /// A folder import is running in the background
    scanning: bool,
    /// Shown while the stats panel is open
    stats: Option<LibraryStats>,
    /// Status message to display to the user
    status: String,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    /// User clicked the "Import Folder" button
    ImportFolder,
    /// Background scan finished
    ImportComplete(Result<ScanSummary, String>),
    /// A sidebar entry was clicked; `None` shows all media
    FolderSelected(Option<PathBuf>),
    /// Stop listing everything under a folder
    RemoveFolder(PathBuf),
    /// A grid cell was clicked
    OpenMedia(PathBuf),
    ShowStats,
    StatsReady(Result<LibraryStats, String>),
    CloseStats,
    CompactDatabase,
    Scrolled(scrollable::Viewport),
    WindowResized(Size),
    Thumbnail(ThumbnailEvent),
}

fn grid_id() -> scrollable::Id {
    scrollable::Id::new("gallery-grid")
}

impl Gallery {
    fn new(config: Config, runtime: tokio::runtime::Handle) -> (Self, Task<Message>) {
        // The app cannot function without its index
        let index = MediaIndex::open(&config.database_path)
            .expect("Failed to open the media index. Check permissions and disk space.");

        let viewport = SharedViewport::new(GridGeometry::new(
            INITIAL_WINDOW.width - SIDEBAR_WIDTH,
            INITIAL_WINDOW.height - TOP_BAR_HEIGHT,
            config.visibility_margin,
        ));
        let (thumbnails, events) =
            ThumbnailService::spawn(&config, Arc::new(viewport.clone()), &runtime);

        let mut gallery = Gallery {
            config,
            index,
            thumbnails,
            viewport,
            entries: Vec::new(),
            decorations: HashMap::new(),
            folders: Vec::new(),
            selected_folder: None,
            scanning: false,
            stats: None,
            status: String::new(),
        };
        let load = gallery.load_entries(None);
        gallery.refresh_folders();

        let events = Task::run(UnboundedReceiverStream::new(events), Message::Thumbnail);
        (gallery, Task::batch([load, events]))
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::ImportFolder => {
                if self.scanning {
                    self.status = "Please wait for the current scan to finish.".to_string();
                    return Task::none();
                }

                let folder = FileDialog::new()
                    .set_title("Select Folder with Photos and Videos")
                    .pick_folder();

                if let Some(folder) = folder {
                    self.scanning = true;
                    self.status = format!("Scanning {}...", folder.display());
                    let config = self.config.clone();
                    return Task::perform(
                        async move {
                            scanner::scan_folders_async(vec![folder], config)
                                .await
                                .map_err(|e| e.to_string())
                        },
                        Message::ImportComplete,
                    );
                }

                Task::none()
            }
            Message::ImportComplete(Ok(summary)) => {
                self.scanning = false;
                self.config.record_scan(LastScan {
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    status: "complete".to_string(),
                    new_files_count: summary.new_files,
                    total_files_scanned: summary.files_seen,
                });
                if let Err(e) = self.config.save() {
                    warn!("Could not save config: {e}");
                }

                self.refresh_folders();
                let task = self.load_entries(self.selected_folder.clone());
                self.status = format!(
                    "Scan complete. Found {} new files in {} folder(s) ({} media files scanned).",
                    summary.new_files, summary.folders, summary.media_found
                );
                task
            }
            Message::ImportComplete(Err(e)) => {
                self.scanning = false;
                self.status = format!("Scan failed: {e}");
                Task::none()
            }
            Message::FolderSelected(folder) => self.load_entries(folder),
            Message::RemoveFolder(folder) => {
                if self.scanning {
                    return Task::none();
                }
                let removed = match self.index.remove_in_folder(&folder) {
                    Ok(removed) => removed,
                    Err(e) => {
                        warn!("Could not remove {}: {e}", folder.display());
                        self.status = format!("Could not remove {}", folder.display());
                        return Task::none();
                    }
                };
                info!("Removed {removed} files under {}", folder.display());

                self.refresh_folders();
                let keep = self
                    .selected_folder
                    .clone()
                    .filter(|selected| !selected.starts_with(&folder));
                let task = self.load_entries(keep);
                self.status = format!("Removed {removed} files from the library");
                task
            }
            Message::OpenMedia(path) => {
                if let Err(e) = launch::open_media(&path) {
                    warn!("Could not open {}: {e}", path.display());
                    self.status = format!("Could not open {}: {e}", path.display());
                }
                Task::none()
            }
            Message::ShowStats => self.refresh_stats(),
            Message::StatsReady(Ok(stats)) => {
                self.stats = Some(stats);
                Task::none()
            }
            Message::StatsReady(Err(e)) => {
                self.status = format!("Could not compute statistics: {e}");
                Task::none()
            }
            Message::CloseStats => {
                self.stats = None;
                Task::none()
            }
            Message::CompactDatabase => {
                if self.scanning {
                    self.status = "Cannot compact while a scan is running.".to_string();
                    return Task::none();
                }
                match self.index.compact() {
                    Ok(()) => self.status = "Database compacted successfully.".to_string(),
                    Err(e) => {
                        warn!("Compacting the database failed: {e}");
                        self.status = "Failed to compact database.".to_string();
                    }
                }
                self.refresh_stats()
            }
            Message::Scrolled(viewport) => {
                {
                    let mut geometry = self.viewport.write();
                    geometry.scroll_offset = viewport.absolute_offset().y;
                    geometry.viewport_width = viewport.bounds().width;
                    geometry.viewport_height = viewport.bounds().height;
                }
                self.request_visible();
                Task::none()
            }
            Message::WindowResized(size) => {
                {
                    let mut geometry = self.viewport.write();
                    geometry.viewport_width = (size.width - SIDEBAR_WIDTH).max(0.0);
                    geometry.viewport_height = (size.height - TOP_BAR_HEIGHT).max(0.0);
                }
                self.request_visible();
                Task::none()
            }
            Message::Thumbnail(ThumbnailEvent::Ready { row_id, image }) => {
                // Results for a previous data set map to no index
                let index = self.viewport.read().index_of(row_id);
                if let Some(index) = index {
                    self.decorations
                        .insert(index, Decoration::from_result(image));
                }
                Task::none()
            }
            Message::Thumbnail(ThumbnailEvent::Dropped { row_id }) => {
                let index = self.viewport.read().index_of(row_id);
                if let Some(index) = index {
                    if matches!(self.decorations.get(&index), Some(Decoration::Loading)) {
                        self.decorations.remove(&index);
                    }
                    // It may have scrolled back into view since
                    self.request_visible();
                }
                Task::none()
            }
        }
    }

    /// Replace the data set with the index contents under `folder`
    fn load_entries(&mut self, folder: Option<PathBuf>) -> Task<Message> {
        self.thumbnails.cancel_all_pending();

        self.entries = match self.index.list_entries(folder.as_deref()) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not list media: {e}");
                Vec::new()
            }
        };
        self.decorations.clear();
        self.viewport.write().reset(self.entries.len());
        self.selected_folder = folder;

        info!("Showing {} media files", self.entries.len());
        self.status = format!("{} media files", self.entries.len());

        self.request_visible();
        scrollable::scroll_to(grid_id(), scrollable::AbsoluteOffset { x: 0.0, y: 0.0 })
    }

    fn refresh_folders(&mut self) {
        match self.index.folders() {
            Ok(folders) => self.folders = sidebar::folder_rows(&folders),
            Err(e) => warn!("Could not list folders: {e}"),
        }
    }

    /// Measure the database and thumbnail cache on a blocking thread
    fn refresh_stats(&mut self) -> Task<Message> {
        let media_count = self.index.count().unwrap_or_else(|e| {
            warn!("Could not count media: {e}");
            0
        });
        let database_path = self.index.path().to_path_buf();
        let cache = CacheStore::new(&self.config.cache_dir, self.config.jpeg_quality);
        let last_scan = self.config.last_scan.clone();

        Task::perform(
            async move {
                tokio::task::spawn_blocking(move || {
                    LibraryStats::collect(&database_path, &cache, media_count, last_scan)
                })
                .await
                .map_err(|e| e.to_string())
            },
            Message::StatsReady,
        )
    }

    /// Ask for a thumbnail for every visible cell that has no decoration yet
    fn request_visible(&mut self) {
        let geometry = self.viewport.read();
        for index in geometry.visible_indices() {
            if self.decorations.contains_key(&index) {
                continue;
            }
            let Some(entry) = self.entries.get(index) else {
                continue;
            };
            self.decorations.insert(index, Decoration::Loading);
            self.thumbnails
                .request_thumbnail(geometry.row_id(index), entry.path.clone(), entry.kind);
        }
    }

    /// Build the user interface
    fn view(&self) -> Element<'_, Message> {
        let top_bar = row![
            button(text("Import Folder"))
                .on_press_maybe((!self.scanning).then_some(Message::ImportFolder))
                .padding(10),
            button(text("Stats"))
                .on_press(Message::ShowStats)
                .padding(10),
            text(&self.status).size(16),
        ]
        .spacing(20)
        .padding(10)
        .height(Length::Fixed(TOP_BAR_HEIGHT));

        let geometry = self.viewport.read().clone();
        let grid = scrollable(grid::view(&self.entries, &self.decorations, &geometry))
            .id(grid_id())
            .on_scroll(Message::Scrolled)
            .width(Length::Fill)
            .height(Length::Fill);

        let main: Element<'_, Message> = match &self.stats {
            Some(stats) => column![self.stats_panel(stats), grid].into(),
            None => grid.into(),
        };

        let body = row![
            container(scrollable(sidebar::view(
                &self.folders,
                self.selected_folder.as_deref(),
                self.scanning,
            )))
            .width(Length::Fixed(SIDEBAR_WIDTH))
            .height(Length::Fill),
            main,
        ];

        column![top_bar, body]
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn stats_panel<'a>(&self, stats: &'a LibraryStats) -> Element<'a, Message> {
        let last_scan = match &stats.last_scan {
            Some(scan) => format!(
                "Last scan: {} ({}, {} new files)",
                scan.timestamp, scan.status, scan.new_files_count
            ),
            None => "Last scan: never".to_string(),
        };

        let figures = column![
            text(format!("Media files: {}", stats.media_count)),
            text(format!("Database size: {}", format_size(stats.database_bytes))),
            text(format!(
                "Thumbnails: {} files, {}",
                stats.thumbnail_files,
                format_size(stats.thumbnail_bytes)
            )),
            text(format!("Total app usage: {}", format_size(stats.total_bytes()))),
            text(last_scan),
        ]
        .spacing(4);

        let actions = column![
            button(text("Compact Database"))
                .on_press_maybe((!self.scanning).then_some(Message::CompactDatabase)),
            button(text("Refresh")).on_press(Message::ShowStats),
            button(text("Close")).on_press(Message::CloseStats),
        ]
        .spacing(6);

        container(row![figures.width(Length::Fill), actions].spacing(20))
            .padding(10)
            .width(Length::Fill)
            .style(container::rounded_box)
            .into()
    }

    fn subscription(&self) -> Subscription<Message> {
        window::resize_events().map(|(_id, size)| Message::WindowResized(size))
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,media_gallery=debug")),
        )
        .init();

    let config = Config::load();

    // Hosts the thumbnail coordinator; its blocking pool runs the jobs
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .max_blocking_threads(config.pool_capacity.max(1))
        .thread_name("thumbnails")
        .enable_all()
        .build()
        .expect("Failed to start the thumbnail runtime");
    let handle = runtime.handle().clone();

    let result = iced::application("Media Gallery", Gallery::update, Gallery::view)
        .subscription(Gallery::subscription)
        .theme(Gallery::theme)
        .window_size(INITIAL_WINDOW)
        .centered()
        .run_with(move || Gallery::new(config, handle));

    drop(runtime);
    result
}
