/// Thumbnail coordinator task
///
/// This module provides the non-blocking entry point the display surface
/// uses. A single background task owns the `Scheduler`; requests and
/// worker completions both reach it as messages, so pending-stack and
/// in-flight state are never shared between threads.
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::cache::CacheStore;
use super::generator::PreviewGenerator;
use super::pool::{BlockingSpawner, Completion, Spawn, WorkerPool};
use super::scheduler::Scheduler;
use super::video::{self, VideoBackend};
use super::{RowId, ThumbnailEvent, ThumbnailRequest, Visibility};
use crate::config::Config;
use crate::state::data::MediaKind;

/// Command sent to the coordinator task
#[derive(Debug)]
pub enum ThumbnailCommand {
    Request(ThumbnailRequest),
    CancelAllPending,
}

/// Handle for requesting thumbnails. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ThumbnailHandle {
    tx: mpsc::UnboundedSender<ThumbnailCommand>,
}

impl ThumbnailHandle {
    /// Fire-and-forget: the answer arrives later as a `ThumbnailEvent`
    pub fn request_thumbnail(&self, row_id: RowId, source_path: PathBuf, media_kind: MediaKind) {
        let _ = self.tx.send(ThumbnailCommand::Request(ThumbnailRequest {
            row_id,
            source_path,
            media_kind,
        }));
    }

    /// Drop every request that hasn't been dispatched yet (data set reset).
    /// No `Dropped` events are sent for them.
    pub fn cancel_all_pending(&self) {
        let _ = self.tx.send(ThumbnailCommand::CancelAllPending);
    }
}

pub struct ThumbnailService;

impl ThumbnailService {
    /// Start the coordinator on `runtime` with jobs on its blocking pool.
    ///
    /// Returns the request handle and the event receiver, which should be
    /// polled by the display surface's event loop.
    pub fn spawn(
        config: &Config,
        visibility: Arc<dyn Visibility>,
        runtime: &Handle,
    ) -> (ThumbnailHandle, mpsc::UnboundedReceiver<ThumbnailEvent>) {
        Self::spawn_with(
            config,
            visibility,
            video::default_backend(),
            Arc::new(BlockingSpawner::new(runtime.clone())),
            runtime,
        )
    }

    /// Like `spawn`, with the video backend and job spawner supplied
    pub fn spawn_with(
        config: &Config,
        visibility: Arc<dyn Visibility>,
        video: Box<dyn VideoBackend>,
        spawner: Arc<dyn Spawn>,
        runtime: &Handle,
    ) -> (ThumbnailHandle, mpsc::UnboundedReceiver<ThumbnailEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let cache = CacheStore::new(&config.cache_dir, config.jpeg_quality);
        info!("Thumbnail cache at {}", cache.dir().display());
        let generator = Arc::new(PreviewGenerator::new(config, cache, video));
        let pool = WorkerPool::new(config.pool_capacity, spawner, completion_tx);
        info!("Thumbnail workers: {}", pool.capacity());
        let scheduler = Scheduler::new(pool, generator, visibility, event_tx);

        runtime.spawn(coordinator_task(scheduler, command_rx, completion_rx));

        (ThumbnailHandle { tx: command_tx }, event_rx)
    }
}

/// Owns the scheduler until every handle is dropped and in-flight jobs drain
async fn coordinator_task(
    mut scheduler: Scheduler,
    mut commands: mpsc::UnboundedReceiver<ThumbnailCommand>,
    mut completions: mpsc::UnboundedReceiver<Completion>,
) {
    let mut accepting = true;

    loop {
        tokio::select! {
            command = commands.recv(), if accepting => match command {
                Some(ThumbnailCommand::Request(request)) => scheduler.request(request),
                Some(ThumbnailCommand::CancelAllPending) => scheduler.cancel_all_pending(),
                None => {
                    accepting = false;
                    scheduler.cancel_all_pending();
                }
            },
            Some(completion) = completions.recv(), if scheduler.in_flight() > 0 => {
                scheduler.on_completed(completion);
            }
            else => break,
        }
    }

    debug!("Thumbnail coordinator stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thumbnail::video::{FrameSource, NoVideoBackend, PixelLayout, VideoFrame};
    use image::{Rgb, RgbImage};
    use rand::Rng;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        Config {
            cache_dir: dir.path().join("cache"),
            database_path: dir.path().join("media.db"),
            ..Config::default()
        }
    }

    fn write_png(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        RgbImage::from_pixel(640, 480, Rgb([90, 160, 220]))
            .save(&path)
            .unwrap();
        path
    }

    fn all_visible() -> Arc<dyn Visibility> {
        Arc::new(|_: RowId| true)
    }

    /// Video backend that records how many generations run at once
    struct CountingVideo {
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    struct OneFrame;

    impl FrameSource for OneFrame {
        fn next_frame(&mut self) -> Option<VideoFrame> {
            Some(VideoFrame {
                width: 16,
                height: 9,
                layout: PixelLayout::Rgb24,
                data: vec![128; 16 * 9 * 3],
            })
        }
    }

    impl VideoBackend for CountingVideo {
        fn open(&self, _path: &std::path::Path) -> Option<Box<dyn FrameSource>> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let jitter = rand::thread_rng().gen_range(0..4);
            std::thread::sleep(Duration::from_millis(jitter));
            self.running.fetch_sub(1, Ordering::SeqCst);
            Some(Box::new(OneFrame))
        }
    }

    async fn collect_ready(
        events: &mut mpsc::UnboundedReceiver<ThumbnailEvent>,
        expected: usize,
    ) -> HashMap<RowId, bool> {
        let mut ready = HashMap::new();
        while ready.len() < expected {
            let event = tokio::time::timeout(Duration::from_secs(30), events.recv())
                .await
                .expect("timed out waiting for thumbnails")
                .expect("coordinator stopped early");
            if let ThumbnailEvent::Ready { row_id, image } = event {
                assert!(ready.insert(row_id, image.is_some()).is_none(), "duplicate delivery");
            }
        }
        ready
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_never_exceeds_capacity() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let video = CountingVideo {
            running: running.clone(),
            peak: peak.clone(),
        };
        let (handle, mut events) = ThumbnailService::spawn_with(
            &config,
            all_visible(),
            Box::new(video),
            Arc::new(BlockingSpawner::new(Handle::current())),
            &Handle::current(),
        );

        // Burst requests from several tasks at random moments
        let mut senders = Vec::new();
        for task in 0..4u64 {
            let handle = handle.clone();
            senders.push(tokio::spawn(async move {
                for i in 0..10u64 {
                    let delay = rand::thread_rng().gen_range(0..2);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    let row = task * 100 + i;
                    handle.request_thumbnail(
                        RowId(row),
                        PathBuf::from(format!("/videos/{row}.mp4")),
                        MediaKind::Video,
                    );
                }
            }));
        }
        for sender in senders {
            sender.await.unwrap();
        }

        let ready = collect_ready(&mut events, 40).await;
        assert_eq!(ready.len(), 40);
        assert!(ready.values().all(|ok| *ok));
        assert!(peak.load(Ordering::SeqCst) <= config.pool_capacity);
        assert!(peak.load(Ordering::SeqCst) >= 1);
        assert_eq!(running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_same_path_requested_twice() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let source = write_png(&dir, "shared.png");

        let (handle, mut events) = ThumbnailService::spawn_with(
            &config,
            all_visible(),
            Box::new(NoVideoBackend),
            Arc::new(BlockingSpawner::new(Handle::current())),
            &Handle::current(),
        );
        handle.request_thumbnail(RowId(1), source.clone(), MediaKind::Image);
        handle.request_thumbnail(RowId(2), source.clone(), MediaKind::Image);

        let ready = collect_ready(&mut events, 2).await;
        assert_eq!(ready.get(&RowId(1)), Some(&true));
        assert_eq!(ready.get(&RowId(2)), Some(&true));

        let entries: Vec<_> = std::fs::read_dir(&config.cache_dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries, vec![CacheStore::new(&config.cache_dir, 80).entry_path(&source)]);
        assert!(CacheStore::new(&config.cache_dir, 80).lookup(&source).is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_hidden_rows_get_dropped_events() {
        let dir = TempDir::new().unwrap();
        let source = write_png(&dir, "a.png");
        let visibility: Arc<dyn Visibility> = Arc::new(|row: RowId| row.0 % 2 == 0);

        let (handle, mut events) = ThumbnailService::spawn_with(
            &test_config(&dir),
            visibility,
            Box::new(NoVideoBackend),
            Arc::new(BlockingSpawner::new(Handle::current())),
            &Handle::current(),
        );
        for row in 0..6 {
            handle.request_thumbnail(RowId(row), source.clone(), MediaKind::Image);
        }

        let mut ready = Vec::new();
        let mut dropped = Vec::new();
        while ready.len() + dropped.len() < 6 {
            match tokio::time::timeout(Duration::from_secs(30), events.recv())
                .await
                .unwrap()
                .unwrap()
            {
                ThumbnailEvent::Ready { row_id, .. } => ready.push(row_id.0),
                ThumbnailEvent::Dropped { row_id } => dropped.push(row_id.0),
            }
        }
        ready.sort_unstable();
        dropped.sort_unstable();
        assert_eq!(ready, vec![0, 2, 4]);
        assert_eq!(dropped, vec![1, 3, 5]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_coordinator_drains_after_handle_drop() {
        let dir = TempDir::new().unwrap();
        let source = write_png(&dir, "a.png");

        let (handle, mut events) = ThumbnailService::spawn_with(
            &test_config(&dir),
            all_visible(),
            Box::new(NoVideoBackend),
            Arc::new(BlockingSpawner::new(Handle::current())),
            &Handle::current(),
        );
        for row in 0..5 {
            handle.request_thumbnail(RowId(row), source.clone(), MediaKind::Image);
        }
        drop(handle);

        // The two admitted jobs finish, the rest are discarded, then the
        // event channel closes
        let mut delivered = 0;
        while let Some(event) = tokio::time::timeout(Duration::from_secs(30), events.recv())
            .await
            .unwrap()
        {
            assert!(matches!(event, ThumbnailEvent::Ready { .. }));
            delivered += 1;
        }
        assert!(delivered >= 2 && delivered <= 5);
    }
}
