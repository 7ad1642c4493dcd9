use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::path::Path;
use tracing::debug;

use super::cache::CacheStore;
use super::video::{first_valid_frame, VideoBackend};
use super::Thumbnail;
use crate::config::Config;
use crate::state::data::MediaKind;

/// Largest size fitting inside `bound`×`bound` with the same aspect ratio.
/// The longest side is exactly `bound`; the other is rounded, never below 1.
pub fn fit_within(width: u32, height: u32, bound: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (0, 0);
    }
    if width >= height {
        let scaled = (height as f64 * bound as f64 / width as f64).round() as u32;
        (bound, scaled.max(1))
    } else {
        let scaled = (width as f64 * bound as f64 / height as f64).round() as u32;
        (scaled.max(1), bound)
    }
}

/// Builds thumbnails from source files and writes them back to the cache
pub struct PreviewGenerator {
    cache: CacheStore,
    video: Box<dyn VideoBackend>,
    size: u32,
    max_video_frame_attempts: usize,
}

impl PreviewGenerator {
    pub fn new(config: &Config, cache: CacheStore, video: Box<dyn VideoBackend>) -> Self {
        Self {
            cache,
            video,
            size: config.thumbnail_size,
            max_video_frame_attempts: config.max_video_frame_attempts,
        }
    }

    #[cfg(test)]
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Cached thumbnail if there is one, otherwise a freshly generated one
    pub fn load_or_generate(&self, path: &Path, kind: MediaKind) -> Option<Thumbnail> {
        self.cache
            .lookup(path)
            .or_else(|| self.generate(path, kind))
    }

    /// Generate a thumbnail, or `None` when the source can't be decoded.
    /// Every non-empty result is stored in the cache before returning.
    pub fn generate(&self, path: &Path, kind: MediaKind) -> Option<Thumbnail> {
        let thumbnail = match kind {
            MediaKind::Image => self.from_image(path),
            MediaKind::Video => self.from_video(path),
        };

        match &thumbnail {
            Some(thumbnail) => self.cache.store(path, thumbnail),
            None => debug!("No {kind} thumbnail for {}", path.display()),
        }
        thumbnail
    }

    /// Read the intrinsic size from the header first so unsupported or
    /// corrupt files fail before any pixel decoding, then decode from the
    /// same reader and reduce straight to the target size.
    fn from_image(&self, path: &Path) -> Option<Thumbnail> {
        let decoder = ImageReader::open(path)
            .and_then(|r| r.with_guessed_format())
            .inspect_err(|e| debug!("Could not open {}: {e}", path.display()))
            .ok()?
            .into_decoder()
            .inspect_err(|e| debug!("Unreadable image header {}: {e}", path.display()))
            .ok()?;

        let (width, height) = decoder.dimensions();
        let (target_w, target_h) = fit_within(width, height, self.size);
        if target_w == 0 {
            return None;
        }

        let image = DynamicImage::from_decoder(decoder)
            .inspect_err(|e| debug!("Image decode failed {}: {e}", path.display()))
            .ok()?;

        if target_w < width && target_h < height {
            Some(image.thumbnail_exact(target_w, target_h).to_rgb8())
        } else {
            // Small sources are scaled up to the grid size like any other
            Some(imageops::resize(
                &image.to_rgb8(),
                target_w,
                target_h,
                FilterType::Triangle,
            ))
        }
    }

    fn from_video(&self, path: &Path) -> Option<Thumbnail> {
        let mut frames = self.video.open(path)?;
        let frame = first_valid_frame(frames.as_mut(), self.max_video_frame_attempts)?;
        let (target_w, target_h) = fit_within(frame.width(), frame.height(), self.size);
        Some(imageops::resize(&frame, target_w, target_h, FilterType::Triangle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thumbnail::video::{FrameSource, NoVideoBackend, PixelLayout, VideoFrame};
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn generator(dir: &TempDir, video: Box<dyn VideoBackend>) -> PreviewGenerator {
        let cache = CacheStore::new(dir.path().join("cache"), 80);
        PreviewGenerator::new(&Config::default(), cache, video)
    }

    fn write_png(dir: &TempDir, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.path().join(name);
        RgbImage::from_pixel(width, height, Rgb([200, 100, 50]))
            .save(&path)
            .unwrap();
        path
    }

    fn cache_entries(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path().join("cache"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Yields `bad` empty frames, then valid 64×36 frames
    struct FlakyVideo {
        bad: usize,
        reads: Arc<AtomicUsize>,
    }

    struct FlakyFrames {
        remaining_bad: usize,
        reads: Arc<AtomicUsize>,
    }

    impl FrameSource for FlakyFrames {
        fn next_frame(&mut self) -> Option<VideoFrame> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.remaining_bad > 0 {
                self.remaining_bad -= 1;
                return Some(VideoFrame::empty());
            }
            Some(VideoFrame {
                width: 64,
                height: 36,
                layout: PixelLayout::Bgr24,
                data: [0u8, 0, 255].repeat(64 * 36),
            })
        }
    }

    impl VideoBackend for FlakyVideo {
        fn open(&self, _path: &Path) -> Option<Box<dyn FrameSource>> {
            Some(Box::new(FlakyFrames {
                remaining_bad: self.bad,
                reads: self.reads.clone(),
            }))
        }
    }

    #[test]
    fn test_fit_within_preserves_aspect() {
        assert_eq!(fit_within(4000, 3000, 100), (100, 75));
        assert_eq!(fit_within(3000, 4000, 100), (75, 100));
        assert_eq!(fit_within(50, 50, 100), (100, 100));
        assert_eq!(fit_within(10_000, 10, 100), (100, 1));
        assert_eq!(fit_within(0, 10, 100), (0, 0));
    }

    #[test]
    fn test_large_image_longest_side_is_bound() {
        let dir = TempDir::new().unwrap();
        let source = write_png(&dir, "large.png", 4000, 3000);
        let generator = generator(&dir, Box::new(NoVideoBackend));

        let thumb = generator.generate(&source, MediaKind::Image).unwrap();
        let (w, h) = thumb.dimensions();
        assert_eq!(w.max(h), 100);
        assert!((h as i64 - 75).abs() <= 1);
        assert_eq!(cache_entries(&dir), 1);
    }

    #[test]
    fn test_portrait_and_small_images() {
        let dir = TempDir::new().unwrap();
        let generator = generator(&dir, Box::new(NoVideoBackend));

        let portrait = write_png(&dir, "portrait.png", 300, 600);
        assert_eq!(
            generator.generate(&portrait, MediaKind::Image).unwrap().dimensions(),
            (50, 100)
        );

        let small = write_png(&dir, "small.png", 20, 10);
        assert_eq!(
            generator.generate(&small, MediaKind::Image).unwrap().dimensions(),
            (100, 50)
        );
    }

    #[test]
    fn test_corrupt_image_is_empty_and_not_cached() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("broken.jpg");
        std::fs::write(&source, b"\xff\xd8\xff garbage").unwrap();
        let generator = generator(&dir, Box::new(NoVideoBackend));

        assert!(generator.generate(&source, MediaKind::Image).is_none());
        assert!(generator
            .generate(&dir.path().join("missing.png"), MediaKind::Image)
            .is_none());
        assert_eq!(cache_entries(&dir), 0);
    }

    #[test]
    fn test_image_decodes_from_sniffed_content() {
        let dir = TempDir::new().unwrap();
        // PNG bytes behind a misleading extension
        let png = write_png(&dir, "real.png", 400, 200);
        let misnamed = dir.path().join("looks_like.jpg");
        std::fs::rename(&png, &misnamed).unwrap();
        let generator = generator(&dir, Box::new(NoVideoBackend));

        let thumb = generator.generate(&misnamed, MediaKind::Image).unwrap();
        assert_eq!(thumb.dimensions(), (100, 50));
    }

    #[test]
    fn test_truncated_image_fails_after_header() {
        let dir = TempDir::new().unwrap();
        let full = std::fs::read(write_png(&dir, "full.png", 300, 300)).unwrap();
        // Header and size survive, pixel data does not
        let source = dir.path().join("truncated.png");
        std::fs::write(&source, &full[..64]).unwrap();
        let generator = generator(&dir, Box::new(NoVideoBackend));

        assert!(generator.generate(&source, MediaKind::Image).is_none());
        assert_eq!(cache_entries(&dir), 0);
    }

    #[test]
    fn test_video_with_five_bad_frames_is_empty() {
        let dir = TempDir::new().unwrap();
        let reads = Arc::new(AtomicUsize::new(0));
        let generator = generator(
            &dir,
            Box::new(FlakyVideo {
                bad: 5,
                reads: reads.clone(),
            }),
        );

        let result = generator.generate(Path::new("/videos/black_start.mp4"), MediaKind::Video);
        assert!(result.is_none());
        assert_eq!(reads.load(Ordering::SeqCst), 5);
        assert_eq!(cache_entries(&dir), 0);
    }

    #[test]
    fn test_video_recovers_after_bad_frames() {
        let dir = TempDir::new().unwrap();
        let generator = generator(
            &dir,
            Box::new(FlakyVideo {
                bad: 4,
                reads: Arc::new(AtomicUsize::new(0)),
            }),
        );

        let source = Path::new("/videos/late_start.mp4");
        let thumb = generator.generate(source, MediaKind::Video).unwrap();
        assert_eq!(thumb.dimensions(), (100, 56));
        // BGR input comes out red
        let px = thumb.get_pixel(50, 28).0;
        assert!(px[0] > 200 && px[2] < 50);
        assert!(generator.cache().lookup(source).is_some());
    }

    #[test]
    fn test_unopenable_video_is_empty() {
        let dir = TempDir::new().unwrap();
        let generator = generator(&dir, Box::new(NoVideoBackend));
        assert!(generator
            .generate(Path::new("/videos/clip.mp4"), MediaKind::Video)
            .is_none());
    }

    #[test]
    fn test_load_or_generate_prefers_cache() {
        let dir = TempDir::new().unwrap();
        let generator = generator(&dir, Box::new(NoVideoBackend));
        let source = write_png(&dir, "cached.png", 200, 200);

        assert!(generator.load_or_generate(&source, MediaKind::Image).is_some());
        std::fs::remove_file(&source).unwrap();
        // Source is gone, the cached entry still answers
        let thumb = generator.load_or_generate(&source, MediaKind::Image).unwrap();
        assert_eq!(thumb.dimensions(), (100, 100));
    }

    #[cfg(feature = "ffmpeg")]
    #[test]
    fn test_video_thumbnail_through_ffmpeg() {
        let dir = TempDir::new().unwrap();
        let clip = crate::thumbnail::video::tests::write_red_y4m(dir.path(), 32, 16, 2);
        let generator = generator(&dir, crate::thumbnail::video::default_backend());

        let thumb = generator.generate(&clip, MediaKind::Video).unwrap();
        assert_eq!(thumb.dimensions(), (100, 50));
        assert_eq!(cache_entries(&dir), 1);
    }
}
