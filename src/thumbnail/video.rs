/// Video frame extraction
///
/// Container formats frequently yield black, empty or corrupt leading frames,
/// so the generator reads a few frames sequentially and keeps the first
/// valid one. Decoding is behind the `VideoBackend` seam; the FFmpeg backend
/// is compiled in with the `ffmpeg` feature.
use std::path::Path;

use super::Thumbnail;

/// Byte layout of a decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(feature = "ffmpeg"), allow(dead_code))]
pub enum PixelLayout {
    Rgb24,
    Bgr24,
    Rgba32,
}

impl PixelLayout {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelLayout::Rgb24 | PixelLayout::Bgr24 => 3,
            PixelLayout::Rgba32 => 4,
        }
    }
}

/// A decoded frame, tightly packed (no row padding)
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub data: Vec<u8>,
}

impl VideoFrame {
    /// Placeholder for a frame the decoder failed to produce
    #[cfg_attr(not(feature = "ffmpeg"), allow(dead_code))]
    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            layout: PixelLayout::Rgb24,
            data: Vec::new(),
        }
    }

    /// Non-zero size with a buffer that matches it
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len()
                == self.width as usize * self.height as usize * self.layout.bytes_per_pixel()
    }

    /// Convert to the standard RGB layout. `None` for invalid frames.
    pub fn to_rgb(&self) -> Option<Thumbnail> {
        if !self.is_valid() {
            return None;
        }

        let rgb: Vec<u8> = match self.layout {
            PixelLayout::Rgb24 => self.data.clone(),
            PixelLayout::Bgr24 => self
                .data
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
            PixelLayout::Rgba32 => self
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
        };

        Thumbnail::from_raw(self.width, self.height, rgb)
    }
}

/// Sequential reader over a video's frames
pub trait FrameSource {
    /// The next frame. `Some` with an invalid frame when one couldn't be
    /// decoded, `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Option<VideoFrame>;
}

/// Opens video containers
pub trait VideoBackend: Send + Sync {
    /// `None` when the container can't be opened
    fn open(&self, path: &Path) -> Option<Box<dyn FrameSource>>;
}

/// Read at most `max_attempts` frames and return the first valid one as RGB
pub fn first_valid_frame(source: &mut dyn FrameSource, max_attempts: usize) -> Option<Thumbnail> {
    for attempt in 1..=max_attempts {
        let frame = source.next_frame()?;
        if let Some(rgb) = frame.to_rgb() {
            return Some(rgb);
        }
        tracing::debug!("Rejected empty video frame (attempt {attempt}/{max_attempts})");
    }
    None
}

/// Backend used when the crate is built without video support
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVideoBackend;

impl VideoBackend for NoVideoBackend {
    fn open(&self, path: &Path) -> Option<Box<dyn FrameSource>> {
        tracing::debug!(
            "Built without the `ffmpeg` feature, no video thumbnail for {}",
            path.display()
        );
        None
    }
}

/// The backend this build supports
pub fn default_backend() -> Box<dyn VideoBackend> {
    #[cfg(feature = "ffmpeg")]
    {
        Box::new(ffmpeg_backend::FfmpegBackend::new())
    }
    #[cfg(not(feature = "ffmpeg"))]
    {
        Box::new(NoVideoBackend)
    }
}

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_backend {
    use ffmpeg_next as ffmpeg;
    use ffmpeg::format::{context::Input, Pixel};
    use ffmpeg::software::scaling::{Context as Scaler, Flags};
    use ffmpeg::util::frame::video::Video;
    use std::path::Path;
    use tracing::{debug, warn};

    use super::{FrameSource, PixelLayout, VideoBackend, VideoFrame};

    /// Decodes frames with FFmpeg and converts them to RGB24
    pub struct FfmpegBackend {
        initialized: bool,
    }

    impl FfmpegBackend {
        pub fn new() -> Self {
            let initialized = match ffmpeg::init() {
                Ok(()) => {
                    ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Quiet);
                    true
                }
                Err(e) => {
                    warn!("FFmpeg failed to initialize, video thumbnails disabled: {e}");
                    false
                }
            };
            Self { initialized }
        }
    }

    impl Default for FfmpegBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    impl VideoBackend for FfmpegBackend {
        fn open(&self, path: &Path) -> Option<Box<dyn FrameSource>> {
            if !self.initialized {
                return None;
            }
            match FfmpegFrames::open(path) {
                Ok(frames) => Some(Box::new(frames)),
                Err(e) => {
                    debug!("Could not open video file {}: {e}", path.display());
                    None
                }
            }
        }
    }

    struct FfmpegFrames {
        input: Input,
        decoder: ffmpeg::decoder::Video,
        stream_index: usize,
        flushed: bool,
    }

    impl FfmpegFrames {
        fn open(path: &Path) -> Result<Self, ffmpeg::Error> {
            let input = ffmpeg::format::input(&path)?;
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or(ffmpeg::Error::StreamNotFound)?;
            let stream_index = stream.index();
            let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?
                .decoder()
                .video()?;

            Ok(Self {
                input,
                decoder,
                stream_index,
                flushed: false,
            })
        }

        /// Feed packets until the decoder yields a frame or the input ends
        fn decode_next(&mut self) -> Option<Result<Video, ffmpeg::Error>> {
            let mut decoded = Video::empty();
            loop {
                if self.decoder.receive_frame(&mut decoded).is_ok() {
                    return Some(Ok(decoded));
                }
                if self.flushed {
                    return None;
                }

                let mut packet = ffmpeg::Packet::empty();
                match packet.read(&mut self.input) {
                    Ok(()) if packet.stream() == self.stream_index => {
                        if let Err(e) = self.decoder.send_packet(&packet) {
                            return Some(Err(e));
                        }
                    }
                    Ok(()) => continue,
                    Err(ffmpeg::Error::Eof) => {
                        self.flushed = true;
                        let _ = self.decoder.send_eof();
                    }
                    Err(e) => return Some(Err(e)),
                }
            }
        }
    }

    impl FrameSource for FfmpegFrames {
        fn next_frame(&mut self) -> Option<VideoFrame> {
            let decoded = match self.decode_next()? {
                Ok(decoded) => decoded,
                Err(e) => {
                    debug!("Video frame decode failed: {e}");
                    return Some(VideoFrame::empty());
                }
            };
            Some(to_rgb24(&decoded).unwrap_or_else(|e| {
                debug!("Video frame conversion failed: {e}");
                VideoFrame::empty()
            }))
        }
    }

    /// Packed RGB-family layouts are copied as they are; anything else
    /// (usually planar YUV) goes through the scaler to RGB24 first.
    fn to_rgb24(decoded: &Video) -> Result<VideoFrame, ffmpeg::Error> {
        let (width, height) = (decoded.width(), decoded.height());
        if width == 0 || height == 0 {
            return Ok(VideoFrame::empty());
        }

        let packed = match decoded.format() {
            Pixel::RGB24 => Some(PixelLayout::Rgb24),
            Pixel::BGR24 => Some(PixelLayout::Bgr24),
            Pixel::RGBA => Some(PixelLayout::Rgba32),
            _ => None,
        };
        if let Some(layout) = packed {
            return Ok(copy_plane(decoded, layout));
        }

        let mut scaler = Scaler::get(
            decoded.format(),
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            Flags::BILINEAR,
        )?;
        let mut rgb = Video::empty();
        scaler.run(decoded, &mut rgb)?;
        Ok(copy_plane(&rgb, PixelLayout::Rgb24))
    }

    /// Strip the per-row padding FFmpeg adds
    fn copy_plane(frame: &Video, layout: PixelLayout) -> VideoFrame {
        let (width, height) = (frame.width(), frame.height());
        let stride = frame.stride(0);
        let row_bytes = width as usize * layout.bytes_per_pixel();
        let data = frame
            .data(0)
            .chunks(stride)
            .take(height as usize)
            .flat_map(|row| &row[..row_bytes.min(row.len())])
            .copied()
            .collect();

        VideoFrame {
            width,
            height,
            layout,
            data,
        }
    }
}
