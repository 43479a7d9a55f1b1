//! Frame sources: where capture rasters come from.
//!
//! A source yields raw rasters until it is exhausted or closed. End of stream
//! is `None`, never an error, and `close` may be called any number of times.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use image::DynamicImage;

/// Default inter-frame interval for paced sources (about 30 fps).
pub const DEFAULT_FRAME_PERIOD: Duration = Duration::from_millis(33);

/// Producer of capture rasters.
pub trait FrameSource: Send {
    /// Next frame, or `None` once the source is exhausted or closed.
    fn read_frame(&mut self) -> Option<DynamicImage>;

    fn is_open(&self) -> bool;

    /// Release the source. Idempotent.
    fn close(&mut self);
}

// ── In-memory still ─────────────────────────────────────────────────────

/// Emits a single in-memory raster, then reports end of stream.
#[derive(Debug, Clone)]
pub struct StillImage {
    frame: Option<DynamicImage>,
    open: bool,
}

impl StillImage {
    pub fn new(frame: DynamicImage) -> Self {
        Self {
            frame: Some(frame),
            open: true,
        }
    }
}

impl FrameSource for StillImage {
    fn read_frame(&mut self) -> Option<DynamicImage> {
        if !self.open {
            return None;
        }
        self.frame.take()
    }

    fn is_open(&self) -> bool {
        self.open && self.frame.is_some()
    }

    fn close(&mut self) {
        self.open = false;
        self.frame = None;
    }
}

// ── Image file ──────────────────────────────────────────────────────────

/// Decodes one image from disk on first read.
///
/// Decode failures are logged and surface as end of stream.
#[derive(Debug, Clone)]
pub struct ImageFile {
    path: PathBuf,
    consumed: bool,
    open: bool,
}

impl ImageFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            consumed: false,
            open: true,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl FrameSource for ImageFile {
    fn read_frame(&mut self) -> Option<DynamicImage> {
        if !self.open || self.consumed {
            return None;
        }
        self.consumed = true;
        decode_path(&self.path)
    }

    fn is_open(&self) -> bool {
        self.open && !self.consumed
    }

    fn close(&mut self) {
        self.open = false;
    }
}

fn decode_path(path: &std::path::Path) -> Option<DynamicImage> {
    match image::open(path) {
        Ok(img) => Some(img),
        Err(e) => {
            tracing::warn!("failed to decode frame {}: {}", path.display(), e);
            None
        }
    }
}

// ── Sequence ────────────────────────────────────────────────────────────

/// A frame held by a [`FrameSequence`]: already decoded or still on disk.
#[derive(Debug, Clone)]
pub enum SequenceFrame {
    Memory(DynamicImage),
    Path(PathBuf),
}

/// Emits a queue of frames at a target interval.
///
/// With pacing enabled, `read_frame` sleeps until the next slot so that
/// consecutive frames are at least `frame_period` apart. On-disk frames that
/// fail to decode are logged and skipped.
#[derive(Debug)]
pub struct FrameSequence {
    frames: VecDeque<SequenceFrame>,
    frame_period: Duration,
    paced: bool,
    last_emit: Option<Instant>,
    open: bool,
}

impl FrameSequence {
    pub fn new(frames: impl IntoIterator<Item = SequenceFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            frame_period: DEFAULT_FRAME_PERIOD,
            paced: false,
            last_emit: None,
            open: true,
        }
    }

    pub fn from_paths<P: Into<PathBuf>>(paths: impl IntoIterator<Item = P>) -> Self {
        Self::new(paths.into_iter().map(|p| SequenceFrame::Path(p.into())))
    }

    pub fn with_frame_period(mut self, period: Duration) -> Self {
        self.frame_period = period;
        self
    }

    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    pub fn frame_period(&self) -> Duration {
        self.frame_period
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    fn wait_for_slot(&mut self) {
        if let Some(last) = self.last_emit {
            let elapsed = last.elapsed();
            if elapsed < self.frame_period {
                std::thread::sleep(self.frame_period - elapsed);
            }
        }
        self.last_emit = Some(Instant::now());
    }
}

impl FrameSource for FrameSequence {
    fn read_frame(&mut self) -> Option<DynamicImage> {
        if !self.open {
            return None;
        }
        // Unreadable entries are skipped; `None` means the queue is drained.
        while let Some(frame) = self.frames.pop_front() {
            let img = match frame {
                SequenceFrame::Memory(img) => img,
                SequenceFrame::Path(path) => match decode_path(&path) {
                    Some(img) => img,
                    None => continue,
                },
            };
            if self.paced {
                self.wait_for_slot();
            }
            return Some(img);
        }
        None
    }

    fn is_open(&self) -> bool {
        self.open && !self.frames.is_empty()
    }

    fn close(&mut self) {
        self.open = false;
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    fn frame(v: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, image::Luma([v])))
    }

    #[test]
    fn still_image_yields_once() {
        let mut src = StillImage::new(frame(7));
        assert!(src.is_open());
        assert!(src.read_frame().is_some());
        assert!(src.read_frame().is_none());
        assert!(!src.is_open());
    }

    #[test]
    fn close_is_idempotent_and_ends_stream() {
        let mut src = StillImage::new(frame(1));
        src.close();
        src.close();
        assert!(!src.is_open());
        assert!(src.read_frame().is_none());
    }

    #[test]
    fn missing_file_reads_as_end_of_stream() {
        let mut src = ImageFile::new("/nonexistent/pagematch/capture.png");
        assert!(src.is_open());
        assert!(src.read_frame().is_none());
        assert!(src.read_frame().is_none());
        src.close();
        assert!(!src.is_open());
    }

    #[test]
    fn sequence_preserves_order() {
        let mut src = FrameSequence::new([
            SequenceFrame::Memory(frame(10)),
            SequenceFrame::Memory(frame(20)),
        ]);
        assert_eq!(src.remaining(), 2);
        let a = src.read_frame().unwrap().to_luma8();
        let b = src.read_frame().unwrap().to_luma8();
        assert_eq!(a.get_pixel(0, 0)[0], 10);
        assert_eq!(b.get_pixel(0, 0)[0], 20);
        assert!(src.read_frame().is_none());
    }

    #[test]
    fn paced_sequence_respects_frame_period() {
        let period = Duration::from_millis(15);
        let mut src = FrameSequence::new([
            SequenceFrame::Memory(frame(1)),
            SequenceFrame::Memory(frame(2)),
        ])
        .with_frame_period(period)
        .paced(true);
        let start = Instant::now();
        src.read_frame().unwrap();
        src.read_frame().unwrap();
        assert!(start.elapsed() >= period);
    }

    #[test]
    fn unreadable_path_is_skipped_not_end_of_stream() {
        let good = std::env::temp_dir().join(format!(
            "pagematch-seq-{}-good.png",
            std::process::id()
        ));
        frame(99).save(&good).unwrap();

        let mut src = FrameSequence::new([
            SequenceFrame::Path("/nonexistent/pagematch/frame-0.png".into()),
            SequenceFrame::Memory(frame(10)),
            SequenceFrame::Path("/nonexistent/pagematch/frame-2.png".into()),
            SequenceFrame::Path(good.clone()),
        ]);
        let a = src.read_frame().unwrap().to_luma8();
        assert_eq!(a.get_pixel(0, 0)[0], 10);
        assert!(src.is_open());
        let b = src.read_frame().unwrap().to_luma8();
        assert_eq!(b.get_pixel(0, 0)[0], 99);
        assert!(src.read_frame().is_none());
        assert!(!src.is_open());
        let _ = std::fs::remove_file(&good);
    }

    #[test]
    fn sequence_of_unreadable_paths_is_exhausted() {
        let mut src = FrameSequence::from_paths([
            "/nonexistent/pagematch/a.png",
            "/nonexistent/pagematch/b.png",
        ]);
        assert!(src.read_frame().is_none());
        assert_eq!(src.remaining(), 0);
        assert!(!src.is_open());
    }

    #[test]
    fn closed_sequence_drops_pending_frames() {
        let mut src = FrameSequence::new([SequenceFrame::Memory(frame(1))]);
        src.close();
        assert_eq!(src.remaining(), 0);
        assert!(src.read_frame().is_none());
    }
}
