//! Turns stored frames into one animated GIF

use crate::error::{CatResult, Error};
use crate::raster::{PngCodec, RasterCodec};
use crate::sink::{GifFileSink, GifSink};
use crate::store::{FrameStore, StoredFrame};
use imgref::ImgVec;
use rgb::RGBA8;
use std::fs;
use std::path::Path;

/// How capture timestamps become per-frame delays
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum DelayTiming {
    /// A frame's delay is the time since the previous frame was captured
    /// (since recording started, for the first frame).
    #[default]
    SincePrevious,
    /// A frame's delay is the time until the next frame was captured
    /// (until recording stopped, for the last frame).
    UntilNext,
}

/// Start and stop times of a recording, in the same clock as the frame timestamps
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RecordingSpan {
    pub start: f64,
    pub stop: f64,
}

pub struct GifEncoder {
    loop_count: u16,
    timing: DelayTiming,
    fast: bool,
    codec: Box<dyn RasterCodec>,
}

impl GifEncoder {
    /// Frames are expected to be PNG files
    #[must_use]
    pub fn new(loop_count: u16, timing: DelayTiming) -> Self {
        Self::with_codec(loop_count, timing, Box::new(PngCodec))
    }

    #[must_use]
    pub fn with_codec(loop_count: u16, timing: DelayTiming, codec: Box<dyn RasterCodec>) -> Self {
        Self { loop_count, timing, fast: false, codec }
    }

    /// Lower quality palettes, but faster
    pub fn set_fast(&mut self, fast: bool) {
        self.fast = fast;
    }

    /// Encodes everything in `store` to `output`. Returns how many frames were written.
    ///
    /// The stored frames are left for the caller to remove. On failure no file is left at `output`.
    pub fn encode(&self, store: &FrameStore, span: RecordingSpan, output: &Path) -> CatResult<usize> {
        let res = store.drain_ordered().and_then(|frames| {
            if frames.is_empty() {
                return Err(Error::NoFrames);
            }
            let mut sink = GifFileSink::create(output, frames.len(), self.fast)?;
            self.encode_frames(&frames, span, &mut sink)
        });
        if res.is_err() {
            let _ = fs::remove_file(output);
        }
        res
    }

    /// Writes `frames` (oldest first) to `sink` and finalizes it. Returns how many frames were written.
    ///
    /// Frames that can't be read or decoded, or don't match the size of the first frame, are skipped.
    pub fn encode_frames(&self, frames: &[StoredFrame], span: RecordingSpan, sink: &mut dyn GifSink) -> CatResult<usize> {
        sink.set_global_properties(self.loop_count)?;

        let mut screen = None;
        let mut previous = span.start;
        let mut held_back: Option<(ImgVec<RGBA8>, f64)> = None;
        let mut written = 0;
        for frame in frames {
            let since_previous = frame.timestamp - previous;
            previous = frame.timestamp;
            let image = match self.load(&frame.path) {
                Ok(image) => image,
                Err(err) => {
                    log::warn!("skipping frame {}: {err}", frame.path.display());
                    continue;
                },
            };
            let size = (image.width(), image.height());
            let expected = *screen.get_or_insert(size);
            if expected != size {
                log::warn!("skipping frame {}: it's {}×{}, expected {}×{}", frame.path.display(), size.0, size.1, expected.0, expected.1);
                continue;
            }

            match self.timing {
                DelayTiming::SincePrevious => {
                    sink.append_image(image, since_previous)?;
                    written += 1;
                },
                DelayTiming::UntilNext => {
                    if let Some((prev_image, prev_ts)) = held_back.replace((image, frame.timestamp)) {
                        sink.append_image(prev_image, frame.timestamp - prev_ts)?;
                        written += 1;
                    }
                },
            }
        }
        if let Some((image, ts)) = held_back {
            sink.append_image(image, (span.stop - ts).max(0.))?;
            written += 1;
        }

        if written == 0 {
            return Err(Error::NoFrames);
        }
        sink.finalize()?;
        Ok(written)
    }

    fn load(&self, path: &Path) -> CatResult<ImgVec<RGBA8>> {
        let data = fs::read(path).map_err(|e| Error::AnimationGenerateFailed(e.to_string()))?;
        self.codec.decode(&data)
    }
}
