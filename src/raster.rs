//! Where frames come from, and how they are persisted between capture and GIF assembly

pub use imgref::ImgVec;
pub use rgb::RGBA8;

use crate::error::{CatResult, Error};

/// The thing being recorded.
///
/// `snapshot()` is called once per tick on the capture thread and must return
/// the current look of the target. `None` means the target is gone, which ends the session.
pub trait CaptureTarget: Send {
    fn snapshot(&mut self) -> Option<ImgVec<RGBA8>>;

    /// Checked once when recording starts
    fn is_valid(&self) -> bool {
        true
    }
}

impl<F> CaptureTarget for F where F: FnMut() -> Option<ImgVec<RGBA8>> + Send {
    #[inline]
    fn snapshot(&mut self) -> Option<ImgVec<RGBA8>> {
        self()
    }
}

/// Serializes a snapshot for temporary storage, and reads it back for encoding
pub trait RasterCodec: Send + Sync {
    fn encode(&self, image: &ImgVec<RGBA8>) -> CatResult<Vec<u8>>;
    fn decode(&self, data: &[u8]) -> CatResult<ImgVec<RGBA8>>;
}

/// Lossless PNG via lodepng
#[derive(Debug, Default, Copy, Clone)]
pub struct PngCodec;

impl RasterCodec for PngCodec {
    fn encode(&self, image: &ImgVec<RGBA8>) -> CatResult<Vec<u8>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::FrameEncodeFailed("image has no pixels".into()));
        }
        let (buf, width, height) = image.as_ref().to_contiguous_buf();
        lodepng::encode32(&buf[..], width, height)
            .map_err(|e| Error::FrameEncodeFailed(e.to_string()))
    }

    fn decode(&self, data: &[u8]) -> CatResult<ImgVec<RGBA8>> {
        let image = lodepng::decode32(data)
            .map_err(|e| Error::AnimationGenerateFailed(format!("can't decode frame: {e}")))?;
        Ok(ImgVec::new(image.buffer, image.width, image.height))
    }
}
