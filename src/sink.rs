use crate::error::{CatResult, Error};
use imgref::ImgVec;
use rgb::RGBA8;
use std::fs::File;
use std::io::BufWriter;
use std::iter::repeat;
use std::path::Path;

/// Destination of an animated GIF, fed one full-size frame at a time
pub trait GifSink {
    /// `loop_count` 0 loops forever
    fn set_global_properties(&mut self, loop_count: u16) -> CatResult<()>;
    /// `delay` is how long the frame is shown, in seconds
    fn append_image(&mut self, image: ImgVec<RGBA8>, delay: f64) -> CatResult<()>;
    /// Writes the trailer. Nothing written before this counts as a valid file.
    fn finalize(&mut self) -> CatResult<()>;
}

/// GIF stores delays as whole 1/100s
#[derive(Debug, Default)]
pub(crate) struct Centiseconds {
    elapsed: f64,
    position: u64,
}

impl Centiseconds {
    /// Rounds the running total rather than each delay, so rounding errors don't add up
    pub fn advance(&mut self, delay: f64) -> u16 {
        self.elapsed += delay.max(0.);
        let next = (self.elapsed * 100.).round() as u64;
        let delay = next.saturating_sub(self.position).min(u64::from(u16::MAX)) as u16;
        self.position += u64::from(delay);
        delay
    }
}

/// Palettizes frames with imagequant and writes them with the `gif` crate
pub struct GifFileSink {
    writer: Option<BufWriter<File>>,
    gif_enc: Option<gif::Encoder<BufWriter<File>>>,
    repeat: gif::Repeat,
    clock: Centiseconds,
    frames_expected: usize,
    frames_written: usize,
    fast: bool,
}

impl GifFileSink {
    /// `frame_count_hint` is only used for reporting
    pub fn create(path: &Path, frame_count_hint: usize, fast: bool) -> CatResult<Self> {
        let file = File::create(path)
            .map_err(|e| Error::AnimationGenerateFailed(format!("can't write to {}: {}", path.display(), e)))?;
        Ok(Self {
            writer: Some(BufWriter::new(file)),
            gif_enc: None,
            repeat: gif::Repeat::Infinite,
            clock: Centiseconds::default(),
            frames_expected: frame_count_hint,
            frames_written: 0,
            fast,
        })
    }

    fn quantize(&self, image: ImgVec<RGBA8>) -> CatResult<(Vec<RGBA8>, Vec<u8>, usize, usize)> {
        let mut liq = imagequant::new();
        if self.fast {
            liq.set_speed(10)?;
        }
        // the first frame is too important to ruin it
        let quality = if self.frames_written == 0 { 100 } else { 90 };
        liq.set_quality(0, quality)?;
        let (buf, width, height) = image.into_contiguous_buf();
        let mut img = liq.new_image(buf, width, height, 0.)?;
        img.add_fixed_color(RGBA8::new(0, 0, 0, 0))?;
        let mut res = liq.quantize(&mut img)?;
        res.set_dithering_level(0.5)?;
        let (pal, pixels) = res.remapped(&mut img)?;
        debug_assert_eq!(width * height, pixels.len());
        Ok((pal, pixels, width, height))
    }
}

impl GifSink for GifFileSink {
    fn set_global_properties(&mut self, loop_count: u16) -> CatResult<()> {
        self.repeat = if loop_count == 0 { gif::Repeat::Infinite } else { gif::Repeat::Finite(loop_count) };
        if let Some(enc) = &mut self.gif_enc {
            enc.set_repeat(self.repeat)?;
        }
        Ok(())
    }

    fn append_image(&mut self, image: ImgVec<RGBA8>, delay: f64) -> CatResult<()> {
        let (pal, pixels, width, height) = self.quantize(image)?;
        let width = u16::try_from(width)?;
        let height = u16::try_from(height)?;

        let mut pal_rgb: Vec<u8> = pal.iter().flat_map(|c| [c.r, c.g, c.b]).collect();
        // Palette should be power-of-two sized
        let needed_size = 3 * pal.len().max(2).next_power_of_two();
        pal_rgb.extend(repeat(0).take(needed_size - pal_rgb.len()));

        let mut frame = gif::Frame::default();
        frame.width = width;
        frame.height = height;
        frame.delay = self.clock.advance(delay);
        frame.dispose = gif::DisposalMethod::Keep;
        frame.transparent = pal.iter().position(|p| p.a == 0).map(|i| i as u8);
        frame.palette = Some(pal_rgb);
        frame.buffer = pixels.into();

        let enc = match self.gif_enc {
            Some(ref mut enc) => enc,
            None => {
                let writer = self.writer.take().ok_or(Error::ThreadSend)?;
                let mut enc = gif::Encoder::new(writer, width, height, &[])?;
                enc.set_repeat(self.repeat)?;
                self.gif_enc.get_or_insert(enc)
            },
        };
        enc.write_frame(&frame)?;
        self.frames_written += 1;
        Ok(())
    }

    fn finalize(&mut self) -> CatResult<()> {
        let enc = self.gif_enc.take().ok_or(Error::NoFrames)?;
        let failed = |e: std::io::Error| Error::AnimationGenerateFailed(e.to_string());
        let writer = enc.into_inner().map_err(failed)?;
        let file = writer.into_inner().map_err(|e| failed(e.into_error()))?;
        file.sync_all().map_err(failed)?;
        log::debug!("wrote {} of {} frames", self.frames_written, self.frames_expected);
        Ok(())
    }
}
