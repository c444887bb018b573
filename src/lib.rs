/*
 screengif animated GIF screen recorder
 © 2017 Kornel Lesiński

 This program is free software: you can redistribute it and/or modify
 it under the terms of the GNU Affero General Public License as
 published by the Free Software Foundation, either version 3 of the
 License, or (at your option) any later version.

 This program is distributed in the hope that it will be useful,
 but WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 GNU Affero General Public License for more details.

 You should have received a copy of the GNU Affero General Public License
 along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/
//! Records something that can be snapshotted into an animated GIF.
//!
//! ```no_run
//! use screengif::{ImgVec, RGBA8, Event, Settings};
//!
//! let (session, events) = screengif::new(Settings::default());
//! session.start(Some(|| Some(ImgVec::new(vec![RGBA8::new(0, 0, 0, 255); 64 * 48], 64, 48)))).ok();
//! std::thread::sleep(std::time::Duration::from_secs(2));
//! session.stop();
//! for event in events {
//!     match event {
//!         Event::Completed { output, .. } => { println!("{}", output.display()); break },
//!         Event::Failed(err) => { eprintln!("{err}"); break },
//!         _ => {},
//!     }
//! }
//! ```

#[macro_use] extern crate quick_error;

mod error;
pub use crate::error::*;
mod rate;
pub use crate::rate::*;
pub mod raster;
pub use crate::raster::{CaptureTarget, ImgVec, PngCodec, RasterCodec, RGBA8};
pub mod store;
pub mod scheduler;
pub mod sink;
pub mod encoder;
pub use crate::encoder::{DelayTiming, GifEncoder, RecordingSpan};
mod session;
pub use crate::session::*;

use crossbeam_channel::Receiver;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// How often the target is captured
    pub frame_rate: FrameRate,
    /// Number of times the animation repeats; 0 loops forever
    pub loop_count: u16,
    /// Where temporary frames and finished GIFs go. Defaults to the user's cache directory.
    pub cache_dir: Option<PathBuf>,
    pub timing: DelayTiming,
    /// Lower quality palettes, but faster encode
    pub fast: bool,
}

/// Create a recording session
///
/// Outcomes of every recording made with the session arrive on the returned receiver.
#[must_use]
pub fn new(settings: Settings) -> (RecordingSession, Receiver<Event>) {
    RecordingSession::new(settings)
}
