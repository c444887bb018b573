//! Start/stop state machine tying capture, storage and encoding together
//!
//! Two threads work for a recording: the tick thread only takes snapshots,
//! and a single worker thread does everything that touches the disk, in order.
//! Because both frames and the final "encode now" request travel through the same queue,
//! encoding can't start before the last accepted frame has been written.

use crate::encoder::{GifEncoder, RecordingSpan};
use crate::error::{CatResult, Error, ErrorKind};
use crate::raster::{CaptureTarget, PngCodec, RasterCodec};
use crate::scheduler::CaptureScheduler;
use crate::store::{CacheArea, FrameStore};
use crate::Settings;
use crossbeam_channel::{Receiver, Sender};
use imgref::ImgVec;
use rgb::RGBA8;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Captured frames waiting for the worker. When full, the tick thread waits.
const FRAME_QUEUE_DEPTH: usize = 8;

/// Progress of a recording, as reported to the owner of the session
#[derive(Debug)]
pub enum Event {
    Started,
    /// Something went wrong that doesn't end the recording, like a frame that couldn't be saved
    Warning(Error),
    /// Capture has ended; no more frames will be added
    Stopped,
    Completed {
        output: PathBuf,
        frames: usize,
        /// Temporary frames that couldn't be removed. Doesn't affect the GIF.
        cleanup_error: Option<Error>,
    },
    Failed(Error),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    /// Capture has stopped and the GIF is being written
    Finalizing,
}

/// Things happening to the host application that end a recording
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LifecycleSignal {
    EnteredBackground,
    Terminating,
}

/// Wall-clock seconds, advanced by a monotonic clock so it can't go backwards mid-recording
#[derive(Debug, Copy, Clone)]
struct SessionClock {
    wall_start: f64,
    epoch: Instant,
}

impl SessionClock {
    fn start() -> Self {
        let wall_start = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.);
        Self { wall_start, epoch: Instant::now() }
    }

    fn now(&self) -> f64 {
        self.wall_start + self.epoch.elapsed().as_secs_f64()
    }
}

/// Hands out frame timestamps at the store's µs resolution, each strictly after the previous one
struct FrameClock {
    clock: SessionClock,
    last_us: Option<u64>,
}

impl FrameClock {
    fn next(&mut self) -> f64 {
        let now_us = (self.clock.now() * 1_000_000.).round() as u64;
        let us = match self.last_us {
            Some(last) if now_us <= last => last + 1,
            _ => now_us,
        };
        self.last_us = Some(us);
        us as f64 / 1_000_000.
    }
}

enum Job {
    Frame { timestamp: f64, image: ImgVec<RGBA8> },
    Abort(Error),
    Finish { stop_time: f64 },
}

struct Active {
    scheduler: CaptureScheduler,
    jobs: Sender<Job>,
    capturing: Arc<AtomicBool>,
    clock: SessionClock,
}

struct Inner {
    state: SessionState,
    active: Option<Active>,
    frames: Arc<AtomicUsize>,
}

struct Shared {
    settings: Settings,
    events: Sender<Event>,
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // state stays consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: Event) {
        match &event {
            Event::Failed(err) => log::error!("recording failed: {err}"),
            Event::Warning(err) => log::warn!("{err}"),
            _ => {},
        }
        // nobody listening is fine
        let _ = self.events.send(event);
    }
}

/// Records a [`CaptureTarget`] into an animated GIF.
///
/// Only one recording runs at a time per session; independent sessions can run side by side.
/// All outcomes are reported as [`Event`]s on the receiver returned by [`RecordingSession::new`],
/// so whoever reads that receiver sees them in order, on one thread.
pub struct RecordingSession {
    shared: Arc<Shared>,
}

impl RecordingSession {
    #[must_use]
    pub fn new(settings: Settings) -> (Self, Receiver<Event>) {
        let (events, events_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared {
            settings,
            events,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                active: None,
                frames: Arc::new(AtomicUsize::new(0)),
            }),
        });
        (Self { shared }, events_rx)
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// Frames stored so far in the current (or last) recording
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.shared.lock().frames.load(SeqCst)
    }

    /// Begins capturing `target`.
    ///
    /// While a recording is running or being finalized this does nothing and returns `AlreadyRecording`.
    /// Any other failure leaves the session idle, and is also sent as [`Event::Failed`] with the full cause.
    pub fn start<T: CaptureTarget + 'static>(&self, target: Option<T>) -> Result<(), ErrorKind> {
        let mut inner = self.shared.lock();
        if inner.state != SessionState::Idle {
            log::debug!("start ignored, session is {:?}", inner.state);
            return Err(ErrorKind::AlreadyRecording);
        }
        match self.begin(&mut inner, target) {
            Ok(()) => {
                inner.state = SessionState::Recording;
                log::info!("recording at {}", self.shared.settings.frame_rate);
                self.shared.emit(Event::Started);
                Ok(())
            },
            Err(err) => {
                let kind = err.kind();
                self.shared.emit(Event::Failed(err));
                Err(kind)
            },
        }
    }

    fn begin<T: CaptureTarget + 'static>(&self, inner: &mut Inner, target: Option<T>) -> CatResult<()> {
        let mut target = target.filter(|t| t.is_valid()).ok_or(Error::EmptyTarget)?;
        let settings = &self.shared.settings;

        let area = CacheArea::resolve(settings.cache_dir.as_deref())?;
        let clock = SessionClock::start();
        let (store, output) = area.open_session(clock.wall_start)?;

        inner.frames = Arc::new(AtomicUsize::new(0));
        let capturing = Arc::new(AtomicBool::new(true));
        let (jobs, jobs_rx) = crossbeam_channel::bounded(FRAME_QUEUE_DEPTH);

        let scope = store.dir().to_path_buf();
        let mut encoder = GifEncoder::new(settings.loop_count, settings.timing);
        encoder.set_fast(settings.fast);
        let worker = Worker {
            shared: self.shared.clone(),
            store,
            output,
            start_time: clock.wall_start,
            encoder,
            codec: PngCodec,
            capturing: capturing.clone(),
            frames: inner.frames.clone(),
        };
        if let Err(err) = thread::Builder::new().name("screengif-worker".into()).spawn(move || worker.run(jobs_rx)) {
            log::error!("can't start worker: {err}");
            let _ = FrameStore::with_dir(scope).reset();
            return Err(Error::ThreadSend);
        }

        let tick_jobs = jobs.clone();
        let tick_capturing = capturing.clone();
        let mut frame_clock = FrameClock { clock, last_us: None };
        let scheduler = CaptureScheduler::start(settings.frame_rate, move |_| {
            if !tick_capturing.load(SeqCst) {
                return ControlFlow::Break(());
            }
            let Some(image) = target.snapshot() else {
                let _ = tick_jobs.send(Job::Abort(Error::EmptyFrame));
                return ControlFlow::Break(());
            };
            let timestamp = frame_clock.next();
            match tick_jobs.send(Job::Frame { timestamp, image }) {
                Ok(()) => ControlFlow::Continue(()),
                Err(_) => ControlFlow::Break(()),
            }
        })?;

        inner.active = Some(Active { scheduler, jobs, capturing, clock });
        Ok(())
    }

    /// Ends capture and starts writing the GIF in the background. Does nothing unless recording.
    ///
    /// When this returns no more frames will be captured; the outcome arrives later as
    /// [`Event::Completed`] or [`Event::Failed`].
    pub fn stop(&self) {
        let active = {
            let mut inner = self.shared.lock();
            if inner.state != SessionState::Recording {
                return;
            }
            let Some(active) = inner.active.take() else {
                inner.state = SessionState::Idle;
                return;
            };
            inner.state = SessionState::Finalizing;
            active.capturing.store(false, SeqCst);
            self.shared.emit(Event::Stopped);
            active
        };
        let stop_time = active.clock.now();
        let Active { mut scheduler, jobs, .. } = active;
        let ticks = scheduler.stop();
        log::info!("stopped after {ticks} ticks");
        // fails only if the worker has already given up, and then it has reported why
        let _ = jobs.send(Job::Finish { stop_time });
    }

    /// Lets the host's lifecycle end the recording the same way [`stop`](Self::stop) does
    pub fn on_lifecycle(&self, signal: LifecycleSignal) {
        log::debug!("lifecycle signal {signal:?}");
        self.stop();
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owns the session's store for as long as the recording lasts
struct Worker {
    shared: Arc<Shared>,
    store: FrameStore,
    output: PathBuf,
    start_time: f64,
    encoder: GifEncoder,
    codec: PngCodec,
    capturing: Arc<AtomicBool>,
    frames: Arc<AtomicUsize>,
}

impl Worker {
    fn run(self, jobs: Receiver<Job>) {
        let mut last_timestamp = None;
        loop {
            match jobs.recv() {
                Ok(Job::Frame { timestamp, image }) => {
                    match self.codec.encode(&image).and_then(|data| self.store.append(timestamp, &data)) {
                        Ok(_) => {
                            self.frames.fetch_add(1, SeqCst);
                            last_timestamp = Some(timestamp);
                        },
                        Err(err @ Error::StorageWriteFailed(_)) => {
                            log::debug!("dropped frame at {timestamp:.6}");
                            self.shared.emit(Event::Warning(err));
                        },
                        Err(err) => return self.abort(jobs, err),
                    }
                },
                Ok(Job::Abort(err)) => return self.abort(jobs, err),
                Ok(Job::Finish { stop_time }) => {
                    drop(jobs);
                    let stop_time = last_timestamp.map_or(stop_time, |t: f64| t.max(stop_time));
                    let res = self.encoder.encode(&self.store, RecordingSpan { start: self.start_time, stop: stop_time }, &self.output);
                    let cleanup_error = self.store.reset().err();
                    return self.finish(res, cleanup_error);
                },
                Err(_) => {
                    // the session went away without finishing
                    let _ = self.store.reset();
                    return;
                },
            }
        }
    }

    /// Ends the recording without a GIF
    fn abort(self, jobs: Receiver<Job>, err: Error) {
        self.capturing.store(false, SeqCst);
        // unblocks the tick thread if it's waiting for queue space
        drop(jobs);

        let scheduler = {
            let mut inner = self.shared.lock();
            if inner.state == SessionState::Recording {
                self.shared.emit(Event::Stopped);
                inner.state = SessionState::Finalizing;
            }
            inner.active.take().map(|a| a.scheduler)
        };
        if let Some(mut scheduler) = scheduler {
            scheduler.stop();
        }
        let cleanup_error = self.store.reset().err();
        self.finish(Err(err), cleanup_error);
    }

    /// Reports the outcome and makes the session available for the next recording
    fn finish(self, res: CatResult<usize>, cleanup_error: Option<Error>) {
        let mut inner = self.shared.lock();
        inner.state = SessionState::Idle;
        match res {
            Ok(frames) => {
                log::info!("wrote {frames} frames to {}", self.output.display());
                if let Some(err) = &cleanup_error {
                    log::warn!("{err} ({})", self.store.dir().display());
                }
                self.shared.emit(Event::Completed { output: self.output, frames, cleanup_error });
            },
            Err(err) => {
                if let Some(cleanup) = cleanup_error {
                    self.shared.emit(Event::Warning(cleanup));
                }
                self.shared.emit(Event::Failed(err));
            },
        }
    }
}
