//! Fixed-cadence tick source standing in for the host's display loop

use crate::error::{CatResult, Error};
use crate::rate::{FrameRate, HOST_REFRESH_HZ};
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::ops::ControlFlow;
use std::thread;
use std::time::{Duration, Instant};

/// Fires a callback every `rate.frame_interval()` host refreshes, on its own thread.
///
/// Ticks are scheduled against the start time rather than the previous tick, so
/// a slow callback doesn't make the cadence drift. Refreshes missed while the callback
/// was running are skipped, the way a display link drops frames.
pub struct CaptureScheduler {
    stop: Option<Sender<()>>,
    thread: Option<thread::JoinHandle<u64>>,
}

impl CaptureScheduler {
    /// The callback gets the number of the tick (from 1) and can end the schedule with `Break`.
    pub fn start<F>(rate: FrameRate, mut on_tick: F) -> CatResult<Self>
        where F: FnMut(u64) -> ControlFlow<()> + Send + 'static
    {
        let (stop, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let refresh = 1. / f64::from(HOST_REFRESH_HZ);
        let period = refresh * f64::from(rate.frame_interval());

        let thread = thread::Builder::new().name("capture-tick".into()).spawn(move || {
            let started = Instant::now();
            let mut slot = 0_u64;
            let mut ticks = 0_u64;
            loop {
                slot += 1;
                let deadline = started + Duration::from_secs_f64(slot as f64 * period);
                match stop_rx.recv_deadline(deadline) {
                    Err(RecvTimeoutError::Timeout) => {},
                    // stop requested or the scheduler was dropped
                    _ => break,
                }
                ticks += 1;
                if on_tick(ticks).is_break() {
                    break;
                }
                let due = (started.elapsed().as_secs_f64() / period).floor() as u64;
                if due > slot {
                    log::debug!("capture fell behind, skipping {} tick(s)", due - slot);
                    slot = due;
                }
            }
            ticks
        }).map_err(|_| Error::ThreadSend)?;

        Ok(Self {
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    /// No tick starts after this returns. A tick that is already running is allowed to finish first.
    ///
    /// Returns the number of ticks that fired. Stopping twice returns 0.
    pub fn stop(&mut self) -> u64 {
        drop(self.stop.take());
        let Some(thread) = self.thread.take() else {
            return 0;
        };
        if thread.thread().id() == thread::current().id() {
            // called from inside the callback; the loop exits once it returns
            return 0;
        }
        thread.join().unwrap_or_else(|_| {
            log::error!("capture tick thread panicked");
            0
        })
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for CaptureScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
