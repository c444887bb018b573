//! Capture cadence

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Refresh rate of the host display loop that ticks are derived from
pub const HOST_REFRESH_HZ: u32 = 60;

/// How often a frame is captured, as a whole divisor of [`HOST_REFRESH_HZ`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum FrameRate {
    F6,
    F10,
    #[default]
    F15,
    F30,
    F60,
}

impl FrameRate {
    pub const ALL: [Self; 5] = [Self::F6, Self::F10, Self::F15, Self::F30, Self::F60];

    #[must_use]
    pub fn fps(self) -> u32 {
        match self {
            Self::F6 => 6,
            Self::F10 => 10,
            Self::F15 => 15,
            Self::F30 => 30,
            Self::F60 => 60,
        }
    }

    /// Number of host refreshes between two ticks. Always >= 1.
    #[must_use]
    pub fn frame_interval(self) -> u32 {
        HOST_REFRESH_HZ / self.fps()
    }

    /// Nominal time between two captured frames
    #[must_use]
    pub fn seconds(self) -> f64 {
        f64::from(self.frame_interval()) / f64::from(HOST_REFRESH_HZ)
    }

    #[must_use]
    pub fn tick_period(self) -> Duration {
        Duration::from_secs_f64(self.seconds())
    }
}

impl TryFrom<u32> for FrameRate {
    type Error = String;

    fn try_from(fps: u32) -> Result<Self, Self::Error> {
        Self::ALL.into_iter().find(|r| r.fps() == fps)
            .ok_or_else(|| format!("unsupported frame rate {fps}; use one of 6, 10, 15, 30 or 60"))
    }
}

impl FromStr for FrameRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fps: u32 = s.trim().parse().map_err(|_| format!("frame rate must be a number, got \"{s}\""))?;
        fps.try_into()
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fps", self.fps())
    }
}
