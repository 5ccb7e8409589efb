//! Frame time readout shown in the window title.

use std::time::{Duration, Instant};

/// Averages frame times over roughly one second windows.
pub struct FrameTimer {
    window_start: Instant,
    frames: u32,
    average: Option<Duration>,
}

impl FrameTimer {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames: 0,
            average: None,
        }
    }

    /// Counts a frame finished at `now`.
    pub fn tick(&mut self, now: Instant) {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= Duration::from_secs(1) {
            self.average = Some(elapsed / self.frames);
            self.window_start = now;
            self.frames = 0;
        }
    }

    /// `"<title> | 16.667 ms/frame (60.0 FPS)"`, or the bare title before the
    /// first full window.
    pub fn status(&self, title: &str) -> String {
        match self.average {
            Some(average) if !average.is_zero() => {
                let ms = average.as_secs_f64() * 1000.0;
                format!("{title} | {ms:.3} ms/frame ({:.1} FPS)", 1000.0 / ms)
            }
            _ => title.to_owned(),
        }
    }
}
