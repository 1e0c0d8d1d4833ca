// Frame rate counter for the window title

use std::time::{Duration, Instant};

const SAMPLE_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpsSample {
    pub fps: f32,
    /// Duration of the most recent frame
    pub frame_ms: f32,
}

#[derive(Debug)]
pub struct FpsCounter {
    frames: u32,
    period_start: Instant,
    last_frame: Instant,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            frames: 0,
            period_start: now,
            last_frame: now,
        }
    }

    /// Count one presented frame. Yields a sample at most once per second.
    pub fn tick(&mut self, now: Instant) -> Option<FpsSample> {
        let frame_ms = now.duration_since(self.last_frame).as_secs_f32() * 1000.0;
        self.last_frame = now;
        self.frames += 1;

        let elapsed = now.duration_since(self.period_start);
        if elapsed < SAMPLE_PERIOD {
            return None;
        }

        let sample = FpsSample {
            fps: self.frames as f32 / elapsed.as_secs_f32(),
            frame_ms,
        };
        self.frames = 0;
        self.period_start = now;
        Some(sample)
    }
}

pub fn window_title(base: &str, sample: &FpsSample, fullscreen: bool) -> String {
    let mode = if fullscreen { "fullscreen" } else { "windowed" };
    format!(
        "{} - {:.0} FPS ({:.2}ms) [{}]",
        base, sample.fps, sample.frame_ms, mode
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_once_per_second() {
        let start = Instant::now();
        let mut counter = FpsCounter::new(start);
        let step = Duration::from_millis(10);

        let mut samples = Vec::new();
        for i in 1..=150 {
            if let Some(s) = counter.tick(start + step * i) {
                samples.push((i, s));
            }
        }

        assert_eq!(samples.len(), 1);
        let (frame, sample) = samples[0];
        assert_eq!(frame, 100);
        assert!((sample.fps - 100.0).abs() < 0.5);
        assert!((sample.frame_ms - 10.0).abs() < 0.01);
    }

    #[test]
    fn counter_restarts_after_sample() {
        let start = Instant::now();
        let mut counter = FpsCounter::new(start);
        assert!(counter.tick(start + Duration::from_secs(2)).is_some());
        assert!(counter.tick(start + Duration::from_millis(2500)).is_none());
        let s = counter.tick(start + Duration::from_secs(3)).unwrap();
        assert!((s.fps - 2.0).abs() < 1e-3);
    }

    #[test]
    fn title_format() {
        let sample = FpsSample {
            fps: 59.6,
            frame_ms: 16.789,
        };
        assert_eq!(
            window_title("Vulkan Triangle", &sample, false),
            "Vulkan Triangle - 60 FPS (16.79ms) [windowed]"
        );
        assert!(window_title("x", &sample, true).ends_with("[fullscreen]"));
    }
}
