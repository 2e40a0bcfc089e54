//! Adaptive repaint scheduling.
//!
//! The repaint timer fires at the current repaint interval. After each real
//! paint the interval becomes the refresh interval minus the average measured
//! paint time, so a paint plus the wait before the next one tracks the display
//! refresh cadence. The result never drops below the configured floor; when
//! painting is too slow for that, the plain refresh interval is used.

use std::time::{Duration, Instant};

use novade_core::config::SchedulerConfig;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// Timer armed, nothing to paint.
    Idle,
    /// Timer armed, damage pending.
    Scheduled,
    /// Paint in progress.
    Painting,
}

#[derive(Debug)]
pub struct RepaintScheduler {
    phase: SchedulerPhase,
    refresh_rate_interval: Duration,
    repaint_interval: Duration,
    fallback_interval: Duration,
    minimum_interval: Duration,
    paint_time_sum: Duration,
    paint_count: u32,
    idle_ticks: u64,
}

impl RepaintScheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        let minimum_interval = config.minimum_repaint_interval();
        let fallback_interval = config.fallback_refresh_interval().max(minimum_interval);
        Self {
            phase: SchedulerPhase::Idle,
            refresh_rate_interval: fallback_interval,
            repaint_interval: fallback_interval,
            fallback_interval,
            minimum_interval,
            paint_time_sum: Duration::ZERO,
            paint_count: 0,
            idle_ticks: 0,
        }
    }

    /// Derives the refresh interval from the display refresh rate in Hz.
    ///
    /// Without a usable rate the fallback interval is used. The repaint
    /// interval restarts from the new refresh interval.
    pub fn set_refresh_rate(&mut self, rate: Option<u16>) -> Duration {
        let interval = match rate {
            Some(hz) if hz > 0 => Duration::from_secs(1) / u32::from(hz),
            _ => {
                let hz = Duration::from_secs(1).as_secs_f64() / self.fallback_interval.as_secs_f64();
                warn!("Could not get the display refresh rate, falling back on {:.0}Hz", hz);
                self.fallback_interval
            }
        };
        self.refresh_rate_interval = interval.max(self.minimum_interval);
        self.repaint_interval = self.refresh_rate_interval;
        debug!(
            refresh_interval_us = self.refresh_rate_interval.as_micros() as u64,
            "Refresh interval set"
        );
        self.refresh_rate_interval
    }

    /// Records that damage is waiting for the next tick.
    pub fn note_damage(&mut self) {
        if self.phase == SchedulerPhase::Idle {
            self.phase = SchedulerPhase::Scheduled;
        }
    }

    /// A tick found nothing to paint. The interval is kept.
    pub fn note_idle_tick(&mut self) {
        self.idle_ticks += 1;
        trace!(idle_ticks = self.idle_ticks, "Repaint tick without damage");
    }

    /// Marks the start of a paint and returns its start time.
    pub fn begin_paint(&mut self) -> Instant {
        self.phase = SchedulerPhase::Painting;
        Instant::now()
    }

    /// Feeds the measured duration of a paint back into the interval and
    /// returns the next repaint interval.
    pub fn record_paint(&mut self, paint_time: Duration) -> Duration {
        self.paint_time_sum = self.paint_time_sum.saturating_add(paint_time);
        self.paint_count = self.paint_count.saturating_add(1);
        let average = self.paint_time_sum / self.paint_count;

        self.repaint_interval = match self.refresh_rate_interval.checked_sub(average) {
            Some(candidate) if candidate >= self.minimum_interval => candidate,
            _ => self.refresh_rate_interval,
        };
        self.phase = SchedulerPhase::Idle;
        trace!(
            paint_time_us = paint_time.as_micros() as u64,
            average_us = average.as_micros() as u64,
            interval_us = self.repaint_interval.as_micros() as u64,
            "Paint recorded"
        );
        self.repaint_interval
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn repaint_interval(&self) -> Duration {
        self.repaint_interval
    }

    pub fn refresh_rate_interval(&self) -> Duration {
        self.refresh_rate_interval
    }

    pub fn minimum_interval(&self) -> Duration {
        self.minimum_interval
    }

    pub fn paint_count(&self) -> u32 {
        self.paint_count
    }

    pub fn idle_ticks(&self) -> u64 {
        self.idle_ticks
    }

    pub fn average_paint_time(&self) -> Option<Duration> {
        (self.paint_count > 0).then(|| self.paint_time_sum / self.paint_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn scheduler() -> RepaintScheduler {
        RepaintScheduler::new(&SchedulerConfig::default())
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[rstest]
    #[case(Some(50), ms(20))]
    #[case(Some(100), ms(10))]
    #[case(Some(250), ms(10))]
    #[case(None, ms(20))]
    #[case(Some(0), ms(20))]
    fn test_set_refresh_rate(#[case] rate: Option<u16>, #[case] expected: Duration) {
        let mut scheduler = scheduler();
        assert_eq!(scheduler.set_refresh_rate(rate), expected);
        assert_eq!(scheduler.repaint_interval(), expected);
    }

    #[test]
    fn test_record_paint_subtracts_average() {
        let mut scheduler = scheduler();
        scheduler.set_refresh_rate(Some(50));
        assert_eq!(scheduler.record_paint(ms(4)), ms(16));
        assert_eq!(scheduler.record_paint(ms(2)), ms(17));
        assert_eq!(scheduler.average_paint_time(), Some(ms(3)));
    }

    #[test]
    fn test_slow_paint_falls_back_to_refresh_interval() {
        let mut scheduler = scheduler();
        scheduler.set_refresh_rate(Some(50));
        assert_eq!(scheduler.record_paint(ms(15)), ms(20));
        assert_eq!(scheduler.record_paint(ms(100)), ms(20));
    }

    #[rstest]
    #[case(Some(60), vec![0, 0, 0])]
    #[case(Some(60), vec![7, 9, 1, 30])]
    #[case(Some(144), vec![1, 2, 3])]
    #[case(None, vec![500, 0, 0, 0, 0])]
    #[case(Some(1), vec![999, 1000, 2000])]
    fn test_interval_never_below_floor(#[case] rate: Option<u16>, #[case] paints: Vec<u64>) {
        let mut scheduler = scheduler();
        scheduler.set_refresh_rate(rate);
        assert!(scheduler.repaint_interval() >= scheduler.minimum_interval());
        for paint in paints {
            let interval = scheduler.record_paint(ms(paint));
            assert!(interval >= scheduler.minimum_interval(), "{:?} below floor", interval);
            assert!(interval <= scheduler.refresh_rate_interval());
        }
    }

    #[test]
    fn test_interval_floor_over_many_paint_times() {
        for hz in [30u16, 50, 60, 75, 120, 144, 240] {
            let mut scheduler = scheduler();
            scheduler.set_refresh_rate(Some(hz));
            for step in 0..200u64 {
                let paint = Duration::from_micros((step * 7919) % 40_000);
                assert!(scheduler.record_paint(paint) >= scheduler.minimum_interval());
            }
        }
    }

    #[test]
    fn test_phases() {
        let mut scheduler = scheduler();
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
        scheduler.note_idle_tick();
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
        assert_eq!(scheduler.idle_ticks(), 1);

        scheduler.note_damage();
        assert_eq!(scheduler.phase(), SchedulerPhase::Scheduled);
        let interval = scheduler.repaint_interval();
        scheduler.note_idle_tick();
        assert_eq!(scheduler.repaint_interval(), interval);

        scheduler.begin_paint();
        assert_eq!(scheduler.phase(), SchedulerPhase::Painting);
        scheduler.record_paint(ms(1));
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
        assert_eq!(scheduler.paint_count(), 1);
    }
}
