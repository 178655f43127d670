#![forbid(unsafe_code)]

//! Polling driver for endpoints.
//!
//! A [`Ticker`] runs a callback on the cooperative [`Scheduler`] at a cadence
//! chosen by [`TickerSettings`]:
//!
//! | Mode | Cadence |
//! |------|---------|
//! | [`TickMode::RealTime`] | As often as possible, capped at `max_ticks_per_second` |
//! | [`TickMode::FrameBased`] | Once every N frames |
//! | [`TickMode::TimeBased`] | Once every T seconds of frame time |
//!
//! # Invariants
//!
//! 1. At most one polling task per ticker. `start` always stops the previous
//!    one first.
//! 2. Changing settings on a running ticker restarts it with the new cadence.
//! 3. After `stop` returns the callback never fires again, including when
//!    `stop` is called from inside the callback.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use bindy_core::FrameClock;
#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::scheduler::{Scheduler, TaskHandle, TaskPoll};

/// How a ticker schedules its callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "snake_case"))]
pub enum TickMode {
    RealTime,
    #[default]
    FrameBased,
    TimeBased,
}

/// Frame cadence for [`TickMode::FrameBased`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "snake_case"))]
pub enum FrameInterval {
    #[default]
    EveryFrame,
    EverySecondFrame,
    EveryThirdFrame,
    EveryFourthFrame,
    EveryFifthFrame,
    /// Values below 1 behave as 1.
    Custom(u32),
}

impl FrameInterval {
    /// Number of frames between ticks, at least 1.
    #[must_use]
    pub fn frames(self) -> u32 {
        match self {
            Self::EveryFrame => 1,
            Self::EverySecondFrame => 2,
            Self::EveryThirdFrame => 3,
            Self::EveryFourthFrame => 4,
            Self::EveryFifthFrame => 5,
            Self::Custom(n) => n.max(1),
        }
    }
}

/// Time cadence for [`TickMode::TimeBased`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "snake_case"))]
pub enum TimeInterval {
    TenPerSecond,
    FivePerSecond,
    FourPerSecond,
    TwicePerSecond,
    #[default]
    EverySecond,
    EveryTwoSeconds,
    EveryFiveSeconds,
    EveryTenSeconds,
    /// Seconds between ticks. Non-positive, non-finite or out-of-range
    /// values mean every frame.
    Custom(f32),
}

impl TimeInterval {
    /// Seconds between ticks as configured.
    #[must_use]
    pub fn seconds(self) -> f32 {
        match self {
            Self::TenPerSecond => 0.1,
            Self::FivePerSecond => 0.2,
            Self::FourPerSecond => 0.25,
            Self::TwicePerSecond => 0.5,
            Self::EverySecond => 1.0,
            Self::EveryTwoSeconds => 2.0,
            Self::EveryFiveSeconds => 5.0,
            Self::EveryTenSeconds => 10.0,
            Self::Custom(s) => s,
        }
    }

    /// Interval as a duration. `None` means "every frame", which is also
    /// what an interval too long for [`Duration`] falls back to.
    #[must_use]
    pub fn duration(self) -> Option<Duration> {
        let seconds = self.seconds();
        if !(seconds.is_finite() && seconds > 0.0) {
            return None;
        }
        match Duration::try_from_secs_f32(seconds) {
            Ok(duration) => Some(duration),
            Err(err) => {
                tracing::warn!(seconds, error = %err, "time interval out of range, ticking every frame");
                None
            }
        }
    }
}

/// Cadence configuration for a [`Ticker`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct TickerSettings {
    pub mode: TickMode,
    /// Cap for [`TickMode::RealTime`]. Values `<= 0` behave as 1.
    pub max_ticks_per_second: i32,
    pub frame_interval: FrameInterval,
    pub time_interval: TimeInterval,
}

impl Default for TickerSettings {
    fn default() -> Self {
        Self {
            mode: TickMode::default(),
            max_ticks_per_second: 60,
            frame_interval: FrameInterval::default(),
            time_interval: TimeInterval::default(),
        }
    }
}

impl TickerSettings {
    #[must_use]
    pub fn real_time(max_ticks_per_second: i32) -> Self {
        Self {
            mode: TickMode::RealTime,
            max_ticks_per_second,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn frame_based(interval: FrameInterval) -> Self {
        Self {
            mode: TickMode::FrameBased,
            frame_interval: interval,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn time_based(interval: TimeInterval) -> Self {
        Self {
            mode: TickMode::TimeBased,
            time_interval: interval,
            ..Self::default()
        }
    }

    /// Target interval between real-time ticks.
    #[must_use]
    pub fn real_time_interval(&self) -> Duration {
        let rate = self.max_ticks_per_second.max(1);
        Duration::from_secs(1) / rate.unsigned_abs()
    }
}

/// Wait before the next real-time tick: the target interval minus what the
/// tick itself cost, never negative.
#[must_use]
pub fn remaining_wait(interval: Duration, cost: Duration) -> Duration {
    interval.saturating_sub(cost)
}

/// Monotonic time source used to measure what a real-time tick cost.
pub type CostClock = Rc<dyn Fn() -> Duration>;

fn wall_clock() -> CostClock {
    let origin = web_time::Instant::now();
    Rc::new(move || origin.elapsed())
}

/// Drives a callback on a [`Scheduler`].
pub struct Ticker {
    settings: TickerSettings,
    callback: Rc<dyn Fn()>,
    handle: Option<TaskHandle>,
    scheduler: Scheduler,
    tick_count: Rc<Cell<u64>>,
    cost_clock: CostClock,
    last_wait: Rc<Cell<Option<Duration>>>,
}

impl fmt::Debug for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticker")
            .field("settings", &self.settings)
            .field("running", &self.is_running())
            .field("tick_count", &self.tick_count.get())
            .finish_non_exhaustive()
    }
}

impl Ticker {
    /// A stopped ticker on this thread's global scheduler.
    pub fn new(settings: TickerSettings, callback: impl Fn() + 'static) -> Self {
        Self::with_scheduler(Scheduler::global(), settings, callback)
    }

    /// A stopped ticker on `scheduler`.
    pub fn with_scheduler(
        scheduler: Scheduler,
        settings: TickerSettings,
        callback: impl Fn() + 'static,
    ) -> Self {
        Self {
            settings,
            callback: Rc::new(callback),
            handle: None,
            scheduler,
            tick_count: Rc::new(Cell::new(0)),
            cost_clock: wall_clock(),
            last_wait: Rc::new(Cell::new(None)),
        }
    }

    /// Measure real-time tick cost with `clock` instead of the wall clock.
    /// Takes effect on the next `start`.
    pub fn set_cost_clock(&mut self, clock: impl Fn() -> Duration + 'static) {
        self.cost_clock = Rc::new(clock);
    }

    /// Wait scheduled after the most recent real-time tick.
    #[must_use]
    pub fn last_real_time_wait(&self) -> Option<Duration> {
        self.last_wait.get()
    }

    /// Start polling, replacing any running loop.
    pub fn start(&mut self) {
        self.stop();
        let callback = Rc::clone(&self.callback);
        let count = Rc::clone(&self.tick_count);
        let fire = move || {
            count.set(count.get() + 1);
            callback();
        };
        let handle = match self.settings.mode {
            TickMode::FrameBased => {
                let every = u64::from(self.settings.frame_interval.frames());
                let mut frames = 0_u64;
                self.scheduler.spawn(move |_| {
                    frames += 1;
                    if frames % every == 0 {
                        fire();
                    }
                    TaskPoll::Pending
                })
            }
            TickMode::TimeBased => {
                let interval = self.settings.time_interval.duration();
                let mut last = FrameClock::now().elapsed;
                self.scheduler.spawn(move |now| {
                    match interval {
                        None => fire(),
                        Some(interval) if now.elapsed.saturating_sub(last) >= interval => {
                            last = now.elapsed;
                            fire();
                        }
                        Some(_) => {}
                    }
                    TaskPoll::Pending
                })
            }
            TickMode::RealTime => {
                let interval = self.settings.real_time_interval();
                let clock = Rc::clone(&self.cost_clock);
                let last_wait = Rc::clone(&self.last_wait);
                let mut next_due: Option<Duration> = None;
                self.scheduler.spawn(move |now| {
                    if next_due.is_none_or(|due| now.elapsed >= due) {
                        let started = clock();
                        fire();
                        let wait = remaining_wait(interval, clock().saturating_sub(started));
                        last_wait.set(Some(wait));
                        next_due = Some(now.elapsed + wait);
                    }
                    TaskPoll::Pending
                })
            }
        };
        tracing::trace!(mode = ?self.settings.mode, task = handle.id(), "ticker started");
        self.handle = Some(handle);
    }

    /// Cancel the loop. Safe when not running.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
            tracing::trace!(task = handle.id(), "ticker stopped");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_cancelled())
    }

    #[must_use]
    pub fn settings(&self) -> TickerSettings {
        self.settings
    }

    /// Replace the settings, restarting the loop if it was running.
    pub fn set_settings(&mut self, settings: TickerSettings) {
        if self.settings == settings {
            return;
        }
        self.settings = settings;
        if self.is_running() {
            self.start();
        }
    }

    pub fn set_mode(&mut self, mode: TickMode) {
        self.set_settings(TickerSettings {
            mode,
            ..self.settings
        });
    }

    pub fn set_frame_interval(&mut self, frame_interval: FrameInterval) {
        self.set_settings(TickerSettings {
            frame_interval,
            ..self.settings
        });
    }

    pub fn set_time_interval(&mut self, time_interval: TimeInterval) {
        self.set_settings(TickerSettings {
            time_interval,
            ..self.settings
        });
    }

    pub fn set_max_ticks_per_second(&mut self, max_ticks_per_second: i32) {
        self.set_settings(TickerSettings {
            max_ticks_per_second,
            ..self.settings
        });
    }

    /// Total callbacks fired over the ticker's lifetime.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick_count.get()
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Duration = Duration::from_millis(100);

    fn counting(scheduler: &Scheduler, settings: TickerSettings) -> (Ticker, Rc<Cell<u32>>) {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let ticker = Ticker::with_scheduler(scheduler.clone(), settings, move || h.set(h.get() + 1));
        (ticker, hits)
    }

    #[test]
    fn frame_based_every_third_frame() {
        let scheduler = Scheduler::new();
        let (mut ticker, hits) =
            counting(&scheduler, TickerSettings::frame_based(FrameInterval::EveryThirdFrame));
        ticker.start();
        scheduler.run_frames(9, FRAME);
        assert_eq!(hits.get(), 3);
        assert_eq!(ticker.tick_count(), 3);
    }

    #[test]
    fn custom_frame_interval_below_one_is_every_frame() {
        assert_eq!(FrameInterval::Custom(0).frames(), 1);
        assert_eq!(FrameInterval::Custom(7).frames(), 7);
    }

    #[test]
    fn time_based_fires_on_elapsed_time() {
        let scheduler = Scheduler::new();
        let (mut ticker, hits) =
            counting(&scheduler, TickerSettings::time_based(TimeInterval::TwicePerSecond));
        ticker.start();
        scheduler.run_frames(10, FRAME);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn non_positive_time_interval_is_every_frame() {
        assert_eq!(TimeInterval::Custom(0.0).duration(), None);
        assert_eq!(TimeInterval::Custom(-1.0).duration(), None);
        let scheduler = Scheduler::new();
        let (mut ticker, hits) =
            counting(&scheduler, TickerSettings::time_based(TimeInterval::Custom(0.0)));
        ticker.start();
        scheduler.run_frames(4, FRAME);
        assert_eq!(hits.get(), 4);
    }

    /// A ticker whose callback advances a fake cost clock by `cost`.
    fn costly(scheduler: &Scheduler, settings: TickerSettings, cost: Duration) -> Ticker {
        let clock = Rc::new(Cell::new(Duration::ZERO));
        let in_callback = Rc::clone(&clock);
        let mut ticker = Ticker::with_scheduler(scheduler.clone(), settings, move || {
            in_callback.set(in_callback.get() + cost);
        });
        ticker.set_cost_clock(move || clock.get());
        ticker
    }

    #[test]
    fn real_time_caps_rate() {
        let scheduler = Scheduler::new();
        let mut ticker = costly(&scheduler, TickerSettings::real_time(2), Duration::ZERO);
        ticker.start();
        // Fires at 0.1s, then once 0.5s has passed: 0.6s.
        scheduler.run_frames(10, FRAME);
        assert_eq!(ticker.tick_count(), 2);
        assert_eq!(ticker.last_real_time_wait(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn real_time_wait_subtracts_tick_cost() {
        let scheduler = Scheduler::new();
        let mut ticker = costly(
            &scheduler,
            TickerSettings::real_time(2),
            Duration::from_millis(150),
        );
        ticker.start();
        // Waits 350ms after each tick: fires at 0.1s, 0.5s and 0.9s.
        scheduler.run_frames(10, FRAME);
        assert_eq!(ticker.tick_count(), 3);
        assert_eq!(ticker.last_real_time_wait(), Some(Duration::from_millis(350)));
    }

    #[test]
    fn real_time_tick_slower_than_interval_runs_every_frame() {
        let scheduler = Scheduler::new();
        let mut ticker = costly(
            &scheduler,
            TickerSettings::real_time(10),
            Duration::from_millis(250),
        );
        ticker.start();
        scheduler.run_frames(5, FRAME);
        assert_eq!(ticker.tick_count(), 5);
        assert_eq!(ticker.last_real_time_wait(), Some(Duration::ZERO));
    }

    #[test]
    fn oversized_time_interval_is_every_frame() {
        assert_eq!(TimeInterval::Custom(f32::MAX).duration(), None);
        assert_eq!(TimeInterval::Custom(1e30).duration(), None);
        let scheduler = Scheduler::new();
        let (mut ticker, hits) = counting(
            &scheduler,
            TickerSettings::time_based(TimeInterval::Custom(f32::MAX)),
        );
        ticker.start();
        scheduler.run_frames(3, FRAME);
        assert_eq!(hits.get(), 3);
    }

    #[test]
    fn real_time_non_positive_rate_is_one_per_second() {
        assert_eq!(
            TickerSettings::real_time(0).real_time_interval(),
            Duration::from_secs(1)
        );
        assert_eq!(
            TickerSettings::real_time(-5).real_time_interval(),
            Duration::from_secs(1)
        );
        assert_eq!(
            TickerSettings::real_time(4).real_time_interval(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn remaining_wait_never_negative() {
        let interval = Duration::from_millis(10);
        assert_eq!(remaining_wait(interval, Duration::from_millis(3)), Duration::from_millis(7));
        assert_eq!(remaining_wait(interval, Duration::from_millis(30)), Duration::ZERO);
    }

    #[test]
    fn start_replaces_running_loop() {
        let scheduler = Scheduler::new();
        let (mut ticker, hits) = counting(&scheduler, TickerSettings::default());
        ticker.start();
        ticker.start();
        scheduler.run_frame(FRAME);
        assert_eq!(hits.get(), 1);
        assert_eq!(scheduler.task_count(), 1);
    }

    #[test]
    fn settings_change_restarts_running_loop() {
        let scheduler = Scheduler::new();
        let (mut ticker, hits) =
            counting(&scheduler, TickerSettings::time_based(TimeInterval::EverySecond));
        ticker.start();
        scheduler.run_frames(3, FRAME);
        assert_eq!(hits.get(), 0);

        ticker.set_settings(TickerSettings::frame_based(FrameInterval::EverySecondFrame));
        assert!(ticker.is_running());
        scheduler.run_frames(4, FRAME);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn settings_change_on_stopped_ticker_stays_stopped() {
        let scheduler = Scheduler::new();
        let (mut ticker, _hits) = counting(&scheduler, TickerSettings::default());
        ticker.set_mode(TickMode::TimeBased);
        assert!(!ticker.is_running());
        assert_eq!(scheduler.task_count(), 0);
    }

    #[test]
    fn stop_is_idempotent_and_final() {
        let scheduler = Scheduler::new();
        let (mut ticker, hits) = counting(&scheduler, TickerSettings::default());
        ticker.stop();
        ticker.start();
        scheduler.run_frame(FRAME);
        ticker.stop();
        ticker.stop();
        scheduler.run_frames(3, FRAME);
        assert_eq!(hits.get(), 1);
        assert!(!ticker.is_running());
    }

    #[test]
    fn drop_stops_loop() {
        let scheduler = Scheduler::new();
        let (mut ticker, hits) = counting(&scheduler, TickerSettings::default());
        ticker.start();
        drop(ticker);
        scheduler.run_frames(2, FRAME);
        assert_eq!(hits.get(), 0);
    }
}
