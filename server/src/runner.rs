//! Fixed-timestep tick scheduler.
//!
//! The runner never measures wall-clock time between ticks: every tick carries
//! the configured `1000 / fps` milliseconds. A tick that fires late is still
//! delivered once and the fires it missed are skipped, so ticks never pile up
//! behind a slow update.

use log::{debug, warn};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

pub struct Runner {
    fps: u32,
    period: Duration,
    interval: Option<Interval>,
    ticks: u64,
}

impl Runner {
    /// Creates a paused runner; a zero rate is treated as one tick per second
    pub fn new(fps: u32) -> Self {
        let fps = fps.max(1);
        Self {
            fps,
            period: Duration::from_nanos(1_000_000_000 / fps as u64),
            interval: None,
            ticks: 0,
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Fixed delta handed to every tick
    pub fn delta_ms(&self) -> f32 {
        1000.0 / self.fps as f32
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_paused(&self) -> bool {
        self.interval.is_none()
    }

    /// Ticks delivered since creation
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Starts ticking one period from now; no-op while running
    pub fn play(&mut self) {
        if self.interval.is_some() {
            return;
        }
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(interval);
        debug!("Runner started at {} ticks per second", self.fps);
    }

    /// Stops ticking; no-op while paused
    pub fn pause(&mut self) {
        if self.interval.take().is_some() {
            debug!("Runner paused after {} ticks", self.ticks);
        }
    }

    /// Waits for the next tick and returns its fixed delta. Never completes
    /// while paused, which makes it safe to use as a `select!` branch.
    pub async fn next_tick(&mut self) -> f32 {
        let Some(interval) = self.interval.as_mut() else {
            return std::future::pending().await;
        };

        let scheduled = interval.tick().await;
        let late = Instant::now().saturating_duration_since(scheduled);
        if late >= self.period {
            warn!(
                "Tick {} ran {:?} late, skipping missed ticks",
                self.ticks, late
            );
        }

        self.ticks += 1;
        self.delta_ms()
    }
}
