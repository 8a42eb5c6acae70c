//! One-second question countdown
//!
//! The timer only runs while a question is open. On the host, reaching zero
//! is what closes the question; every other replica only uses the value for
//! display and can never force a phase change with it.

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Timer not running or already at zero
    Idle,
    /// Counted down, time still left
    Running { remaining: u32 },
    /// This tick brought the count to zero
    Expired,
}

#[derive(Debug, Clone)]
pub struct QuestionTimer {
    limit: u32,
    remaining: u32,
    running: bool,
}

impl QuestionTimer {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            remaining: limit,
            running: false,
        }
    }

    /// Restarts the countdown at `limit` seconds
    pub fn reset(&mut self, limit: u32) {
        self.limit = limit;
        self.remaining = limit;
        self.running = true;
    }

    /// Stops counting without touching the remaining value
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Advances the countdown by one second
    pub fn tick(&mut self) -> TickOutcome {
        if !self.running || self.remaining == 0 {
            return TickOutcome::Idle;
        }

        self.remaining -= 1;
        if self.remaining == 0 {
            TickOutcome::Expired
        } else {
            TickOutcome::Running {
                remaining: self.remaining,
            }
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Share of the limit still left, for progress bars
    pub fn fraction_remaining(&self) -> f32 {
        if self.limit == 0 {
            return 0.0;
        }
        self.remaining as f32 / self.limit as f32
    }
}
