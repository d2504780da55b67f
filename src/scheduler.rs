//! Frame scheduling for the render loop.
//!
//! The scheduler owns at most one outstanding tick. Cancelling bumps the
//! generation so a token handed out earlier can never fire afterwards.

use std::time::{Duration, Instant};

/// A scheduled frame. Only the current generation's token is honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickToken {
    generation: u64,
    frame: u64,
}

impl TickToken {
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

#[derive(Debug)]
struct Pending {
    token: TickToken,
    due: Instant,
}

#[derive(Debug)]
pub struct FrameScheduler {
    interval: Duration,
    generation: u64,
    frames: u64,
    pending: Option<Pending>,
}

impl FrameScheduler {
    /// Scheduler ticking `frame_rate` times per second.
    pub fn new(frame_rate: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / frame_rate.max(1),
            generation: 0,
            frames: 0,
            pending: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Schedule the next tick one interval after `now`, replacing any
    /// outstanding one.
    pub fn schedule(&mut self, now: Instant) -> TickToken {
        self.schedule_at(now + self.interval)
    }

    /// Schedule a tick that is due immediately.
    pub fn schedule_now(&mut self, now: Instant) -> TickToken {
        self.schedule_at(now)
    }

    fn schedule_at(&mut self, due: Instant) -> TickToken {
        self.frames += 1;
        let token = TickToken {
            generation: self.generation,
            frame: self.frames,
        };
        self.pending = Some(Pending { token, due });
        token
    }

    /// Drop the outstanding tick and invalidate every earlier token.
    pub fn cancel(&mut self) -> Option<TickToken> {
        self.generation += 1;
        self.pending.take().map(|p| p.token)
    }

    /// Take the outstanding tick if it is due.
    pub fn poll(&mut self, now: Instant) -> Option<TickToken> {
        match &self.pending {
            Some(pending) if pending.due <= now => self.pending.take().map(|p| p.token),
            _ => None,
        }
    }

    pub fn is_current(&self, token: &TickToken) -> bool {
        token.generation == self.generation
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Time left until the outstanding tick, `None` when nothing is scheduled.
    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.pending
            .as_ref()
            .map(|p| p.due.saturating_duration_since(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_is_not_due_early() {
        let t0 = Instant::now();
        let mut scheduler = FrameScheduler::new(60);
        scheduler.schedule(t0);
        assert!(scheduler.poll(t0).is_none());
        assert!(scheduler.poll(t0 + scheduler.interval()).is_some());
    }

    #[test]
    fn a_tick_fires_once() {
        let t0 = Instant::now();
        let mut scheduler = FrameScheduler::new(60);
        scheduler.schedule_now(t0);
        assert!(scheduler.poll(t0).is_some());
        assert!(scheduler.poll(t0 + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn rescheduling_keeps_a_single_outstanding_tick() {
        let t0 = Instant::now();
        let mut scheduler = FrameScheduler::new(30);
        let first = scheduler.schedule(t0);
        let second = scheduler.schedule(t0);
        assert_ne!(first, second);
        let fired = scheduler.poll(t0 + Duration::from_secs(1)).unwrap();
        assert_eq!(fired, second);
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn cancel_invalidates_outstanding_tokens() {
        let t0 = Instant::now();
        let mut scheduler = FrameScheduler::new(30);
        let token = scheduler.schedule_now(t0);
        assert_eq!(scheduler.cancel(), Some(token));
        assert!(!scheduler.is_current(&token));
        assert!(scheduler.poll(t0 + Duration::from_secs(10)).is_none());
        assert_eq!(scheduler.time_until_due(t0), None);
    }

    #[test]
    fn zero_frame_rate_is_clamped() {
        assert_eq!(FrameScheduler::new(0).interval(), Duration::from_secs(1));
    }
}
