//! Completion detection by output stability.
//!
//! The target pages stream their answers and offer no "done" event, so a
//! response counts as complete once the same reading has been seen on
//! `threshold` consecutive ticks after its first sighting, with no thinking
//! indicator in between.

/// What one polling tick observed.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick<T> {
    /// A "still composing" indicator was visible; nothing was read.
    Thinking,
    /// No usable output yet.
    Empty,
    /// The current candidate output.
    Reading(T),
}

/// Consecutive-identical-readings counter.
#[derive(Debug, Clone)]
pub struct StabilityTracker<T> {
    threshold: u32,
    count: u32,
    previous: Option<T>,
    latest: Option<T>,
}

impl<T: Clone + PartialEq> StabilityTracker<T> {
    /// `threshold` is clamped to at least 1.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            count: 0,
            previous: None,
            latest: None,
        }
    }

    /// Feed one tick. Returns the reading once it has settled.
    pub fn observe(&mut self, tick: Tick<T>) -> Option<T> {
        match tick {
            Tick::Thinking => {
                self.count = 0;
                self.previous = None;
                None
            }
            Tick::Empty => {
                self.count = 0;
                self.previous = None;
                None
            }
            Tick::Reading(value) => {
                self.latest = Some(value.clone());
                if self.previous.as_ref() == Some(&value) {
                    self.count += 1;
                    if self.count >= self.threshold {
                        return Some(value);
                    }
                } else {
                    self.count = 0;
                    self.previous = Some(value);
                }
                None
            }
        }
    }

    /// Current run length of identical readings.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Most recent reading taken outside a thinking phase.
    pub fn into_latest(self) -> Option<T> {
        self.latest
    }
}
