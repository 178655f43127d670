#![forbid(unsafe_code)]

//! Thread-local frame clock.
//!
//! The clock is the single source of "current frame" used by the accessor
//! write guard and by the cooperative scheduler. It only moves when the
//! scheduler advances it, which keeps tests deterministic.

use std::cell::Cell;
use std::time::Duration;

thread_local! {
    static CLOCK: Cell<FrameTime> = const { Cell::new(FrameTime::ZERO) };
}

/// Snapshot of the frame clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameTime {
    /// Frame number, starting at 0 before the first frame runs.
    pub frame: u64,
    /// Total time advanced so far.
    pub elapsed: Duration,
    /// Time advanced by the most recent frame.
    pub delta: Duration,
}

impl FrameTime {
    /// Clock state before any frame has run.
    pub const ZERO: FrameTime = FrameTime {
        frame: 0,
        elapsed: Duration::ZERO,
        delta: Duration::ZERO,
    };
}

/// Accessors for the thread-local frame clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameClock;

impl FrameClock {
    /// Current clock snapshot.
    #[must_use]
    pub fn now() -> FrameTime {
        CLOCK.with(Cell::get)
    }

    /// Current frame number.
    #[must_use]
    pub fn frame() -> u64 {
        Self::now().frame
    }

    /// Advance one frame by `delta` and return the new snapshot.
    pub fn advance(delta: Duration) -> FrameTime {
        CLOCK.with(|clock| {
            let prev = clock.get();
            let next = FrameTime {
                frame: prev.frame + 1,
                elapsed: prev.elapsed + delta,
                delta,
            };
            clock.set(next);
            next
        })
    }

    /// Rewind to [`FrameTime::ZERO`].
    pub fn reset() {
        CLOCK.with(|clock| clock.set(FrameTime::ZERO));
    }
}
