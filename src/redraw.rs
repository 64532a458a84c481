use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Layer that needs a few extra invalidations after its style changes before animated
/// cluster markers repaint correctly.
pub trait Redraw: Send + Sync {
    fn redraw(&self);
}

/// Invalidate at `0, step, 2 * step, ...` up to and including `window`.
#[derive(Debug, Clone, Copy)]
pub struct RepaintSchedule {
    pub step: Duration,
    pub window: Duration,
}

impl Default for RepaintSchedule {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(100),
            window: Duration::from_millis(1500),
        }
    }
}

impl RepaintSchedule {
    pub fn offsets(&self) -> Vec<Duration> {
        if self.step.is_zero() {
            return vec![Duration::ZERO];
        }
        let mut offsets = Vec::new();
        let mut at = Duration::ZERO;
        while at <= self.window {
            offsets.push(at);
            at += self.step;
        }
        offsets
    }

    /// Spawns the invalidation ticks on the current runtime.
    pub fn run(&self, target: Arc<dyn Redraw>) -> JoinHandle<()> {
        let offsets = self.offsets();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now();
            for offset in offsets {
                tokio::time::sleep_until(start + offset).await;
                target.redraw();
            }
        })
    }
}

/// Revision counter clients poll to learn that the cluster layer must be repainted.
#[derive(Debug, Default)]
pub struct LayerRevision(AtomicU64);

impl LayerRevision {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Redraw for LayerRevision {
    fn redraw(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}
