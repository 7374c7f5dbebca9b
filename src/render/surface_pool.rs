use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::PoolOptions;
use crate::foundation::events::EventBus;
use crate::foundation::ids::OwnerId;
use crate::render::surface::{RenderTarget, SurfaceOptions};

/// Notifications emitted by [`RenderTargetPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolEvent {
    /// The debounce window elapsed without a release and every idle surface was dropped.
    Cleanup { dropped: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct BucketKey {
    owner: OwnerId,
    options: SurfaceOptions,
}

/// Allocation counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Idle surfaces currently held.
    pub retained_surfaces: usize,
    /// Surfaces allocated because no idle one matched.
    pub alloc_surfaces: u64,
    /// Acquisitions served from an idle surface.
    pub reused_surfaces: u64,
    /// Releases dropped because their bucket was full.
    pub dropped_on_release: u64,
    /// Debounced flushes performed.
    pub cleanups: u64,
}

/// Pooled allocator for render surfaces, shared by every layer of a scene.
///
/// Keyed by `(owner, options)`. A bucket holds at most `capacity_per_bucket` idle surfaces. Every
/// release restarts a single debounce window; once it elapses without another release, the whole
/// pool is flushed and [`PoolEvent::Cleanup`] is emitted. Listeners must not call back into the
/// pool.
pub struct RenderTargetPool {
    opts: PoolOptions,
    stats: PoolStats,
    buckets: HashMap<BucketKey, Vec<RenderTarget>>,
    last_release: Option<Instant>,
    events: EventBus<PoolEvent>,
}

impl Default for RenderTargetPool {
    fn default() -> Self {
        Self::new(PoolOptions::default())
    }
}

impl RenderTargetPool {
    pub fn new(opts: PoolOptions) -> Self {
        Self {
            opts,
            stats: PoolStats::default(),
            buckets: HashMap::new(),
            last_release: None,
            events: EventBus::new(),
        }
    }

    pub fn options(&self) -> &PoolOptions {
        &self.opts
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.clone()
    }

    pub fn events(&self) -> &EventBus<PoolEvent> {
        &self.events
    }

    fn debounce(&self) -> Duration {
        Duration::from_millis(self.opts.debounce_ms)
    }

    /// Hand out an idle surface with identical options, resized to `width × height`, or allocate
    /// a new one.
    pub fn acquire(
        &mut self,
        owner: OwnerId,
        width: u32,
        height: u32,
        options: SurfaceOptions,
    ) -> RenderTarget {
        let key = BucketKey { owner, options };
        if let Some(bucket) = self.buckets.get_mut(&key)
            && let Some(mut target) = bucket.pop()
        {
            self.stats.retained_surfaces = self.stats.retained_surfaces.saturating_sub(1);
            self.stats.reused_surfaces = self.stats.reused_surfaces.saturating_add(1);
            target.resize(width, height);
            tracing::trace!(surface = %target.id(), width, height, "reusing pooled surface");
            return target;
        }

        self.stats.alloc_surfaces = self.stats.alloc_surfaces.saturating_add(1);
        let target = RenderTarget::allocate(owner, width, height, options);
        tracing::trace!(surface = %target.id(), width, height, "allocated surface");
        target
    }

    /// Return a surface to its owner's bucket, restarting the debounce window.
    pub fn release(&mut self, target: RenderTarget) {
        self.release_at(target, Instant::now());
    }

    pub fn release_at(&mut self, target: RenderTarget, now: Instant) {
        self.last_release = Some(now);

        let key = BucketKey {
            owner: target.owner(),
            options: target.options(),
        };
        let bucket = self.buckets.entry(key).or_default();
        if bucket.len() >= self.opts.capacity_per_bucket {
            self.stats.dropped_on_release = self.stats.dropped_on_release.saturating_add(1);
            tracing::trace!(surface = %target.id(), "pool bucket full, dropping surface");
            return;
        }
        bucket.push(target);
        self.stats.retained_surfaces = self.stats.retained_surfaces.saturating_add(1);
    }

    /// Flush the pool if the debounce window has elapsed since the last release.
    ///
    /// Returns `true` when a flush happened.
    pub fn flush_if_idle(&mut self, now: Instant) -> bool {
        let Some(last) = self.last_release else {
            return false;
        };
        if now.saturating_duration_since(last) < self.debounce() {
            return false;
        }
        self.flush();
        true
    }

    /// Drop every idle surface and emit [`PoolEvent::Cleanup`].
    pub fn flush(&mut self) {
        let dropped = self.stats.retained_surfaces;
        self.buckets.clear();
        self.last_release = None;
        self.stats.retained_surfaces = 0;
        self.stats.cleanups = self.stats.cleanups.saturating_add(1);
        tracing::debug!(dropped, "render target pool flushed");
        self.events.emit(&PoolEvent::Cleanup { dropped });
    }
}

impl std::fmt::Debug for RenderTargetPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTargetPool")
            .field("opts", &self.opts)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/surface_pool.rs"]
mod tests;
