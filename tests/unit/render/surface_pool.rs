use std::cell::Cell;
use std::rc::Rc;

use super::*;

const OWNER: OwnerId = OwnerId(1);

fn pool(cap: usize) -> RenderTargetPool {
    RenderTargetPool::new(PoolOptions {
        capacity_per_bucket: cap,
        debounce_ms: 50,
    })
}

#[test]
fn acquire_release_acquire_returns_same_surface() {
    let mut p = pool(16);
    let a = p.acquire(OWNER, 256, 256, SurfaceOptions::color());
    let id = a.id();
    p.release(a);

    let b = p.acquire(OWNER, 256, 256, SurfaceOptions::color());
    assert_eq!(b.id(), id);
    let st = p.stats();
    assert_eq!(st.alloc_surfaces, 1);
    assert_eq!(st.reused_surfaces, 1);
    assert_eq!(st.retained_surfaces, 0);
}

#[test]
fn reused_surface_is_resized_in_place() {
    let mut p = pool(16);
    let a = p.acquire(OWNER, 256, 256, SurfaceOptions::color());
    let id = a.id();
    p.release(a);

    let b = p.acquire(OWNER, 128, 64, SurfaceOptions::color());
    assert_eq!(b.id(), id);
    assert_eq!((b.width(), b.height()), (128, 64));
}

#[test]
fn options_and_owners_partition_buckets() {
    let mut p = pool(16);
    let color = p.acquire(OWNER, 8, 8, SurfaceOptions::color());
    let color_id = color.id();
    p.release(color);

    let elevation = p.acquire(OWNER, 8, 8, SurfaceOptions::elevation());
    assert_ne!(elevation.id(), color_id);

    let other_owner = p.acquire(OwnerId(2), 8, 8, SurfaceOptions::color());
    assert_ne!(other_owner.id(), color_id);
    assert_eq!(p.stats().alloc_surfaces, 3);
}

#[test]
fn pool_honors_bucket_cap() {
    let mut p = pool(1);
    let a = p.acquire(OWNER, 8, 8, SurfaceOptions::color());
    let b = p.acquire(OWNER, 8, 8, SurfaceOptions::color());
    p.release(a);
    p.release(b);

    let st = p.stats();
    assert_eq!(st.retained_surfaces, 1);
    assert_eq!(st.dropped_on_release, 1);
}

#[test]
fn idle_pool_flushes_after_debounce_window() {
    let mut p = pool(16);
    let cleanups = Rc::new(Cell::new(0usize));
    let seen = Rc::clone(&cleanups);
    p.events().subscribe(move |ev: &PoolEvent| {
        let PoolEvent::Cleanup { dropped } = ev;
        seen.set(seen.get() + dropped);
    });

    let t0 = Instant::now();
    let a = p.acquire(OWNER, 8, 8, SurfaceOptions::color());
    let b = p.acquire(OWNER, 8, 8, SurfaceOptions::color());
    p.release_at(a, t0);
    assert!(!p.flush_if_idle(t0 + Duration::from_millis(30)));

    // A second release restarts the window.
    p.release_at(b, t0 + Duration::from_millis(40));
    assert!(!p.flush_if_idle(t0 + Duration::from_millis(60)));
    assert!(p.flush_if_idle(t0 + Duration::from_millis(90)));

    assert_eq!(cleanups.get(), 2);
    assert_eq!(p.stats().retained_surfaces, 0);
    assert_eq!(p.stats().cleanups, 1);
    assert!(!p.flush_if_idle(t0 + Duration::from_secs(10)));
}
