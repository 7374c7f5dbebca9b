use std::cell::Cell;

use super::*;
use crate::foundation::core::Crs;
use crate::foundation::events::EventBus;
use crate::foundation::ids::OwnerId;
use crate::render::compositor::RasterCompositor;
use crate::render::surface::SurfaceOptions;
use crate::scene::{Material, NodeEvent, NodeListener};

struct StubNode {
    id: NodeId,
    events: EventBus<NodeEvent>,
    unsubscribed: Cell<usize>,
}

impl Node for StubNode {
    fn id(&self) -> NodeId {
        self.id
    }
    fn is_disposed(&self) -> bool {
        false
    }
    fn is_visible(&self) -> bool {
        true
    }
    fn level(&self) -> u32 {
        2
    }
    fn texture_size(&self) -> (u32, u32) {
        (4, 4)
    }
    fn extent(&self) -> Extent {
        Extent::new(Crs::new("EPSG:3857"), 0.0, 10.0, 0.0, 10.0).unwrap()
    }
    fn material(&self) -> Option<Rc<dyn Material>> {
        None
    }
    fn subscribe(&self, listener: NodeListener) -> SubscriptionId {
        self.events.subscribe(listener)
    }
    fn unsubscribe(&self, id: SubscriptionId) {
        self.unsubscribed.set(self.unsubscribed.get() + 1);
        self.events.unsubscribe(id);
    }
}

fn target() -> (Rc<StubNode>, Target) {
    let node = Rc::new(StubNode {
        id: NodeId::from_u64(1),
        events: EventBus::new(),
        unsubscribed: Cell::new(0),
    });
    let sub = node.subscribe(Box::new(|_: &NodeEvent| {}));
    let geometry = node.extent();
    let extent = geometry.with_relative_margin(0.05);
    let t = Target::new(node.clone(), geometry, extent, 4, 4, Some(sub));
    (node, t)
}

#[test]
fn only_pending_targets_start_processing() {
    let (_node, mut t) = target();
    assert_eq!(t.state(), TargetState::Pending);
    t.begin_processing().unwrap();
    assert!(matches!(
        t.begin_processing(),
        Err(StreamError::Invariant(_))
    ));
    t.complete().unwrap();
    assert!(t.begin_processing().is_err());
    assert!(t.complete().is_err());
}

#[test]
fn pending_targets_cannot_complete() {
    let (_node, mut t) = target();
    assert!(matches!(t.complete(), Err(StreamError::Invariant(_))));
}

#[test]
fn abort_swaps_token_and_keeps_images() {
    let (_node, mut t) = target();
    let before = t.token().clone();
    t.begin_processing().unwrap();
    t.image_ids = vec![ImageId::from_u64(3)];
    t.abort();
    assert!(before.is_aborted());
    assert!(!t.token().is_aborted());
    assert_ne!(before.generation(), t.token().generation());
    assert_eq!(t.state(), TargetState::Pending);
    assert_eq!(t.image_ids.len(), 1);
}

#[test]
fn reset_returns_images_for_unlocking() {
    let (_node, mut t) = target();
    t.image_ids = vec![ImageId::from_u64(3), ImageId::from_u64(4)];
    let ids = t.reset();
    assert_eq!(ids.len(), 2);
    assert!(t.image_ids.is_empty());
}

#[test]
fn pitch_maps_geometry_into_padded_extent() {
    let (_node, t) = target();
    assert!((t.pitch.scale.x - 1.0 / 1.1).abs() < 1e-9);
    assert!((t.pitch.offset.x - 0.5 / 11.0).abs() < 1e-9);
}

#[test]
fn dispose_is_idempotent_and_releases_once() {
    let (node, mut t) = target();
    let mut pool = RenderTargetPool::default();
    let mut compositor = RasterCompositor::default();
    t.surface = Some(pool.acquire(OwnerId::from_u64(1), 4, 4, SurfaceOptions::color()));
    let token = t.token().clone();

    t.dispose(&mut pool, &mut compositor);
    t.dispose(&mut pool, &mut compositor);

    assert!(t.is_disposed());
    assert!(token.is_aborted());
    assert!(t.surface.is_none());
    assert_eq!(pool.stats().retained_surfaces, 1);
    assert_eq!(node.unsubscribed.get(), 1);
    assert_eq!(node.events.listener_count(), 0);
}

#[test]
fn paint_count_only_grows() {
    let (_node, mut t) = target();
    t.record_paint();
    t.reset();
    t.record_paint();
    assert_eq!(t.paint_count(), 2);
}
