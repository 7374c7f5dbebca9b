#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use terrastream::{
    BlendingMode, Colorimetry, Compositor, CopyRequest, Crs, DecodedImage, ElevationRange,
    EventBus, Extent, ImageId, Instance, InstanceId, LayerContext, LayerId, LayerTexture,
    ManualQueue, MaskMode, Material, Node, NodeEvent, NodeId, NodeListener, RasterCompositor,
    RenderOutcome, RenderRequest, RenderTargetPool, Rgba8, SubscriptionId,
};

pub const RED: Rgba8 = Rgba8 {
    r: 255,
    g: 0,
    b: 0,
    a: 255,
};

pub const GREEN: Rgba8 = Rgba8 {
    r: 0,
    g: 255,
    b: 0,
    a: 255,
};

pub fn crs() -> Crs {
    Crs::new("EPSG:3857")
}

pub fn ext(west: f64, east: f64, south: f64, north: f64) -> Extent {
    Extent::new(crs(), west, east, south, north).unwrap()
}

pub fn solid(id: u64, extent: Extent, color: Rgba8) -> DecodedImage {
    DecodedImage::solid_rgba(ImageId::from_u64(id), extent, 8, 8, color).unwrap()
}

pub fn install_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Material recording everything layers push onto it.
#[derive(Default)]
pub struct TestMaterial {
    pub hidden: Cell<bool>,
    pub color: RefCell<HashMap<LayerId, LayerTexture>>,
    pub elevation: RefCell<HashMap<LayerId, LayerTexture>>,
    pub color_layers: RefCell<Vec<LayerId>>,
    pub visibility: RefCell<HashMap<LayerId, bool>>,
    pub opacity: RefCell<HashMap<LayerId, f32>>,
    pub blending: RefCell<HashMap<LayerId, BlendingMode>>,
    pub colorimetry: RefCell<HashMap<LayerId, Colorimetry>>,
    pub elevation_range: RefCell<HashMap<LayerId, Option<ElevationRange>>>,
    pub mask_mode: RefCell<HashMap<LayerId, MaskMode>>,
    pub binds: Cell<usize>,
}

impl TestMaterial {
    pub fn color_texture(&self, layer: LayerId) -> Option<LayerTexture> {
        self.color.borrow().get(&layer).cloned()
    }

    pub fn elevation_texture(&self, layer: LayerId) -> Option<LayerTexture> {
        self.elevation.borrow().get(&layer).cloned()
    }

    /// Center texel of the bound color texture, in node space.
    pub fn color_center(&self, layer: LayerId) -> Option<Rgba8> {
        let tex = self.color_texture(layer)?;
        let texture = tex.texture()?;
        let px = texture.pixels();
        px.rgba_at(px.width() / 2, px.height() / 2)
    }
}

impl Material for TestMaterial {
    fn is_visible(&self) -> bool {
        !self.hidden.get()
    }

    fn set_color_texture(&self, layer: LayerId, texture: LayerTexture) {
        self.binds.set(self.binds.get() + 1);
        self.color.borrow_mut().insert(layer, texture);
    }

    fn set_elevation_texture(&self, layer: LayerId, texture: LayerTexture) {
        self.binds.set(self.binds.get() + 1);
        self.elevation.borrow_mut().insert(layer, texture);
    }

    fn set_layer_visibility(&self, layer: LayerId, visible: bool) {
        self.visibility.borrow_mut().insert(layer, visible);
    }

    fn set_layer_opacity(&self, layer: LayerId, opacity: f32) {
        self.opacity.borrow_mut().insert(layer, opacity);
    }

    fn set_layer_elevation_range(&self, layer: LayerId, range: Option<ElevationRange>) {
        self.elevation_range.borrow_mut().insert(layer, range);
    }

    fn set_layer_colorimetry(&self, layer: LayerId, colorimetry: Colorimetry) {
        self.colorimetry.borrow_mut().insert(layer, colorimetry);
    }

    fn set_layer_blending_mode(&self, layer: LayerId, mode: BlendingMode) {
        self.blending.borrow_mut().insert(layer, mode);
    }

    fn set_layer_mask_mode(&self, layer: LayerId, mode: MaskMode) {
        self.mask_mode.borrow_mut().insert(layer, mode);
    }

    fn has_color_layer(&self, layer: LayerId) -> bool {
        self.color_layers.borrow().contains(&layer)
    }

    fn index_of_color_layer(&self, layer: LayerId) -> Option<usize> {
        self.color_layers.borrow().iter().position(|l| *l == layer)
    }

    fn remove_color_layer(&self, layer: LayerId) {
        self.color_layers.borrow_mut().retain(|l| *l != layer);
    }

    fn push_color_layer(&self, layer: LayerId, _extent: Option<&Extent>) {
        self.color_layers.borrow_mut().push(layer);
    }
}

/// Node whose visibility and lifecycle are driven by the test.
pub struct TestNode {
    pub id: NodeId,
    pub level: u32,
    pub extent: Extent,
    pub texture_size: (u32, u32),
    pub material: Option<Rc<TestMaterial>>,
    pub visible: Cell<bool>,
    pub disposed: Cell<bool>,
    pub color_ready: Cell<bool>,
    pub events: EventBus<NodeEvent>,
}

impl TestNode {
    pub fn new(id: u64, level: u32, extent: Extent) -> Rc<Self> {
        Rc::new(Self {
            id: NodeId::from_u64(id),
            level,
            extent,
            texture_size: (16, 16),
            material: Some(Rc::new(TestMaterial::default())),
            visible: Cell::new(true),
            disposed: Cell::new(false),
            color_ready: Cell::new(true),
            events: EventBus::new(),
        })
    }

    pub fn mat(&self) -> &TestMaterial {
        self.material.as_deref().unwrap()
    }

    pub fn as_node(self: &Rc<Self>) -> Rc<dyn Node> {
        self.clone()
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.set(visible);
        self.events.emit(&NodeEvent::VisibilityChanged { visible });
    }

    pub fn dispose(&self) {
        self.disposed.set(true);
        self.events.emit(&NodeEvent::Disposed);
    }
}

impl Node for TestNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn is_visible(&self) -> bool {
        self.visible.get()
    }

    fn level(&self) -> u32 {
        self.level
    }

    fn texture_size(&self) -> (u32, u32) {
        self.texture_size
    }

    fn extent(&self) -> Extent {
        self.extent.clone()
    }

    fn material(&self) -> Option<Rc<dyn Material>> {
        self.material.clone().map(|m| m as Rc<dyn Material>)
    }

    fn can_process_color_layer(&self) -> bool {
        self.color_ready.get()
    }

    fn subscribe(&self, listener: NodeListener) -> SubscriptionId {
        self.events.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.events.unsubscribe(id);
    }
}

/// Instance counting redraw requests.
pub struct TestInstance {
    pub id: InstanceId,
    pub changes: Cell<usize>,
}

impl TestInstance {
    pub fn new(id: u64) -> Rc<Self> {
        Rc::new(Self {
            id: InstanceId::from_u64(id),
            changes: Cell::new(0),
        })
    }
}

impl Instance for TestInstance {
    fn id(&self) -> InstanceId {
        self.id
    }

    fn notify_change(&self, _layer: LayerId) {
        self.changes.set(self.changes.get() + 1);
    }
}

/// Shared services of one test scene.
pub struct Scene {
    pub instance: Rc<TestInstance>,
    pub pool: Rc<RefCell<RenderTargetPool>>,
    pub queue: Rc<ManualQueue>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            instance: TestInstance::new(1),
            pool: Rc::new(RefCell::new(RenderTargetPool::default())),
            queue: Rc::new(ManualQueue::new()),
        }
    }

    pub fn context(&self) -> LayerContext {
        LayerContext::new(self.instance.clone(), self.pool.clone(), self.queue.clone())
    }
}

/// Counters shared with a [`RecordingCompositor`].
#[derive(Default)]
pub struct CompositorLog {
    pub renders: Cell<usize>,
    pub fallback_renders: Cell<usize>,
    pub copies: Cell<usize>,
}

/// Delegates to [`RasterCompositor`] and counts calls.
pub struct RecordingCompositor {
    inner: RasterCompositor,
    pub log: Rc<CompositorLog>,
}

impl RecordingCompositor {
    pub fn new() -> (Self, Rc<CompositorLog>) {
        let log = Rc::new(CompositorLog::default());
        (
            Self {
                inner: RasterCompositor::default(),
                log: log.clone(),
            },
            log,
        )
    }
}

impl Compositor for RecordingCompositor {
    fn add(&mut self, image: DecodedImage) {
        self.inner.add(image);
    }

    fn has(&self, id: ImageId) -> bool {
        self.inner.has(id)
    }

    fn render(&mut self, request: RenderRequest<'_>) -> RenderOutcome {
        if request.fallback_mode {
            self.log.fallback_renders.set(self.log.fallback_renders.get() + 1);
        } else {
            self.log.renders.set(self.log.renders.get() + 1);
        }
        self.inner.render(request)
    }

    fn copy(&mut self, request: CopyRequest<'_>) {
        self.log.copies.set(self.log.copies.get() + 1);
        self.inner.copy(request);
    }

    fn lock(&mut self, ids: &[ImageId], owner: NodeId) {
        self.inner.lock(ids, owner);
    }

    fn unlock(&mut self, ids: &[ImageId], owner: NodeId) {
        self.inner.unlock(ids, owner);
    }

    fn cached_len(&self) -> usize {
        self.inner.cached_len()
    }

    fn evict_within(&mut self, extent: &Extent) -> usize {
        self.inner.evict_within(extent)
    }

    fn dispose(&mut self) {
        self.inner.dispose();
    }
}
