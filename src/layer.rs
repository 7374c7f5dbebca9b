use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Instant;

use crate::config::{BlendingMode, Colorimetry, ElevationRange, LayerOptions};
use crate::foundation::core::Extent;
use crate::foundation::error::{StreamError, StreamResult};
use crate::foundation::events::EventBus;
use crate::foundation::ids::{LayerId, NodeId, OwnerId};
use crate::queue::RequestQueue;
use crate::render::compositor::{Compositor, RasterCompositor, RasterCompositorOptions};
use crate::render::surface_pool::RenderTargetPool;
use crate::scene::{Instance, Node, NodeEvent};
use crate::source::ImageSource;

use self::fetch::FetchOutcome;
use self::kind::{LayerKind, MaterialParams};
use self::progress::OperationCounter;
use self::target::{Target, TargetState};

pub(crate) mod fallback;
pub(crate) mod fetch;
pub(crate) mod kind;
pub(crate) mod progress;
pub(crate) mod prune;
pub(crate) mod target;

/// Scene services a layer is attached to by [`Layer::initialize`].
///
/// The pool and the queue are shared by every layer of the scene.
#[derive(Clone)]
pub struct LayerContext {
    pub instance: Rc<dyn Instance>,
    /// Owner key of the surfaces this layer allocates.
    pub owner: OwnerId,
    pub pool: Rc<RefCell<RenderTargetPool>>,
    pub queue: Rc<dyn RequestQueue>,
}

impl LayerContext {
    /// Context whose surface owner is derived from the instance id.
    pub fn new(
        instance: Rc<dyn Instance>,
        pool: Rc<RefCell<RenderTargetPool>>,
        queue: Rc<dyn RequestQueue>,
    ) -> Self {
        Self {
            owner: OwnerId::from_u64(instance.id().as_u64()),
            instance,
            pool,
            queue,
        }
    }

    pub fn with_owner(mut self, owner: OwnerId) -> Self {
        self.owner = owner;
        self
    }
}

impl std::fmt::Debug for LayerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerContext")
            .field("instance", &self.instance.id())
            .field("owner", &self.owner)
            .finish()
    }
}

/// Property changes emitted by [`Layer`].
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LayerEvent {
    VisiblePropertyChanged { visible: bool },
    OpacityPropertyChanged { opacity: f32 },
    BlendingModePropertyChanged { mode: BlendingMode },
    ColorimetryPropertyChanged { colorimetry: Colorimetry },
    ElevationRangePropertyChanged { range: Option<ElevationRange> },
    FrozenPropertyChanged { frozen: bool },
}

/// Diagnostics of one target, as returned by [`Layer::get_info`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TargetInfo {
    pub node: NodeId,
    pub level: u32,
    pub state: TargetState,
    pub image_count: usize,
    pub paint_count: u64,
    pub has_surface: bool,
    pub width: u32,
    pub height: u32,
}

/// Builder for [`Layer`].
pub struct LayerBuilder {
    kind: LayerKind,
    opts: LayerOptions,
    source: Option<Box<dyn ImageSource>>,
    compositor: Option<Box<dyn Compositor>>,
}

impl LayerBuilder {
    pub fn new(kind: LayerKind) -> Self {
        Self {
            kind,
            opts: LayerOptions::default(),
            source: None,
            compositor: None,
        }
    }

    pub fn options(mut self, opts: LayerOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn source(mut self, source: impl ImageSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Replace the default [`RasterCompositor`].
    pub fn compositor(mut self, compositor: impl Compositor + 'static) -> Self {
        self.compositor = Some(Box::new(compositor));
        self
    }

    /// Validate options and build the layer. A source is mandatory.
    pub fn build(self) -> StreamResult<Layer> {
        let Some(source) = self.source else {
            return Err(StreamError::validation(format!(
                "{} layer requires an image source",
                self.kind.name()
            )));
        };
        self.opts.validate()?;
        let compositor = self.compositor.unwrap_or_else(|| {
            Box::new(RasterCompositor::new(RasterCompositorOptions {
                background: self.opts.background,
                no_data: self.opts.no_data,
                interpretation: self.opts.interpretation,
                ..RasterCompositorOptions::default()
            }))
        });
        let (results_tx, results) = mpsc::channel();
        Ok(Layer {
            id: LayerId::next(),
            kind: self.kind,
            opts: self.opts,
            source,
            compositor: Rc::new(RefCell::new(compositor)),
            ctx: None,
            targets: HashMap::new(),
            inbox: Rc::new(RefCell::new(Vec::new())),
            results_tx,
            results,
            counter: OperationCounter::new(),
            events: EventBus::new(),
            disposed: false,
        })
    }
}

/// Streams source images onto the nodes of a scene.
///
/// Drive it from the scene update loop: [`pre_update`](Self::pre_update), then
/// [`update`](Self::update) for every node that should display the layer, then
/// [`post_update`](Self::post_update). Asynchronous results are applied by
/// [`poll`](Self::poll), which both bracketing calls run.
pub struct Layer {
    id: LayerId,
    kind: LayerKind,
    opts: LayerOptions,
    source: Box<dyn ImageSource>,
    compositor: Rc<RefCell<Box<dyn Compositor>>>,
    ctx: Option<LayerContext>,
    targets: HashMap<NodeId, Target>,
    inbox: Rc<RefCell<Vec<(NodeId, NodeEvent)>>>,
    results_tx: Sender<FetchOutcome>,
    results: Receiver<FetchOutcome>,
    counter: OperationCounter,
    events: EventBus<LayerEvent>,
    disposed: bool,
}

impl Layer {
    pub fn builder(kind: LayerKind) -> LayerBuilder {
        LayerBuilder::new(kind)
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.opts.name.as_deref()
    }

    pub fn options(&self) -> &LayerOptions {
        &self.opts
    }

    pub fn events(&self) -> &EventBus<LayerEvent> {
        &self.events
    }

    pub fn is_ready(&self) -> bool {
        self.ctx.is_some() && !self.disposed
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Images held by the compositor cache.
    pub fn cached_images(&self) -> usize {
        self.compositor.borrow().cached_len()
    }

    /// `true` while asynchronous fetches are outstanding.
    pub fn loading(&self) -> bool {
        self.counter.loading()
    }

    pub fn progress(&self) -> f64 {
        self.counter.progress()
    }

    /// Attach the layer to a scene. Repeating the call for the same instance is a no-op; any
    /// other instance is rejected.
    #[tracing::instrument(skip_all, fields(layer = %self.id))]
    pub fn initialize(&mut self, ctx: LayerContext) -> StreamResult<()> {
        if self.disposed {
            return Err(StreamError::invariant(format!(
                "layer {} is disposed",
                self.id
            )));
        }
        if let Some(current) = &self.ctx {
            if current.instance.id() == ctx.instance.id() {
                return Ok(());
            }
            return Err(StreamError::invariant(format!(
                "layer {} is already initialized for {}",
                self.id,
                current.instance.id()
            )));
        }
        self.source.initialize()?;
        tracing::debug!(
            instance = %ctx.instance.id(),
            kind = self.kind.name(),
            "layer initialized"
        );
        self.ctx = Some(ctx);
        Ok(())
    }

    /// Apply node notifications and finished fetches before the update pass.
    pub fn pre_update(&mut self) -> StreamResult<()> {
        self.drain_node_events();
        self.poll()?;
        Ok(())
    }

    /// Per-node update. Cheap when nothing changed.
    pub fn update(&mut self, node: &Rc<dyn Node>) -> StreamResult<()> {
        self.drain_node_events();
        if !self.is_ready() || !self.opts.visible {
            return Ok(());
        }
        if node.is_disposed() {
            return Ok(());
        }
        let Some(material) = node.material() else {
            return Ok(());
        };
        if !material.is_visible() {
            return Ok(());
        }

        let node_id = node.id();
        if !self.targets.contains_key(&node_id) {
            let target = self.create_target(node);
            tracing::debug!(
                node = %node_id,
                level = target.level,
                width = target.width,
                height = target.height,
                "target created"
            );
            self.targets.insert(node_id, target);
        }

        let layer_extent = self.layer_extent();
        let params = self.material_params(layer_extent.as_ref());
        self.kind.update_material(&*material, self.id, &params);

        if self.opts.frozen {
            return Ok(());
        }
        let pending = self
            .targets
            .get(&node_id)
            .is_some_and(|t| t.state() == TargetState::Pending);
        if pending {
            self.process_target(node_id)?;
        } else {
            tracing::trace!(node = %node_id, "target not pending, skipped");
        }
        Ok(())
    }

    /// Prune unused targets and let the pool reclaim idle surfaces.
    pub fn post_update(&mut self) -> StreamResult<()> {
        self.post_update_at(Instant::now())
    }

    #[tracing::instrument(skip_all, fields(layer = %self.id))]
    pub fn post_update_at(&mut self, now: Instant) -> StreamResult<()> {
        self.drain_node_events();
        self.poll()?;
        self.delete_unused_targets();
        if let Some(ctx) = &self.ctx {
            ctx.pool.borrow_mut().flush_if_idle(now);
        }
        Ok(())
    }

    /// Apply every fetch result delivered so far and pump the request queue.
    ///
    /// Returns the number of results applied.
    pub fn poll(&mut self) -> StreamResult<usize> {
        let mut applied = 0;
        while let Ok(outcome) = self.results.try_recv() {
            self.counter.finish();
            self.apply_outcome(outcome)?;
            applied += 1;
        }
        if let Some(ctx) = &self.ctx {
            ctx.queue.pump();
        }
        Ok(applied)
    }

    pub fn set_visible(&mut self, visible: bool) {
        if self.opts.visible == visible {
            return;
        }
        self.opts.visible = visible;
        self.refresh_materials();
        self.emit(LayerEvent::VisiblePropertyChanged { visible });
    }

    pub fn set_opacity(&mut self, opacity: f32) -> StreamResult<()> {
        if !opacity.is_finite() || !(0.0..=1.0).contains(&opacity) {
            return Err(StreamError::validation("opacity must be within [0, 1]"));
        }
        if self.opts.opacity == opacity {
            return Ok(());
        }
        self.opts.opacity = opacity;
        self.refresh_materials();
        self.emit(LayerEvent::OpacityPropertyChanged { opacity });
        Ok(())
    }

    pub fn set_blending_mode(&mut self, mode: BlendingMode) {
        if self.opts.blending_mode == mode {
            return;
        }
        self.opts.blending_mode = mode;
        self.refresh_materials();
        self.emit(LayerEvent::BlendingModePropertyChanged { mode });
    }

    pub fn set_colorimetry(&mut self, colorimetry: Colorimetry) {
        if self.opts.colorimetry == colorimetry {
            return;
        }
        self.opts.colorimetry = colorimetry;
        self.refresh_materials();
        self.emit(LayerEvent::ColorimetryPropertyChanged { colorimetry });
    }

    pub fn set_elevation_range(&mut self, range: Option<ElevationRange>) -> StreamResult<()> {
        if let Some(r) = range
            && r.min > r.max
        {
            return Err(StreamError::validation("elevation_range min must be <= max"));
        }
        if self.opts.elevation_range == range {
            return Ok(());
        }
        self.opts.elevation_range = range;
        self.refresh_materials();
        self.emit(LayerEvent::ElevationRangePropertyChanged { range });
        Ok(())
    }

    /// Frozen layers keep updating materials but stop fetching.
    pub fn set_frozen(&mut self, frozen: bool) {
        if self.opts.frozen == frozen {
            return;
        }
        self.opts.frozen = frozen;
        self.emit(LayerEvent::FrozenPropertyChanged { frozen });
    }

    /// Reset every target intersecting `extent` (all of them for `None`) so it is fetched again,
    /// and drop cached images in that region.
    pub fn invalidate(&mut self, extent: Option<&Extent>) {
        let mut reset = 0usize;
        {
            let mut compositor = self.compositor.borrow_mut();
            for target in self.targets.values_mut() {
                if extent.is_some_and(|e| !e.intersects(&target.extent)) {
                    continue;
                }
                let ids = target.reset();
                if !ids.is_empty() {
                    compositor.unlock(&ids, target.node_id);
                }
                reset += 1;
            }
            let evicted = match extent {
                Some(e) => compositor.evict_within(e),
                None => {
                    let n = compositor.cached_len();
                    compositor.dispose();
                    n
                }
            };
            tracing::debug!(layer = %self.id, targets = reset, evicted, "layer invalidated");
        }
        self.notify_change();
    }

    /// Rebuild every surface after the rendering context was lost.
    ///
    /// Targets restart from `Pending` and immediately show whatever the image cache still holds.
    pub fn restore_context(&mut self) -> StreamResult<()> {
        let mut ids: Vec<(u32, NodeId)> = self
            .targets
            .values()
            .map(|t| (t.level, t.node_id))
            .collect();
        ids.sort_unstable();

        {
            let mut compositor = self.compositor.borrow_mut();
            for target in self.targets.values_mut() {
                let images = target.reset();
                if !images.is_empty() {
                    compositor.unlock(&images, target.node_id);
                }
            }
        }
        for (_, node_id) in ids {
            let Some(mut target) = self.targets.remove(&node_id) else {
                continue;
            };
            if target.surface.is_some() {
                self.paint_fallback(&mut target);
            }
            self.targets.insert(node_id, target);
        }
        tracing::debug!(layer = %self.id, targets = self.targets.len(), "context restored");
        self.notify_change();
        Ok(())
    }

    pub fn get_info(&self, node: NodeId) -> Option<TargetInfo> {
        let t = self.targets.get(&node)?;
        Some(TargetInfo {
            node: t.node_id,
            level: t.level,
            state: t.state(),
            image_count: t.image_ids.len(),
            paint_count: t.paint_count(),
            has_surface: t.surface.is_some(),
            width: t.width,
            height: t.height,
        })
    }

    /// Detach from every node, release every surface and drop the image cache. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        let targets: Vec<Target> = self.targets.drain().map(|(_, t)| t).collect();
        for mut target in targets {
            if !target.node.is_disposed()
                && let Some(material) = target.node.material()
            {
                self.kind.detach(&*material, self.id);
            }
            self.release_target(&mut target);
        }
        self.compositor.borrow_mut().dispose();
        self.events.clear();
        tracing::debug!(layer = %self.id, "layer disposed");
    }

    fn create_target(&self, node: &Rc<dyn Node>) -> Target {
        let geometry = node.extent();
        let (extent, width, height) = self.request_region(&geometry, node.texture_size());
        let node_id = node.id();
        let inbox = Rc::downgrade(&self.inbox);
        let subscription = node.subscribe(Box::new(move |event: &NodeEvent| {
            if let Some(inbox) = inbox.upgrade() {
                inbox.borrow_mut().push((node_id, event.clone()));
            }
        }));
        Target::new(
            Rc::clone(node),
            geometry,
            extent,
            width,
            height,
            Some(subscription),
        )
    }

    fn drain_node_events(&mut self) {
        let events = std::mem::take(&mut *self.inbox.borrow_mut());
        for (node_id, event) in events {
            match event {
                NodeEvent::Disposed => self.dispose_target(node_id, false),
                NodeEvent::VisibilityChanged { visible: false } => {
                    if let Some(target) = self.targets.get_mut(&node_id)
                        && target.state() != TargetState::Complete
                    {
                        tracing::debug!(node = %node_id, "node hidden, aborting target");
                        target.abort();
                    }
                }
                NodeEvent::VisibilityChanged { visible: true } => {}
            }
        }
    }

    /// Remove a target, optionally unbinding its texture from the node first.
    pub(crate) fn dispose_target(&mut self, node_id: NodeId, unbind: bool) {
        let Some(mut target) = self.targets.remove(&node_id) else {
            return;
        };
        if unbind
            && !target.node.is_disposed()
            && let Some(material) = target.node.material()
        {
            self.kind.apply_empty_texture_to_node(&*material, self.id);
        }
        self.release_target(&mut target);
    }

    fn release_target(&self, target: &mut Target) {
        let Some(ctx) = &self.ctx else {
            return;
        };
        let mut compositor = self.compositor.borrow_mut();
        target.dispose(&mut ctx.pool.borrow_mut(), &mut **compositor);
    }

    fn layer_extent(&self) -> Option<Extent> {
        self.opts.extent.clone().or_else(|| self.source.extent())
    }

    fn material_params<'a>(&self, extent: Option<&'a Extent>) -> MaterialParams<'a> {
        MaterialParams {
            visible: self.opts.visible,
            opacity: self.opts.opacity,
            blending_mode: self.opts.blending_mode,
            colorimetry: self.opts.colorimetry,
            elevation_range: self.opts.elevation_range,
            extent,
        }
    }

    fn refresh_materials(&self) {
        let layer_extent = self.layer_extent();
        let params = self.material_params(layer_extent.as_ref());
        for target in self.targets.values() {
            if target.node.is_disposed() {
                continue;
            }
            if let Some(material) = target.node.material() {
                self.kind.update_material(&*material, self.id, &params);
            }
        }
    }

    fn emit(&self, event: LayerEvent) {
        tracing::debug!(layer = %self.id, ?event, "layer property changed");
        self.events.emit(&event);
        self.notify_change();
    }

    fn notify_change(&self) {
        if let Some(ctx) = &self.ctx {
            ctx.instance.notify_change(self.id);
        }
    }

    fn context(&self) -> StreamResult<&LayerContext> {
        self.ctx.as_ref().ok_or_else(|| {
            StreamError::invariant(format!("layer {} is not initialized", self.id))
        })
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("ready", &self.is_ready())
            .field("targets", &self.targets.len())
            .field("loading", &self.counter.loading())
            .finish()
    }
}

impl Drop for Layer {
    fn drop(&mut self) {
        self.dispose();
    }
}
