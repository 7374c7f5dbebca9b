use std::collections::HashSet;
use std::rc::Rc;

use crate::foundation::cancel::CancellationToken;
use crate::foundation::core::{Extent, Pitch};
use crate::foundation::error::{StreamError, StreamResult};
use crate::foundation::events::SubscriptionId;
use crate::foundation::ids::{ImageId, NodeId};
use crate::render::compositor::Compositor;
use crate::render::surface::RenderTarget;
use crate::render::surface_pool::RenderTargetPool;
use crate::scene::Node;

/// Streaming state of a target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    /// No work in flight, or the last result is not final.
    Pending,
    /// A fetch/composite cycle is running.
    Processing,
    /// The last composite fully covered the request; nothing to do until invalidated.
    Complete,
}

impl std::fmt::Display for TargetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TargetState::Pending => "pending",
            TargetState::Processing => "processing",
            TargetState::Complete => "complete",
        })
    }
}

/// Bookkeeping of one asynchronous fetch graph, settled once every request resolved.
#[derive(Debug)]
pub(crate) struct FetchGroup {
    pub(crate) generation: u64,
    /// Every image of the request, in draw order.
    pub(crate) ids: Vec<ImageId>,
    pub(crate) outstanding: HashSet<ImageId>,
    pub(crate) succeeded: usize,
    pub(crate) cancelled: usize,
    pub(crate) failed: usize,
}

impl FetchGroup {
    pub(crate) fn new(generation: u64, ids: Vec<ImageId>, outstanding: HashSet<ImageId>) -> Self {
        Self {
            generation,
            ids,
            outstanding,
            succeeded: 0,
            cancelled: 0,
            failed: 0,
        }
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.outstanding.is_empty()
    }
}

/// Per-(layer, node) streaming state.
pub(crate) struct Target {
    pub(crate) node: Rc<dyn Node>,
    pub(crate) node_id: NodeId,
    pub(crate) level: u32,
    /// Raw extent of the node.
    pub(crate) geometry_extent: Extent,
    /// Margin-padded request region.
    pub(crate) extent: Extent,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) pitch: Pitch,
    pub(crate) surface: Option<RenderTarget>,
    pub(crate) image_ids: Vec<ImageId>,
    pub(crate) fetch: Option<FetchGroup>,
    state: TargetState,
    token: CancellationToken,
    paint_count: u64,
    subscription: Option<SubscriptionId>,
    disposed: bool,
}

impl Target {
    pub(crate) fn new(
        node: Rc<dyn Node>,
        geometry_extent: Extent,
        extent: Extent,
        width: u32,
        height: u32,
        subscription: Option<SubscriptionId>,
    ) -> Self {
        let pitch = geometry_extent.offset_to_parent(&extent);
        Self {
            node_id: node.id(),
            level: node.level(),
            node,
            geometry_extent,
            extent,
            width,
            height,
            pitch,
            surface: None,
            image_ids: Vec::new(),
            fetch: None,
            state: TargetState::Pending,
            token: CancellationToken::fresh(),
            paint_count: 0,
            subscription,
            disposed: false,
        }
    }

    pub(crate) fn state(&self) -> TargetState {
        self.state
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn paint_count(&self) -> u64 {
        self.paint_count
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// `Complete` with a real surface: usable as a fallback source.
    pub(crate) fn is_loaded(&self) -> bool {
        self.state == TargetState::Complete && self.surface.is_some()
    }

    pub(crate) fn begin_processing(&mut self) -> StreamResult<()> {
        if self.state != TargetState::Pending {
            return Err(StreamError::invariant(format!(
                "target for {} cannot start processing while {}",
                self.node_id, self.state
            )));
        }
        self.transition(TargetState::Processing);
        Ok(())
    }

    pub(crate) fn complete(&mut self) -> StreamResult<()> {
        if self.state != TargetState::Processing {
            return Err(StreamError::invariant(format!(
                "target for {} cannot complete while {}",
                self.node_id, self.state
            )));
        }
        self.transition(TargetState::Complete);
        Ok(())
    }

    pub(crate) fn set_pending(&mut self) {
        self.transition(TargetState::Pending);
    }

    pub(crate) fn record_paint(&mut self) {
        self.paint_count += 1;
    }

    /// Cancel in-flight work and return to `Pending`, keeping the displayed images.
    pub(crate) fn abort(&mut self) {
        self.token.abort();
        self.token = CancellationToken::fresh();
        self.fetch = None;
        self.transition(TargetState::Pending);
    }

    /// [`abort`](Self::abort), then forget the displayed images. Returns them for unlocking.
    pub(crate) fn reset(&mut self) -> Vec<ImageId> {
        self.abort();
        std::mem::take(&mut self.image_ids)
    }

    /// Abort, stop listening to the node, unlock images and release the surface. Idempotent.
    pub(crate) fn dispose(&mut self, pool: &mut RenderTargetPool, compositor: &mut dyn Compositor) {
        if self.is_disposed() {
            return;
        }
        self.disposed = true;
        self.token.abort();
        self.fetch = None;
        if let Some(sub) = self.subscription.take() {
            self.node.unsubscribe(sub);
        }
        let ids = std::mem::take(&mut self.image_ids);
        if !ids.is_empty() {
            compositor.unlock(&ids, self.node_id);
        }
        if let Some(surface) = self.surface.take() {
            pool.release(surface);
        }
        tracing::debug!(node = %self.node_id, "target disposed");
    }

    fn transition(&mut self, next: TargetState) {
        if self.state != next {
            tracing::debug!(node = %self.node_id, from = %self.state, to = %next, "target state");
            self.state = next;
        }
    }
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("node", &self.node_id)
            .field("level", &self.level)
            .field("state", &self.state)
            .field("images", &self.image_ids.len())
            .field("paint_count", &self.paint_count)
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/layer/target.rs"]
mod tests;
