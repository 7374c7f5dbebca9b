use std::collections::HashSet;
use std::rc::Rc;

use crate::foundation::core::Extent;
use crate::foundation::error::{StreamError, StreamResult};
use crate::foundation::ids::{ImageId, NodeId};
use crate::layer::Layer;
use crate::layer::target::{FetchGroup, Target, TargetState};
use crate::queue::{Deliver, QueuedRequest, ShouldExecute};
use crate::render::compositor::RenderRequest;
use crate::render::surface::LayerTexture;
use crate::source::{FetchResult, ImageHandle, ImageRequest};

/// A fetch result travelling back to the orchestration thread.
pub(crate) struct FetchOutcome {
    pub(crate) node: NodeId,
    /// Cancellation generation of the target when the request was issued.
    pub(crate) generation: u64,
    pub(crate) image: ImageId,
    pub(crate) result: FetchResult,
}

enum Resolution {
    Succeeded,
    Cancelled,
    Failed,
}

impl Layer {
    /// Margin-padded request region and pixel size for a node.
    pub(crate) fn request_region(
        &self,
        geometry: &Extent,
        texture_size: (u32, u32),
    ) -> (Extent, u32, u32) {
        let factor = self.opts.resolution_factor;
        let scale = |v: u32| ((f64::from(v) * factor).round() as u32).max(1);
        let (width, height) = (scale(texture_size.0), scale(texture_size.1));
        match self.source.adjust_extent_and_pixel_size(
            geometry,
            width,
            height,
            self.opts.margin.pixels,
        ) {
            Some(adjusted) => adjusted,
            None => (
                geometry.with_relative_margin(self.opts.margin.relative),
                width,
                height,
            ),
        }
    }

    /// Layer extent and source coverage both include `extent`.
    fn covers(&self, extent: &Extent) -> bool {
        if extent.crs() != self.source.crs() {
            return false;
        }
        if let Some(limit) = &self.opts.extent
            && !limit.intersects(extent)
        {
            return false;
        }
        self.source.contains(extent)
    }

    pub(crate) fn process_target(&mut self, node_id: NodeId) -> StreamResult<()> {
        let Some(mut target) = self.targets.remove(&node_id) else {
            return Ok(());
        };
        let result = self.process(&mut target);
        self.targets.insert(node_id, target);
        result
    }

    fn process(&mut self, target: &mut Target) -> StreamResult<()> {
        if target.state() != TargetState::Pending {
            return Ok(());
        }
        if target.token().is_aborted() {
            target.abort();
            return Ok(());
        }

        if !self.covers(&target.extent) {
            target.begin_processing()?;
            if let Some(material) = target.node.material() {
                self.kind.apply_empty_texture_to_node(&*material, self.id);
            }
            target.record_paint();
            target.complete()?;
            tracing::debug!(node = %target.node_id, "target outside layer coverage");
            self.notify_change();
            return Ok(());
        }

        if target.surface.is_none() {
            let ctx = self.context()?;
            let surface = ctx.pool.borrow_mut().acquire(
                ctx.owner,
                target.width,
                target.height,
                self.kind.surface_options(),
            );
            target.surface = Some(surface);
            if !self.source.is_synchronous() {
                self.paint_fallback(target);
            }
        }

        if !self.kind.can_fetch_images(&*target.node) {
            tracing::trace!(node = %target.node_id, "node not ready for this layer");
            return Ok(());
        }

        target.begin_processing()?;
        let handles = {
            let request = ImageRequest {
                target_id: format!("{}/{}", self.id, target.node_id),
                extent: &target.extent,
                width: target.width,
                height: target.height,
                signal: target.token(),
            };
            self.source.get_images(&request)
        };

        if self.source.is_synchronous() {
            self.fetch_sync(target, handles)
        } else {
            self.fetch_async(target, handles)
        }
    }

    fn fetch_sync(&mut self, target: &mut Target, handles: Vec<ImageHandle>) -> StreamResult<()> {
        let mut ids = Vec::with_capacity(handles.len());
        for handle in handles {
            ids.push(handle.id);
            if self.compositor.borrow().has(handle.id) {
                continue;
            }
            match (handle.request)() {
                Ok(image) => self.compositor.borrow_mut().add(image),
                Err(err) => {
                    if err.is_cancellation() {
                        tracing::trace!(node = %target.node_id, "synchronous fetch cancelled");
                    } else {
                        tracing::warn!(
                            node = %target.node_id,
                            image = %handle.id,
                            error = %err,
                            "synchronous fetch failed, retrying next update"
                        );
                    }
                    target.set_pending();
                    return Ok(());
                }
            }
        }
        self.paint_target(target, &ids, false)
    }

    fn fetch_async(&mut self, target: &mut Target, handles: Vec<ImageHandle>) -> StreamResult<()> {
        let queue = Rc::clone(&self.context()?.queue);
        let generation = target.token().generation();

        let mut ids = Vec::with_capacity(handles.len());
        let mut outstanding = HashSet::new();
        let mut requests = Vec::new();
        {
            let compositor = self.compositor.borrow();
            for handle in handles {
                ids.push(handle.id);
                if compositor.has(handle.id) || !outstanding.insert(handle.id) {
                    continue;
                }
                requests.push(handle);
            }
        }
        if requests.is_empty() {
            return self.paint_target(target, &ids, false);
        }

        tracing::debug!(
            node = %target.node_id,
            requests = requests.len(),
            cached = ids.len() - requests.len(),
            "queueing image requests"
        );
        self.counter.start(requests.len());
        target.fetch = Some(FetchGroup::new(generation, ids, outstanding));
        for handle in requests {
            let request = QueuedRequest {
                id: handle.id,
                priority: queue.next_priority(),
                should_execute: self.should_execute(target, handle.id),
                request: handle.request,
                deliver: self.deliver_to(target.node_id, generation, handle.id),
            };
            queue.enqueue(request);
        }
        Ok(())
    }

    /// Dispatch guard: the target must still be live and the image not cached yet.
    fn should_execute(&self, target: &Target, image: ImageId) -> ShouldExecute {
        let token = target.token().clone();
        let node = Rc::downgrade(&target.node);
        let compositor = Rc::downgrade(&self.compositor);
        Box::new(move || {
            if token.is_aborted() {
                return false;
            }
            let Some(node) = node.upgrade() else {
                return false;
            };
            if node.is_disposed() || !node.is_visible() {
                return false;
            }
            compositor
                .upgrade()
                .is_some_and(|c| c.try_borrow().map_or(true, |c| !c.has(image)))
        })
    }

    fn deliver_to(&self, node: NodeId, generation: u64, image: ImageId) -> Deliver {
        let tx = self.results_tx.clone();
        Box::new(move |result| {
            // The layer may be gone; nothing left to notify then.
            let _ = tx.send(FetchOutcome {
                node,
                generation,
                image,
                result,
            });
        })
    }

    pub(crate) fn apply_outcome(&mut self, outcome: FetchOutcome) -> StreamResult<()> {
        let FetchOutcome {
            node,
            generation,
            image,
            result,
        } = outcome;

        let resolution = match result {
            Ok(decoded) => {
                self.compositor.borrow_mut().add(decoded);
                Resolution::Succeeded
            }
            Err(err) if err.is_cancellation() => Resolution::Cancelled,
            Err(err) => {
                tracing::warn!(node = %node, image = %image, error = %err, "image fetch failed");
                Resolution::Failed
            }
        };

        let Some(mut target) = self.targets.remove(&node) else {
            tracing::trace!(node = %node, image = %image, "result for released target");
            return Ok(());
        };
        let result = self.resolve(&mut target, generation, image, resolution);
        self.targets.insert(node, target);
        result
    }

    fn resolve(
        &mut self,
        target: &mut Target,
        generation: u64,
        image: ImageId,
        resolution: Resolution,
    ) -> StreamResult<()> {
        let Some(group) = target.fetch.as_mut() else {
            tracing::trace!(node = %target.node_id, image = %image, "no fetch in flight");
            return Ok(());
        };
        if group.generation != generation || !group.outstanding.remove(&image) {
            tracing::trace!(node = %target.node_id, image = %image, "stale result discarded");
            return Ok(());
        }
        match resolution {
            Resolution::Succeeded => group.succeeded += 1,
            Resolution::Cancelled => group.cancelled += 1,
            Resolution::Failed => group.failed += 1,
        }
        if !group.is_settled() {
            return Ok(());
        }
        let Some(group) = target.fetch.take() else {
            return Ok(());
        };
        self.settle(target, group)
    }

    /// Every request of the group resolved.
    fn settle(&mut self, target: &mut Target, group: FetchGroup) -> StreamResult<()> {
        let (any_present, all_present) = {
            let compositor = self.compositor.borrow();
            (
                group.ids.iter().any(|id| compositor.has(*id)),
                group.ids.iter().all(|id| compositor.has(*id)),
            )
        };

        if group.failed > 0 {
            tracing::warn!(
                node = %target.node_id,
                failed = group.failed,
                succeeded = group.succeeded,
                "fetch incomplete, keeping partial result"
            );
            if any_present {
                return self.paint_target(target, &group.ids, true);
            }
            return target.complete();
        }
        if all_present || group.succeeded > 0 {
            return self.paint_target(target, &group.ids, false);
        }
        tracing::trace!(
            node = %target.node_id,
            cancelled = group.cancelled,
            "fetch cancelled"
        );
        target.set_pending();
        Ok(())
    }

    /// Composite `ids` into the target surface, bind it on the node and move the state machine.
    pub(crate) fn paint_target(
        &mut self,
        target: &mut Target,
        ids: &[ImageId],
        force_complete: bool,
    ) -> StreamResult<()> {
        let node_id = target.node_id;
        let Some(surface) = target.surface.as_mut() else {
            return Err(StreamError::invariant(format!(
                "target for {node_id} has no surface to paint"
            )));
        };

        let outcome = {
            let mut compositor = self.compositor.borrow_mut();
            let outcome = compositor.render(RenderRequest {
                extent: &target.extent,
                width: target.width,
                height: target.height,
                target: &mut *surface,
                image_ids: Some(ids),
                fallback_mode: false,
            });
            compositor.lock(ids, node_id);
            let released: Vec<ImageId> = target
                .image_ids
                .iter()
                .filter(|id| !ids.contains(id))
                .copied()
                .collect();
            if !released.is_empty() {
                compositor.unlock(&released, node_id);
            }
            outcome
        };
        let texture = surface.texture().clone();

        target.image_ids = ids.to_vec();
        target.record_paint();
        if let Some(material) = target.node.material() {
            self.kind.apply_texture_to_node(
                &*material,
                self.id,
                LayerTexture::Bound {
                    texture,
                    pitch: target.pitch,
                },
            );
        }

        if outcome.is_last_render || force_complete {
            target.complete()?;
        } else {
            target.set_pending();
        }
        tracing::debug!(
            node = %node_id,
            images = ids.len(),
            last = outcome.is_last_render,
            state = %target.state(),
            "target painted"
        );
        self.notify_change();
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/layer/fetch.rs"]
mod tests;
