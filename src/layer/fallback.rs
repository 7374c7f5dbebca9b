use crate::layer::Layer;
use crate::layer::target::Target;
use crate::render::compositor::{CopyRequest, RenderRequest};
use crate::render::surface::LayerTexture;

impl Layer {
    /// Fill a freshly acquired surface with the best data already at hand and bind it.
    ///
    /// The deepest loaded target whose extent contains `target.extent` is copied in. Without one,
    /// every cached image intersecting the extent is rendered in fallback mode. `target` must not
    /// be in `self.targets` while this runs.
    pub(crate) fn paint_fallback(&self, target: &mut Target) {
        let Some(dest) = target.surface.as_mut() else {
            return;
        };

        let ancestor = self
            .targets
            .values()
            .filter(|t| {
                t.node_id != target.node_id && t.is_loaded() && t.extent.contains_extent(&target.extent)
            })
            .min_by(|a, b| a.extent.area().total_cmp(&b.extent.area()));

        {
            let mut compositor = self.compositor.borrow_mut();
            match ancestor.and_then(|a| a.surface.as_ref().map(|s| (a, s))) {
                Some((ancestor, source)) => {
                    compositor.copy(CopyRequest {
                        source,
                        source_extent: &ancestor.extent,
                        dest,
                        target_extent: &target.extent,
                    });
                    tracing::debug!(
                        node = %target.node_id,
                        ancestor = %ancestor.node_id,
                        "fallback inherited from ancestor"
                    );
                }
                None => {
                    compositor.render(RenderRequest {
                        extent: &target.extent,
                        width: target.width,
                        height: target.height,
                        target: dest,
                        image_ids: None,
                        fallback_mode: true,
                    });
                    tracing::debug!(node = %target.node_id, "fallback rendered from cache");
                }
            }
        }

        let Some(surface) = target.surface.as_ref() else {
            return;
        };
        if let Some(material) = target.node.material() {
            self.kind.apply_texture_to_node(
                &*material,
                self.id,
                LayerTexture::Bound {
                    texture: surface.texture().clone(),
                    pitch: target.pitch,
                },
            );
        }
    }
}
