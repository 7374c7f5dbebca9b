use crate::foundation::ids::NodeId;
use crate::layer::Layer;
use crate::layer::target::Target;

impl Layer {
    /// Release targets nobody will miss: hidden nodes, outside the retained levels, with a
    /// loaded ancestor to fall back on.
    pub(crate) fn delete_unused_targets(&mut self) {
        let stride = self.opts.retention_stride.max(1);
        let unused: Vec<NodeId> = self
            .targets
            .values()
            .filter(|t| self.is_prunable(t, stride))
            .map(|t| t.node_id)
            .collect();
        if unused.is_empty() {
            return;
        }
        for node_id in &unused {
            self.dispose_target(*node_id, true);
        }
        tracing::debug!(layer = %self.id, pruned = unused.len(), "unused targets released");
    }

    fn is_prunable(&self, target: &Target, stride: u32) -> bool {
        !target.node.is_visible()
            && target.level != 0
            && target.level % stride != 0
            && self.has_loaded_ancestor(target)
    }

    /// Another loaded target covers the geometry of `target` and is shallower or strictly larger.
    /// Peers with identical geometry never count, so they cannot release each other.
    pub(crate) fn has_loaded_ancestor(&self, target: &Target) -> bool {
        self.targets.values().any(|other| {
            other.node_id != target.node_id
                && other.is_loaded()
                && other.geometry_extent.contains_extent(&target.geometry_extent)
                && (other.level < target.level || other.geometry_extent != target.geometry_extent)
        })
    }
}
