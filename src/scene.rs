use std::rc::Rc;

use crate::config::{BlendingMode, Colorimetry, ElevationRange};
use crate::foundation::core::Extent;
use crate::foundation::events::SubscriptionId;
use crate::foundation::ids::{InstanceId, LayerId, NodeId};
use crate::render::surface::LayerTexture;

/// Lifecycle notifications a [`Node`] sends to the layers displaying it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeEvent {
    Disposed,
    VisibilityChanged { visible: bool },
}

/// Listener registered through [`Node::subscribe`].
pub type NodeListener = Box<dyn Fn(&NodeEvent)>;

/// A geometric tile of the host scene that can display layer textures.
pub trait Node {
    fn id(&self) -> NodeId;

    fn is_disposed(&self) -> bool;

    fn is_visible(&self) -> bool;

    /// Depth in the tile hierarchy; the root is level 0.
    fn level(&self) -> u32;

    /// Pixel-size hint `(width, height)` for textures displayed on this node.
    fn texture_size(&self) -> (u32, u32);

    fn extent(&self) -> Extent;

    /// `None` while the node has no material to receive textures.
    fn material(&self) -> Option<Rc<dyn Material>>;

    /// `false` while color data cannot be draped yet (e.g. elevation still loading).
    fn can_process_color_layer(&self) -> bool {
        true
    }

    fn subscribe(&self, listener: NodeListener) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

/// Mask layer behaviour, forwarded to the material.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskMode {
    /// Hide what lies outside the mask.
    #[default]
    Normal,
    /// Hide what lies inside the mask.
    Inverted,
}

/// Shader-facing state of a node. Methods take `&self`; implementations use interior mutability.
pub trait Material {
    fn is_visible(&self) -> bool;

    fn set_color_texture(&self, layer: LayerId, texture: LayerTexture);

    fn set_elevation_texture(&self, layer: LayerId, texture: LayerTexture);

    fn set_layer_visibility(&self, layer: LayerId, visible: bool);

    fn set_layer_opacity(&self, layer: LayerId, opacity: f32);

    fn set_layer_elevation_range(&self, layer: LayerId, range: Option<ElevationRange>);

    fn set_layer_colorimetry(&self, layer: LayerId, colorimetry: Colorimetry);

    fn set_layer_blending_mode(&self, layer: LayerId, mode: BlendingMode);

    fn set_layer_mask_mode(&self, _layer: LayerId, _mode: MaskMode) {}

    fn has_color_layer(&self, layer: LayerId) -> bool;

    fn index_of_color_layer(&self, layer: LayerId) -> Option<usize>;

    fn remove_color_layer(&self, layer: LayerId);

    /// Register a color layer covering `extent` (`None` for unbounded layers).
    fn push_color_layer(&self, layer: LayerId, extent: Option<&Extent>);
}

/// The scene that owns layers and redraws when told.
pub trait Instance {
    fn id(&self) -> InstanceId;

    fn notify_change(&self, layer: LayerId);
}
