use crate::config::{BlendingMode, Colorimetry, ElevationRange};
use crate::foundation::core::Extent;
use crate::foundation::ids::LayerId;
use crate::render::surface::{LayerTexture, SurfaceOptions};
use crate::scene::{MaskMode, Material, Node};

/// The closed set of layer flavours.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum LayerKind {
    /// Imagery draped over the terrain.
    Color,
    /// Heights displacing the node geometry.
    Elevation,
    /// Color layer used as a visibility mask by the material.
    Mask { mode: MaskMode },
}

/// Visual parameters pushed to materials on every update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct MaterialParams<'a> {
    pub(crate) visible: bool,
    pub(crate) opacity: f32,
    pub(crate) blending_mode: BlendingMode,
    pub(crate) colorimetry: Colorimetry,
    pub(crate) elevation_range: Option<ElevationRange>,
    pub(crate) extent: Option<&'a Extent>,
}

impl LayerKind {
    pub fn name(self) -> &'static str {
        match self {
            LayerKind::Color => "color",
            LayerKind::Elevation => "elevation",
            LayerKind::Mask { .. } => "mask",
        }
    }

    pub(crate) fn surface_options(self) -> SurfaceOptions {
        match self {
            LayerKind::Elevation => SurfaceOptions::elevation(),
            LayerKind::Color | LayerKind::Mask { .. } => SurfaceOptions::color(),
        }
    }

    fn is_color(self) -> bool {
        !matches!(self, LayerKind::Elevation)
    }

    /// `false` stalls the target in `Pending` without counting as a failure.
    pub(crate) fn can_fetch_images(self, node: &dyn Node) -> bool {
        if self.is_color() {
            node.can_process_color_layer()
        } else {
            true
        }
    }

    pub(crate) fn apply_texture_to_node(
        self,
        material: &dyn Material,
        layer: LayerId,
        texture: LayerTexture,
    ) {
        if self.is_color() {
            material.set_color_texture(layer, texture);
        } else {
            material.set_elevation_texture(layer, texture);
        }
    }

    pub(crate) fn apply_empty_texture_to_node(self, material: &dyn Material, layer: LayerId) {
        self.apply_texture_to_node(material, layer, LayerTexture::Empty);
    }

    pub(crate) fn update_material(
        self,
        material: &dyn Material,
        layer: LayerId,
        params: &MaterialParams<'_>,
    ) {
        match self {
            LayerKind::Elevation => {
                material.set_layer_visibility(layer, params.visible);
            }
            LayerKind::Color | LayerKind::Mask { .. } => {
                if !material.has_color_layer(layer) {
                    material.push_color_layer(layer, params.extent);
                }
                material.set_layer_visibility(layer, params.visible);
                material.set_layer_opacity(layer, params.opacity);
                material.set_layer_elevation_range(layer, params.elevation_range);
                material.set_layer_colorimetry(layer, params.colorimetry);
                material.set_layer_blending_mode(layer, params.blending_mode);
                if let LayerKind::Mask { mode } = self {
                    material.set_layer_mask_mode(layer, mode);
                }
            }
        }
    }

    /// Remove every trace of the layer from a material.
    pub(crate) fn detach(self, material: &dyn Material, layer: LayerId) {
        self.apply_empty_texture_to_node(material, layer);
        if self.is_color() && material.has_color_layer(layer) {
            material.remove_color_layer(layer);
        }
    }
}
