use crate::foundation::core::{Extent, Rgba8};
use crate::foundation::error::{StreamError, StreamResult};

/// How layer pixels combine with the layers below them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendingMode {
    /// Layer replaces what is below it, alpha ignored.
    None,
    /// Regular alpha blending.
    #[default]
    Normal,
    Additive,
    Multiplicative,
}

/// Brightness/contrast/saturation adjustments applied by the material.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Colorimetry {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
}

impl Default for Colorimetry {
    fn default() -> Self {
        Self {
            brightness: 0.0,
            contrast: 1.0,
            saturation: 1.0,
        }
    }
}

/// Elevation interval outside of which a color layer is hidden.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ElevationRange {
    pub min: f32,
    pub max: f32,
}

/// How raw source pixels are turned into layer values.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum Interpretation {
    /// Use samples as they are.
    #[default]
    Raw,
    /// RGB-encoded elevation: `-10000 + (r * 65536 + g * 256 + b) * 0.1`.
    MapboxTerrainRgb,
    /// Map float samples in `[min, max]` to a grayscale ramp.
    ScaleToMinMax { min: f32, max: f32 },
}

/// No-data handling of float sources.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct NoData {
    /// Samples equal to this value are treated as missing.
    pub value: Option<f32>,
    /// Replacement for missing samples; when unset they stay transparent / `NaN`.
    pub fill: Option<f32>,
}

/// Margin added around a node's extent before querying the source, to hide seams.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MarginPolicy {
    /// Used when the source has no native margin policy; fraction of the extent size.
    pub relative: f64,
    /// Passed to sources that adjust extents natively.
    pub pixels: u32,
}

impl Default for MarginPolicy {
    fn default() -> Self {
        Self {
            relative: 0.05,
            pixels: 4,
        }
    }
}

/// Layer configuration. Every field has a default, so `{}` is a valid document.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayerOptions {
    pub name: Option<String>,
    pub visible: bool,
    pub opacity: f32,
    /// Keep pushing material parameters but stop fetching (debugging aid).
    pub frozen: bool,
    /// Multiplier applied to the node texture size to get the request size.
    pub resolution_factor: f64,
    /// Color painted under the source images.
    pub background: Rgba8,
    pub no_data: NoData,
    pub interpretation: Interpretation,
    pub blending_mode: BlendingMode,
    pub colorimetry: Colorimetry,
    pub elevation_range: Option<ElevationRange>,
    pub margin: MarginPolicy,
    /// Every `retention_stride`-th level is never pruned.
    pub retention_stride: u32,
    /// Restrict the layer to this extent, on top of the source's own coverage.
    pub extent: Option<Extent>,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            name: None,
            visible: true,
            opacity: 1.0,
            frozen: false,
            resolution_factor: 1.0,
            background: Rgba8::TRANSPARENT,
            no_data: NoData::default(),
            interpretation: Interpretation::Raw,
            blending_mode: BlendingMode::Normal,
            colorimetry: Colorimetry::default(),
            elevation_range: None,
            margin: MarginPolicy::default(),
            retention_stride: 3,
            extent: None,
        }
    }
}

impl LayerOptions {
    /// Parse and validate options from JSON.
    pub fn from_json(s: &str) -> StreamResult<Self> {
        let opts: LayerOptions = serde_json::from_str(s)?;
        opts.validate()?;
        Ok(opts)
    }

    pub fn validate(&self) -> StreamResult<()> {
        if !self.opacity.is_finite() || !(0.0..=1.0).contains(&self.opacity) {
            return Err(StreamError::validation("opacity must be within [0, 1]"));
        }
        if !self.resolution_factor.is_finite() || self.resolution_factor <= 0.0 {
            return Err(StreamError::validation(
                "resolution_factor must be finite and > 0",
            ));
        }
        if self.retention_stride == 0 {
            return Err(StreamError::validation("retention_stride must be >= 1"));
        }
        if !self.margin.relative.is_finite() || self.margin.relative < 0.0 {
            return Err(StreamError::validation(
                "margin.relative must be finite and >= 0",
            ));
        }
        if let Some(r) = self.elevation_range
            && r.min > r.max
        {
            return Err(StreamError::validation("elevation_range min must be <= max"));
        }
        if let Interpretation::ScaleToMinMax { min, max } = self.interpretation
            && !(min < max)
        {
            return Err(StreamError::validation(
                "interpretation scale_to_min_max requires min < max",
            ));
        }
        Ok(())
    }
}

/// [`RenderTargetPool`](crate::RenderTargetPool) configuration.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolOptions {
    /// Idle surfaces kept per `(owner, options)` bucket.
    pub capacity_per_bucket: usize,
    /// Quiet period after the last release before the pool is flushed.
    pub debounce_ms: u64,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            capacity_per_bucket: 16,
            debounce_ms: 50,
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
