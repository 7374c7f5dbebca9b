use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use crate::foundation::core::{Pitch, Rgba8};
use crate::foundation::ids::{OwnerId, SurfaceId};

/// Texel formats a layer can render into.
///
/// Color and mask layers use `Rgba8`; elevation layers use `R32Float`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Straight-alpha RGBA, 8 bits per channel.
    Rgba8,
    /// Single 32-bit float channel.
    R32Float,
}

/// Allocation options of a render surface. Two surfaces are interchangeable only when their
/// options are identical; the size is not part of the options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SurfaceOptions {
    pub format: PixelFormat,
    /// Sample with bilinear filtering rather than nearest.
    pub linear_filtering: bool,
}

impl SurfaceOptions {
    pub fn color() -> Self {
        Self {
            format: PixelFormat::Rgba8,
            linear_filtering: true,
        }
    }

    pub fn elevation() -> Self {
        Self {
            format: PixelFormat::R32Float,
            linear_filtering: false,
        }
    }
}

/// Texel storage of a surface.
#[derive(Clone, Debug, PartialEq)]
pub enum RasterData {
    /// Row-major straight-alpha RGBA8 bytes.
    Rgba8(Vec<u8>),
    /// Row-major float samples. `NaN` marks "no data".
    R32Float(Vec<f32>),
}

/// CPU-side texels of a render surface.
#[derive(Clone, Debug, PartialEq)]
pub struct Raster {
    width: u32,
    height: u32,
    data: RasterData,
}

impl Raster {
    /// Allocate a cleared raster (transparent for RGBA8, `NaN` for floats).
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let px = (width as usize).saturating_mul(height as usize);
        let data = match format {
            PixelFormat::Rgba8 => RasterData::Rgba8(vec![0; px.saturating_mul(4)]),
            PixelFormat::R32Float => RasterData::R32Float(vec![f32::NAN; px]),
        };
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        match self.data {
            RasterData::Rgba8(_) => PixelFormat::Rgba8,
            RasterData::R32Float(_) => PixelFormat::R32Float,
        }
    }

    pub fn data(&self) -> &RasterData {
        &self.data
    }

    /// Resize in place. Contents are cleared when the size changes.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == self.width && height == self.height {
            return;
        }
        *self = Raster::new(width, height, self.format());
    }

    /// Fill every texel with `color` (RGBA8) or with `value` (floats).
    pub fn clear(&mut self, color: Rgba8, value: f32) {
        match &mut self.data {
            RasterData::Rgba8(bytes) => {
                let c = color.to_array();
                for px in bytes.chunks_exact_mut(4) {
                    px.copy_from_slice(&c);
                }
            }
            RasterData::R32Float(samples) => samples.fill(value),
        }
    }

    pub fn rgba_at(&self, x: u32, y: u32) -> Option<Rgba8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        match &self.data {
            RasterData::Rgba8(bytes) => {
                let i = self.index(x, y) * 4;
                Some(Rgba8::new(bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]))
            }
            RasterData::R32Float(_) => None,
        }
    }

    pub fn value_at(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        match &self.data {
            RasterData::R32Float(samples) => Some(samples[self.index(x, y)]),
            RasterData::Rgba8(_) => None,
        }
    }

    pub fn set_rgba(&mut self, x: u32, y: u32, c: Rgba8) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = self.index(x, y);
        if let RasterData::Rgba8(bytes) = &mut self.data {
            bytes[i * 4..i * 4 + 4].copy_from_slice(&c.to_array());
        }
    }

    pub fn set_value(&mut self, x: u32, y: u32, v: f32) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = self.index(x, y);
        if let RasterData::R32Float(samples) = &mut self.data {
            samples[i] = v;
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }
}

/// Shared handle to a surface's texels, as bound on node materials.
///
/// Cloning is cheap and aliases the same storage, like a GPU texture handle.
#[derive(Clone)]
pub struct Texture {
    id: SurfaceId,
    pixels: Rc<RefCell<Raster>>,
}

impl Texture {
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn pixels(&self) -> Ref<'_, Raster> {
        self.pixels.borrow()
    }

    pub fn width(&self) -> u32 {
        self.pixels.borrow().width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.borrow().height()
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let px = self.pixels.borrow();
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("width", &px.width())
            .field("height", &px.height())
            .field("format", &px.format())
            .finish()
    }
}

/// What a layer binds on a node material.
#[derive(Clone, Debug)]
pub enum LayerTexture {
    /// Nothing to show (node outside the layer, or layer detached).
    Empty,
    /// A composited surface plus the transform from the node's extent into it.
    Bound { texture: Texture, pitch: Pitch },
}

impl LayerTexture {
    pub fn is_bound(&self) -> bool {
        matches!(self, LayerTexture::Bound { .. })
    }

    pub fn texture(&self) -> Option<&Texture> {
        match self {
            LayerTexture::Bound { texture, .. } => Some(texture),
            LayerTexture::Empty => None,
        }
    }
}

/// A pooled, exclusively owned render surface.
///
/// Not `Clone`: ownership moves between a [`RenderTargetPool`](crate::RenderTargetPool) and the
/// target currently drawing into it.
#[derive(Debug)]
pub struct RenderTarget {
    owner: OwnerId,
    options: SurfaceOptions,
    texture: Texture,
}

impl RenderTarget {
    pub(crate) fn allocate(owner: OwnerId, width: u32, height: u32, opts: SurfaceOptions) -> Self {
        Self {
            owner,
            options: opts,
            texture: Texture {
                id: SurfaceId::next(),
                pixels: Rc::new(RefCell::new(Raster::new(width, height, opts.format))),
            },
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.texture.id
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn options(&self) -> SurfaceOptions {
        self.options
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    /// Handle to bind on materials.
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn pixels(&self) -> Ref<'_, Raster> {
        self.texture.pixels.borrow()
    }

    pub fn pixels_mut(&mut self) -> RefMut<'_, Raster> {
        self.texture.pixels.borrow_mut()
    }

    pub(crate) fn resize(&mut self, width: u32, height: u32) {
        self.pixels_mut().resize(width, height);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/surface.rs"]
mod tests;
