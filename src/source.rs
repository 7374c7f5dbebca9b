use std::sync::Arc;

use crate::foundation::cancel::CancellationToken;
use crate::foundation::core::{Crs, Extent, Rgba8};
use crate::foundation::error::{FetchError, StreamError, StreamResult};
use crate::foundation::ids::ImageId;

pub(crate) mod memory;

/// Decoded texels of a source image.
#[derive(Clone, Debug, PartialEq)]
pub enum ImagePixels {
    /// Row-major straight-alpha RGBA8.
    Rgba8(Arc<[u8]>),
    /// Row-major float samples.
    R32Float(Arc<[f32]>),
}

/// A decoded source image and the region it covers. Cheap to clone.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedImage {
    pub id: ImageId,
    pub extent: Extent,
    pub width: u32,
    pub height: u32,
    pub pixels: ImagePixels,
}

impl DecodedImage {
    /// Validate that the buffer length matches `width × height`.
    pub fn new(
        id: ImageId,
        extent: Extent,
        width: u32,
        height: u32,
        pixels: ImagePixels,
    ) -> StreamResult<Self> {
        let px = (width as usize) * (height as usize);
        let ok = match &pixels {
            ImagePixels::Rgba8(b) => b.len() == px * 4,
            ImagePixels::R32Float(s) => s.len() == px,
        };
        if !ok || width == 0 || height == 0 {
            return Err(StreamError::validation(format!(
                "image {id}: pixel buffer does not match {width}x{height}"
            )));
        }
        Ok(Self {
            id,
            extent,
            width,
            height,
            pixels,
        })
    }

    /// Uniformly colored RGBA8 image.
    pub fn solid_rgba(
        id: ImageId,
        extent: Extent,
        width: u32,
        height: u32,
        color: Rgba8,
    ) -> StreamResult<Self> {
        let bytes: Vec<u8> = std::iter::repeat_n(color.to_array(), (width * height) as usize)
            .flatten()
            .collect();
        Self::new(id, extent, width, height, ImagePixels::Rgba8(bytes.into()))
    }

    /// Uniform float image.
    pub fn solid_value(
        id: ImageId,
        extent: Extent,
        width: u32,
        height: u32,
        value: f32,
    ) -> StreamResult<Self> {
        let samples = vec![value; (width * height) as usize];
        Self::new(id, extent, width, height, ImagePixels::R32Float(samples.into()))
    }

    /// Texel index for normalized coordinates (`u` east, `v` south), clamped to the image.
    pub(crate) fn texel_index(&self, u: f64, v: f64) -> usize {
        let x = ((u * f64::from(self.width)).floor() as i64).clamp(0, i64::from(self.width) - 1);
        let y = ((v * f64::from(self.height)).floor() as i64).clamp(0, i64::from(self.height) - 1);
        (y as usize) * (self.width as usize) + (x as usize)
    }
}

/// Result of fetching one image.
pub type FetchResult = Result<DecodedImage, FetchError>;

/// Deferred fetch/decode work for one image. Runs on any thread.
pub type FetchFn = Box<dyn FnOnce() -> FetchResult + Send>;

/// One image the source wants composited for a request, plus how to get it.
pub struct ImageHandle {
    pub id: ImageId,
    pub request: FetchFn,
}

impl ImageHandle {
    pub fn new(id: ImageId, request: impl FnOnce() -> FetchResult + Send + 'static) -> Self {
        Self {
            id,
            request: Box::new(request),
        }
    }
}

impl std::fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageHandle").field("id", &self.id).finish()
    }
}

/// Parameters of [`ImageSource::get_images`].
#[derive(Clone, Debug)]
pub struct ImageRequest<'a> {
    /// Identifier of the requesting target, for source-side bookkeeping.
    pub target_id: String,
    pub extent: &'a Extent,
    pub width: u32,
    pub height: u32,
    /// Aborted when the requesting target no longer needs the images.
    pub signal: &'a CancellationToken,
}

/// Provider of raster images for a layer.
///
/// Which images answer a request is entirely up to the source.
pub trait ImageSource {
    fn crs(&self) -> &Crs;

    /// Overall coverage of the source, if bounded.
    fn extent(&self) -> Option<Extent> {
        None
    }

    /// `true` when [`ImageHandle::request`] is cheap enough to run inline on the update thread.
    fn is_synchronous(&self) -> bool {
        false
    }

    /// One-time preparation, called by [`Layer::initialize`](crate::Layer::initialize).
    fn initialize(&mut self) -> StreamResult<()> {
        Ok(())
    }

    /// `true` when the source may have data inside `extent`.
    fn contains(&self, extent: &Extent) -> bool;

    /// Native margin policy. Returns the padded extent and pixel size for a request, or `None`
    /// to let the layer apply its relative margin.
    fn adjust_extent_and_pixel_size(
        &self,
        _extent: &Extent,
        _width: u32,
        _height: u32,
        _margin_px: u32,
    ) -> Option<(Extent, u32, u32)> {
        None
    }

    fn get_images(&self, request: &ImageRequest<'_>) -> Vec<ImageHandle>;
}

/// Pad `extent` by `margin_px` pixels on every side, growing the pixel size to match.
pub fn pad_by_pixels(extent: &Extent, width: u32, height: u32, margin_px: u32) -> (Extent, u32, u32) {
    if width == 0 || height == 0 {
        return (extent.clone(), width, height);
    }
    let dx = extent.width() / f64::from(width) * f64::from(margin_px);
    let dy = extent.height() / f64::from(height) * f64::from(margin_px);
    (
        extent.with_margin(dx, dy),
        width + 2 * margin_px,
        height + 2 * margin_px,
    )
}

#[cfg(test)]
#[path = "../tests/unit/source/image.rs"]
mod tests;
