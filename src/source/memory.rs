use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::foundation::core::{Crs, Extent};
use crate::foundation::error::{FetchError, StreamResult};
use crate::foundation::ids::ImageId;
use crate::source::{
    DecodedImage, ImageHandle, ImagePixels, ImageRequest, ImageSource, pad_by_pixels,
};

/// Source serving already-decoded images held in memory.
///
/// Every image intersecting a request is returned. Useful for static overlays, for tests, and as
/// the reference implementation of [`ImageSource`].
pub struct MemorySource {
    key: String,
    crs: Crs,
    images: Vec<DecodedImage>,
    synchronous: bool,
    native_margin: bool,
    fetches: Arc<AtomicUsize>,
    failure: Option<String>,
}

impl MemorySource {
    pub fn new(crs: Crs) -> Self {
        Self {
            key: String::from("memory"),
            crs,
            images: Vec::new(),
            synchronous: true,
            native_margin: false,
            fetches: Arc::new(AtomicUsize::new(0)),
            failure: None,
        }
    }

    pub fn with_image(mut self, image: DecodedImage) -> Self {
        self.images.push(image);
        self
    }

    /// Name mixed into the ids of images added with [`MemorySource::with_pixels`].
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Add raw pixels covering `extent`. The id is derived from the source key and the image
    /// geometry, so the same tile added to two sources with one key is cached once.
    pub fn with_pixels(
        self,
        extent: Extent,
        width: u32,
        height: u32,
        pixels: ImagePixels,
    ) -> StreamResult<Self> {
        let id = ImageId::for_request(&self.key, &extent, width, height);
        let image = DecodedImage::new(id, extent, width, height, pixels)?;
        Ok(self.with_image(image))
    }

    /// Mark fetches as asynchronous so they are routed through the request queue.
    pub fn asynchronous(mut self) -> Self {
        self.synchronous = false;
        self
    }

    /// Pad requests by whole pixels instead of the layer's relative margin.
    pub fn with_native_margin(mut self) -> Self {
        self.native_margin = true;
        self
    }

    /// Make every fetch fail with `msg` (simulates a broken remote).
    pub fn failing(mut self, msg: impl Into<String>) -> Self {
        self.failure = Some(msg.into());
        self
    }

    /// Number of fetch closures that actually ran.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Shared counter, readable after the source moved into a layer.
    pub fn fetch_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.fetches)
    }
}

impl ImageSource for MemorySource {
    fn crs(&self) -> &Crs {
        &self.crs
    }

    fn extent(&self) -> Option<Extent> {
        let mut it = self.images.iter().filter(|i| i.extent.crs() == &self.crs);
        let first = it.next()?.extent.rect();
        let union = it.fold(first, |acc, img| acc.union(img.extent.rect()));
        Some(Extent::from_rect(self.crs.clone(), union))
    }

    fn is_synchronous(&self) -> bool {
        self.synchronous
    }

    fn contains(&self, extent: &Extent) -> bool {
        self.images.iter().any(|img| img.extent.intersects(extent))
    }

    fn adjust_extent_and_pixel_size(
        &self,
        extent: &Extent,
        width: u32,
        height: u32,
        margin_px: u32,
    ) -> Option<(Extent, u32, u32)> {
        self.native_margin
            .then(|| pad_by_pixels(extent, width, height, margin_px))
    }

    fn get_images(&self, request: &ImageRequest<'_>) -> Vec<ImageHandle> {
        self.images
            .iter()
            .filter(|img| img.extent.intersects(request.extent))
            .map(|img| {
                let image = img.clone();
                let signal = request.signal.clone();
                let fetches = Arc::clone(&self.fetches);
                let failure = self.failure.clone();
                ImageHandle::new(img.id, move || {
                    signal.check()?;
                    fetches.fetch_add(1, Ordering::Relaxed);
                    match failure {
                        Some(msg) => Err(FetchError::Failed(msg)),
                        None => Ok(image),
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/source/memory.rs"]
mod tests;
