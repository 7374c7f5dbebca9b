use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::{Interpretation, NoData};
use crate::foundation::core::{Extent, Rgba8};
use crate::foundation::ids::{ImageId, NodeId};
use crate::render::surface::{PixelFormat, Raster, RenderTarget};
use crate::source::{DecodedImage, ImagePixels};

/// Parameters of [`Compositor::render`].
pub struct RenderRequest<'a> {
    /// Destination extent covered by the whole target surface.
    pub extent: &'a Extent,
    pub width: u32,
    pub height: u32,
    pub target: &'a mut RenderTarget,
    /// Images to draw, in draw order. `None` draws every cached image intersecting `extent`.
    pub image_ids: Option<&'a [ImageId]>,
    /// Last-resort render from whatever is cached; never reported as final.
    pub fallback_mode: bool,
}

/// What [`Compositor::render`] reports back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderOutcome {
    /// Every requested image contributed, so no further render is needed for this extent.
    pub is_last_render: bool,
}

/// Parameters of [`Compositor::copy`].
pub struct CopyRequest<'a> {
    pub source: &'a RenderTarget,
    pub source_extent: &'a Extent,
    pub dest: &'a mut RenderTarget,
    pub target_extent: &'a Extent,
}

/// Paints source images into render surfaces and caches them between renders.
///
/// Overlapping images are drawn in the order given; the last writer wins.
pub trait Compositor {
    /// Cache a decoded image. Adding an id that is already cached is a no-op.
    fn add(&mut self, image: DecodedImage);

    fn has(&self, id: ImageId) -> bool;

    fn render(&mut self, request: RenderRequest<'_>) -> RenderOutcome;

    /// Extent-aware blit of one surface into another.
    fn copy(&mut self, request: CopyRequest<'_>);

    /// Pin images so they survive eviction while `owner` displays them.
    fn lock(&mut self, ids: &[ImageId], owner: NodeId);

    fn unlock(&mut self, ids: &[ImageId], owner: NodeId);

    fn cached_len(&self) -> usize;

    /// Drop unlocked images intersecting `extent`. Returns how many were dropped.
    fn evict_within(&mut self, extent: &Extent) -> usize;

    /// Drop every cached image, locked or not.
    fn dispose(&mut self);
}

/// Options of [`RasterCompositor`].
#[derive(Clone, Debug, PartialEq)]
pub struct RasterCompositorOptions {
    pub background: Rgba8,
    pub no_data: NoData,
    pub interpretation: Interpretation,
    /// Unlocked images kept around for reuse; older ones are evicted first.
    pub max_unlocked_images: usize,
}

impl Default for RasterCompositorOptions {
    fn default() -> Self {
        Self {
            background: Rgba8::TRANSPARENT,
            no_data: NoData::default(),
            interpretation: Interpretation::Raw,
            max_unlocked_images: 256,
        }
    }
}

/// CPU implementation of [`Compositor`] drawing into [`Raster`] storage with nearest sampling.
pub struct RasterCompositor {
    opts: RasterCompositorOptions,
    images: HashMap<ImageId, DecodedImage>,
    insertion_order: VecDeque<ImageId>,
    locks: HashMap<ImageId, HashSet<NodeId>>,
}

enum Sample {
    Color(Rgba8),
    Value(f32),
}

impl RasterCompositor {
    pub fn new(opts: RasterCompositorOptions) -> Self {
        Self {
            opts,
            images: HashMap::new(),
            insertion_order: VecDeque::new(),
            locks: HashMap::new(),
        }
    }

    pub fn is_locked(&self, id: ImageId) -> bool {
        self.locks.get(&id).is_some_and(|owners| !owners.is_empty())
    }

    fn evict_unlocked(&mut self) {
        let unlocked = self
            .insertion_order
            .iter()
            .filter(|id| !self.is_locked(**id))
            .count();
        let mut excess = unlocked.saturating_sub(self.opts.max_unlocked_images);
        if excess == 0 {
            return;
        }
        let mut kept = VecDeque::with_capacity(self.insertion_order.len());
        while let Some(id) = self.insertion_order.pop_front() {
            if excess > 0 && !self.is_locked(id) {
                self.images.remove(&id);
                excess -= 1;
                tracing::trace!(image = %id, "evicted cached image");
            } else {
                kept.push_back(id);
            }
        }
        self.insertion_order = kept;
    }

    fn sample(&self, image: &DecodedImage, u: f64, v: f64) -> Option<Sample> {
        let i = image.texel_index(u, v);
        match &image.pixels {
            ImagePixels::Rgba8(bytes) => {
                let [r, g, b, a] = *bytes.get(i * 4..i * 4 + 4)?.first_chunk::<4>()?;
                let c = Rgba8::new(r, g, b, a);
                if c.a == 0 {
                    return None;
                }
                Some(Sample::Color(c))
            }
            ImagePixels::R32Float(samples) => {
                // Images built by hand may carry short buffers.
                let v = *samples.get(i)?;
                let missing = !v.is_finite() || self.opts.no_data.value.is_some_and(|nd| nd == v);
                if missing {
                    return self.opts.no_data.fill.map(Sample::Value);
                }
                Some(Sample::Value(v))
            }
        }
    }

    fn write(&self, raster: &mut Raster, x: u32, y: u32, sample: Sample) {
        match (raster.format(), sample) {
            (PixelFormat::Rgba8, Sample::Color(c)) => {
                let out = if c.a == 255 {
                    c
                } else {
                    let below = raster.rgba_at(x, y).unwrap_or(Rgba8::TRANSPARENT);
                    blend_over(c, below)
                };
                raster.set_rgba(x, y, out);
            }
            (PixelFormat::Rgba8, Sample::Value(v)) => {
                let t = match self.opts.interpretation {
                    Interpretation::ScaleToMinMax { min, max } => (v - min) / (max - min),
                    _ => v,
                };
                let g = (t.clamp(0.0, 1.0) * 255.0).round() as u8;
                raster.set_rgba(x, y, Rgba8::new(g, g, g, 255));
            }
            (PixelFormat::R32Float, Sample::Value(v)) => raster.set_value(x, y, v),
            (PixelFormat::R32Float, Sample::Color(c)) => {
                let v = match self.opts.interpretation {
                    Interpretation::MapboxTerrainRgb => {
                        let code = u32::from(c.r) * 65536 + u32::from(c.g) * 256 + u32::from(c.b);
                        -10000.0 + code as f32 * 0.1
                    }
                    _ => f32::from(c.r),
                };
                raster.set_value(x, y, v);
            }
        }
    }

    fn clear(&self, raster: &mut Raster) {
        raster.clear(self.opts.background, self.opts.no_data.fill.unwrap_or(f32::NAN));
    }
}

impl Default for RasterCompositor {
    fn default() -> Self {
        Self::new(RasterCompositorOptions::default())
    }
}

fn blend_over(src: Rgba8, dst: Rgba8) -> Rgba8 {
    let sa = f32::from(src.a) / 255.0;
    let da = f32::from(dst.a) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return Rgba8::TRANSPARENT;
    }
    let ch = |s: u8, d: u8| {
        let v = (f32::from(s) * sa + f32::from(d) * da * (1.0 - sa)) / out_a;
        v.round().clamp(0.0, 255.0) as u8
    };
    Rgba8::new(
        ch(src.r, dst.r),
        ch(src.g, dst.g),
        ch(src.b, dst.b),
        (out_a * 255.0).round() as u8,
    )
}

/// World coordinates of the center of pixel `(x, y)` of a `w × h` grid laid over `extent`.
fn pixel_center(extent: &Extent, w: u32, h: u32, x: u32, y: u32) -> (f64, f64) {
    let wx = extent.west() + (f64::from(x) + 0.5) / f64::from(w) * extent.width();
    let wy = extent.north() - (f64::from(y) + 0.5) / f64::from(h) * extent.height();
    (wx, wy)
}

/// Normalized coordinates of a world position inside `extent`, if it falls inside.
fn uv_in(extent: &Extent, wx: f64, wy: f64) -> Option<(f64, f64)> {
    if extent.width() <= 0.0 || extent.height() <= 0.0 {
        return None;
    }
    let u = (wx - extent.west()) / extent.width();
    let v = (extent.north() - wy) / extent.height();
    ((0.0..1.0).contains(&u) && (0.0..1.0).contains(&v)).then_some((u, v))
}

impl Compositor for RasterCompositor {
    fn add(&mut self, image: DecodedImage) {
        if self.images.contains_key(&image.id) {
            return;
        }
        self.insertion_order.push_back(image.id);
        self.images.insert(image.id, image);
        self.evict_unlocked();
    }

    fn has(&self, id: ImageId) -> bool {
        self.images.contains_key(&id)
    }

    fn render(&mut self, request: RenderRequest<'_>) -> RenderOutcome {
        let RenderRequest {
            extent,
            width,
            height,
            target,
            image_ids,
            fallback_mode,
        } = request;

        let ids: Vec<ImageId> = match image_ids {
            Some(ids) => ids.to_vec(),
            None => self
                .insertion_order
                .iter()
                .copied()
                .filter(|id| self.images.get(id).is_some_and(|i| i.extent.intersects(extent)))
                .collect(),
        };
        let all_present = ids.iter().all(|id| self.images.contains_key(id));

        target.resize(width, height);
        let mut raster = target.pixels_mut();
        self.clear(&mut raster);

        for id in &ids {
            let Some(image) = self.images.get(id) else {
                continue;
            };
            let Some(overlap) = image.extent.intersection(extent) else {
                continue;
            };
            for y in 0..height {
                for x in 0..width {
                    let (wx, wy) = pixel_center(extent, width, height, x, y);
                    if !overlap.contains_point(kurbo::Point::new(wx, wy)) {
                        continue;
                    }
                    let Some((u, v)) = uv_in(&image.extent, wx, wy) else {
                        continue;
                    };
                    if let Some(s) = self.sample(image, u, v) {
                        self.write(&mut raster, x, y, s);
                    }
                }
            }
        }

        RenderOutcome {
            is_last_render: !fallback_mode && all_present,
        }
    }

    fn copy(&mut self, request: CopyRequest<'_>) {
        let CopyRequest {
            source,
            source_extent,
            dest,
            target_extent,
        } = request;
        if source.options().format != dest.options().format {
            tracing::warn!(
                source = %source.id(),
                dest = %dest.id(),
                "copy between surfaces of different formats ignored"
            );
            return;
        }
        let src = source.pixels();
        let (sw, sh) = (src.width(), src.height());
        if sw == 0 || sh == 0 {
            return;
        }
        let mut dst = dest.pixels_mut();
        let (dw, dh) = (dst.width(), dst.height());
        for y in 0..dh {
            for x in 0..dw {
                let (wx, wy) = pixel_center(target_extent, dw, dh, x, y);
                let Some((u, v)) = uv_in(source_extent, wx, wy) else {
                    continue;
                };
                let sx = ((u * f64::from(sw)) as u32).min(sw - 1);
                let sy = ((v * f64::from(sh)) as u32).min(sh - 1);
                match src.format() {
                    PixelFormat::Rgba8 => {
                        if let Some(c) = src.rgba_at(sx, sy) {
                            dst.set_rgba(x, y, c);
                        }
                    }
                    PixelFormat::R32Float => {
                        if let Some(v) = src.value_at(sx, sy) {
                            dst.set_value(x, y, v);
                        }
                    }
                }
            }
        }
    }

    fn lock(&mut self, ids: &[ImageId], owner: NodeId) {
        for id in ids {
            self.locks.entry(*id).or_default().insert(owner);
        }
    }

    fn unlock(&mut self, ids: &[ImageId], owner: NodeId) {
        for id in ids {
            if let Some(owners) = self.locks.get_mut(id) {
                owners.remove(&owner);
                if owners.is_empty() {
                    self.locks.remove(id);
                }
            }
        }
        self.evict_unlocked();
    }

    fn cached_len(&self) -> usize {
        self.images.len()
    }

    fn evict_within(&mut self, extent: &Extent) -> usize {
        let before = self.images.len();
        let doomed: Vec<ImageId> = self
            .images
            .values()
            .filter(|img| !self.is_locked(img.id) && img.extent.intersects(extent))
            .map(|img| img.id)
            .collect();
        for id in &doomed {
            self.images.remove(id);
        }
        self.insertion_order.retain(|id| !doomed.contains(id));
        before - self.images.len()
    }

    fn dispose(&mut self) {
        self.images.clear();
        self.insertion_order.clear();
        self.locks.clear();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/compositor.rs"]
mod tests;
