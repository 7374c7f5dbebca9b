use super::*;
use crate::foundation::core::Crs;
use crate::foundation::ids::OwnerId;
use crate::render::surface::SurfaceOptions;

fn ext(w: f64, e: f64, s: f64, n: f64) -> Extent {
    Extent::new(Crs::new("EPSG:3857"), w, e, s, n).unwrap()
}

fn color_target(w: u32, h: u32) -> RenderTarget {
    RenderTarget::allocate(OwnerId::from_u64(1), w, h, SurfaceOptions::color())
}

const RED: Rgba8 = Rgba8 {
    r: 255,
    g: 0,
    b: 0,
    a: 255,
};
const BLUE: Rgba8 = Rgba8 {
    r: 0,
    g: 0,
    b: 255,
    a: 255,
};

#[test]
fn renders_images_by_destination_extent() {
    let mut c = RasterCompositor::default();
    let west = DecodedImage::solid_rgba(ImageId::from_u64(1), ext(0.0, 5.0, 0.0, 10.0), 2, 2, RED)
        .unwrap();
    c.add(west);

    let mut target = color_target(4, 4);
    let extent = ext(0.0, 10.0, 0.0, 10.0);
    let out = c.render(RenderRequest {
        extent: &extent,
        width: 4,
        height: 4,
        target: &mut target,
        image_ids: Some(&[ImageId::from_u64(1)]),
        fallback_mode: false,
    });
    assert!(out.is_last_render);
    let px = target.pixels();
    assert_eq!(px.rgba_at(0, 0), Some(RED));
    assert_eq!(px.rgba_at(1, 3), Some(RED));
    assert_eq!(px.rgba_at(2, 0), Some(Rgba8::TRANSPARENT));
}

#[test]
fn missing_images_or_fallback_mode_are_not_final() {
    let mut c = RasterCompositor::default();
    let extent = ext(0.0, 10.0, 0.0, 10.0);
    c.add(DecodedImage::solid_rgba(ImageId::from_u64(1), extent.clone(), 1, 1, RED).unwrap());

    let mut target = color_target(2, 2);
    let out = c.render(RenderRequest {
        extent: &extent,
        width: 2,
        height: 2,
        target: &mut target,
        image_ids: Some(&[ImageId::from_u64(1), ImageId::from_u64(2)]),
        fallback_mode: false,
    });
    assert!(!out.is_last_render);

    let out = c.render(RenderRequest {
        extent: &extent,
        width: 2,
        height: 2,
        target: &mut target,
        image_ids: None,
        fallback_mode: true,
    });
    assert!(!out.is_last_render);
    assert_eq!(target.pixels().rgba_at(1, 1), Some(RED));
}

#[test]
fn overlapping_images_last_writer_wins() {
    let mut c = RasterCompositor::default();
    let extent = ext(0.0, 10.0, 0.0, 10.0);
    c.add(DecodedImage::solid_rgba(ImageId::from_u64(1), extent.clone(), 1, 1, RED).unwrap());
    c.add(DecodedImage::solid_rgba(ImageId::from_u64(2), extent.clone(), 1, 1, BLUE).unwrap());

    let mut target = color_target(1, 1);
    c.render(RenderRequest {
        extent: &extent,
        width: 1,
        height: 1,
        target: &mut target,
        image_ids: Some(&[ImageId::from_u64(1), ImageId::from_u64(2)]),
        fallback_mode: false,
    });
    assert_eq!(target.pixels().rgba_at(0, 0), Some(BLUE));
}

#[test]
fn elevation_render_applies_no_data() {
    let mut c = RasterCompositor::new(RasterCompositorOptions {
        no_data: NoData {
            value: Some(-9999.0),
            fill: None,
        },
        ..RasterCompositorOptions::default()
    });
    let extent = ext(0.0, 2.0, 0.0, 1.0);
    c.add(
        DecodedImage::new(
            ImageId::from_u64(1),
            extent.clone(),
            2,
            1,
            ImagePixels::R32Float(vec![12.5, -9999.0].into()),
        )
        .unwrap(),
    );
    let mut target =
        RenderTarget::allocate(OwnerId::from_u64(1), 2, 1, SurfaceOptions::elevation());
    c.render(RenderRequest {
        extent: &extent,
        width: 2,
        height: 1,
        target: &mut target,
        image_ids: Some(&[ImageId::from_u64(1)]),
        fallback_mode: false,
    });
    assert_eq!(target.pixels().value_at(0, 0), Some(12.5));
    assert!(target.pixels().value_at(1, 0).unwrap().is_nan());
}

#[test]
fn terrain_rgb_is_decoded_into_elevation() {
    let mut c = RasterCompositor::new(RasterCompositorOptions {
        interpretation: Interpretation::MapboxTerrainRgb,
        ..RasterCompositorOptions::default()
    });
    let extent = ext(0.0, 1.0, 0.0, 1.0);
    // code = 1 * 65536 + 134 * 256 + 160 = 100000 -> 0.0 m
    c.add(
        DecodedImage::solid_rgba(ImageId::from_u64(1), extent.clone(), 1, 1, Rgba8::new(1, 134, 160, 255))
            .unwrap(),
    );
    let mut target =
        RenderTarget::allocate(OwnerId::from_u64(1), 1, 1, SurfaceOptions::elevation());
    c.render(RenderRequest {
        extent: &extent,
        width: 1,
        height: 1,
        target: &mut target,
        image_ids: Some(&[ImageId::from_u64(1)]),
        fallback_mode: false,
    });
    assert!(target.pixels().value_at(0, 0).unwrap().abs() < 1e-2);
}

#[test]
fn copy_remaps_parent_quadrant() {
    let mut c = RasterCompositor::default();
    let parent_extent = ext(0.0, 10.0, 0.0, 10.0);
    let mut parent = color_target(2, 2);
    {
        let mut px = parent.pixels_mut();
        px.set_rgba(0, 0, RED);
        px.set_rgba(1, 0, BLUE);
    }
    let child_extent = ext(5.0, 10.0, 5.0, 10.0);
    let mut child = color_target(2, 2);
    c.copy(CopyRequest {
        source: &parent,
        source_extent: &parent_extent,
        dest: &mut child,
        target_extent: &child_extent,
    });
    let px = child.pixels();
    for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
        assert_eq!(px.rgba_at(x, y), Some(BLUE));
    }
}

#[test]
fn locked_images_survive_eviction() {
    let mut c = RasterCompositor::new(RasterCompositorOptions {
        max_unlocked_images: 1,
        ..RasterCompositorOptions::default()
    });
    let extent = ext(0.0, 1.0, 0.0, 1.0);
    let owner = NodeId::from_u64(7);
    c.add(DecodedImage::solid_rgba(ImageId::from_u64(1), extent.clone(), 1, 1, RED).unwrap());
    c.lock(&[ImageId::from_u64(1)], owner);
    c.add(DecodedImage::solid_rgba(ImageId::from_u64(2), extent.clone(), 1, 1, RED).unwrap());
    c.add(DecodedImage::solid_rgba(ImageId::from_u64(3), extent.clone(), 1, 1, RED).unwrap());

    assert!(c.has(ImageId::from_u64(1)));
    assert!(!c.has(ImageId::from_u64(2)));
    assert!(c.has(ImageId::from_u64(3)));

    c.unlock(&[ImageId::from_u64(1)], owner);
    assert!(!c.is_locked(ImageId::from_u64(1)));
    assert_eq!(c.cached_len(), 1);
}

#[test]
fn evict_within_spares_locked_and_distant_images() {
    let mut c = RasterCompositor::default();
    c.add(DecodedImage::solid_rgba(ImageId::from_u64(1), ext(0.0, 1.0, 0.0, 1.0), 1, 1, RED).unwrap());
    c.add(DecodedImage::solid_rgba(ImageId::from_u64(2), ext(0.0, 1.0, 0.0, 1.0), 1, 1, BLUE).unwrap());
    c.add(DecodedImage::solid_rgba(ImageId::from_u64(3), ext(5.0, 6.0, 5.0, 6.0), 1, 1, BLUE).unwrap());
    c.lock(&[ImageId::from_u64(2)], NodeId::from_u64(9));

    let dropped = c.evict_within(&ext(0.0, 2.0, 0.0, 2.0));
    assert_eq!(dropped, 1);
    assert!(!c.has(ImageId::from_u64(1)));
    assert!(c.has(ImageId::from_u64(2)));
    assert!(c.has(ImageId::from_u64(3)));
}

#[test]
fn short_pixel_buffers_sample_as_empty() {
    let mut c = RasterCompositor::default();
    let truncated = DecodedImage {
        id: ImageId::from_u64(1),
        extent: ext(0.0, 5.0, 0.0, 10.0),
        width: 2,
        height: 2,
        pixels: ImagePixels::Rgba8(RED.to_array().to_vec().into()),
    };
    c.add(truncated);

    let mut target = color_target(4, 4);
    let extent = ext(0.0, 10.0, 0.0, 10.0);
    c.render(RenderRequest {
        extent: &extent,
        width: 4,
        height: 4,
        target: &mut target,
        image_ids: Some(&[ImageId::from_u64(1)]),
        fallback_mode: false,
    });
    let px = target.pixels();
    assert_eq!(px.rgba_at(0, 0), Some(RED));
    assert_eq!(px.rgba_at(1, 1), Some(Rgba8::TRANSPARENT));
}
