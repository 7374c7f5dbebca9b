use super::*;

#[test]
fn new_rasters_are_cleared_per_format() {
    let c = Raster::new(2, 2, PixelFormat::Rgba8);
    assert_eq!(c.rgba_at(1, 1), Some(Rgba8::TRANSPARENT));

    let e = Raster::new(2, 2, PixelFormat::R32Float);
    assert!(e.value_at(0, 0).unwrap().is_nan());
    assert_eq!(e.rgba_at(0, 0), None);
}

#[test]
fn resize_keeps_format_and_clears() {
    let mut r = Raster::new(2, 2, PixelFormat::Rgba8);
    r.set_rgba(0, 0, Rgba8::new(1, 2, 3, 4));
    r.resize(2, 2);
    assert_eq!(r.rgba_at(0, 0), Some(Rgba8::new(1, 2, 3, 4)));

    r.resize(4, 1);
    assert_eq!((r.width(), r.height()), (4, 1));
    assert_eq!(r.format(), PixelFormat::Rgba8);
    assert_eq!(r.rgba_at(0, 0), Some(Rgba8::TRANSPARENT));
}

#[test]
fn out_of_bounds_access_is_ignored() {
    let mut r = Raster::new(1, 1, PixelFormat::R32Float);
    r.set_value(3, 3, 1.0);
    assert_eq!(r.value_at(3, 3), None);
}

#[test]
fn texture_handles_alias_target_pixels() {
    let mut target = RenderTarget::allocate(OwnerId(1), 2, 2, SurfaceOptions::color());
    let handle = target.texture().clone();
    target
        .pixels_mut()
        .set_rgba(1, 0, Rgba8::new(255, 0, 0, 255));
    assert_eq!(handle.pixels().rgba_at(1, 0), Some(Rgba8::new(255, 0, 0, 255)));
    assert_eq!(handle.id(), target.id());
}
