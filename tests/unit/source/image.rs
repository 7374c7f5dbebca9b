use super::*;

fn extent() -> Extent {
    Extent::new(Crs::new("EPSG:3857"), 0.0, 100.0, 0.0, 100.0).unwrap()
}

#[test]
fn rejects_mismatched_buffers() {
    let err = DecodedImage::new(
        ImageId::from_u64(1),
        extent(),
        2,
        2,
        ImagePixels::Rgba8(vec![0u8; 3].into()),
    );
    assert!(err.is_err());
    assert!(DecodedImage::solid_value(ImageId::from_u64(1), extent(), 0, 4, 1.0).is_err());
}

#[test]
fn texel_index_clamps_edges() {
    let img = DecodedImage::solid_value(ImageId::from_u64(4), extent(), 4, 2, 0.0).unwrap();
    assert_eq!(img.texel_index(0.0, 0.0), 0);
    assert_eq!(img.texel_index(1.0, 1.0), 7);
    assert_eq!(img.texel_index(-0.5, 0.6), 4);
}

#[test]
fn pixel_margin_grows_extent_and_size_together() {
    let (padded, w, h) = pad_by_pixels(&extent(), 100, 50, 4);
    assert_eq!((w, h), (108, 58));
    assert_eq!(padded.west(), -4.0);
    assert_eq!(padded.north(), 108.0);
}
