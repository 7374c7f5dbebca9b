use std::sync::mpsc;
use std::time::Duration;

use super::*;
use crate::foundation::core::{Crs, Extent, Rgba8};
use crate::foundation::ids::ImageId;
use crate::source::DecodedImage;

fn image(id: u64) -> DecodedImage {
    let extent = Extent::new(Crs::new("EPSG:3857"), 0.0, 1.0, 0.0, 1.0).unwrap();
    DecodedImage::solid_rgba(ImageId::from_u64(id), extent, 1, 1, Rgba8::TRANSPARENT).unwrap()
}

#[test]
fn rejects_zero_concurrency_or_threads() {
    assert!(PooledRequestQueue::new(0, None).is_err());
    assert!(PooledRequestQueue::new(1, Some(0)).is_err());
}

#[test]
fn delivers_results_from_workers() {
    let q = PooledRequestQueue::new(2, Some(2)).unwrap();
    let (tx, rx) = mpsc::channel();
    for id in 1..=4u64 {
        let tx = tx.clone();
        q.enqueue(QueuedRequest {
            id: ImageId::from_u64(id),
            priority: id,
            should_execute: Box::new(|| true),
            request: Box::new(move || Ok(image(id))),
            deliver: Box::new(move |r| {
                let _ = tx.send(r.map(|img| img.id.as_u64()));
            }),
        });
    }

    let mut got = Vec::new();
    while got.len() < 4 {
        q.pump();
        if let Ok(r) = rx.recv_timeout(Duration::from_millis(50)) {
            got.push(r.unwrap());
        }
    }
    got.sort_unstable();
    assert_eq!(got, vec![1, 2, 3, 4]);
    assert_eq!(q.pending_len(), 0);
}
