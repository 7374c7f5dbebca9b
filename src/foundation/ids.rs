use std::sync::atomic::{AtomicU64, Ordering};

use xxhash_rust::xxh3::Xxh3;

use crate::foundation::core::Extent;

const XXH3_SEED: u64 = 0x5f3a_91c4_d2e7_b86b;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(pub(crate) u64);

        impl $name {
            /// Construct from a raw 64-bit value.
            pub fn from_u64(raw: u64) -> Self {
                Self(raw)
            }

            /// Raw 64-bit value.
            pub fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

id_type!(
    /// Stable identity of a scene node.
    NodeId
);
id_type!(
    /// Identity of a layer, unique per process.
    LayerId
);
id_type!(
    /// Identity of the scene instance that owns layers.
    InstanceId
);
id_type!(
    /// Owner of pooled surfaces; surfaces never cross owners.
    OwnerId
);
id_type!(
    /// Identity of a pooled render surface, unique per process.
    SurfaceId
);
id_type!(
    /// Content-addressed identifier of a source image.
    ImageId
);

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

impl LayerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl SurfaceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl ImageId {
    /// Derive an id from the parameters of an image request.
    ///
    /// Identical `(source_key, extent, width, height)` tuples always hash to the same id, which is
    /// what lets the compositor cache and the request queue de-duplicate work.
    pub fn for_request(source_key: &str, extent: &Extent, width: u32, height: u32) -> Self {
        let mut h = Xxh3::with_seed(XXH3_SEED);
        h.update(source_key.as_bytes());
        h.update(&[0]);
        h.update(extent.crs().as_str().as_bytes());
        h.update(&[0]);
        for v in [extent.west(), extent.east(), extent.south(), extent.north()] {
            h.update(&v.to_bits().to_le_bytes());
        }
        h.update(&width.to_le_bytes());
        h.update(&height.to_le_bytes());
        Self(h.digest())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/ids.rs"]
mod tests;
