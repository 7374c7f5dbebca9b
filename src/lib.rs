//! Terrastream streams raster tiles onto the nodes of a tiled terrain scene.
//!
//! For every visible node a [`Layer`] decides which source images are needed, fetches them
//! synchronously or through a shared [`RequestQueue`], and composites them into a pooled
//! [`RenderTarget`]. Nodes always display something: while data is in flight they inherit a
//! fallback from a loaded ancestor or from the image cache.
//!
//! The host scene plugs in through the [`Node`], [`Material`] and [`Instance`] traits and drives
//! each layer once per tick:
//!
//! - [`Layer::pre_update`]
//! - [`Layer::update`] for every node that should display the layer
//! - [`Layer::post_update`], which also prunes targets of hidden nodes
#![forbid(unsafe_code)]

mod foundation;

pub(crate) mod config;
pub(crate) mod layer;
pub(crate) mod queue;
pub(crate) mod render;
pub(crate) mod scene;
pub(crate) mod source;

pub use crate::foundation::cancel::CancellationToken;
pub use crate::foundation::core::{Crs, Extent, Pitch, Point, Rect, Rgba8, Vec2};
pub use crate::foundation::error::{FetchError, StreamError, StreamResult};
pub use crate::foundation::events::{EventBus, SubscriptionId};
pub use crate::foundation::ids::{ImageId, InstanceId, LayerId, NodeId, OwnerId, SurfaceId};

pub use crate::config::{
    BlendingMode, Colorimetry, ElevationRange, Interpretation, LayerOptions, MarginPolicy, NoData,
    PoolOptions,
};
pub use crate::layer::kind::LayerKind;
pub use crate::layer::progress::OperationCounter;
pub use crate::layer::target::TargetState;
pub use crate::layer::{Layer, LayerBuilder, LayerContext, LayerEvent, TargetInfo};
pub use crate::queue::manual::ManualQueue;
pub use crate::queue::pooled::PooledRequestQueue;
pub use crate::queue::{Deliver, QueuedRequest, RequestQueue, ShouldExecute};
pub use crate::render::compositor::{
    Compositor, CopyRequest, RasterCompositor, RasterCompositorOptions, RenderOutcome,
    RenderRequest,
};
pub use crate::render::surface::{
    LayerTexture, PixelFormat, Raster, RasterData, RenderTarget, SurfaceOptions, Texture,
};
pub use crate::render::surface_pool::{PoolEvent, PoolStats, RenderTargetPool};
pub use crate::scene::{Instance, MaskMode, Material, Node, NodeEvent, NodeListener};
pub use crate::source::memory::MemorySource;
pub use crate::source::{
    DecodedImage, FetchFn, FetchResult, ImageHandle, ImagePixels, ImageRequest, ImageSource,
    pad_by_pixels,
};
