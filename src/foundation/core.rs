use crate::foundation::error::{StreamError, StreamResult};

pub use kurbo::{Point, Rect, Vec2};

/// Tolerance used for extent containment tests, relative to the container size.
const CONTAINS_EPSILON: f64 = 1e-9;

/// Coordinate reference system identifier (e.g. `"EPSG:3857"`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Crs(String);

impl Crs {
    /// Wrap a CRS code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The CRS code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Axis-aligned bounding box in a given CRS. `y` grows northward.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Extent {
    crs: Crs,
    rect: Rect,
}

impl Extent {
    /// Create a validated extent from its west/east/south/north bounds.
    pub fn new(crs: Crs, west: f64, east: f64, south: f64, north: f64) -> StreamResult<Self> {
        if ![west, east, south, north].iter().all(|v| v.is_finite()) {
            return Err(StreamError::validation("extent bounds must be finite"));
        }
        if west > east || south > north {
            return Err(StreamError::validation(format!(
                "invalid extent bounds: west={west} east={east} south={south} north={north}"
            )));
        }
        Ok(Self {
            crs,
            rect: Rect::new(west, south, east, north),
        })
    }

    /// Wrap an already normalized rectangle (`x0 <= x1`, `y0 <= y1`).
    pub fn from_rect(crs: Crs, rect: Rect) -> Self {
        Self {
            crs,
            rect: rect.abs(),
        }
    }

    /// CRS of this extent.
    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    /// Underlying rectangle (`x0`=west, `y0`=south, `x1`=east, `y1`=north).
    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn west(&self) -> f64 {
        self.rect.x0
    }

    pub fn east(&self) -> f64 {
        self.rect.x1
    }

    pub fn south(&self) -> f64 {
        self.rect.y0
    }

    pub fn north(&self) -> f64 {
        self.rect.y1
    }

    pub fn width(&self) -> f64 {
        self.rect.width()
    }

    pub fn height(&self) -> f64 {
        self.rect.height()
    }

    pub fn area(&self) -> f64 {
        self.rect.area()
    }

    pub fn center(&self) -> Point {
        self.rect.center()
    }

    /// `true` when `other` lies entirely inside this extent (same CRS only).
    pub fn contains_extent(&self, other: &Extent) -> bool {
        if self.crs != other.crs {
            return false;
        }
        let eps_x = self.width().abs() * CONTAINS_EPSILON;
        let eps_y = self.height().abs() * CONTAINS_EPSILON;
        other.west() >= self.west() - eps_x
            && other.east() <= self.east() + eps_x
            && other.south() >= self.south() - eps_y
            && other.north() <= self.north() + eps_y
    }

    /// `true` when `p` lies inside this extent, borders included.
    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.west() && p.x <= self.east() && p.y >= self.south() && p.y <= self.north()
    }

    /// `true` when both extents share a region of non-zero area (same CRS only).
    pub fn intersects(&self, other: &Extent) -> bool {
        self.intersection(other).is_some()
    }

    /// Overlapping region of non-zero area, if any.
    pub fn intersection(&self, other: &Extent) -> Option<Extent> {
        if self.crs != other.crs {
            return None;
        }
        let r = self.rect.intersect(other.rect);
        if r.width() <= 0.0 || r.height() <= 0.0 {
            return None;
        }
        Some(Self {
            crs: self.crs.clone(),
            rect: r,
        })
    }

    /// Expand every side by `ratio` times the extent dimensions.
    pub fn with_relative_margin(&self, ratio: f64) -> Extent {
        let dx = self.width() * ratio;
        let dy = self.height() * ratio;
        self.with_margin(dx, dy)
    }

    /// Expand west/east by `dx` and south/north by `dy`.
    pub fn with_margin(&self, dx: f64, dy: f64) -> Extent {
        Self {
            crs: self.crs.clone(),
            rect: self.rect.inflate(dx, dy),
        }
    }

    /// Offset/scale that maps `self` into the normalized space of `parent`.
    ///
    /// The origin of the normalized space is the parent's north-west corner.
    pub fn offset_to_parent(&self, parent: &Extent) -> Pitch {
        let pw = parent.width();
        let ph = parent.height();
        if pw <= 0.0 || ph <= 0.0 {
            return Pitch::IDENTITY;
        }
        Pitch {
            offset: Vec2::new(
                (self.west() - parent.west()) / pw,
                (parent.north() - self.north()) / ph,
            ),
            scale: Vec2::new(self.width() / pw, self.height() / ph),
        }
    }
}

/// Offset/scale transform applied to texture coordinates.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pitch {
    /// Normalized offset of the child inside its parent.
    pub offset: Vec2,
    /// Normalized size of the child relative to its parent.
    pub scale: Vec2,
}

impl Pitch {
    pub const IDENTITY: Pitch = Pitch {
        offset: Vec2::ZERO,
        scale: Vec2::new(1.0, 1.0),
    };
}

impl Default for Pitch {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Straight-alpha RGBA8 color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const TRANSPARENT: Rgba8 = Rgba8 {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
