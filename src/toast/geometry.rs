//! TOAST tile geometry.
//!
//! TOAST unfolds an octahedron inscribed in the sphere onto a square. The
//! square's centre is the north pole, its four corners are the south pole, and
//! the midpoints of its edges are equator points at RA 90° (top), 0° (right),
//! 270° (bottom) and 180° (left). Level 1 splits the square into four tiles,
//! each holding two octahedron faces separated by one diagonal.
//!
//! Deeper levels come from recursive subdivision: edge midpoints and the
//! midpoint of the face-separating diagonal, all taken on the sphere
//! (normalised vector sums). Pixel positions inside a tile follow the same
//! rule, so a pixel at level `n` lands exactly on the corresponding point of
//! the tile one level down.

use std::f64::consts::TAU;

/// Position of a tile in the pyramid.
///
/// Level 0 is the single root tile; level `n` is a `2^n × 2^n` grid with `x`
/// growing to the right and `y` growing downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TilePos {
    pub level: u32,
    pub x: u32,
    pub y: u32,
}

impl TilePos {
    pub fn new(level: u32, x: u32, y: u32) -> Self {
        Self { level, x, y }
    }

    /// Tiles per side at this position's level.
    pub fn side(level: u32) -> u32 {
        1 << level
    }

    /// Tile at row-major `index` within a level.
    pub fn from_index(level: u32, index: u64) -> Self {
        let side = u64::from(Self::side(level));
        Self::new(level, (index % side) as u32, (index / side) as u32)
    }

    pub fn parent(self) -> Option<TilePos> {
        (self.level > 0).then(|| TilePos::new(self.level - 1, self.x / 2, self.y / 2))
    }

    /// Children in the order upper-left, upper-right, lower-left, lower-right.
    pub fn children(self) -> [TilePos; 4] {
        let (level, x, y) = (self.level + 1, self.x * 2, self.y * 2);
        [
            TilePos::new(level, x, y),
            TilePos::new(level, x + 1, y),
            TilePos::new(level, x, y + 1),
            TilePos::new(level, x + 1, y + 1),
        ]
    }
}

/// A point on the unit sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Unit vector for longitude/latitude in radians.
    pub fn from_lonlat(lon: f64, lat: f64) -> Self {
        let (sin_lon, cos_lon) = lon.sin_cos();
        let (sin_lat, cos_lat) = lat.sin_cos();
        Self {
            x: cos_lat * cos_lon,
            y: cos_lat * sin_lon,
            z: sin_lat,
        }
    }

    /// Longitude in `[0, 2π)` and latitude in `[-π/2, π/2]`.
    pub fn to_lonlat(self) -> (f64, f64) {
        let lon = self.y.atan2(self.x).rem_euclid(TAU);
        let lat = self.z.clamp(-1.0, 1.0).asin();
        (lon, lat)
    }

    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    fn plus(self, other: Vec3) -> Vec3 {
        Vec3 {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }

    fn normalized(self) -> Vec3 {
        let len = self.length();
        Vec3 {
            x: self.x / len,
            y: self.y / len,
            z: self.z / len,
        }
    }

    /// Great-circle midpoint of two non-antipodal points.
    pub fn midpoint(self, other: Vec3) -> Vec3 {
        self.plus(other).normalized()
    }

    /// Angular distance in radians.
    pub fn angle_to(self, other: Vec3) -> f64 {
        let dot = self.x * other.x + self.y * other.y + self.z * other.z;
        dot.clamp(-1.0, 1.0).acos()
    }
}

/// Index of each corner in [`Tile::corners`].
const UL: usize = 0;
const UR: usize = 1;
const LR: usize = 2;
const LL: usize = 3;

/// Geometry of one TOAST tile at level 1 or deeper.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub pos: TilePos,
    /// Corner points: upper-left, upper-right, lower-right, lower-left.
    pub corners: [Vec3; 4],
    /// True when the lower-left → upper-right diagonal is the octahedron edge.
    pub increasing: bool,
}

fn deg(lon: f64, lat: f64) -> Vec3 {
    Vec3::from_lonlat(lon.to_radians(), lat.to_radians())
}

/// The four level-1 tiles in row-major order.
pub fn level1_tiles() -> [Tile; 4] {
    let south = deg(0.0, -90.0);
    let north = deg(0.0, 90.0);
    let (ra0, ra90, ra180, ra270) = (
        deg(0.0, 0.0),
        deg(90.0, 0.0),
        deg(180.0, 0.0),
        deg(270.0, 0.0),
    );
    [
        Tile {
            pos: TilePos::new(1, 0, 0),
            corners: [south, ra90, north, ra180],
            increasing: true,
        },
        Tile {
            pos: TilePos::new(1, 1, 0),
            corners: [ra90, south, ra0, north],
            increasing: false,
        },
        Tile {
            pos: TilePos::new(1, 0, 1),
            corners: [ra180, north, ra270, south],
            increasing: false,
        },
        Tile {
            pos: TilePos::new(1, 1, 1),
            corners: [north, ra0, south, ra270],
            increasing: true,
        },
    ]
}

impl Tile {
    /// Geometry of the tile at `pos`. `None` for the root, which has no
    /// quadrilateral geometry of its own.
    pub fn at(pos: TilePos) -> Option<Tile> {
        if pos.level == 0 {
            return None;
        }
        let shift = pos.level - 1;
        let root_index = ((pos.y >> shift) * 2 + (pos.x >> shift)) as usize;
        let mut tile = level1_tiles()[root_index];
        for bit in (0..shift).rev() {
            let child = (((pos.y >> bit) & 1) * 2 + ((pos.x >> bit) & 1)) as usize;
            tile = tile.subdivide()[child];
        }
        Some(tile)
    }

    fn center(&self) -> Vec3 {
        let c = &self.corners;
        if self.increasing {
            c[LL].midpoint(c[UR])
        } else {
            c[UL].midpoint(c[LR])
        }
    }

    /// Split into four children, ordered like [`TilePos::children`].
    pub fn subdivide(&self) -> [Tile; 4] {
        let [ul, ur, lr, ll] = self.corners;
        let top = ul.midpoint(ur);
        let right = ur.midpoint(lr);
        let bottom = lr.midpoint(ll);
        let left = ll.midpoint(ul);
        let center = self.center();
        let [p_ul, p_ur, p_ll, p_lr] = self.pos.children();
        let child = |pos, corners| Tile {
            pos,
            corners,
            increasing: self.increasing,
        };
        [
            child(p_ul, [ul, top, center, left]),
            child(p_ur, [top, ur, right, center]),
            child(p_ll, [left, center, bottom, ll]),
            child(p_lr, [center, right, lr, bottom]),
        ]
    }

    /// Corner points of a `cells × cells` pixel grid, row-major, with
    /// `(cells + 1)²` entries. `cells` must be a power of two.
    pub fn corner_grid(&self, cells: u32) -> Vec<Vec3> {
        let mut n = 1usize;
        let mut grid = vec![
            self.corners[UL],
            self.corners[UR],
            self.corners[LL],
            self.corners[LR],
        ];
        while n < cells as usize {
            let m = n * 2;
            let old_stride = n + 1;
            let new_stride = m + 1;
            let mut next = vec![self.corners[UL]; new_stride * new_stride];
            for j in 0..=n {
                for i in 0..=n {
                    let p = grid[j * old_stride + i];
                    next[2 * j * new_stride + 2 * i] = p;
                    if i < n {
                        let right = grid[j * old_stride + i + 1];
                        next[2 * j * new_stride + 2 * i + 1] = p.midpoint(right);
                    }
                    if j < n {
                        let below = grid[(j + 1) * old_stride + i];
                        next[(2 * j + 1) * new_stride + 2 * i] = p.midpoint(below);
                    }
                    if i < n && j < n {
                        let ur = grid[j * old_stride + i + 1];
                        let ll = grid[(j + 1) * old_stride + i];
                        let lr = grid[(j + 1) * old_stride + i + 1];
                        next[(2 * j + 1) * new_stride + 2 * i + 1] = if self.increasing {
                            ll.midpoint(ur)
                        } else {
                            p.midpoint(lr)
                        };
                    }
                }
            }
            grid = next;
            n = m;
        }
        grid
    }

    /// Longitude/latitude of every pixel centre of a `size × size` rendering,
    /// row-major. `size` must be a power of two.
    pub fn pixel_lonlats(&self, size: u32) -> Vec<(f64, f64)> {
        let cells = size as usize;
        let stride = cells + 1;
        let grid = self.corner_grid(size);
        let mut out = Vec::with_capacity(cells * cells);
        for j in 0..cells {
            for i in 0..cells {
                let centre = grid[j * stride + i]
                    .plus(grid[j * stride + i + 1])
                    .plus(grid[(j + 1) * stride + i])
                    .plus(grid[(j + 1) * stride + i + 1])
                    .normalized();
                out.push(centre.to_lonlat());
            }
        }
        out
    }
}
