/// A cell of the 3D routing grid. `z` is the 0-based layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl GridCoord {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    pub fn planar(x: u32, y: u32) -> Self {
        Self { x, y, z: 0 }
    }

    #[inline(always)]
    pub fn same_xy(&self, other: &GridCoord) -> bool {
        self.x == other.x && self.y == other.y
    }

    #[inline(always)]
    pub fn manhattan(&self, other: &GridCoord) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// True when the two cells differ by exactly one unit in exactly one of x, y or z.
    pub fn is_adjacent(&self, other: &GridCoord) -> bool {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y) + (self.z.abs_diff(other.z) as u32)
            == 1
    }
}
