//! A fixed-size, column-major grid of two-valued pixels.
//!
//! Cells are addressed as `(x, y)` with `x` the column and `y` the row, matching how
//! writer modules address the physical matrix. The pixel type is the device's own
//! encoding, see [`LedDevice::ON`](crate::LedDevice::ON).

use core::ops::{Index, IndexMut};

/// Shared in-memory mirror of the physical display.
///
/// Dimensions are fixed when the grid is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelGrid<P> {
    width: usize,
    height: usize,
    // Column-major: cell (x, y) lives at x * height + y.
    cells: Vec<P>,
}

impl<P: Copy> PixelGrid<P> {
    /// Create a grid with every cell set to `value`.
    #[must_use]
    pub fn filled(width: usize, height: usize, value: P) -> Self {
        Self {
            width,
            height,
            cells: vec![value; width.saturating_mul(height)],
        }
    }

    /// Build a grid from columns, so `columns[x][y]` is the pixel at `(x, y)`.
    ///
    /// Returns `None` if the columns are ragged.
    #[must_use]
    pub fn from_columns(columns: Vec<Vec<P>>) -> Option<Self> {
        let width = columns.len();
        let height = columns.first().map_or(0, Vec::len);
        if columns.iter().any(|column| column.len() != height) {
            return None;
        }
        Some(Self {
            width,
            height,
            cells: columns.into_iter().flatten().collect(),
        })
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// The pixel at `(x, y)`, or `None` when out of bounds.
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<P> {
        self.offset(x, y).and_then(|offset| self.cells.get(offset).copied())
    }

    /// Set the pixel at `(x, y)`. Returns `false` (and changes nothing) when out of bounds.
    pub fn set(&mut self, x: usize, y: usize, value: P) -> bool {
        match self.offset(x, y).and_then(|offset| self.cells.get_mut(offset)) {
            Some(cell) => {
                *cell = value;
                true
            }
            None => false,
        }
    }

    /// Overwrite every cell with `value`.
    pub fn fill(&mut self, value: P) {
        self.cells.iter_mut().for_each(|cell| *cell = value);
    }

    /// Iterate over columns, left to right. Each column runs top to bottom.
    pub fn columns(&self) -> impl Iterator<Item = &[P]> {
        // `max(1)` keeps `chunks` happy for a zero-height grid; such a grid has no cells.
        self.cells.chunks(self.height.max(1))
    }

    /// Copy the grid out as `columns[x][y]`.
    #[must_use]
    pub fn to_columns(&self) -> Vec<Vec<P>> {
        self.columns().map(<[P]>::to_vec).collect()
    }

    /// Iterate over every `(x, y, pixel)` in column-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, P)> + '_ {
        self.columns().enumerate().flat_map(|(x, column)| {
            column
                .iter()
                .enumerate()
                .map(move |(y, &pixel)| (x, y, pixel))
        })
    }

    #[must_use]
    pub const fn same_dimensions(&self, width: usize, height: usize) -> bool {
        self.width == width && self.height == height
    }

    fn offset(&self, x: usize, y: usize) -> Option<usize> {
        if x < self.width && y < self.height {
            x.checked_mul(self.height)?.checked_add(y)
        } else {
            None
        }
    }
}

impl<P: Copy> Index<(usize, usize)> for PixelGrid<P> {
    type Output = P;

    #[expect(
        clippy::indexing_slicing,
        reason = "Bounds checking is the caller's responsibility."
    )]
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        let offset = self.offset(x, y);
        assert!(offset.is_some(), "({x}, {y}) is out of bounds");
        &self.cells[offset.unwrap_or_default()]
    }
}

impl<P: Copy> IndexMut<(usize, usize)> for PixelGrid<P> {
    #[expect(
        clippy::indexing_slicing,
        reason = "Bounds checking is the caller's responsibility."
    )]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Self::Output {
        let offset = self.offset(x, y);
        assert!(offset.is_some(), "({x}, {y}) is out of bounds");
        &mut self.cells[offset.unwrap_or_default()]
    }
}
