use parking_lot::RwLock;
use std::ops::Range;
use std::sync::Arc;

use crate::thumbnail::{RowId, Visibility};

/// Cell width in the grid (thumbnail + side padding)
pub const CELL_WIDTH: f32 = 120.0;
/// Cell height in the grid (thumbnail + padding + file name)
pub const CELL_HEIGHT: f32 = 160.0;
pub const SPACING: f32 = 10.0;
pub const PADDING: f32 = 10.0;

/// Layout of the thumbnail grid and where it is scrolled to.
///
/// Cells are laid out left to right in lines of `columns()`; line `n`
/// starts at `PADDING + n * (CELL_HEIGHT + SPACING)` in content space.
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry {
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub scroll_offset: f32,
    /// Extra pixels above and below the viewport still counted as visible
    pub margin: f32,
    /// Id of cell 0 in the current data set
    row_base: u64,
    row_count: usize,
}

impl GridGeometry {
    pub fn new(viewport_width: f32, viewport_height: f32, margin: f32) -> Self {
        Self {
            viewport_width,
            viewport_height,
            scroll_offset: 0.0,
            margin,
            row_base: 0,
            row_count: 0,
        }
    }

    #[cfg(test)]
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Switch to a new data set of `row_count` cells. Ids of the previous
    /// set are never reused, so late results for them can't land on a new cell.
    pub fn reset(&mut self, row_count: usize) {
        self.row_base += self.row_count as u64;
        self.row_count = row_count;
        self.scroll_offset = 0.0;
    }

    pub fn row_id(&self, index: usize) -> RowId {
        RowId(self.row_base + index as u64)
    }

    /// Cell index of `row_id` in the current data set
    pub fn index_of(&self, row_id: RowId) -> Option<usize> {
        let index = row_id.0.checked_sub(self.row_base)?;
        (index < self.row_count as u64).then_some(index as usize)
    }

    pub fn columns(&self) -> usize {
        let usable = self.viewport_width - 2.0 * PADDING + SPACING;
        ((usable / (CELL_WIDTH + SPACING)).floor() as usize).max(1)
    }

    pub fn lines(&self) -> usize {
        self.row_count.div_ceil(self.columns())
    }

    pub fn line_pitch() -> f32 {
        CELL_HEIGHT + SPACING
    }

    /// The viewport inflated by the margin, in content coordinates
    fn buffered_span(&self) -> (f32, f32) {
        (
            self.scroll_offset - self.margin,
            self.scroll_offset + self.viewport_height + self.margin,
        )
    }

    pub fn is_index_visible(&self, index: usize) -> bool {
        if index >= self.row_count {
            return false;
        }
        let top = PADDING + (index / self.columns()) as f32 * Self::line_pitch();
        let bottom = top + CELL_HEIGHT;
        let (start, end) = self.buffered_span();
        top < end && bottom > start
    }

    /// Grid lines intersecting the buffered viewport
    pub fn visible_lines(&self) -> Range<usize> {
        let (start, end) = self.buffered_span();
        let pitch = Self::line_pitch();

        // Line n is visible when PADDING + n*pitch < end and PADDING + n*pitch + CELL_HEIGHT > start
        let first = ((start - PADDING - CELL_HEIGHT) / pitch).floor() + 1.0;
        let last = ((end - PADDING) / pitch).ceil();
        let first = first.max(0.0) as usize;
        let last = (last.max(0.0) as usize).min(self.lines());
        first.min(last)..last
    }

    /// Cell indices intersecting the buffered viewport
    pub fn visible_indices(&self) -> Range<usize> {
        let lines = self.visible_lines();
        let columns = self.columns();
        (lines.start * columns).min(self.row_count)..(lines.end * columns).min(self.row_count)
    }
}

/// Grid geometry shared between the UI and the thumbnail coordinator
#[derive(Debug, Clone)]
pub struct SharedViewport(Arc<RwLock<GridGeometry>>);

impl SharedViewport {
    pub fn new(geometry: GridGeometry) -> Self {
        Self(Arc::new(RwLock::new(geometry)))
    }

    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, GridGeometry> {
        self.0.read()
    }

    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, GridGeometry> {
        self.0.write()
    }
}

impl Visibility for SharedViewport {
    fn is_row_visible(&self, row_id: RowId) -> bool {
        let geometry = self.0.read();
        geometry
            .index_of(row_id)
            .is_some_and(|index| geometry.is_index_visible(index))
    }
}
