//! The bead grid: a `height × width` array of cells and the pure operations the
//! tools are built on (resize, flood fill, shifting, bounded translation).
//!
//! Grids are values. `Clone` is a full copy of the cell buffer, which is what the
//! editor and the history store rely on to never alias a committed state.

use crate::color::Rgb;
use crate::error::{PatternError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashMap, HashSet, VecDeque};

/// Serialized form of an empty cell.
pub const TRANSPARENT: &str = "transparent";

/// One bead position.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum Cell {
    #[default]
    Empty,
    Color(Rgb),
}

impl Cell {
    pub fn is_empty(self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn color(self) -> Option<Rgb> {
        match self {
            Cell::Empty => None,
            Cell::Color(rgb) => Some(rgb),
        }
    }

    /// `"transparent"` or lowercase `#rrggbb`.
    pub fn to_token(self) -> String {
        match self {
            Cell::Empty => TRANSPARENT.to_string(),
            Cell::Color(rgb) => rgb.to_hex(),
        }
    }

    pub fn parse(token: &str) -> Result<Self> {
        let trimmed = token.trim();
        if trimmed.eq_ignore_ascii_case(TRANSPARENT) {
            return Ok(Cell::Empty);
        }
        Rgb::from_hex(trimmed)
            .filter(|_| trimmed.starts_with('#'))
            .map(Cell::Color)
            .ok_or_else(|| PatternError::InvalidColor(token.to_string()))
    }
}

impl From<Rgb> for Cell {
    fn from(value: Rgb) -> Self {
        Cell::Color(value)
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_token())
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Cell::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridSize {
    pub width: usize,
    pub height: usize,
}

impl GridSize {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn cell_count(self) -> usize {
        self.width * self.height
    }

    pub fn is_valid(self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Signed bounds check, for coordinates produced by offsets.
    pub fn contains(self, y: isize, x: isize) -> bool {
        y >= 0 && x >= 0 && (y as usize) < self.height && (x as usize) < self.width
    }

    pub fn aspect_ratio(self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }
}

/// Color usage entry for legends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorCount {
    pub color: Rgb,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    size: GridSize,
    cells: Vec<Cell>,
}

impl Grid {
    /// Every cell Empty.
    pub fn empty(size: GridSize) -> Self {
        Self {
            size,
            cells: vec![Cell::Empty; size.cell_count()],
        }
    }

    pub fn filled(size: GridSize, cell: Cell) -> Self {
        Self {
            size,
            cells: vec![cell; size.cell_count()],
        }
    }

    /// Build from row vectors. Every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != width) {
            return Err(PatternError::Validation(format!(
                "row {} has {} cells, expected {}",
                idx,
                row.len(),
                width
            )));
        }
        Ok(Self {
            size: GridSize::new(width, height),
            cells: rows.into_iter().flatten().collect(),
        })
    }

    pub fn size(&self) -> GridSize {
        self.size
    }

    pub fn width(&self) -> usize {
        self.size.width
    }

    pub fn height(&self) -> usize {
        self.size.height
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> + '_ {
        self.cells.chunks(self.size.width.max(1)).take(self.size.height)
    }

    pub fn to_rows(&self) -> Vec<Vec<Cell>> {
        self.rows().map(<[Cell]>::to_vec).collect()
    }

    pub fn get(&self, y: usize, x: usize) -> Option<Cell> {
        if y < self.size.height && x < self.size.width {
            Some(self.cells[y * self.size.width + x])
        } else {
            None
        }
    }

    pub fn get_signed(&self, y: isize, x: isize) -> Option<Cell> {
        if self.size.contains(y, x) {
            self.get(y as usize, x as usize)
        } else {
            None
        }
    }

    /// Write one cell. Returns `false` when out of bounds.
    pub fn set(&mut self, y: usize, x: usize, cell: Cell) -> bool {
        if y < self.size.height && x < self.size.width {
            self.cells[y * self.size.width + x] = cell;
            true
        } else {
            false
        }
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|cell| cell.is_empty())
    }

    /// Top-left aligned copy into a grid of `new_size`; exposed cells are Empty.
    pub fn resize(&self, new_size: GridSize) -> Grid {
        let mut out = Grid::empty(new_size);
        let rows = self.size.height.min(new_size.height);
        let cols = self.size.width.min(new_size.width);
        for y in 0..rows {
            let src = y * self.size.width;
            let dst = y * new_size.width;
            out.cells[dst..dst + cols].copy_from_slice(&self.cells[src..src + cols]);
        }
        out
    }

    /// 4-connected breadth-first fill from `(y, x)`, in place.
    ///
    /// Only cells currently equal to `target` are repainted. Returns the number
    /// of cells changed; zero when `target == replacement` or the start is out
    /// of bounds.
    pub fn flood_fill(&mut self, y: usize, x: usize, target: Cell, replacement: Cell) -> usize {
        if target == replacement {
            return 0;
        }
        let width = self.size.width;
        let height = self.size.height;
        if y >= height || x >= width {
            return 0;
        }

        let mut filled = 0usize;
        let mut queue = VecDeque::new();
        queue.push_back((y, x));

        while let Some((cy, cx)) = queue.pop_front() {
            let idx = cy * width + cx;
            if self.cells[idx] != target {
                continue;
            }
            self.cells[idx] = replacement;
            filled += 1;

            if cy + 1 < height {
                queue.push_back((cy + 1, cx));
            }
            if cy > 0 {
                queue.push_back((cy - 1, cx));
            }
            if cx + 1 < width {
                queue.push_back((cy, cx + 1));
            }
            if cx > 0 {
                queue.push_back((cy, cx - 1));
            }
        }

        filled
    }

    /// Translate contents by `(dx, dy)` cells. Positive `dx` moves content right,
    /// positive `dy` moves it down. Cells whose source falls outside are Empty.
    pub fn shift_by(&self, dx: isize, dy: isize) -> Grid {
        let mut out = Grid::empty(self.size);
        for y in 0..self.size.height {
            let sy = y as isize - dy;
            for x in 0..self.size.width {
                let sx = x as isize - dx;
                if let Some(cell) = self.get_signed(sy, sx) {
                    out.cells[y * self.size.width + x] = cell;
                }
            }
        }
        out
    }

    pub fn shift_up(&self) -> Grid {
        self.shift_by(0, -1)
    }

    pub fn shift_down(&self) -> Grid {
        self.shift_by(0, 1)
    }

    pub fn shift_left(&self) -> Grid {
        self.shift_by(-1, 0)
    }

    pub fn shift_right(&self) -> Grid {
        self.shift_by(1, 0)
    }

    /// Move a subset of cells by `(dx, dy)`.
    ///
    /// All source cells are cleared first, then each non-Empty original color is
    /// written at its destination. Destinations outside the grid are dropped.
    pub fn translate_cells<I>(&self, cells: I, dx: isize, dy: isize) -> Grid
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let mut out = self.clone();
        let mut moved = Vec::new();
        for (y, x) in cells {
            let Some(cell) = self.get(y, x) else {
                continue;
            };
            out.set(y, x, Cell::Empty);
            if !cell.is_empty() {
                moved.push((y as isize + dy, x as isize + dx, cell));
            }
        }
        for (ty, tx, cell) in moved {
            if self.size.contains(ty, tx) {
                out.set(ty as usize, tx as usize, cell);
            }
        }
        out
    }

    /// Stamp every non-Empty cell of `overlay` with its top-left at `(top, left)`.
    /// Out-of-bounds destinations are skipped. Returns the number of cells written.
    pub fn paste(&mut self, overlay: &Grid, top: isize, left: isize) -> usize {
        let mut written = 0;
        for oy in 0..overlay.height() {
            for ox in 0..overlay.width() {
                let cell = overlay.cells[oy * overlay.width() + ox];
                if cell.is_empty() {
                    continue;
                }
                let ty = top + oy as isize;
                let tx = left + ox as isize;
                if self.size.contains(ty, tx) {
                    self.set(ty as usize, tx as usize, cell);
                    written += 1;
                }
            }
        }
        written
    }

    /// Replace every cell equal to `old` with `new`. Returns the count replaced.
    pub fn replace_color(&mut self, old: Cell, new: Cell) -> usize {
        if old == new {
            return 0;
        }
        let mut replaced = 0;
        for cell in self.cells.iter_mut().filter(|cell| **cell == old) {
            *cell = new;
            replaced += 1;
        }
        replaced
    }

    /// Apply a color→color mapping to every colored cell. Returns the count changed.
    pub fn apply_color_map(&mut self, mapping: &HashMap<Rgb, Rgb>) -> usize {
        let mut changed = 0;
        for cell in self.cells.iter_mut() {
            if let Cell::Color(rgb) = *cell {
                if let Some(mapped) = mapping.get(&rgb) {
                    if *mapped != rgb {
                        *cell = Cell::Color(*mapped);
                        changed += 1;
                    }
                }
            }
        }
        changed
    }

    /// Distinct colors in row-major first-seen order.
    pub fn distinct_colors(&self) -> Vec<Rgb> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for rgb in self.cells.iter().filter_map(|cell| cell.color()) {
            if seen.insert(rgb) {
                out.push(rgb);
            }
        }
        out
    }

    /// Non-Empty colors with their counts, most used first.
    pub fn color_counts(&self) -> Vec<ColorCount> {
        let mut order = HashMap::<Rgb, (usize, usize)>::new();
        for rgb in self.cells.iter().filter_map(|cell| cell.color()) {
            let next = order.len();
            order.entry(rgb).or_insert((next, 0)).1 += 1;
        }
        let mut counts = order.into_iter().collect::<Vec<_>>();
        counts.sort_by(|a, b| b.1 .1.cmp(&a.1 .1).then(a.1 .0.cmp(&b.1 .0)));
        counts
            .into_iter()
            .map(|(color, (_, count))| ColorCount { color, count })
            .collect()
    }
}

impl Serialize for Grid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.rows())
    }
}

impl<'de> Deserialize<'de> for Grid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let rows = Vec::<Vec<Cell>>::deserialize(deserializer)?;
        Grid::from_rows(rows).map_err(serde::de::Error::custom)
    }
}

/// All-Empty grid of `size`.
pub fn init_empty(size: GridSize) -> Grid {
    Grid::empty(size)
}
