use crate::grid::{Grid, GridSize};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

/// A selected `(row, col)` coordinate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub y: usize,
    pub x: usize,
}

impl CellKey {
    pub const fn new(y: usize, x: usize) -> Self {
        Self { y, x }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.y, self.x)
    }
}

impl FromStr for CellKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ys, xs) = s
            .split_once(',')
            .ok_or_else(|| format!("cell key {s:?} has no separator"))?;
        let y = ys
            .trim()
            .parse::<usize>()
            .map_err(|e| format!("cell key {s:?}: {e}"))?;
        let x = xs
            .trim()
            .parse::<usize>()
            .map_err(|e| format!("cell key {s:?}: {e}"))?;
        Ok(Self { y, x })
    }
}

/// `"y,x"` string form of a coordinate.
pub fn cell_key(y: usize, x: usize) -> String {
    CellKey::new(y, x).to_string()
}

pub fn parse_cell_key(key: &str) -> Option<CellKey> {
    key.parse().ok()
}

/// Tight bounding box of a selection, inclusive on both ends.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionBounds {
    pub min_y: usize,
    pub min_x: usize,
    pub max_y: usize,
    pub max_x: usize,
}

/// Unordered set of selected cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    cells: HashSet<CellKey>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, key: CellKey) -> bool {
        self.cells.contains(&key)
    }

    pub fn insert(&mut self, key: CellKey) -> bool {
        self.cells.insert(key)
    }

    pub fn remove(&mut self, key: CellKey) -> bool {
        self.cells.remove(&key)
    }

    pub fn extend<I: IntoIterator<Item = CellKey>>(&mut self, keys: I) {
        self.cells.extend(keys);
    }

    pub fn subtract<'a, I: IntoIterator<Item = &'a CellKey>>(&mut self, keys: I) {
        for key in keys {
            self.cells.remove(key);
        }
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellKey> + '_ {
        self.cells.iter()
    }

    /// Keys in row-major order, for stable output.
    pub fn sorted(&self) -> Vec<CellKey> {
        let mut keys = self.cells.iter().copied().collect::<Vec<_>>();
        keys.sort();
        keys
    }

    pub fn bounds(&self) -> SelectionBounds {
        bounds(self.cells.iter())
    }

    /// Drop every coordinate outside `size`.
    pub fn clip(&mut self, size: GridSize) {
        self.cells
            .retain(|key| key.y < size.height && key.x < size.width);
    }

    /// Shift every coordinate by `(dx, dy)`, dropping any that leave `size`.
    pub fn translated(&self, dx: isize, dy: isize, size: GridSize) -> Selection {
        let cells = self
            .cells
            .iter()
            .filter_map(|key| {
                let y = key.y as isize + dy;
                let x = key.x as isize + dx;
                size.contains(y, x).then(|| CellKey::new(y as usize, x as usize))
            })
            .collect();
        Selection { cells }
    }
}

impl FromIterator<CellKey> for Selection {
    fn from_iter<T: IntoIterator<Item = CellKey>>(iter: T) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

/// Bounding box of `keys`; `{0,0,0,0}` when there are none.
pub fn bounds<'a, I: IntoIterator<Item = &'a CellKey>>(keys: I) -> SelectionBounds {
    let mut iter = keys.into_iter();
    let Some(first) = iter.next() else {
        return SelectionBounds::default();
    };
    let mut out = SelectionBounds {
        min_y: first.y,
        min_x: first.x,
        max_y: first.y,
        max_x: first.x,
    };
    for key in iter {
        out.min_y = out.min_y.min(key.y);
        out.min_x = out.min_x.min(key.x);
        out.max_y = out.max_y.max(key.y);
        out.max_x = out.max_x.max(key.x);
    }
    out
}

/// Cells 4-connected to `(y, x)` holding exactly the same value, Empty included.
/// Read-only; returns an empty set when the seed is out of bounds.
pub fn same_color_region(grid: &Grid, y: usize, x: usize) -> HashSet<CellKey> {
    let mut region = HashSet::new();
    let Some(target) = grid.get(y, x) else {
        return region;
    };

    let width = grid.width();
    let height = grid.height();
    let mut visited = vec![false; width * height];
    let mut queue = VecDeque::new();
    queue.push_back((y, x));
    visited[y * width + x] = true;

    while let Some((cy, cx)) = queue.pop_front() {
        region.insert(CellKey::new(cy, cx));

        for (dx, dy) in [(-1i32, 0i32), (1, 0), (0, -1), (0, 1)] {
            let nx = cx as i32 + dx;
            let ny = cy as i32 + dy;
            if nx < 0 || nx >= width as i32 || ny < 0 || ny >= height as i32 {
                continue;
            }
            let (nx, ny) = (nx as usize, ny as usize);
            let nidx = ny * width + nx;
            if visited[nidx] {
                continue;
            }
            visited[nidx] = true;
            if grid.get(ny, nx) == Some(target) {
                queue.push_back((ny, nx));
            }
        }
    }

    region
}

/// Clamp a drag offset so the moved bounding box stays inside `size`.
pub fn clamp_move_offset(
    bounds: SelectionBounds,
    size: GridSize,
    dx: isize,
    dy: isize,
) -> (isize, isize) {
    let min_dx = -(bounds.min_x as isize);
    let max_dx = size.width as isize - 1 - bounds.max_x as isize;
    let min_dy = -(bounds.min_y as isize);
    let max_dy = size.height as isize - 1 - bounds.max_y as isize;
    (
        dx.clamp(min_dx, max_dx.max(min_dx)),
        dy.clamp(min_dy, max_dy.max(min_dy)),
    )
}
