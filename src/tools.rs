//! Gesture handling, one handler per tool.
//!
//! Handlers see the current grid read-only and hand back an [`Outcome`]; the
//! editor owns committing. Select is the only tool that edits editor state
//! directly (the selection), since toggling membership is not a grid change.

use crate::color::Rgb;
use crate::error::Result;
use crate::grid::{Cell, Grid, GridSize};
use crate::selection::{clamp_move_offset, same_color_region, CellKey, Selection};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolKind {
    Paint,
    Erase,
    Eyedropper,
    Bucket,
    Select,
    Text,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectMode {
    #[default]
    Single,
    Region,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Remove from the selection instead of adding.
    pub subtract: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Idle,
    /// A changed grid to install and push to history.
    Commit(Grid),
    /// Adopt this color and switch to painting.
    PickColor(Rgb),
}

pub struct ToolContext<'a> {
    pub grid: &'a Grid,
    pub selection: &'a mut Selection,
    pub color: Rgb,
    pub modifiers: Modifiers,
}

pub trait Tool {
    fn pointer_down(&mut self, ctx: &mut ToolContext<'_>, at: CellKey) -> Outcome;

    fn pointer_move(&mut self, _ctx: &mut ToolContext<'_>, _at: CellKey) -> Outcome {
        Outcome::Idle
    }

    fn pointer_up(&mut self, _ctx: &mut ToolContext<'_>) -> Outcome {
        Outcome::Idle
    }
}

fn commit_if_changed(before: &Grid, after: Grid) -> Outcome {
    if after == *before {
        Outcome::Idle
    } else {
        Outcome::Commit(after)
    }
}

/// Paint or erase; a drag commits once per newly touched cell.
#[derive(Debug, Clone, Default)]
pub struct BrushTool {
    erase: bool,
    last: Option<CellKey>,
}

impl BrushTool {
    pub fn paint() -> Self {
        Self::default()
    }

    pub fn eraser() -> Self {
        Self {
            erase: true,
            last: None,
        }
    }

    fn stroke(&mut self, ctx: &ToolContext<'_>, at: CellKey) -> Outcome {
        self.last = Some(at);
        let value = if self.erase {
            Cell::Empty
        } else {
            Cell::Color(ctx.color)
        };
        match ctx.grid.get(at.y, at.x) {
            Some(current) if current != value => {
                let mut next = ctx.grid.clone();
                next.set(at.y, at.x, value);
                Outcome::Commit(next)
            }
            _ => Outcome::Idle,
        }
    }
}

impl Tool for BrushTool {
    fn pointer_down(&mut self, ctx: &mut ToolContext<'_>, at: CellKey) -> Outcome {
        self.stroke(ctx, at)
    }

    fn pointer_move(&mut self, ctx: &mut ToolContext<'_>, at: CellKey) -> Outcome {
        match self.last {
            Some(last) if last != at => self.stroke(ctx, at),
            _ => Outcome::Idle,
        }
    }

    fn pointer_up(&mut self, _ctx: &mut ToolContext<'_>) -> Outcome {
        self.last = None;
        Outcome::Idle
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EyedropperTool;

impl Tool for EyedropperTool {
    fn pointer_down(&mut self, ctx: &mut ToolContext<'_>, at: CellKey) -> Outcome {
        match ctx.grid.get(at.y, at.x).and_then(Cell::color) {
            Some(rgb) => Outcome::PickColor(rgb),
            None => Outcome::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BucketTool;

impl Tool for BucketTool {
    fn pointer_down(&mut self, ctx: &mut ToolContext<'_>, at: CellKey) -> Outcome {
        let Some(target) = ctx.grid.get(at.y, at.x) else {
            return Outcome::Idle;
        };
        let mut next = ctx.grid.clone();
        if next.flood_fill(at.y, at.x, target, Cell::Color(ctx.color)) == 0 {
            return Outcome::Idle;
        }
        Outcome::Commit(next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MoveDrag {
    origin: CellKey,
    offset: (isize, isize),
}

/// Toggle cells or same-color regions; drag a selected cell to move the selection.
#[derive(Debug, Clone, Default)]
pub struct SelectTool {
    pub mode: SelectMode,
    drag: Option<MoveDrag>,
}

impl SelectTool {
    pub fn new(mode: SelectMode) -> Self {
        Self { mode, drag: None }
    }

    /// Clamped `(dx, dy)` of a move in progress.
    pub fn move_preview(&self) -> Option<(isize, isize)> {
        self.drag.map(|drag| drag.offset)
    }
}

impl Tool for SelectTool {
    fn pointer_down(&mut self, ctx: &mut ToolContext<'_>, at: CellKey) -> Outcome {
        if ctx.grid.get(at.y, at.x).is_none() {
            return Outcome::Idle;
        }
        if !ctx.modifiers.subtract && ctx.selection.contains(at) {
            self.drag = Some(MoveDrag {
                origin: at,
                offset: (0, 0),
            });
            return Outcome::Idle;
        }

        match (self.mode, ctx.modifiers.subtract) {
            (SelectMode::Single, false) => {
                ctx.selection.insert(at);
            }
            (SelectMode::Single, true) => {
                ctx.selection.remove(at);
            }
            (SelectMode::Region, false) => {
                ctx.selection.extend(same_color_region(ctx.grid, at.y, at.x));
            }
            (SelectMode::Region, true) => {
                let region = same_color_region(ctx.grid, at.y, at.x);
                ctx.selection.subtract(region.iter());
            }
        }
        Outcome::Idle
    }

    fn pointer_move(&mut self, ctx: &mut ToolContext<'_>, at: CellKey) -> Outcome {
        if let Some(drag) = self.drag.as_mut() {
            let dx = at.x as isize - drag.origin.x as isize;
            let dy = at.y as isize - drag.origin.y as isize;
            drag.offset = clamp_move_offset(ctx.selection.bounds(), ctx.grid.size(), dx, dy);
        }
        Outcome::Idle
    }

    fn pointer_up(&mut self, ctx: &mut ToolContext<'_>) -> Outcome {
        let Some(drag) = self.drag.take() else {
            return Outcome::Idle;
        };
        let (dx, dy) = drag.offset;
        if ctx.selection.is_empty() || (dx, dy) == (0, 0) {
            return Outcome::Idle;
        }
        let sources = ctx.selection.iter().map(|key| (key.y, key.x)).collect::<Vec<_>>();
        let next = ctx.grid.translate_cells(sources, dx, dy);
        // The selection only follows a move that changes the grid, so undo restores both.
        if next == *ctx.grid {
            return Outcome::Idle;
        }
        *ctx.selection = ctx.selection.translated(dx, dy, ctx.grid.size());
        Outcome::Commit(next)
    }
}

/// Floating stamp that follows the pointer and commits on click.
#[derive(Debug, Clone, Default)]
pub struct TextTool {
    overlay: Option<Grid>,
    anchor: (isize, isize),
}

impl TextTool {
    pub fn set_overlay(&mut self, overlay: Grid) {
        self.overlay = Some(overlay);
        self.anchor = (0, 0);
    }

    pub fn clear_overlay(&mut self) {
        self.overlay = None;
    }

    pub fn overlay(&self) -> Option<&Grid> {
        self.overlay.as_ref()
    }

    /// Top-left `(row, col)` of the overlay.
    pub fn anchor(&self) -> (isize, isize) {
        self.anchor
    }

    fn recenter(&mut self, size: GridSize, at: CellKey) {
        let Some(overlay) = self.overlay.as_ref() else {
            return;
        };
        let max_top = size.height.saturating_sub(overlay.height()) as isize;
        let max_left = size.width.saturating_sub(overlay.width()) as isize;
        let top = at.y as isize - (overlay.height() / 2) as isize;
        let left = at.x as isize - (overlay.width() / 2) as isize;
        self.anchor = (top.clamp(0, max_top), left.clamp(0, max_left));
    }
}

impl Tool for TextTool {
    fn pointer_down(&mut self, ctx: &mut ToolContext<'_>, at: CellKey) -> Outcome {
        self.recenter(ctx.grid.size(), at);
        let Some(overlay) = self.overlay.take() else {
            return Outcome::Idle;
        };
        let mut next = ctx.grid.clone();
        next.paste(&overlay, self.anchor.0, self.anchor.1);
        commit_if_changed(ctx.grid, next)
    }

    fn pointer_move(&mut self, ctx: &mut ToolContext<'_>, at: CellKey) -> Outcome {
        self.recenter(ctx.grid.size(), at);
        Outcome::Idle
    }
}

/// Overlay from a rasterized glyph mask: `true` cells take `color`.
pub fn overlay_from_mask(mask: &[Vec<bool>], color: Rgb) -> Result<Grid> {
    Grid::from_rows(
        mask.iter()
            .map(|row| {
                row.iter()
                    .map(|&on| if on { Cell::Color(color) } else { Cell::Empty })
                    .collect()
            })
            .collect(),
    )
}

/// Overlay from `"#rrggbb"` / `"transparent"` rows.
pub fn overlay_from_tokens<S: AsRef<str>>(rows: &[Vec<S>]) -> Result<Grid> {
    let parsed = rows
        .iter()
        .map(|row| row.iter().map(|t| Cell::parse(t.as_ref())).collect::<Result<Vec<_>>>())
        .collect::<Result<Vec<_>>>()?;
    Grid::from_rows(parsed)
}

/// The active tool and its gesture state.
#[derive(Debug, Clone)]
pub enum ToolState {
    Paint(BrushTool),
    Erase(BrushTool),
    Eyedropper(EyedropperTool),
    Bucket(BucketTool),
    Select(SelectTool),
    Text(TextTool),
}

impl Default for ToolState {
    fn default() -> Self {
        ToolState::Paint(BrushTool::paint())
    }
}

impl ToolState {
    pub fn for_kind(kind: ToolKind) -> Self {
        match kind {
            ToolKind::Paint => ToolState::Paint(BrushTool::paint()),
            ToolKind::Erase => ToolState::Erase(BrushTool::eraser()),
            ToolKind::Eyedropper => ToolState::Eyedropper(EyedropperTool),
            ToolKind::Bucket => ToolState::Bucket(BucketTool),
            ToolKind::Select => ToolState::Select(SelectTool::default()),
            ToolKind::Text => ToolState::Text(TextTool::default()),
        }
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            ToolState::Paint(_) => ToolKind::Paint,
            ToolState::Erase(_) => ToolKind::Erase,
            ToolState::Eyedropper(_) => ToolKind::Eyedropper,
            ToolState::Bucket(_) => ToolKind::Bucket,
            ToolState::Select(_) => ToolKind::Select,
            ToolState::Text(_) => ToolKind::Text,
        }
    }

    pub fn handler(&mut self) -> &mut dyn Tool {
        match self {
            ToolState::Paint(tool) | ToolState::Erase(tool) => tool,
            ToolState::Eyedropper(tool) => tool,
            ToolState::Bucket(tool) => tool,
            ToolState::Select(tool) => tool,
            ToolState::Text(tool) => tool,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb = Rgb::new(255, 0, 0);
    const BLUE: Rgb = Rgb::new(0, 0, 255);

    fn key(y: usize, x: usize) -> CellKey {
        CellKey::new(y, x)
    }

    fn ctx<'a>(grid: &'a Grid, selection: &'a mut Selection, color: Rgb) -> ToolContext<'a> {
        ToolContext {
            grid,
            selection,
            color,
            modifiers: Modifiers::default(),
        }
    }

    #[test]
    fn test_brush_commits_once_per_new_cell() {
        let grid = Grid::empty(GridSize::new(3, 3));
        let mut selection = Selection::new();
        let mut tool = BrushTool::paint();
        let mut c = ctx(&grid, &mut selection, RED);

        let Outcome::Commit(after) = tool.pointer_down(&mut c, key(1, 1)) else {
            panic!("first stroke should commit");
        };
        assert_eq!(after.get(1, 1), Some(Cell::Color(RED)));
        assert_eq!(tool.pointer_move(&mut c, key(1, 1)), Outcome::Idle);
        assert!(matches!(tool.pointer_move(&mut c, key(1, 2)), Outcome::Commit(_)));
        tool.pointer_up(&mut c);
        assert_eq!(tool.pointer_move(&mut c, key(0, 0)), Outcome::Idle);
    }

    #[test]
    fn test_brush_same_value_is_idle() {
        let grid = Grid::filled(GridSize::new(2, 2), Cell::Color(RED));
        let mut selection = Selection::new();
        let mut c = ctx(&grid, &mut selection, RED);
        assert_eq!(BrushTool::paint().pointer_down(&mut c, key(0, 0)), Outcome::Idle);

        let Outcome::Commit(after) = BrushTool::eraser().pointer_down(&mut c, key(0, 0)) else {
            panic!("erase should commit");
        };
        assert_eq!(after.get(0, 0), Some(Cell::Empty));
        assert_eq!(BrushTool::paint().pointer_down(&mut c, key(5, 5)), Outcome::Idle);
    }

    #[test]
    fn test_eyedropper() {
        let mut grid = Grid::empty(GridSize::new(2, 1));
        grid.set(0, 1, Cell::Color(BLUE));
        let mut selection = Selection::new();
        let mut c = ctx(&grid, &mut selection, RED);
        assert_eq!(EyedropperTool.pointer_down(&mut c, key(0, 1)), Outcome::PickColor(BLUE));
        assert_eq!(EyedropperTool.pointer_down(&mut c, key(0, 0)), Outcome::Idle);
    }

    #[test]
    fn test_bucket_fills_connected_region_only() {
        let mut grid = Grid::empty(GridSize::new(3, 1));
        grid.set(0, 1, Cell::Color(BLUE));
        let mut selection = Selection::new();
        let mut c = ctx(&grid, &mut selection, RED);
        let Outcome::Commit(after) = BucketTool.pointer_down(&mut c, key(0, 0)) else {
            panic!("bucket should commit");
        };
        assert_eq!(after.get(0, 0), Some(Cell::Color(RED)));
        assert_eq!(after.get(0, 2), Some(Cell::Empty));

        let mut c = ctx(&grid, &mut selection, BLUE);
        assert_eq!(BucketTool.pointer_down(&mut c, key(0, 1)), Outcome::Idle);
    }

    #[test]
    fn test_select_single_and_subtract() {
        let grid = Grid::empty(GridSize::new(3, 3));
        let mut selection = Selection::new();
        let mut tool = SelectTool::new(SelectMode::Single);
        {
            let mut c = ctx(&grid, &mut selection, RED);
            tool.pointer_down(&mut c, key(0, 0));
            tool.pointer_up(&mut c);
            tool.pointer_down(&mut c, key(2, 2));
            tool.pointer_up(&mut c);
            c.modifiers.subtract = true;
            tool.pointer_down(&mut c, key(0, 0));
        }
        assert_eq!(selection.sorted(), vec![key(2, 2)]);
    }

    #[test]
    fn test_select_region_mode() {
        let mut grid = Grid::empty(GridSize::new(3, 2));
        grid.set(0, 0, Cell::Color(RED));
        grid.set(0, 1, Cell::Color(RED));
        grid.set(1, 2, Cell::Color(RED));
        let mut selection = Selection::new();
        let mut tool = SelectTool::new(SelectMode::Region);
        {
            let mut c = ctx(&grid, &mut selection, RED);
            tool.pointer_down(&mut c, key(0, 1));
        }
        assert_eq!(selection.sorted(), vec![key(0, 0), key(0, 1)]);
    }

    #[test]
    fn test_select_move_is_clamped_and_commits_once() {
        let mut grid = Grid::empty(GridSize::new(4, 4));
        grid.set(1, 1, Cell::Color(RED));
        let mut selection: Selection = [key(1, 1), key(1, 2)].into_iter().collect();
        let mut tool = SelectTool::default();

        let outcome = {
            let mut c = ctx(&grid, &mut selection, BLUE);
            assert_eq!(tool.pointer_down(&mut c, key(1, 1)), Outcome::Idle);
            tool.pointer_move(&mut c, key(3, 9));
            assert_eq!(tool.move_preview(), Some((1, 2)));
            tool.pointer_up(&mut c)
        };
        let Outcome::Commit(after) = outcome else {
            panic!("move should commit");
        };
        assert_eq!(after.get(1, 1), Some(Cell::Empty));
        assert_eq!(after.get(3, 2), Some(Cell::Color(RED)));
        assert_eq!(selection.sorted(), vec![key(3, 2), key(3, 3)]);
        assert_eq!(tool.move_preview(), None);
    }

    #[test]
    fn test_select_zero_move_is_idle() {
        let grid = Grid::filled(GridSize::new(2, 2), Cell::Color(RED));
        let mut selection: Selection = [key(0, 0)].into_iter().collect();
        let mut tool = SelectTool::default();
        let mut c = ctx(&grid, &mut selection, RED);
        tool.pointer_down(&mut c, key(0, 0));
        tool.pointer_move(&mut c, key(0, 0));
        assert_eq!(tool.pointer_up(&mut c), Outcome::Idle);
    }

    #[test]
    fn test_select_move_of_empty_cells_leaves_selection() {
        let grid = Grid::empty(GridSize::new(3, 3));
        let mut selection: Selection = [key(0, 0)].into_iter().collect();
        let mut tool = SelectTool::default();
        let mut c = ctx(&grid, &mut selection, RED);
        tool.pointer_down(&mut c, key(0, 0));
        tool.pointer_move(&mut c, key(2, 2));
        assert_eq!(tool.move_preview(), Some((2, 2)));
        assert_eq!(tool.pointer_up(&mut c), Outcome::Idle);
        assert_eq!(selection.sorted(), vec![key(0, 0)]);
    }

    #[test]
    fn test_text_overlay_follows_pointer_and_commits() {
        let grid = Grid::empty(GridSize::new(5, 4));
        let mut selection = Selection::new();
        let overlay = overlay_from_mask(&[vec![true, false, true], vec![true, true, true]], BLUE).unwrap();
        let mut tool = TextTool::default();
        tool.set_overlay(overlay);

        let mut c = ctx(&grid, &mut selection, RED);
        tool.pointer_move(&mut c, key(0, 0));
        assert_eq!(tool.anchor(), (0, 0));
        tool.pointer_move(&mut c, key(3, 4));
        assert_eq!(tool.anchor(), (2, 2));

        let Outcome::Commit(after) = tool.pointer_down(&mut c, key(2, 2)) else {
            panic!("stamp should commit");
        };
        assert_eq!(tool.anchor(), (1, 1));
        assert_eq!(after.get(1, 1), Some(Cell::Color(BLUE)));
        assert_eq!(after.get(1, 2), Some(Cell::Empty));
        assert_eq!(after.get(2, 3), Some(Cell::Color(BLUE)));
        assert!(tool.overlay().is_none());
        assert_eq!(tool.pointer_down(&mut c, key(2, 2)), Outcome::Idle);
    }

    #[test]
    fn test_overlay_from_tokens() {
        let overlay = overlay_from_tokens(&[vec!["#FF0000", "transparent"]]).unwrap();
        assert_eq!(overlay.get(0, 0), Some(Cell::Color(RED)));
        assert!(overlay_from_tokens(&[vec!["red"]]).is_err());
    }

    #[test]
    fn test_tool_state_kinds() {
        for kind in [
            ToolKind::Paint,
            ToolKind::Erase,
            ToolKind::Eyedropper,
            ToolKind::Bucket,
            ToolKind::Select,
            ToolKind::Text,
        ] {
            assert_eq!(ToolState::for_kind(kind).kind(), kind);
        }
        assert_eq!(ToolState::default().kind(), ToolKind::Paint);
    }
}
