//! The editing session: current grid, tool, selection, pan state, source image
//! and at most one generation in flight.
//!
//! Every committed change goes through [`PatternEditor::commit`], which installs
//! the new grid and pushes a copy to history. No-ops never reach it.

use crate::color::Rgb;
use crate::config::EditorConfig;
use crate::error::Result;
use crate::export;
use crate::generator::{
    image_digest, request_cache_key, GenerationParams, GenerationRequest, PatternGenerator,
};
use crate::grid::{Cell, ColorCount, Grid, GridSize};
use crate::history::HistoryStore;
use crate::normalize::normalize;
use crate::pattern_file::PatternFile;
use crate::selection::{CellKey, Selection};
use crate::session::{GenerationCache, GenerationSession, SessionPoll};
use crate::tools::{
    overlay_from_mask, Modifiers, Outcome, SelectMode, SelectTool, Tool, ToolContext, ToolKind,
    ToolState,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Accumulated pan in whole cells. Positive x is right, positive y is down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanOffset {
    pub x: i32,
    pub y: i32,
}

impl PanOffset {
    pub fn is_zero(self) -> bool {
        self.x == 0 && self.y == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PanDirection {
    Up,
    Down,
    Left,
    Right,
}

impl PanDirection {
    fn delta(self) -> (i32, i32) {
        match self {
            PanDirection::Up => (0, -1),
            PanDirection::Down => (0, 1),
            PanDirection::Left => (-1, 0),
            PanDirection::Right => (1, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dimension {
    Width,
    Height,
}

#[derive(Debug, Clone)]
struct SourceImage {
    bytes: Arc<Vec<u8>>,
    digest: String,
    /// Fixed oversampling for stamped images; grid-size based otherwise.
    multiplier: Option<u32>,
}

impl SourceImage {
    fn new(bytes: Vec<u8>, multiplier: Option<u32>) -> Self {
        let digest = image_digest(&bytes);
        Self {
            bytes: Arc::new(bytes),
            digest,
            multiplier,
        }
    }
}

/// Scale that frames a rasterized QR code of `module_count` modules on the board.
pub fn qr_scale_for_modules(module_count: usize) -> Option<u32> {
    match module_count {
        29 => Some(133),
        25 => Some(123),
        21 => Some(89),
        _ => None,
    }
}

pub struct PatternEditor {
    config: EditorConfig,
    generator: PatternGenerator,
    grid: Grid,
    history: HistoryStore,
    tool: ToolState,
    select_mode: SelectMode,
    modifiers: Modifiers,
    color: Rgb,
    selection: Selection,
    scale: u32,
    offset: PanOffset,
    image: Option<SourceImage>,
    session: Option<GenerationSession>,
    next_session_id: u64,
    cache: GenerationCache,
}

impl Default for PatternEditor {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl PatternEditor {
    pub fn new(config: EditorConfig) -> Self {
        let size = GridSize::new(config.grid_size.width.max(1), config.grid_size.height.max(1));
        let grid = Grid::empty(size);
        Self {
            generator: PatternGenerator::new(&config.generation),
            history: HistoryStore::with_limit(grid.clone(), config.history_limit),
            cache: GenerationCache::new(config.generation.cache_entries),
            color: config.default_color,
            scale: config.default_scale,
            grid,
            tool: ToolState::default(),
            select_mode: SelectMode::default(),
            modifiers: Modifiers::default(),
            selection: Selection::new(),
            offset: PanOffset::default(),
            image: None,
            session: None,
            next_session_id: 1,
            config,
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn size(&self) -> GridSize {
        self.grid.size()
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn offset(&self) -> PanOffset {
        self.offset
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    pub fn set_color(&mut self, color: Rgb) {
        self.color = color;
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn color_counts(&self) -> Vec<ColorCount> {
        self.grid.color_counts()
    }

    fn commit(&mut self, grid: Grid) {
        if grid.size() != self.grid.size() {
            self.selection.clip(grid.size());
        }
        self.grid = grid;
        self.history.push(&self.grid);
    }

    fn install(&mut self, grid: Grid) {
        if grid.size() != self.grid.size() {
            self.selection.clip(grid.size());
        }
        self.grid = grid;
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(grid) => {
                self.install(grid);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(grid) => {
                self.install(grid);
                true
            }
            None => false,
        }
    }

    // Tools

    pub fn tool_kind(&self) -> ToolKind {
        self.tool.kind()
    }

    pub fn tool(&self) -> &ToolState {
        &self.tool
    }

    pub fn set_tool(&mut self, kind: ToolKind) {
        self.tool = match kind {
            ToolKind::Select => ToolState::Select(SelectTool::new(self.select_mode)),
            other => ToolState::for_kind(other),
        };
    }

    pub fn select_mode(&self) -> SelectMode {
        self.select_mode
    }

    pub fn set_select_mode(&mut self, mode: SelectMode) {
        self.select_mode = mode;
        if let ToolState::Select(tool) = &mut self.tool {
            tool.mode = mode;
        }
    }

    pub fn set_subtract_modifier(&mut self, subtract: bool) {
        self.modifiers.subtract = subtract;
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Clamped offset of a selection move in progress.
    pub fn move_preview(&self) -> Option<(isize, isize)> {
        match &self.tool {
            ToolState::Select(tool) => tool.move_preview(),
            _ => None,
        }
    }

    /// Switch to the stamp tool holding `overlay`.
    pub fn set_text_overlay(&mut self, overlay: Grid) {
        if !matches!(self.tool, ToolState::Text(_)) {
            self.set_tool(ToolKind::Text);
        }
        if let ToolState::Text(tool) = &mut self.tool {
            tool.set_overlay(overlay);
        }
    }

    /// Stamp a rasterized glyph mask in the current color.
    pub fn set_text_mask(&mut self, mask: &[Vec<bool>]) -> Result<()> {
        let overlay = overlay_from_mask(mask, self.color)?;
        self.set_text_overlay(overlay);
        Ok(())
    }

    /// Floating overlay and its top-left anchor, if one is held.
    pub fn text_overlay(&self) -> Option<(&Grid, (isize, isize))> {
        match &self.tool {
            ToolState::Text(tool) => tool.overlay().map(|overlay| (overlay, tool.anchor())),
            _ => None,
        }
    }

    fn dispatch<F>(&mut self, gesture: F) -> bool
    where
        F: FnOnce(&mut dyn Tool, &mut ToolContext<'_>) -> Outcome,
    {
        let mut ctx = ToolContext {
            grid: &self.grid,
            selection: &mut self.selection,
            color: self.color,
            modifiers: self.modifiers,
        };
        let outcome = gesture(self.tool.handler(), &mut ctx);
        self.apply_outcome(outcome)
    }

    fn apply_outcome(&mut self, outcome: Outcome) -> bool {
        match outcome {
            Outcome::Idle => false,
            Outcome::Commit(grid) => {
                self.commit(grid);
                true
            }
            Outcome::PickColor(color) => {
                self.color = color;
                self.set_tool(ToolKind::Paint);
                false
            }
        }
    }

    /// Returns `true` when the gesture committed a grid change.
    pub fn pointer_down(&mut self, y: usize, x: usize) -> bool {
        let at = CellKey::new(y, x);
        self.dispatch(|tool, ctx| tool.pointer_down(ctx, at))
    }

    pub fn pointer_move(&mut self, y: usize, x: usize) -> bool {
        let at = CellKey::new(y, x);
        self.dispatch(|tool, ctx| tool.pointer_move(ctx, at))
    }

    pub fn pointer_up(&mut self) -> bool {
        self.dispatch(|tool, ctx| tool.pointer_up(ctx))
    }

    // Whole-grid edits

    /// Replace every `old` cell with `new`. No-op when `new` is absent or equal to `old`.
    pub fn replace_color(&mut self, old: Cell, new: Option<Cell>) -> bool {
        let Some(new) = new else {
            return false;
        };
        let mut next = self.grid.clone();
        if next.replace_color(old, new) == 0 {
            return false;
        }
        self.commit(next);
        true
    }

    /// Collapse near-identical colors. Returns the number of cells recolored.
    pub fn normalize_colors(&mut self, threshold: f32) -> usize {
        let colors = self.grid.distinct_colors();
        let mapping = normalize(&colors, threshold);
        let mut next = self.grid.clone();
        let changed = next.apply_color_map(&mapping);
        if changed > 0 {
            log::info!(
                "Normalized {} colors into {} at threshold {:.1} ({} cells changed)",
                colors.len(),
                next.distinct_colors().len(),
                threshold,
                changed
            );
            self.commit(next);
        }
        changed
    }

    /// Empty every cell and forget the source image and pan state.
    pub fn clear(&mut self) {
        self.cancel_generation();
        self.image = None;
        self.offset = PanOffset::default();
        self.selection.clear();
        self.commit(Grid::empty(self.grid.size()));
    }

    // Panning

    pub fn pan(&mut self, direction: PanDirection) {
        let (dx, dy) = direction.delta();
        let shifted = self.grid.shift_by(dx as isize, dy as isize);
        self.offset.x += dx;
        self.offset.y += dy;
        self.commit(shifted);
    }

    /// Undo the accumulated pan at once, then regenerate from the origin when
    /// an image is loaded. Returns `false` when already centered.
    pub fn recenter(&mut self) -> bool {
        if self.offset.is_zero() {
            return false;
        }
        let shifted = self
            .grid
            .shift_by(-(self.offset.x as isize), -(self.offset.y as isize));
        self.offset = PanOffset::default();
        self.commit(shifted);
        self.regenerate();
        true
    }

    // Grid size

    pub fn set_grid_size(&mut self, size: GridSize) {
        let size = GridSize::new(size.width.max(1), size.height.max(1));
        if size == self.grid.size() {
            return;
        }
        self.cancel_generation();
        let resized = self.grid.resize(size);
        self.commit(resized);
    }

    /// Resize keeping the current aspect ratio; `value` sets the longer side.
    pub fn set_linked_size(&mut self, value: usize) {
        let current = self.grid.size();
        let aspect = current.aspect_ratio();
        let (width, height) = if current.width >= current.height {
            (value, (value as f64 / aspect).round() as usize)
        } else {
            ((value as f64 * aspect).round() as usize, value)
        };
        let min = self.config.min_linked_dimension.max(1);
        self.set_grid_size(GridSize::new(width.max(min), height.max(min)));
    }

    pub fn set_dimension(&mut self, dimension: Dimension, value: usize) {
        let mut size = self.grid.size();
        match dimension {
            Dimension::Width => size.width = value,
            Dimension::Height => size.height = value,
        }
        self.set_grid_size(size);
    }

    /// Square the grid at the rounded mean of its sides.
    pub fn square_up(&mut self) {
        let size = self.grid.size();
        let side = ((size.width + size.height) as f64 / 2.0).round() as usize;
        self.set_grid_size(GridSize::new(side, side));
    }

    pub fn reset_grid_size(&mut self) {
        self.set_grid_size(self.config.grid_size);
    }

    // Generation

    pub fn is_generating(&self) -> bool {
        self.session.is_some()
    }

    /// Current request parameters, including the accumulated pan.
    pub fn generation_params(&self) -> GenerationParams {
        let size = self.grid.size();
        let multiplier = self
            .image
            .as_ref()
            .and_then(|image| image.multiplier)
            .unwrap_or_else(|| self.config.generation.multiplier_for(size));
        GenerationParams::new(size, self.scale, multiplier).with_offset(self.offset.x, self.offset.y)
    }

    /// Store a new source image and generate from it at zero offset.
    pub fn load_image(&mut self, bytes: Vec<u8>) {
        log::info!("Loaded source image ({} bytes)", bytes.len());
        self.image = Some(SourceImage::new(bytes, None));
        self.offset = PanOffset::default();
        self.regenerate();
    }

    /// Load an externally rasterized QR image. Known module counts pick a
    /// framing scale; the image is sampled at the dedicated QR oversampling.
    pub fn load_stamp_image(&mut self, bytes: Vec<u8>, module_count: usize) {
        if let Some(scale) = qr_scale_for_modules(module_count) {
            self.scale = scale;
        }
        log::info!(
            "Loaded stamp image ({} bytes, {} modules, scale {})",
            bytes.len(),
            module_count,
            self.scale
        );
        self.image = Some(SourceImage::new(bytes, Some(self.config.generation.qr_multiplier)));
        self.offset = PanOffset::default();
        self.regenerate();
    }

    /// Request a generation from the current image, scale and pan offset.
    /// Returns `false` when no image is loaded.
    pub fn regenerate(&mut self) -> bool {
        let params = self.generation_params();
        let Some(image) = self.image.as_ref() else {
            return false;
        };
        let request = GenerationRequest {
            image: Arc::clone(&image.bytes),
            params,
        };
        let key = request_cache_key(&image.digest, &params, self.generator.alpha_threshold());

        self.cancel_generation();
        let id = self.next_session_id;
        self.next_session_id += 1;

        let session = match self.cache.get(&key) {
            Some(grid) => {
                log::debug!("Generation {} served from cache", id);
                GenerationSession::ready(id, params, grid)
            }
            None => GenerationSession::start(id, self.generator.clone(), request),
        };
        log::info!(
            "Generation {} requested: grid={}x{} scale={} multiplier={} offset=({}, {})",
            id,
            params.grid_width,
            params.grid_height,
            params.scale_percent,
            params.multiplier,
            params.offset_cells_x,
            params.offset_cells_y
        );
        self.session = Some(session.with_cache_key(key));
        true
    }

    /// Record a scale change while it is still being adjusted. Only small grids
    /// regenerate live; returns whether a generation was requested.
    pub fn preview_scale(&mut self, scale: u32) -> bool {
        self.scale = scale;
        if self.grid.size().cell_count() >= self.config.live_preview_max_cells {
            return false;
        }
        self.regenerate()
    }

    pub fn commit_scale(&mut self, scale: u32) -> bool {
        self.scale = scale;
        self.regenerate()
    }

    pub fn cancel_generation(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel();
            log::warn!("Generation {} superseded before it was applied", session.id());
        }
    }

    /// Apply a finished generation if there is one. Returns `true` when the grid changed.
    pub fn poll_generation(&mut self) -> bool {
        let poll = match self.session.as_ref() {
            Some(session) => session.try_take(),
            None => return false,
        };
        match poll {
            SessionPoll::Pending => false,
            SessionPoll::Abandoned => {
                self.session = None;
                false
            }
            SessionPoll::Ready(grid) => match self.session.take() {
                Some(session) => self.apply_generated(&session, grid),
                None => false,
            },
        }
    }

    /// Block until the in-flight generation finishes and apply it.
    pub fn wait_for_generation(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        match session.wait() {
            Some(grid) => self.apply_generated(&session, grid),
            None => false,
        }
    }

    fn apply_generated(&mut self, session: &GenerationSession, grid: Grid) -> bool {
        if grid.size() != self.grid.size() {
            log::warn!(
                "Discarding generation {}: result is {}x{}, grid is {}x{}",
                session.id(),
                grid.width(),
                grid.height(),
                self.grid.width(),
                self.grid.height()
            );
            return false;
        }
        if let Some(key) = session.cache_key() {
            self.cache.insert(key.to_string(), grid.clone());
        }
        log::info!(
            "Generation {} applied after {}ms ({} colors)",
            session.id(),
            session.elapsed().as_millis(),
            grid.distinct_colors().len()
        );
        self.commit(grid);
        true
    }

    // Import / export

    pub fn to_pattern_file(&self) -> PatternFile {
        PatternFile::new(&self.grid, self.scale)
    }

    pub fn export_json(&self) -> Result<String> {
        self.to_pattern_file().to_json()
    }

    /// Replace the grid and scale from a pattern document. Nothing changes when
    /// the payload is rejected.
    pub fn import_json(&mut self, raw: &str) -> Result<()> {
        let file = PatternFile::from_json(raw)?;
        self.import_pattern(file);
        Ok(())
    }

    pub fn import_pattern(&mut self, file: PatternFile) {
        self.cancel_generation();
        if file.grid_size != self.grid.size() {
            log::info!(
                "Import resizes grid {}x{} -> {}x{}",
                self.grid.width(),
                self.grid.height(),
                file.grid_size.width,
                file.grid_size.height
            );
        }
        self.scale = file.scale;
        self.commit(file.perler_pattern);
    }

    pub fn bead_circles(&self) -> Vec<export::BeadCircle> {
        export::bead_circles(&self.grid, &self.config.export)
    }

    pub fn render_png(&self) -> Result<Vec<u8>> {
        export::render_png(&self.grid, &self.config.export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    const RED: Rgb = Rgb::new(255, 0, 0);
    const BLUE: Rgb = Rgb::new(0, 0, 255);

    fn editor(width: usize, height: usize) -> PatternEditor {
        PatternEditor::new(EditorConfig {
            grid_size: GridSize::new(width, height),
            ..EditorConfig::default()
        })
    }

    fn png(image: &RgbaImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("png encode");
        bytes
    }

    fn red_corner_png() -> Vec<u8> {
        png(&RgbaImage::from_fn(20, 20, |x, y| {
            if x < 10 && y < 10 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        }))
    }

    fn paint(editor: &mut PatternEditor, y: usize, x: usize, color: Rgb) {
        editor.set_tool(ToolKind::Paint);
        editor.set_color(color);
        editor.pointer_down(y, x);
        editor.pointer_up();
    }

    fn tokens(grid: &Grid) -> Vec<Vec<String>> {
        grid.rows()
            .map(|row| row.iter().map(|cell| cell.to_token()).collect())
            .collect()
    }

    #[test]
    fn test_defaults() {
        let editor = PatternEditor::default();
        assert_eq!(editor.size(), GridSize::new(29, 29));
        assert!(editor.grid().is_blank());
        assert_eq!(editor.color(), Rgb::BLACK);
        assert_eq!(editor.scale(), 100);
        assert_eq!(editor.tool_kind(), ToolKind::Paint);
        assert!(!editor.can_undo());
        assert!(!editor.has_image());
    }

    #[test]
    fn test_paint_undo_redo() {
        let mut editor = editor(4, 4);
        paint(&mut editor, 1, 2, RED);
        assert_eq!(editor.grid().get(1, 2), Some(Cell::Color(RED)));
        assert!(editor.undo());
        assert!(editor.grid().is_blank());
        assert!(!editor.undo());
        assert!(editor.redo());
        assert_eq!(editor.grid().get(1, 2), Some(Cell::Color(RED)));
        assert!(!editor.redo());
    }

    #[test]
    fn test_drag_paints_one_entry_per_cell() {
        let mut editor = editor(4, 4);
        editor.set_color(BLUE);
        assert!(editor.pointer_down(0, 0));
        assert!(editor.pointer_move(0, 1));
        assert!(!editor.pointer_move(0, 1));
        assert!(editor.pointer_move(1, 1));
        editor.pointer_up();
        assert_eq!(editor.history().len(), 4);
        assert_eq!(editor.color_counts()[0].count, 3);

        // Repainting a cell with its own color is not a commit.
        assert!(!editor.pointer_down(0, 0));
        editor.pointer_up();
        assert_eq!(editor.history().len(), 4);
    }

    #[test]
    fn test_erase_and_bucket() {
        let mut editor = editor(3, 1);
        paint(&mut editor, 0, 1, RED);
        editor.set_tool(ToolKind::Bucket);
        editor.set_color(BLUE);
        assert!(editor.pointer_down(0, 0));
        assert_eq!(tokens(editor.grid()), vec![vec!["#0000ff", "#ff0000", "transparent"]]);

        editor.set_tool(ToolKind::Erase);
        assert!(editor.pointer_down(0, 1));
        editor.pointer_up();
        assert_eq!(editor.grid().get(0, 1), Some(Cell::Empty));
    }

    #[test]
    fn test_eyedropper_adopts_color_and_switches_to_paint() {
        let mut editor = editor(2, 2);
        paint(&mut editor, 0, 0, RED);
        let entries = editor.history().len();
        editor.set_color(BLUE);
        editor.set_tool(ToolKind::Eyedropper);

        assert!(!editor.pointer_down(1, 1));
        assert_eq!(editor.tool_kind(), ToolKind::Eyedropper);

        assert!(!editor.pointer_down(0, 0));
        assert_eq!(editor.color(), RED);
        assert_eq!(editor.tool_kind(), ToolKind::Paint);
        assert_eq!(editor.history().len(), entries);
    }

    #[test]
    fn test_replace_color_no_ops() {
        let mut editor = editor(3, 3);
        paint(&mut editor, 0, 0, RED);
        paint(&mut editor, 2, 2, RED);
        let entries = editor.history().len();

        assert!(!editor.replace_color(Cell::Color(RED), Some(Cell::Color(RED))));
        assert!(!editor.replace_color(Cell::Color(RED), None));
        assert!(!editor.replace_color(Cell::Color(BLUE), Some(Cell::Color(RED))));
        assert_eq!(editor.history().len(), entries);

        assert!(editor.replace_color(Cell::Color(RED), Some(Cell::Color(BLUE))));
        assert_eq!(editor.history().len(), entries + 1);
        assert_eq!(editor.grid().get(2, 2), Some(Cell::Color(BLUE)));
    }

    #[test]
    fn test_clear_pushes_history_and_forgets_image() {
        let mut editor = editor(2, 2);
        editor.load_image(red_corner_png());
        assert!(editor.wait_for_generation());
        editor.pan(PanDirection::Down);
        let entries = editor.history().len();

        editor.clear();
        assert!(editor.grid().is_blank());
        assert!(!editor.has_image());
        assert!(editor.offset().is_zero());
        assert_eq!(editor.history().len(), entries + 1);
        assert!(editor.can_undo());
        assert!(!editor.regenerate());
    }

    #[test]
    fn test_pan_and_recenter_without_image() {
        let mut editor = editor(4, 4);
        paint(&mut editor, 0, 0, RED);
        paint(&mut editor, 2, 2, BLUE);

        editor.pan(PanDirection::Up);
        assert_eq!(editor.offset(), PanOffset { x: 0, y: -1 });
        assert_eq!(editor.grid().get(1, 2), Some(Cell::Color(BLUE)));
        assert_eq!(editor.grid().get(0, 0), Some(Cell::Empty));

        editor.pan(PanDirection::Left);
        assert_eq!(editor.offset(), PanOffset { x: -1, y: -1 });

        assert!(editor.recenter());
        assert!(editor.offset().is_zero());
        assert!(!editor.is_generating());
        // The top row scrolled off and is gone; the rest is back in place.
        assert_eq!(editor.grid().get(2, 2), Some(Cell::Color(BLUE)));
        assert_eq!(editor.grid().get(0, 0), Some(Cell::Empty));
        assert_eq!(editor.color_counts().len(), 1);

        let entries = editor.history().len();
        assert!(!editor.recenter());
        assert_eq!(editor.history().len(), entries);
    }

    #[test]
    fn test_generation_follows_pan_and_recenter_restores_origin() {
        let mut editor = editor(2, 2);
        editor.load_image(red_corner_png());
        assert!(editor.is_generating());
        assert!(editor.wait_for_generation());
        let origin = editor.grid().clone();
        assert_eq!(
            tokens(&origin),
            vec![vec!["#ff0000", "#0000ff"], vec!["#0000ff", "#0000ff"]]
        );

        editor.pan(PanDirection::Right);
        let shifted = editor.grid().clone();
        assert!(editor.regenerate());
        assert!(editor.wait_for_generation());
        assert_eq!(*editor.grid(), shifted);

        assert!(editor.recenter());
        assert_eq!(
            tokens(editor.grid()),
            vec![vec!["#ff0000", "transparent"], vec!["#0000ff", "transparent"]]
        );
        assert!(editor.is_generating());
        assert!(editor.wait_for_generation());
        assert_eq!(*editor.grid(), origin);
    }

    #[test]
    fn test_superseded_generation_is_never_applied() {
        let mut editor = editor(2, 2);
        editor.load_image(red_corner_png());
        let solid_green = png(&RgbaImage::from_pixel(8, 8, Rgba([0, 200, 0, 255])));
        editor.load_image(solid_green);
        assert!(editor.wait_for_generation());
        assert_eq!(editor.history().len(), 2);
        assert!(editor
            .grid()
            .cells()
            .iter()
            .all(|c| *c == Cell::Color(Rgb::new(0, 200, 0))));
        assert!(!editor.wait_for_generation());
    }

    #[test]
    fn test_resize_cancels_in_flight_generation() {
        let mut editor = editor(2, 2);
        editor.load_image(red_corner_png());
        editor.set_dimension(Dimension::Width, 3);
        assert!(!editor.is_generating());
        assert!(!editor.wait_for_generation());
        assert_eq!(editor.size(), GridSize::new(3, 2));
    }

    #[test]
    fn test_decode_failure_generates_empty_grid() {
        let mut editor = editor(3, 2);
        paint(&mut editor, 0, 0, RED);
        editor.load_image(b"not an image".to_vec());
        assert!(editor.wait_for_generation());
        assert!(editor.grid().is_blank());
        assert_eq!(editor.size(), GridSize::new(3, 2));
    }

    #[test]
    fn test_poll_generation_eventually_applies() {
        let mut editor = editor(2, 2);
        assert!(!editor.poll_generation());
        editor.load_image(red_corner_png());
        let mut applied = false;
        for _ in 0..500 {
            if editor.poll_generation() {
                applied = true;
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(applied);
        assert_eq!(editor.grid().get(0, 0), Some(Cell::Color(RED)));
        assert!(!editor.is_generating());
    }

    #[test]
    fn test_scale_preview_respects_live_limit() {
        let mut small = editor(10, 10);
        assert!(!small.preview_scale(120));
        small.load_image(red_corner_png());
        small.wait_for_generation();
        assert!(small.preview_scale(110));
        assert_eq!(small.scale(), 110);

        let mut large = editor(50, 50);
        large.load_image(red_corner_png());
        large.cancel_generation();
        assert!(!large.preview_scale(90));
        assert!(!large.is_generating());
        assert!(large.commit_scale(90));
        assert_eq!(large.generation_params().multiplier, 8);
    }

    #[test]
    fn test_stamp_image_picks_scale_and_multiplier() {
        let mut editor = editor(25, 25);
        editor.load_stamp_image(red_corner_png(), 25);
        assert_eq!(editor.scale(), 123);
        assert_eq!(editor.generation_params().multiplier, 64);
        editor.cancel_generation();

        editor.load_stamp_image(red_corner_png(), 33);
        assert_eq!(editor.scale(), 123);
        editor.cancel_generation();
        assert_eq!(qr_scale_for_modules(21), Some(89));
        assert_eq!(qr_scale_for_modules(29), Some(133));
    }

    #[test]
    fn test_linked_and_independent_sizes() {
        let mut editor = PatternEditor::default();
        paint(&mut editor, 0, 0, RED);

        editor.set_linked_size(40);
        assert_eq!(editor.size(), GridSize::new(40, 40));
        assert_eq!(editor.grid().get(0, 0), Some(Cell::Color(RED)));

        editor.set_dimension(Dimension::Width, 20);
        assert_eq!(editor.size(), GridSize::new(20, 40));

        editor.set_linked_size(10);
        assert_eq!(editor.size(), GridSize::new(5, 10));

        editor.set_linked_size(4);
        assert_eq!(editor.size(), GridSize::new(5, 5));

        editor.set_dimension(Dimension::Height, 15);
        editor.square_up();
        assert_eq!(editor.size(), GridSize::new(10, 10));

        editor.reset_grid_size();
        assert_eq!(editor.size(), GridSize::new(29, 29));
        assert_eq!(editor.grid().get(0, 0), Some(Cell::Color(RED)));

        assert!(editor.undo());
        assert_eq!(editor.size(), GridSize::new(10, 10));
    }

    #[test]
    fn test_resize_clips_selection() {
        let mut editor = editor(5, 5);
        editor.set_tool(ToolKind::Select);
        editor.pointer_down(4, 4);
        editor.pointer_down(1, 1);
        assert_eq!(editor.selection().len(), 2);
        editor.set_grid_size(GridSize::new(3, 3));
        assert_eq!(editor.selection().sorted(), vec![CellKey::new(1, 1)]);
        editor.clear_selection();
        assert!(editor.selection().is_empty());
    }

    #[test]
    fn test_select_move_commits_one_entry() {
        let mut editor = editor(4, 4);
        paint(&mut editor, 0, 0, RED);
        paint(&mut editor, 0, 1, BLUE);
        editor.set_tool(ToolKind::Select);
        editor.set_select_mode(SelectMode::Single);
        editor.pointer_down(0, 0);
        editor.pointer_up();
        editor.pointer_down(0, 1);
        editor.pointer_up();
        let entries = editor.history().len();

        editor.pointer_down(0, 0);
        editor.pointer_move(2, 1);
        assert_eq!(editor.move_preview(), Some((1, 2)));
        assert!(editor.pointer_up());
        assert_eq!(editor.history().len(), entries + 1);
        assert_eq!(editor.grid().get(2, 1), Some(Cell::Color(RED)));
        assert_eq!(editor.grid().get(2, 2), Some(Cell::Color(BLUE)));
        assert_eq!(editor.grid().get(0, 0), Some(Cell::Empty));
        assert_eq!(
            editor.selection().sorted(),
            vec![CellKey::new(2, 1), CellKey::new(2, 2)]
        );
    }

    #[test]
    fn test_region_select_with_subtract() {
        let mut editor = editor(3, 3);
        paint(&mut editor, 1, 1, RED);
        editor.set_select_mode(SelectMode::Region);
        editor.set_tool(ToolKind::Select);
        editor.pointer_down(0, 0);
        editor.pointer_up();
        assert_eq!(editor.selection().len(), 8);

        editor.set_subtract_modifier(true);
        editor.pointer_down(2, 2);
        editor.pointer_up();
        assert!(editor.selection().is_empty());
    }

    #[test]
    fn test_text_stamp() {
        let mut editor = editor(6, 4);
        editor.set_color(BLUE);
        editor
            .set_text_mask(&[vec![true, true], vec![false, true]])
            .expect("rectangular mask");
        assert_eq!(editor.tool_kind(), ToolKind::Text);
        editor.pointer_move(3, 5);
        let (_, anchor) = editor.text_overlay().expect("overlay held");
        assert_eq!(anchor, (2, 4));

        assert!(editor.pointer_down(0, 0));
        assert!(editor.text_overlay().is_none());
        assert_eq!(editor.grid().get(0, 0), Some(Cell::Color(BLUE)));
        assert_eq!(editor.grid().get(1, 0), Some(Cell::Empty));
        assert_eq!(editor.grid().get(1, 1), Some(Cell::Color(BLUE)));
        assert!(editor.set_text_mask(&[vec![true], vec![]]).is_err());
    }

    #[test]
    fn test_normalize_colors() {
        let mut editor = editor(3, 1);
        paint(&mut editor, 0, 0, Rgb::new(0, 0, 0));
        paint(&mut editor, 0, 1, Rgb::new(1, 1, 1));
        paint(&mut editor, 0, 2, Rgb::WHITE);
        let entries = editor.history().len();

        assert_eq!(editor.normalize_colors(5.0), 1);
        assert_eq!(editor.history().len(), entries + 1);
        assert_eq!(
            tokens(editor.grid()),
            vec![vec!["#000000", "#000000", "#ffffff"]]
        );
        assert_eq!(editor.normalize_colors(5.0), 0);
        assert_eq!(editor.history().len(), entries + 1);
    }

    #[test]
    fn test_json_round_trip_into_fresh_editor() {
        let mut source = editor(4, 3);
        paint(&mut source, 0, 0, RED);
        paint(&mut source, 2, 3, BLUE);
        source.commit_scale(135);
        let json = source.export_json().unwrap();

        let mut fresh = PatternEditor::default();
        fresh.import_json(&json).unwrap();
        assert_eq!(fresh.grid(), source.grid());
        assert_eq!(fresh.size(), GridSize::new(4, 3));
        assert_eq!(fresh.scale(), 135);
        assert!(fresh.can_undo());
    }

    #[test]
    fn test_rejected_import_leaves_state_alone() {
        let mut editor = editor(2, 2);
        paint(&mut editor, 0, 0, RED);
        let before = editor.grid().clone();
        let entries = editor.history().len();

        let err = editor.import_json(r#"{"scale": 50}"#).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(*editor.grid(), before);
        assert_eq!(editor.history().len(), entries);
        assert_eq!(editor.scale(), 100);
    }

    #[test]
    fn test_export_helpers() {
        let mut editor = editor(2, 2);
        paint(&mut editor, 1, 1, RED);
        let circles = editor.bead_circles();
        assert_eq!(circles.len(), 1);
        assert_eq!((circles[0].row, circles[0].col), (1, 1));
        let png = editor.render_png().unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
