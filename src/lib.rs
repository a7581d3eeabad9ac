pub mod color;
pub mod config;
pub mod editor;
pub mod error;
pub mod export;
pub mod generator;
pub mod grid;
pub mod history;
pub mod normalize;
pub mod pattern_file;
pub mod selection;
pub mod session;
pub mod tools;

pub use color::{color_distance, hex_to_rgb, rgb_to_hex, rgb_to_hsv, rgb_to_lab, Hsv, Rgb};
pub use config::{EditorConfig, ExportConfig, GenerationConfig};
pub use editor::{Dimension, PanDirection, PanOffset, PatternEditor};
pub use error::{PatternError, Result};
pub use generator::{GenerationParams, GenerationRequest, PatternGenerator};
pub use grid::{Cell, ColorCount, Grid, GridSize};
pub use history::{HistoryEntry, HistoryStore};
pub use pattern_file::PatternFile;
pub use selection::{CellKey, Selection, SelectionBounds};
pub use session::{GenerationSession, SessionPoll};
pub use tools::{Modifiers, SelectMode, ToolKind};

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

/// Generate a bead pattern from encoded image bytes.
///
/// # Arguments
/// * `image_bytes` - Any format the `image` crate can decode
/// * `params` - Grid size, scale, oversampling and pan offset
///
/// # Returns
/// The voted grid, or a decode/validation error
pub fn generate_bead_pattern(image_bytes: &[u8], params: &GenerationParams) -> Result<Grid> {
    log::info!(
        "Generating bead pattern: {} bytes, grid {}x{}, scale {}%, multiplier {}",
        image_bytes.len(),
        params.grid_width,
        params.grid_height,
        params.scale_percent,
        params.multiplier
    );
    let start = Instant::now();
    let grid = generator::generate_pattern(image_bytes, params)?;
    log::info!(
        "Bead pattern generated: {} colors, {} empty cells, {}ms",
        grid.distinct_colors().len(),
        grid.cells().iter().filter(|cell| cell.is_empty()).count(),
        start.elapsed().as_millis()
    );
    Ok(grid)
}

/// Same as [`generate_bead_pattern`] for an image already on disk.
pub fn generate_bead_pattern_from_file(
    file_path: impl AsRef<Path>,
    params: &GenerationParams,
) -> Result<Grid> {
    log::info!("Generating bead pattern from file: {}", file_path.as_ref().display());
    let bytes = std::fs::read(file_path.as_ref())?;
    generate_bead_pattern(&bytes, params)
}

pub fn import_pattern_json(raw: &str) -> Result<PatternFile> {
    let file = PatternFile::from_json(raw).map_err(|err| {
        log::warn!("Rejected pattern import: {}", err);
        err
    })?;
    log::info!(
        "Imported pattern {}x{} at scale {}",
        file.grid_size.width,
        file.grid_size.height,
        file.scale
    );
    Ok(file)
}

pub fn export_pattern_json(grid: &Grid, scale: u32) -> Result<String> {
    let json = PatternFile::new(grid, scale).to_json()?;
    log::info!("Exported pattern JSON: {} bytes", json.len());
    Ok(json)
}

pub fn export_pattern_png(grid: &Grid, config: &ExportConfig) -> Result<Vec<u8>> {
    let start = Instant::now();
    let png = export::render_png(grid, config)?;
    log::info!(
        "Exported pattern PNG: {}x{} cells, {} bytes, {}ms",
        grid.width(),
        grid.height(),
        png.len(),
        start.elapsed().as_millis()
    );
    Ok(png)
}

/// Collapse a palette at a ΔE threshold; see [`normalize::normalize`].
pub fn normalize_palette(colors: &[Rgb], threshold: f32) -> HashMap<Rgb, Rgb> {
    let mapping = normalize::normalize(colors, threshold);
    let representatives = normalize::clusters(&mapping).len();
    log::info!(
        "Normalized palette: {} colors -> {} clusters at threshold {:.1}",
        mapping.len(),
        representatives,
        threshold
    );
    mapping
}
