use crate::color::Rgb;
use crate::error::Result;
use crate::grid::GridSize;
use serde::{Deserialize, Serialize};

/// Oversampling and caching knobs for pattern generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationConfig {
    pub multiplier: u32,
    pub reduced_multiplier: u32,
    pub reduced_multiplier_cells: usize,
    pub minimal_multiplier: u32,
    pub minimal_multiplier_cells: usize,
    /// Samples with alpha at or below this are not part of the image.
    pub alpha_threshold: u8,
    /// Oversampling used for externally rasterized stamp images (QR codes).
    pub qr_multiplier: u32,
    pub cache_entries: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            multiplier: 10,
            reduced_multiplier: 8,
            reduced_multiplier_cells: 2500,
            minimal_multiplier: 5,
            minimal_multiplier_cells: 10_000,
            alpha_threshold: 10,
            qr_multiplier: 64,
            cache_entries: 8,
        }
    }
}

impl GenerationConfig {
    /// Samples per cell per axis for a grid of `size`. Large grids sample coarser.
    pub fn multiplier_for(&self, size: GridSize) -> u32 {
        let cells = size.cell_count();
        let multiplier = if cells >= self.minimal_multiplier_cells {
            self.minimal_multiplier
        } else if cells >= self.reduced_multiplier_cells {
            self.reduced_multiplier
        } else {
            self.multiplier
        };
        multiplier.max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportConfig {
    pub cell_px: u32,
    pub padding: u32,
    pub background: Rgb,
    /// Draw a thin darker ring around each bead.
    pub border: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            cell_px: 20,
            padding: 20,
            background: Rgb::WHITE,
            border: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    pub grid_size: GridSize,
    pub default_color: Rgb,
    pub default_scale: u32,
    pub min_linked_dimension: usize,
    /// Above this many cells, scale changes only regenerate on commit.
    pub live_preview_max_cells: usize,
    pub history_limit: Option<usize>,
    pub generation: GenerationConfig,
    pub export: ExportConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            grid_size: GridSize::new(29, 29),
            default_color: Rgb::BLACK,
            default_scale: 100,
            min_linked_dimension: 5,
            live_preview_max_cells: 2500,
            history_limit: None,
            generation: GenerationConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl EditorConfig {
    /// Parse a JSON config document; absent fields keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        let mut config: EditorConfig = serde_json::from_str(raw)?;
        config.grid_size.width = config.grid_size.width.max(1);
        config.grid_size.height = config.grid_size.height.max(1);
        Ok(config)
    }
}

/// Opt-in per-stage timing logs.
pub fn debug_timing_enabled() -> bool {
    matches!(
        std::env::var("PEGBOARD_DEBUG_TIMING").as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes") | Ok("YES")
    )
}
