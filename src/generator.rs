//! Image → bead grid conversion.
//!
//! The source image is laid onto a virtual sampling canvas of
//! `grid × multiplier` pixels (aspect-fit, scaled, centered, then panned by
//! whole cells). Each cell then votes over its `multiplier²` canvas samples in
//! a coarse HSV histogram and takes the average color of the heaviest bin, so
//! a cell straddling two flat regions picks one of them instead of a blend.
//!
//! The canvas is never materialized: canvas columns and rows are mapped back
//! to source pixel spans once, and cells read through those maps. A canvas
//! sample that covers several source pixels is their alpha-weighted average,
//! so transparent pixels lower its alpha without darkening its color.

use crate::color::{rgb_to_hsv, Rgb};
use crate::config::{debug_timing_enabled, GenerationConfig};
use crate::error::{PatternError, Result};
use crate::grid::{Cell, Grid, GridSize};
use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

const GENERATOR_CACHE_VERSION: u8 = 2;

/// Slack for float error at footprint edges, in source pixels.
const FOOTPRINT_EPSILON: f64 = 1e-6;

pub const HUE_BINS: usize = 24;
pub const SAT_BINS: usize = 6;
pub const VAL_BINS: usize = 6;
pub const BIN_COUNT: usize = HUE_BINS * SAT_BINS * VAL_BINS;

/// Everything the worker needs besides the image itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    /// 100 fits the image exactly inside the grid's aspect-correct box.
    pub scale_percent: u32,
    pub grid_width: usize,
    pub grid_height: usize,
    pub multiplier: u32,
    #[serde(default)]
    pub offset_cells_x: i32,
    #[serde(default)]
    pub offset_cells_y: i32,
}

impl GenerationParams {
    pub fn new(size: GridSize, scale_percent: u32, multiplier: u32) -> Self {
        Self {
            scale_percent,
            grid_width: size.width,
            grid_height: size.height,
            multiplier,
            offset_cells_x: 0,
            offset_cells_y: 0,
        }
    }

    pub fn with_offset(mut self, offset_cells_x: i32, offset_cells_y: i32) -> Self {
        self.offset_cells_x = offset_cells_x;
        self.offset_cells_y = offset_cells_y;
        self
    }

    pub fn grid_size(&self) -> GridSize {
        GridSize::new(self.grid_width, self.grid_height)
    }
}

/// One generation job: shared image bytes plus parameters.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub image: Arc<Vec<u8>>,
    pub params: GenerationParams,
}

/// Aspect-fit placement of the image on the sampling canvas, in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DrawRect {
    pub fn compute(image_width: u32, image_height: u32, params: &GenerationParams) -> Self {
        let multiplier = params.multiplier.max(1) as f64;
        let canvas_w = params.grid_width as f64 * multiplier;
        let canvas_h = params.grid_height as f64 * multiplier;
        let scale = params.scale_percent as f64 / 100.0;

        let img_aspect = image_width as f64 / image_height.max(1) as f64;
        let canvas_aspect = canvas_w / canvas_h.max(1.0);
        let (width, height) = if img_aspect > canvas_aspect {
            let w = canvas_w * scale;
            (w, w / img_aspect)
        } else {
            let h = canvas_h * scale;
            (h * img_aspect, h)
        };

        Self {
            x: (canvas_w - width) / 2.0 + params.offset_cells_x as f64 * multiplier,
            y: (canvas_h - height) / 2.0 + params.offset_cells_y as f64 * multiplier,
            width,
            height,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite()) || self.width <= 0.0 || self.height <= 0.0
    }
}

/// Histogram bin for an RGB sample, plus the sample's vote weight.
pub fn hsv_bin(rgb: Rgb) -> (usize, f64) {
    let hsv = rgb_to_hsv(rgb.r, rgb.g, rgb.b);
    let h_bin = ((hsv.h / 360.0 * HUE_BINS as f32).floor() as usize).min(HUE_BINS - 1);
    let s_bin = ((hsv.s * SAT_BINS as f32).floor() as usize).min(SAT_BINS - 1);
    let v_bin = ((hsv.v * VAL_BINS as f32).floor() as usize).min(VAL_BINS - 1);
    let weight = 0.7 + 0.3 * hsv.s as f64;
    (h_bin * SAT_BINS * VAL_BINS + s_bin * VAL_BINS + v_bin, weight)
}

/// Per-cell vote accumulator. Only touched bins are reset between cells.
struct Histogram {
    weight: Vec<f64>,
    sum_r: Vec<f64>,
    sum_g: Vec<f64>,
    sum_b: Vec<f64>,
    touched: Vec<usize>,
}

impl Histogram {
    fn new() -> Self {
        Self {
            weight: vec![0.0; BIN_COUNT],
            sum_r: vec![0.0; BIN_COUNT],
            sum_g: vec![0.0; BIN_COUNT],
            sum_b: vec![0.0; BIN_COUNT],
            touched: Vec::with_capacity(64),
        }
    }

    fn add(&mut self, rgb: Rgb) {
        let (bin, w) = hsv_bin(rgb);
        if self.weight[bin] == 0.0 {
            self.touched.push(bin);
        }
        self.weight[bin] += w;
        self.sum_r[bin] += rgb.r as f64 * w;
        self.sum_g[bin] += rgb.g as f64 * w;
        self.sum_b[bin] += rgb.b as f64 * w;
    }

    /// Average color of the heaviest bin; the lowest bin index wins exact ties.
    fn dominant(&self) -> Option<Rgb> {
        let mut best: Option<(usize, f64)> = None;
        for &bin in &self.touched {
            let w = self.weight[bin];
            best = match best {
                Some((best_bin, best_w)) if best_w > w || (best_w == w && best_bin < bin) => {
                    Some((best_bin, best_w))
                }
                _ => Some((bin, w)),
            };
        }
        let (bin, w) = best?;
        Some(Rgb::from_channels(
            self.sum_r[bin] / w,
            self.sum_g[bin] / w,
            self.sum_b[bin] / w,
        ))
    }

    fn clear(&mut self) {
        for bin in self.touched.drain(..) {
            self.weight[bin] = 0.0;
            self.sum_r[bin] = 0.0;
            self.sum_g[bin] = 0.0;
            self.sum_b[bin] = 0.0;
        }
    }
}

/// Source span under every canvas column (or row), `None` when the sample
/// center falls outside the image. Spans narrower than one source pixel
/// collapse to the nearest pixel.
fn axis_map(canvas_len: usize, start: f64, extent: f64, source_len: u32) -> Vec<Option<Range<u32>>> {
    let per_px = source_len as f64 / extent;
    let last = source_len.saturating_sub(1);
    (0..canvas_len)
        .map(|px| {
            let u = (px as f64 + 0.5 - start) / extent;
            if !(0.0..1.0).contains(&u) {
                return None;
            }
            let nearest = ((u * source_len as f64).floor() as u32).min(last);
            let lo = ((px as f64 - start) * per_px + FOOTPRINT_EPSILON).floor().max(0.0) as u32;
            let hi = ((px as f64 + 1.0 - start) * per_px - FOOTPRINT_EPSILON)
                .ceil()
                .max(0.0) as u32;
            let hi = hi.min(source_len);
            if hi <= lo.saturating_add(1) {
                Some(nearest..nearest + 1)
            } else {
                Some(lo..hi)
            }
        })
        .collect()
}

/// Alpha-weighted color and mean alpha of a source block; `None` if fully transparent.
fn sample_block(image: &RgbaImage, xs: &Range<u32>, ys: &Range<u32>) -> Option<(Rgb, u8)> {
    let (mut sum_a, mut sum_r, mut sum_g, mut sum_b, mut count) = (0u64, 0u64, 0u64, 0u64, 0u64);
    for y in ys.clone() {
        for x in xs.clone() {
            let px = image.get_pixel(x, y);
            let a = px[3] as u64;
            sum_a += a;
            sum_r += px[0] as u64 * a;
            sum_g += px[1] as u64 * a;
            sum_b += px[2] as u64 * a;
            count += 1;
        }
    }
    if sum_a == 0 {
        return None;
    }
    let a = sum_a as f64;
    let rgb = Rgb::from_channels(sum_r as f64 / a, sum_g as f64 / a, sum_b as f64 / a);
    Some((rgb, (a / count as f64).round() as u8))
}

#[derive(Debug, Clone)]
pub struct PatternGenerator {
    alpha_threshold: u8,
}

impl Default for PatternGenerator {
    fn default() -> Self {
        Self::new(&GenerationConfig::default())
    }
}

impl PatternGenerator {
    pub fn new(config: &GenerationConfig) -> Self {
        Self {
            alpha_threshold: config.alpha_threshold,
        }
    }

    pub fn alpha_threshold(&self) -> u8 {
        self.alpha_threshold
    }

    /// Vote every cell from a decoded image.
    ///
    /// Returns `None` only when `cancel` was raised before the last row finished.
    pub fn generate_from_rgba(
        &self,
        image: &RgbaImage,
        params: &GenerationParams,
        cancel: &AtomicBool,
    ) -> Option<Grid> {
        let size = params.grid_size();
        let mut grid = Grid::empty(size);
        if !size.is_valid() || image.width() == 0 || image.height() == 0 {
            return Some(grid);
        }

        let multiplier = params.multiplier.max(1) as usize;
        let rect = DrawRect::compute(image.width(), image.height(), params);
        if rect.is_degenerate() {
            return Some(grid);
        }

        let cols = axis_map(size.width * multiplier, rect.x, rect.width, image.width());
        let rows = axis_map(size.height * multiplier, rect.y, rect.height, image.height());
        let alpha_threshold = self.alpha_threshold;

        let voted: Option<Vec<Vec<Cell>>> = (0..size.height)
            .into_par_iter()
            .map(|cy| {
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }
                let mut histogram = Histogram::new();
                let row_maps = &rows[cy * multiplier..(cy + 1) * multiplier];
                let mut out = Vec::with_capacity(size.width);
                for cx in 0..size.width {
                    let col_maps = &cols[cx * multiplier..(cx + 1) * multiplier];
                    for ys in row_maps.iter().flatten() {
                        for xs in col_maps.iter().flatten() {
                            match sample_block(image, xs, ys) {
                                Some((rgb, alpha)) if alpha > alpha_threshold => histogram.add(rgb),
                                _ => {}
                            }
                        }
                    }
                    out.push(histogram.dominant().map(Cell::Color).unwrap_or_default());
                    histogram.clear();
                }
                Some(out)
            })
            .collect();

        for (y, row) in voted?.into_iter().enumerate() {
            for (x, cell) in row.into_iter().enumerate() {
                grid.set(y, x, cell);
            }
        }
        Some(grid)
    }

    /// Decode `bytes` and generate. Decode failures are reported as [`PatternError::Decode`].
    pub fn generate(&self, bytes: &[u8], params: &GenerationParams) -> Result<Grid> {
        self.generate_cancellable(bytes, params, &AtomicBool::new(false))
            .map(|grid| grid.unwrap_or_else(|| Grid::empty(params.grid_size())))
    }

    pub(crate) fn generate_cancellable(
        &self,
        bytes: &[u8],
        params: &GenerationParams,
        cancel: &AtomicBool,
    ) -> Result<Option<Grid>> {
        if !params.grid_size().is_valid() {
            return Err(PatternError::Validation(format!(
                "grid size {}x{} must be positive",
                params.grid_width, params.grid_height
            )));
        }

        let total_start = Instant::now();
        let decode_start = Instant::now();
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| PatternError::Decode(e.to_string()))?
            .to_rgba8();
        let decode_ms = decode_start.elapsed().as_millis();

        let vote_start = Instant::now();
        let grid = self.generate_from_rgba(&decoded, params, cancel);
        let vote_ms = vote_start.elapsed().as_millis();

        if debug_timing_enabled() {
            log::debug!(
                "Generation timing grid={}x{} multiplier={} image={}x{} decode={}ms vote={}ms total={}ms",
                params.grid_width,
                params.grid_height,
                params.multiplier,
                decoded.width(),
                decoded.height(),
                decode_ms,
                vote_ms,
                total_start.elapsed().as_millis()
            );
        }
        Ok(grid)
    }

    /// Like [`generate`](Self::generate) but never fails: errors become an
    /// all-Empty grid of the requested size, and are logged.
    pub fn generate_or_empty(&self, bytes: &[u8], params: &GenerationParams) -> Grid {
        match self.generate(bytes, params) {
            Ok(grid) => grid,
            Err(err) => {
                log::error!("Pattern generation failed: {}", err);
                Grid::empty(params.grid_size())
            }
        }
    }
}

/// Generate with default settings.
pub fn generate_pattern(bytes: &[u8], params: &GenerationParams) -> Result<Grid> {
    PatternGenerator::default().generate(bytes, params)
}

pub fn generate_pattern_from_path(path: impl AsRef<Path>, params: &GenerationParams) -> Result<Grid> {
    let bytes = std::fs::read(path.as_ref())?;
    generate_pattern(&bytes, params)
}

/// Hex SHA-256 of the raw image bytes.
pub fn image_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Cache key for a request: image digest plus every parameter that affects the output.
pub fn request_cache_key(image_digest: &str, params: &GenerationParams, alpha_threshold: u8) -> String {
    let mut hasher = Sha256::new();
    hasher.update([GENERATOR_CACHE_VERSION]);
    hasher.update(image_digest.as_bytes());
    hasher.update(params.scale_percent.to_le_bytes());
    hasher.update((params.grid_width as u64).to_le_bytes());
    hasher.update((params.grid_height as u64).to_le_bytes());
    hasher.update(params.multiplier.to_le_bytes());
    hasher.update(params.offset_cells_x.to_le_bytes());
    hasher.update(params.offset_cells_y.to_le_bytes());
    hasher.update([alpha_threshold]);
    format!("{:x}", hasher.finalize())
}
