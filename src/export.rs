//! Bead-board raster export.
//!
//! [`bead_circles`] is the geometry contract any renderer can use; the PNG
//! renderer here is one consumer of it.

use crate::color::Rgb;
use crate::config::ExportConfig;
use crate::error::{PatternError, Result};
use crate::grid::Grid;
use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut};
use serde::Serialize;
use std::io::Cursor;
use std::path::Path;

/// One non-Empty cell as a circle in output pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeadCircle {
    pub row: usize,
    pub col: usize,
    pub center_x: f32,
    pub center_y: f32,
    pub radius: f32,
    pub color: Rgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportLayout {
    pub cell_px: u32,
    pub padding: u32,
    pub width: u32,
    pub height: u32,
}

impl ExportLayout {
    pub fn for_grid(grid: &Grid, config: &ExportConfig) -> Self {
        let cell_px = config.cell_px.max(2);
        Self {
            cell_px,
            padding: config.padding,
            width: grid.width() as u32 * cell_px + config.padding * 2,
            height: grid.height() as u32 * cell_px + config.padding * 2,
        }
    }

    /// Bead radius: half a cell minus a 1px gap.
    pub fn radius(&self) -> f32 {
        (self.cell_px as f32 / 2.0 - 1.0).max(0.5)
    }

    pub fn cell_center(&self, row: usize, col: usize) -> (f32, f32) {
        let half = self.cell_px as f32 / 2.0;
        (
            self.padding as f32 + col as f32 * self.cell_px as f32 + half,
            self.padding as f32 + row as f32 * self.cell_px as f32 + half,
        )
    }
}

pub fn bead_circles(grid: &Grid, config: &ExportConfig) -> Vec<BeadCircle> {
    let layout = ExportLayout::for_grid(grid, config);
    let radius = layout.radius();
    grid.rows()
        .enumerate()
        .flat_map(|(row, cells)| {
            cells.iter().enumerate().filter_map(move |(col, cell)| {
                let color = cell.color()?;
                let (center_x, center_y) = layout.cell_center(row, col);
                Some(BeadCircle {
                    row,
                    col,
                    center_x,
                    center_y,
                    radius,
                    color,
                })
            })
        })
        .collect()
}

fn rgba(color: Rgb) -> Rgba<u8> {
    Rgba([color.r, color.g, color.b, 255])
}

fn ring_color(color: Rgb) -> Rgb {
    Rgb::from_channels(
        color.r as f64 * 0.75,
        color.g as f64 * 0.75,
        color.b as f64 * 0.75,
    )
}

pub fn render_image(grid: &Grid, config: &ExportConfig) -> RgbaImage {
    let layout = ExportLayout::for_grid(grid, config);
    let mut canvas = RgbaImage::from_pixel(layout.width, layout.height, rgba(config.background));
    for bead in bead_circles(grid, config) {
        let center = (bead.center_x.floor() as i32, bead.center_y.floor() as i32);
        let radius = bead.radius.floor() as i32;
        draw_filled_circle_mut(&mut canvas, center, radius, rgba(bead.color));
        if config.border {
            draw_hollow_circle_mut(&mut canvas, center, radius, rgba(ring_color(bead.color)));
        }
    }
    canvas
}

pub fn render_png(grid: &Grid, config: &ExportConfig) -> Result<Vec<u8>> {
    let canvas = render_image(grid, config);
    let mut bytes = Vec::new();
    canvas
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| PatternError::Encode(e.to_string()))?;
    Ok(bytes)
}

pub fn write_png(grid: &Grid, config: &ExportConfig, path: impl AsRef<Path>) -> Result<()> {
    std::fs::write(path.as_ref(), render_png(grid, config)?)?;
    Ok(())
}
