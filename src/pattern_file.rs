use crate::error::{PatternError, Result};
use crate::grid::{Cell, Grid, GridSize};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;

pub const DEFAULT_SCALE: u32 = 100;

/// Persisted pattern document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternFile {
    pub grid_size: GridSize,
    pub scale: u32,
    pub perler_pattern: Grid,
}

/// Strict cell token: `#rrggbb` or `transparent`, no surrounding whitespace.
fn is_cell_token(token: &str) -> bool {
    static CELL_TOKEN: OnceLock<Option<Regex>> = OnceLock::new();
    CELL_TOKEN
        .get_or_init(|| Regex::new(r"^(?:#[0-9a-fA-F]{6}|(?i:transparent))$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(token))
}

impl PatternFile {
    pub fn new(grid: &Grid, scale: u32) -> Self {
        Self {
            grid_size: grid.size(),
            scale,
            perler_pattern: grid.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PatternError::Encode(e.to_string()))
    }

    /// Parse and validate an import payload.
    ///
    /// `perlerPattern` and `gridSize` are required, `scale` falls back to 100.
    /// The pattern must be rectangular and match `gridSize`.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let object = value
            .as_object()
            .ok_or_else(|| PatternError::Validation("expected a JSON object".to_string()))?;

        let size_value = object
            .get("gridSize")
            .filter(|v| !v.is_null())
            .ok_or_else(|| PatternError::Validation("missing gridSize".to_string()))?;
        let rows_value = object
            .get("perlerPattern")
            .filter(|v| !v.is_null())
            .ok_or_else(|| PatternError::Validation("missing perlerPattern".to_string()))?;

        let grid_size = GridSize::deserialize(size_value)
            .map_err(|e| PatternError::Validation(format!("bad gridSize: {}", e)))?;
        if !grid_size.is_valid() {
            return Err(PatternError::Validation(format!(
                "gridSize {}x{} must be positive",
                grid_size.width, grid_size.height
            )));
        }

        let raw_rows = Vec::<Vec<String>>::deserialize(rows_value)
            .map_err(|e| PatternError::Validation(format!("bad perlerPattern: {}", e)))?;
        let rows = raw_rows
            .iter()
            .enumerate()
            .map(|(y, row)| {
                row.iter()
                    .enumerate()
                    .map(|(x, token)| {
                        if !is_cell_token(token) {
                            return Err(PatternError::InvalidColor(format!("{token} at {y},{x}")));
                        }
                        Cell::parse(token)
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        let pattern = Grid::from_rows(rows)?;
        if pattern.size() != grid_size {
            return Err(PatternError::Validation(format!(
                "perlerPattern is {}x{} but gridSize says {}x{}",
                pattern.width(),
                pattern.height(),
                grid_size.width,
                grid_size.height
            )));
        }

        let scale = match object.get("scale") {
            None | Some(Value::Null) => DEFAULT_SCALE,
            Some(v) => v
                .as_u64()
                .filter(|s| *s > 0)
                .map(|s| s.min(u32::MAX as u64) as u32)
                .unwrap_or(DEFAULT_SCALE),
        };

        Ok(Self {
            grid_size,
            scale,
            perler_pattern: pattern,
        })
    }

    pub fn write_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        Ok(())
    }

    pub fn read_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }
}
