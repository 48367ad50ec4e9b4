//! JSON configuration and report helpers.

use std::{
    fs,
    path::{Path, PathBuf},
};

use cvbridge_core::BoardSpec;
use serde::{Deserialize, Serialize};

use crate::result::{CalibrationData, DetectionResult};

#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn load<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T, IoError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn store<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<(), IoError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Input for a multi-view calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Calibration board images, in capture order.
    pub images: Vec<String>,
    #[serde(default)]
    pub board: BoardSpec,
    #[serde(default)]
    pub output_path: Option<String>,
}

impl CalibrationConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        load(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        store(self, path)
    }

    /// Resolve the output report path.
    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("calibration_report.json"))
    }
}

/// Outcome of a calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub backend: String,
    pub board: BoardSpec,
    pub views_total: usize,
    /// Images in which the board was found.
    pub views_found: Vec<String>,
    #[serde(default)]
    pub calibration: Option<CalibrationData>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CalibrationReport {
    pub fn new(backend: &str, board: BoardSpec, views_total: usize) -> Self {
        Self {
            backend: backend.to_owned(),
            board,
            views_total,
            views_found: Vec::new(),
            calibration: None,
            error: None,
        }
    }

    pub fn set_calibration(&mut self, data: CalibrationData) {
        self.calibration = Some(data);
        self.error = None;
    }

    pub fn set_error(&mut self, err: impl std::fmt::Display) {
        self.error = Some(err.to_string());
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        load(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        store(self, path)
    }
}

/// Outcome of marker detection on one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub image_path: String,
    pub backend: String,
    pub width: u32,
    pub height: u32,
    pub detection: DetectionResult,
}

impl DetectionReport {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        load(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        store(self, path)
    }
}
