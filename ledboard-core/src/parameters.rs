//! Live control parameters
//!
//! The board exposes one flat record of tunable values. It is read and
//! written as a whole; there is no per-field protocol.

use serde::{Deserialize, Serialize};

use crate::error::{LedBoardError, Result};

/// Color source for the noise layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Hsl,
    Rgb,
}

/// Inclusive value range of one numeric control parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterRange {
    pub name: &'static str,
    pub min: i32,
    pub max: i32,
}

impl ParameterRange {
    const fn new(name: &'static str, min: i32, max: i32) -> Self {
        Self { name, min, max }
    }

    pub fn contains(&self, value: i32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Ranges of every numeric field, in declaration order.
pub const PARAMETER_RANGES: &[ParameterRange] = &[
    ParameterRange::new("shutter", 0, 255),
    ParameterRange::new("noise_octaves", 1, 6),
    ParameterRange::new("noise_scale", 1, 16),
    ParameterRange::new("noise_scale_x", 0, 500),
    ParameterRange::new("noise_scale_y", 0, 500),
    ParameterRange::new("noise_speed_x", -200, 200),
    ParameterRange::new("noise_speed_y", -200, 200),
    ParameterRange::new("noise_speed_z", -200, 200),
    ParameterRange::new("noise_min", 0, 1024),
    ParameterRange::new("noise_max", 0, 1024),
    ParameterRange::new("noise_h", 0, 255),
    ParameterRange::new("noise_s", 0, 255),
    ParameterRange::new("noise_l", 0, 255),
    ParameterRange::new("noise_r", 0, 255),
    ParameterRange::new("noise_g", 0, 255),
    ParameterRange::new("noise_b", 0, 255),
    ParameterRange::new("runner_h", 0, 255),
    ParameterRange::new("runner_s", 0, 255),
    ParameterRange::new("runner_l", 0, 255),
    ParameterRange::new("runner_r", 0, 255),
    ParameterRange::new("runner_g", 0, 255),
    ParameterRange::new("runner_b", 0, 255),
    ParameterRange::new("mask_x1", -255, 255),
    ParameterRange::new("mask_x2", -255, 255),
    ParameterRange::new("mask_y1", -255, 255),
    ParameterRange::new("mask_y2", -255, 255),
    ParameterRange::new("single_led", -1, 32767),
];

/// Live tunable values of a board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlParameters {
    pub shutter: i32,

    pub noise_octaves: i32,
    pub noise_scale: i32,
    pub noise_scale_x: i32,
    pub noise_scale_y: i32,
    pub noise_speed_x: i32,
    pub noise_speed_y: i32,
    pub noise_speed_z: i32,
    pub noise_min: i32,
    pub noise_max: i32,

    pub color_mode: ColorMode,

    pub noise_h: i32,
    pub noise_s: i32,
    pub noise_l: i32,
    pub noise_r: i32,
    pub noise_g: i32,
    pub noise_b: i32,

    pub runner_h: i32,
    pub runner_s: i32,
    pub runner_l: i32,
    pub runner_r: i32,
    pub runner_g: i32,
    pub runner_b: i32,

    pub runner_trigger: bool,
    pub are_colors_inverted: bool,
    pub is_noise_on: bool,

    // > 0: additive, < 0: multiply
    pub mask_x1: i32,
    pub mask_x2: i32,
    pub mask_y1: i32,
    pub mask_y2: i32,

    /// Index of a single LED to light for scanning, -1 to disable
    pub single_led: i32,
}

impl Default for ControlParameters {
    fn default() -> Self {
        Self {
            shutter: 255,
            noise_octaves: 1,
            noise_scale: 1,
            noise_scale_x: 100,
            noise_scale_y: 100,
            noise_speed_x: 0,
            noise_speed_y: 0,
            noise_speed_z: 0,
            noise_min: 0,
            noise_max: 1024,
            color_mode: ColorMode::Hsl,
            noise_h: 0,
            noise_s: 255,
            noise_l: 127,
            noise_r: 255,
            noise_g: 255,
            noise_b: 255,
            runner_h: 0,
            runner_s: 0,
            runner_l: 255,
            runner_r: 255,
            runner_g: 255,
            runner_b: 255,
            runner_trigger: false,
            are_colors_inverted: false,
            is_noise_on: true,
            mask_x1: 0,
            mask_x2: 0,
            mask_y1: 0,
            mask_y2: 0,
            single_led: -1,
        }
    }
}

impl ControlParameters {
    /// Numeric field values, in the same order as [`PARAMETER_RANGES`].
    fn numeric_values(&self) -> [i32; 27] {
        [
            self.shutter,
            self.noise_octaves,
            self.noise_scale,
            self.noise_scale_x,
            self.noise_scale_y,
            self.noise_speed_x,
            self.noise_speed_y,
            self.noise_speed_z,
            self.noise_min,
            self.noise_max,
            self.noise_h,
            self.noise_s,
            self.noise_l,
            self.noise_r,
            self.noise_g,
            self.noise_b,
            self.runner_h,
            self.runner_s,
            self.runner_l,
            self.runner_r,
            self.runner_g,
            self.runner_b,
            self.mask_x1,
            self.mask_x2,
            self.mask_y1,
            self.mask_y2,
            self.single_led,
        ]
    }

    /// Check every numeric field against its range.
    ///
    /// Fails on the first out-of-range field.
    pub fn validate(&self) -> Result<()> {
        for (range, value) in PARAMETER_RANGES.iter().zip(self.numeric_values()) {
            if !range.contains(value) {
                return Err(LedBoardError::InvalidInput(format!(
                    "{} must be {}..={}, got {}",
                    range.name, range.min, range.max, value
                )));
            }
        }
        Ok(())
    }

    /// Look up the range of a numeric field by name
    pub fn range_of(name: &str) -> Option<&'static ParameterRange> {
        PARAMETER_RANGES.iter().find(|range| range.name == name)
    }
}
