//! HVAC, fan and swing modes
//!
//! Every mode list the climate entity exposes is a subset of one of the
//! canonical lists below, kept in canonical order.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// =============================================================================
// HVAC modes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Auto,
    Cool,
    Dry,
    FanOnly,
    Heat,
    Off,
}

/// Canonical HVAC mode order
pub const HVAC_MODES: [HvacMode; 6] = [
    HvacMode::Auto,
    HvacMode::Cool,
    HvacMode::Dry,
    HvacMode::FanOnly,
    HvacMode::Heat,
    HvacMode::Off,
];

/// Modes the user may pick in the form (`off` is always enabled)
pub const EXTRA_HVAC_MODES: [HvacMode; 5] = [
    HvacMode::Auto,
    HvacMode::Cool,
    HvacMode::Heat,
    HvacMode::Dry,
    HvacMode::FanOnly,
];

pub const DEFAULT_HVAC_MODES: [HvacMode; 3] = [HvacMode::Auto, HvacMode::Cool, HvacMode::Heat];

impl HvacMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HvacMode::Auto => "auto",
            HvacMode::Cool => "cool",
            HvacMode::Dry => "dry",
            HvacMode::FanOnly => "fan_only",
            HvacMode::Heat => "heat",
            HvacMode::Off => "off",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HvacMode::Auto => "Auto",
            HvacMode::Cool => "Cool",
            HvacMode::Dry => "Dry",
            HvacMode::FanOnly => "Fan Only",
            HvacMode::Heat => "Heat",
            HvacMode::Off => "Off",
        }
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HvacMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HVAC_MODES
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

// =============================================================================
// Fan modes
// =============================================================================

/// Fan speeds; the mixed-case names are what the device expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FanMode {
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "Medium-Low")]
    MediumLow,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "Medium-High")]
    MediumHigh,
    #[serde(rename = "high")]
    High,
    #[serde(rename = "Turbo")]
    Turbo,
    #[serde(rename = "Quiet")]
    Quiet,
}

/// Canonical fan mode order
pub const FAN_MODES: [FanMode; 8] = [
    FanMode::Auto,
    FanMode::Low,
    FanMode::MediumLow,
    FanMode::Medium,
    FanMode::MediumHigh,
    FanMode::High,
    FanMode::Turbo,
    FanMode::Quiet,
];

impl FanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FanMode::Auto => "auto",
            FanMode::Low => "low",
            FanMode::MediumLow => "Medium-Low",
            FanMode::Medium => "medium",
            FanMode::MediumHigh => "Medium-High",
            FanMode::High => "high",
            FanMode::Turbo => "Turbo",
            FanMode::Quiet => "Quiet",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FanMode::Auto => "Auto",
            FanMode::Low => "Low",
            FanMode::MediumLow => "Medium-Low",
            FanMode::Medium => "Medium",
            FanMode::MediumHigh => "Medium-High",
            FanMode::High => "High",
            FanMode::Turbo => "Turbo",
            FanMode::Quiet => "Quiet",
        }
    }
}

impl fmt::Display for FanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FAN_MODES
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

// =============================================================================
// Swing modes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingMode {
    Off,
    Vertical,
    Horizontal,
    Both,
}

/// Indexed by `ud + 2 * lr`
pub const SWING_MODES: [SwingMode; 4] = [
    SwingMode::Off,
    SwingMode::Vertical,
    SwingMode::Horizontal,
    SwingMode::Both,
];

impl SwingMode {
    /// Mode from the up/down and left/right swing flags
    pub fn from_flags(up_down: bool, left_right: bool) -> Self {
        SWING_MODES[usize::from(up_down) + 2 * usize::from(left_right)]
    }

    pub fn up_down(&self) -> bool {
        matches!(self, SwingMode::Vertical | SwingMode::Both)
    }

    pub fn left_right(&self) -> bool {
        matches!(self, SwingMode::Horizontal | SwingMode::Both)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SwingMode::Off => "off",
            SwingMode::Vertical => "vertical",
            SwingMode::Horizontal => "horizontal",
            SwingMode::Both => "both",
        }
    }
}

impl fmt::Display for SwingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SWING_MODES
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

// =============================================================================
// Narrowing
// =============================================================================

/// Members of `canonical` that appear in `source`, in canonical order
pub fn sort_by_list<T: PartialEq + Copy>(source: &[T], canonical: &[T]) -> Vec<T> {
    canonical
        .iter()
        .filter(|item| source.contains(item))
        .copied()
        .collect()
}

/// Selected HVAC modes plus `off`, in canonical order
pub fn enabled_hvac_modes(selected: &[HvacMode]) -> Vec<HvacMode> {
    let mut modes = vec![HvacMode::Off];
    modes.extend_from_slice(selected);
    sort_by_list(&modes, &HVAC_MODES)
}

pub fn enabled_fan_modes(selected: &[FanMode]) -> Vec<FanMode> {
    sort_by_list(selected, &FAN_MODES)
}

/// Form labels for the HVAC mode multi-select
pub fn hvac_mode_labels() -> IndexMap<String, String> {
    EXTRA_HVAC_MODES
        .iter()
        .map(|m| (m.as_str().to_string(), m.label().to_string()))
        .collect()
}

/// Form labels for the fan mode multi-select
pub fn fan_mode_labels() -> IndexMap<String, String> {
    FAN_MODES
        .iter()
        .map(|m| (m.as_str().to_string(), m.label().to_string()))
        .collect()
}
