//! Device feature flags exposed as switches

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device::StateDelta;

/// A feature flag of the air conditioner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Lights,
    Health,
    Powersave,
    Sleep,
    Xfan,
    Eightdegheat,
    Air,
}

pub const FEATURES: [Feature; 7] = [
    Feature::Lights,
    Feature::Health,
    Feature::Powersave,
    Feature::Sleep,
    Feature::Xfan,
    Feature::Eightdegheat,
    Feature::Air,
];

pub const DEFAULT_FEATURES: [Feature; 3] = [Feature::Lights, Feature::Health, Feature::Sleep];

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Lights => "lights",
            Feature::Health => "health",
            Feature::Powersave => "powersave",
            Feature::Sleep => "sleep",
            Feature::Xfan => "xfan",
            Feature::Eightdegheat => "eightdegheat",
            Feature::Air => "air",
        }
    }

    /// Entity name shown after the device name
    pub fn label(&self) -> &'static str {
        match self {
            Feature::Lights => "Lights",
            Feature::Health => "Health",
            Feature::Powersave => "Power Save",
            Feature::Sleep => "Sleep",
            Feature::Xfan => "X-Fan",
            Feature::Eightdegheat => "8°C Heat",
            Feature::Air => "Air",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Feature::Lights => "mdi:lightbulb-on-10",
            Feature::Health => "mdi:pine-tree-variant-outline",
            Feature::Powersave => "mdi:leaf-circle-outline",
            Feature::Sleep => "mdi:power-sleep",
            Feature::Xfan => "mdi:tumble-dryer",
            Feature::Eightdegheat => "mdi:dice-d8-outline",
            Feature::Air => "mdi:weather-dust",
        }
    }

    /// Device option holding the current flag
    pub fn option_key(&self) -> &'static str {
        match self {
            Feature::Lights => "Lig",
            Feature::Health => "Health",
            Feature::Powersave => "SvSt",
            Feature::Sleep => "SwhSlp",
            Feature::Xfan => "Blo",
            Feature::Eightdegheat => "StHt",
            Feature::Air => "Air",
        }
    }

    /// Options written to switch the flag
    pub fn payload(&self, on: bool) -> StateDelta {
        let value = i64::from(on);
        let mut delta = StateDelta::new();
        delta.insert(self.option_key().to_string(), value);
        if *self == Feature::Sleep {
            delta.insert("SlpMod".to_string(), value);
        }
        delta
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
