//! Fixup phase configuration
//!
//! The phase consults a handful of platform facts: how JS values are
//! represented, whether integer division is done in hardware, and how many
//! general purpose registers the backend has. Presets per target are
//! available through [`FixupConfig::for_target`]; a JSON file can name a
//! target and override individual fields.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Target architecture preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetArch {
    #[default]
    X86_64,
    X86,
    Armv7,
    Armv7s,
    Arm64,
    Mips,
}

impl TargetArch {
    pub const ALL: [TargetArch; 6] = [
        TargetArch::X86_64,
        TargetArch::X86,
        TargetArch::Armv7,
        TargetArch::Armv7s,
        TargetArch::Arm64,
        TargetArch::Mips,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TargetArch::X86_64 => "x86_64",
            TargetArch::X86 => "x86",
            TargetArch::Armv7 => "armv7",
            TargetArch::Armv7s => "armv7s",
            TargetArch::Arm64 => "arm64",
            TargetArch::Mips => "mips",
        }
    }
}

impl fmt::Display for TargetArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TargetArch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        TargetArch::ALL
            .into_iter()
            .find(|arch| arch.name() == lower)
            .ok_or_else(|| Error::Config(format!("unknown target architecture '{}'", s)))
    }
}

/// How boxed JS values are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueRepresentation {
    /// NaN-boxed 64-bit values
    JsValue64,
    /// Separate 32-bit tag and payload words
    JsValue32_64,
}

/// Platform facts the fixup phase depends on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixupConfig {
    pub target: TargetArch,
    pub value_representation: ValueRepresentation,
    /// Integer division and modulo have a native instruction
    pub hardware_integer_division: bool,
    /// Registers available to the backend for general purpose values
    pub general_purpose_registers: u32,
    /// Upper bound on unboxing fixpoint sweeps; `None` derives it from the
    /// variable count
    pub max_fixpoint_sweeps: Option<usize>,
}

impl Default for FixupConfig {
    fn default() -> Self {
        Self::for_target(TargetArch::default())
    }
}

/// Fields a config file may set; anything missing comes from the preset
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigOverlay {
    target: Option<TargetArch>,
    value_representation: Option<ValueRepresentation>,
    hardware_integer_division: Option<bool>,
    general_purpose_registers: Option<u32>,
    max_fixpoint_sweeps: Option<usize>,
}

impl FixupConfig {
    /// Preset for a target architecture
    pub fn for_target(target: TargetArch) -> Self {
        let (value_representation, hardware_integer_division, general_purpose_registers) =
            match target {
                TargetArch::X86_64 => (ValueRepresentation::JsValue64, true, 11),
                TargetArch::X86 => (ValueRepresentation::JsValue32_64, true, 6),
                TargetArch::Armv7 => (ValueRepresentation::JsValue32_64, false, 9),
                TargetArch::Armv7s => (ValueRepresentation::JsValue32_64, true, 9),
                TargetArch::Arm64 => (ValueRepresentation::JsValue64, false, 16),
                TargetArch::Mips => (ValueRepresentation::JsValue32_64, false, 7),
            };
        Self {
            target,
            value_representation,
            hardware_integer_division,
            general_purpose_registers,
            max_fixpoint_sweeps: None,
        }
    }

    /// Read a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json(&json)
    }

    /// Parse a JSON config: the named target's preset with the given
    /// fields overridden
    pub fn from_json(json: &str) -> Result<Self> {
        let overlay: ConfigOverlay = serde_json::from_str(json)?;
        let mut config = Self::for_target(overlay.target.unwrap_or_default());
        if let Some(representation) = overlay.value_representation {
            config.value_representation = representation;
        }
        if let Some(hardware) = overlay.hardware_integer_division {
            config.hardware_integer_division = hardware;
        }
        if let Some(registers) = overlay.general_purpose_registers {
            config.general_purpose_registers = registers;
        }
        config.max_fixpoint_sweeps = overlay.max_fixpoint_sweeps;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.general_purpose_registers == 0 {
            return Err(Error::Config(
                "general_purpose_registers must be positive".into(),
            ));
        }
        if self.max_fixpoint_sweeps == Some(0) {
            return Err(Error::Config("max_fixpoint_sweeps must be positive".into()));
        }
        Ok(())
    }

    /// On 32_64 every simple primitive is cheaper unboxed
    pub fn always_unbox_simple_primitives(&self) -> bool {
        self.value_representation == ValueRepresentation::JsValue32_64
    }

    /// Generic indexed accesses speculate a cell base to relieve register
    /// pressure on 32_64
    pub fn speculate_cell_for_generic_access(&self) -> bool {
        self.value_representation == ValueRepresentation::JsValue32_64
    }

    /// String equality needs seven registers in the backend
    pub fn can_specialize_string_equality(&self) -> bool {
        self.general_purpose_registers >= 7
    }

    /// Fixpoint sweep bound for a graph with `variable_count` variables
    pub fn fixpoint_sweep_limit(&self, variable_count: usize) -> usize {
        self.max_fixpoint_sweeps.unwrap_or(variable_count + 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let x64 = FixupConfig::for_target(TargetArch::X86_64);
        assert!(!x64.always_unbox_simple_primitives());
        assert!(x64.hardware_integer_division);
        assert!(x64.can_specialize_string_equality());

        let x86 = FixupConfig::for_target(TargetArch::X86);
        assert!(x86.always_unbox_simple_primitives());
        assert!(!x86.can_specialize_string_equality());

        let armv7 = FixupConfig::for_target(TargetArch::Armv7);
        assert!(!armv7.hardware_integer_division);
    }

    #[test]
    fn test_from_json_overlays_preset() {
        let config =
            FixupConfig::from_json(r#"{"target": "armv7", "hardware_integer_division": true}"#)
                .unwrap();
        assert_eq!(config.target, TargetArch::Armv7);
        assert!(config.hardware_integer_division);
        assert_eq!(config.value_representation, ValueRepresentation::JsValue32_64);
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        assert!(matches!(
            FixupConfig::from_json(r#"{"registers": 4}"#),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_from_json_rejects_zero_sweeps() {
        assert!(matches!(
            FixupConfig::from_json(r#"{"max_fixpoint_sweeps": 0}"#),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_target_from_str() {
        assert_eq!("ARM64".parse::<TargetArch>().unwrap(), TargetArch::Arm64);
        assert!("sparc".parse::<TargetArch>().is_err());
    }

    #[test]
    fn test_sweep_limit() {
        let config = FixupConfig::default();
        assert_eq!(config.fixpoint_sweep_limit(3), 5);
    }
}
