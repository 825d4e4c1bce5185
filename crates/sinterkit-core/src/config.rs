//! Machine configuration
//!
//! Serial, motion, and per-motor settings with JSON persistence.
//! Defaults match the stock bench wiring: two platform axes sharing one
//! controller channel and the recoater sweep on its own channel, all at
//! 38400 baud 8N1.

use crate::error::{Result, ValidationError};
use crate::types::{AxisId, ControllerRole, ALL_AXES};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Parity mode for the serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParityMode {
    None,
    Even,
    Odd,
}

/// Serial port settings shared by every controller channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Baud rate (the stages only speak 38400)
    pub baud_rate: u32,
    /// Data bits per character
    pub data_bits: u8,
    /// Parity mode
    pub parity: ParityMode,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// How many times to retry opening a port before giving up
    pub open_retries: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 38_400,
            data_bits: 8,
            parity: ParityMode::None,
            stop_bits: 1,
            open_retries: 3,
        }
    }
}

/// Motion and recoat timing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionSettings {
    /// How long to wait for a single reply line, in milliseconds
    pub reply_timeout_ms: u64,
    /// Delay between status polls while waiting for a stop, in milliseconds
    pub poll_interval_ms: u64,
    /// How many status polls before a move is declared hung
    pub max_poll_attempts: u32,
    /// Layer thickness in millimeters
    pub layer_thickness: f64,
    /// Supply dose multiplier: the powder platform rises by
    /// `layer_thickness * supply_amplifier` each layer
    pub supply_amplifier: f64,
    /// How far the platforms drop to clear the sweep blade, in millimeters
    pub sweep_clearance: f64,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            reply_timeout_ms: 2_000,
            poll_interval_ms: 100,
            max_poll_attempts: 600,
            layer_thickness: 0.1,
            supply_amplifier: 2.0,
            sweep_clearance: 2.0,
        }
    }
}

/// Settings for a single motor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorSettings {
    /// Human-readable motor name, used in logs
    pub name: String,
    /// Serial port the motor's controller hangs off
    pub port: String,
    /// Axis number on that controller (1-based; 0 is reserved for broadcast)
    pub axis: AxisId,
    /// Mechanical role in the powder bed
    pub role: ControllerRole,
    /// Lower soft limit in millimeters
    pub min_position: f64,
    /// Upper soft limit in millimeters
    pub max_position: f64,
    /// Home position in millimeters
    pub home_position: f64,
    /// Travel velocity in millimeters per second
    pub velocity: f64,
}

/// Top-level machine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Serial link settings
    #[serde(default)]
    pub serial: SerialSettings,
    /// Motion and recoat settings
    #[serde(default)]
    pub motion: MotionSettings,
    /// Attached motors
    #[serde(default = "Config::default_motors")]
    pub motors: Vec<MotorSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    fn default_motors() -> Vec<MotorSettings> {
        vec![
            MotorSettings {
                name: "build".to_string(),
                port: "/dev/ttyUSB0".to_string(),
                axis: 1,
                role: ControllerRole::Build,
                min_position: -35.0,
                max_position: 35.0,
                home_position: 0.0,
                velocity: 1.0,
            },
            MotorSettings {
                name: "powder".to_string(),
                port: "/dev/ttyUSB0".to_string(),
                axis: 2,
                role: ControllerRole::Powder,
                min_position: -35.0,
                max_position: 35.0,
                home_position: 0.0,
                velocity: 1.0,
            },
            MotorSettings {
                name: "sweep".to_string(),
                port: "/dev/ttyUSB1".to_string(),
                axis: 1,
                role: ControllerRole::Sweep,
                min_position: 0.0,
                max_position: 260.0,
                home_position: 0.0,
                velocity: 25.0,
            },
        ]
    }

    /// Create a configuration with stock bench defaults.
    pub fn new() -> Self {
        Self {
            serial: SerialSettings::default(),
            motion: MotionSettings::default(),
            motors: Self::default_motors(),
        }
    }

    /// Load configuration from a JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            ValidationError::InvalidConfig {
                reason: format!("{}: {}", path.display(), e),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).map_err(|e| {
            ValidationError::InvalidConfig {
                reason: format!("serialize failed: {}", e),
            }
        })?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| -> Result<()> {
            Err(ValidationError::InvalidConfig { reason }.into())
        };

        if self.serial.baud_rate == 0 {
            return fail("baud_rate must be non-zero".to_string());
        }
        if !(5..=8).contains(&self.serial.data_bits) {
            return fail(format!("data_bits must be 5-8, got {}", self.serial.data_bits));
        }
        if !(1..=2).contains(&self.serial.stop_bits) {
            return fail(format!("stop_bits must be 1 or 2, got {}", self.serial.stop_bits));
        }
        if self.motion.poll_interval_ms == 0 || self.motion.max_poll_attempts == 0 {
            return fail("stop polling needs a non-zero interval and attempt budget".to_string());
        }
        if self.motion.layer_thickness <= 0.0 {
            return fail(format!(
                "layer_thickness must be positive, got {}",
                self.motion.layer_thickness
            ));
        }
        if self.motion.supply_amplifier < 1.0 {
            return fail(format!(
                "supply_amplifier must be at least 1, got {}",
                self.motion.supply_amplifier
            ));
        }

        for motor in &self.motors {
            if motor.axis == ALL_AXES {
                return fail(format!("motor '{}': axis 0 is reserved for broadcast", motor.name));
            }
            if motor.min_position >= motor.max_position {
                return fail(format!(
                    "motor '{}': min_position {} must be below max_position {}",
                    motor.name, motor.min_position, motor.max_position
                ));
            }
            if motor.home_position < motor.min_position || motor.home_position > motor.max_position
            {
                return fail(format!(
                    "motor '{}': home_position {} outside [{}, {}]",
                    motor.name, motor.home_position, motor.min_position, motor.max_position
                ));
            }
            if motor.velocity <= 0.0 {
                return fail(format!("motor '{}': velocity must be positive", motor.name));
            }
        }

        for (i, a) in self.motors.iter().enumerate() {
            for b in &self.motors[i + 1..] {
                if a.port == b.port && a.axis == b.axis {
                    return fail(format!(
                        "motors '{}' and '{}' both claim axis {} on {}",
                        a.name, b.name, a.axis, a.port
                    ));
                }
            }
        }

        Ok(())
    }

    /// Motors attached to a given port, in configuration order.
    pub fn motors_on_port(&self, port: &str) -> Vec<&MotorSettings> {
        self.motors.iter().filter(|m| m.port == port).collect()
    }

    /// Distinct ports in configuration order.
    pub fn ports(&self) -> Vec<&str> {
        let mut ports: Vec<&str> = Vec::new();
        for motor in &self.motors {
            if !ports.contains(&motor.port.as_str()) {
                ports.push(&motor.port);
            }
        }
        ports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.serial.baud_rate, 38_400);
        assert_eq!(config.motors.len(), 3);
    }

    #[test]
    fn ports_are_deduplicated_in_order() {
        let config = Config::new();
        assert_eq!(config.ports(), vec!["/dev/ttyUSB0", "/dev/ttyUSB1"]);
        assert_eq!(config.motors_on_port("/dev/ttyUSB0").len(), 2);
    }

    #[test]
    fn rejects_home_outside_limits() {
        let mut config = Config::new();
        config.motors[0].home_position = 99.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_axis_on_port() {
        let mut config = Config::new();
        config.motors[1].axis = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_broadcast_axis() {
        let mut config = Config::new();
        config.motors[0].axis = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine.json");
        let mut config = Config::new();
        config.motion.layer_thickness = 0.05;
        config.save_to_file(&path).unwrap();
        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
