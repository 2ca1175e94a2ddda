//! Sensor, register and reading data types
//!
//! Wire spellings (`coil`, `inputDiscrete`, `readValues`, ...) are kept stable
//! because persisted readings and schedule state are read back by other tools.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reading timestamp format: second precision, no offset (always UTC)
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Register table a read addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegisterKind {
    /// Read/write single bit (FC 0x01)
    Coil,
    /// Read-only 16-bit word (FC 0x04)
    Input,
    /// Read/write 16-bit word (FC 0x03)
    Holding,
    /// Read-only single bit (FC 0x02)
    InputDiscrete,
}

impl RegisterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coil => "coil",
            Self::Input => "input",
            Self::Holding => "holding",
            Self::InputDiscrete => "inputDiscrete",
        }
    }

    /// Bit-packed kinds carry one boolean per bit on the wire
    pub fn is_bit(&self) -> bool {
        matches!(self, Self::Coil | Self::InputDiscrete)
    }

    /// Modbus read function code for this table
    pub fn function_code(&self) -> u8 {
        match self {
            Self::Coil => 0x01,
            Self::InputDiscrete => 0x02,
            Self::Holding => 0x03,
            Self::Input => 0x04,
        }
    }
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One addressable cell on a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub location: u16,
    #[serde(rename = "type")]
    pub kind: RegisterKind,
}

/// Typed value produced by combining two registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Float32,
    Uint32,
    Int32,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Float32 => "float32",
            Self::Uint32 => "uint32",
            Self::Int32 => "int32",
        };
        f.write_str(name)
    }
}

/// Declares that the two registers at `start_location` form one typed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadGroupSpec {
    pub sensor_address: u8,
    pub start_location: u16,
    #[serde(rename = "resultType")]
    pub result_kind: ResultKind,
}

/// A polled device with its register map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sensor {
    pub address: u8,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub registers: Vec<Register>,
    #[serde(default)]
    pub read_groups: Vec<ReadGroupSpec>,
}

/// Result of a read-group calculation, serialized as a bare number
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CalculatedValue {
    Uint32(u32),
    Int32(i32),
    Float32(f32),
}

/// Raw result of one poll plus any values calculated from it
///
/// `count` always equals the number of values. Readings are built with
/// [`Reading::new`]; stored readings are checked on the way back in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "StoredReading")]
pub struct Reading {
    sensor: u8,
    #[serde(rename = "type")]
    kind: RegisterKind,
    start_location: u16,
    count: u16,
    read_values: Vec<u16>,
    time: String,
    calculated_values: BTreeMap<String, CalculatedValue>,
}

impl Reading {
    pub fn new(
        sensor: u8,
        kind: RegisterKind,
        start_location: u16,
        mut values: Vec<u16>,
        at: DateTime<Utc>,
    ) -> Self {
        // A read window never exceeds the 16-bit register address space
        values.truncate(usize::from(u16::MAX));
        let count = u16::try_from(values.len()).unwrap_or(u16::MAX);
        Self {
            sensor,
            kind,
            start_location,
            count,
            read_values: values,
            time: at.format(TIME_FORMAT).to_string(),
            calculated_values: BTreeMap::new(),
        }
    }

    pub fn sensor(&self) -> u8 {
        self.sensor
    }

    pub fn kind(&self) -> RegisterKind {
        self.kind
    }

    pub fn start_location(&self) -> u16 {
        self.start_location
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn values(&self) -> &[u16] {
        &self.read_values
    }

    pub fn time(&self) -> &str {
        &self.time
    }

    pub fn calculated_values(&self) -> &BTreeMap<String, CalculatedValue> {
        &self.calculated_values
    }

    /// Store a group result under its decimal start location
    pub fn insert_calculated(&mut self, start_location: u16, value: CalculatedValue) {
        self.calculated_values
            .insert(start_location.to_string(), value);
    }
}

/// Reading as found in storage, before its count is checked
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredReading {
    sensor: u8,
    #[serde(rename = "type")]
    kind: RegisterKind,
    start_location: u16,
    count: u16,
    read_values: Vec<u16>,
    time: String,
    #[serde(default)]
    calculated_values: BTreeMap<String, CalculatedValue>,
}

impl TryFrom<StoredReading> for Reading {
    type Error = String;

    fn try_from(stored: StoredReading) -> Result<Self, Self::Error> {
        if usize::from(stored.count) != stored.read_values.len() {
            return Err(format!(
                "reading of sensor {} declares {} values but holds {}",
                stored.sensor,
                stored.count,
                stored.read_values.len()
            ));
        }
        Ok(Self {
            sensor: stored.sensor,
            kind: stored.kind,
            start_location: stored.start_location,
            count: stored.count,
            read_values: stored.read_values,
            time: stored.time,
            calculated_values: stored.calculated_values,
        })
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_register_kind_wire_names() {
        for kind in [
            RegisterKind::Coil,
            RegisterKind::Input,
            RegisterKind::Holding,
            RegisterKind::InputDiscrete,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
            assert_eq!(serde_json::from_str::<RegisterKind>(&json).unwrap(), kind);
        }
        assert!(serde_json::from_str::<RegisterKind>("\"discrete\"").is_err());
    }

    #[test]
    fn test_reading_count_matches_values() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let reading = Reading::new(3, RegisterKind::Holding, 8, vec![1, 2, 3], at);

        assert_eq!(reading.count(), 3);
        assert_eq!(reading.values().len(), 3);
        assert_eq!(reading.time(), "2024-03-01T12:30:05");
    }

    #[test]
    fn test_reading_json_layout() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut reading = Reading::new(1, RegisterKind::Input, 10, vec![0, 7], at);
        reading.insert_calculated(10, CalculatedValue::Uint32(7));

        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["type"], "input");
        assert_eq!(json["startLocation"], 10);
        assert_eq!(json["readValues"], serde_json::json!([0, 7]));
        assert_eq!(json["calculatedValues"]["10"], 7);

        let back: Reading = serde_json::from_value(json).unwrap();
        assert_eq!(back, reading);
    }

    #[test]
    fn test_stored_reading_count_must_match_values() {
        let json = serde_json::json!({
            "sensor": 1,
            "type": "holding",
            "startLocation": 0,
            "count": 3,
            "readValues": [1, 2],
            "time": "2024-03-01T00:00:00",
        });
        let err = serde_json::from_value::<Reading>(json).unwrap_err();
        assert!(err.to_string().contains("declares 3 values but holds 2"));
    }

    #[test]
    fn test_oversized_value_list_keeps_count_consistent() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let values = vec![0; usize::from(u16::MAX) + 5];
        let reading = Reading::new(1, RegisterKind::Holding, 0, values, at);
        assert_eq!(reading.count(), u16::MAX);
        assert_eq!(reading.values().len(), usize::from(reading.count()));
    }

    #[test]
    fn test_sensor_config_deserializes() {
        let yaml = r#"
address: 4
description: boiler
registers:
  - name: temp
    location: 10
    type: holding
readGroups:
  - sensorAddress: 4
    startLocation: 10
    resultType: float32
"#;
        let sensor: Sensor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(sensor.registers[0].kind, RegisterKind::Holding);
        assert_eq!(sensor.read_groups[0].result_kind, ResultKind::Float32);
    }
}
