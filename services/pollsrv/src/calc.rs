//! Read-group value calculation
//!
//! A read group combines the two registers at its start location into one
//! 32-bit value. Each result kind carries its own word/byte order.

use tracing::warn;

use crate::codec::{regs_to_f32, regs_to_i32, regs_to_u32, ByteOrder};
use crate::error::CalcError;
use crate::model::{CalculatedValue, ReadGroupSpec, Reading, RegisterKind, ResultKind};

impl ResultKind {
    /// Word/byte order this kind is assembled with on the wire
    ///
    /// Float32 arrives fully byte-reversed relative to the integer kinds.
    pub fn byte_order(&self) -> ByteOrder {
        match self {
            Self::Uint32 | Self::Int32 => ByteOrder::BigEndian,
            Self::Float32 => ByteOrder::LittleEndian,
        }
    }

    /// Decode a register pair (first, second) into a typed value
    pub fn decode(&self, regs: [u16; 2]) -> CalculatedValue {
        let order = self.byte_order();
        match self {
            Self::Uint32 => CalculatedValue::Uint32(regs_to_u32(regs, order)),
            Self::Int32 => CalculatedValue::Int32(regs_to_i32(regs, order)),
            Self::Float32 => CalculatedValue::Float32(regs_to_f32(regs, order)),
        }
    }
}

impl ReadGroupSpec {
    /// Calculate this group's value from a reading
    ///
    /// The reading must cover both registers `[start, start + 1]` and hold
    /// word registers (holding or input).
    pub fn calculate(&self, reading: &Reading) -> Result<CalculatedValue, CalcError> {
        let reading_start = reading.start_location();
        if reading_start > self.start_location {
            return Err(CalcError::WindowTooLate {
                kind: self.result_kind,
                group_start: self.start_location,
                reading_start,
            });
        }

        let reading_end = i64::from(reading_start) + i64::from(reading.count()) - 1;
        let needed = u32::from(self.start_location) + 1;
        if reading_end < i64::from(needed) {
            return Err(CalcError::WindowTooShort {
                kind: self.result_kind,
                group_start: self.start_location,
                needed,
                reading_end,
            });
        }

        match reading.kind() {
            RegisterKind::Holding | RegisterKind::Input => {},
            other => return Err(CalcError::UnsupportedRegisterKind(other)),
        }

        let offset = usize::from(self.start_location - reading_start);
        let values = reading.values();
        Ok(self
            .result_kind
            .decode([values[offset], values[offset + 1]]))
    }
}

/// Run every group addressed to the reading's sensor and store the results
///
/// Failed groups are logged and returned; the reading keeps every value that
/// did calculate.
pub fn apply_read_groups(
    reading: &mut Reading,
    groups: &[ReadGroupSpec],
) -> Vec<(u16, CalcError)> {
    let sensor = reading.sensor();
    let mut failures = Vec::new();
    for group in groups.iter().filter(|g| g.sensor_address == sensor) {
        match group.calculate(reading) {
            Ok(value) => reading.insert_calculated(group.start_location, value),
            Err(e) => {
                warn!(
                    sensor,
                    group_start = group.start_location,
                    "Read group skipped: {}",
                    e
                );
                failures.push((group.start_location, e));
            },
        }
    }
    failures
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::Utc;

    fn reading(kind: RegisterKind, start: u16, values: Vec<u16>) -> Reading {
        Reading::new(1, kind, start, values, Utc::now())
    }

    fn group(start: u16, result_kind: ResultKind) -> ReadGroupSpec {
        ReadGroupSpec {
            sensor_address: 1,
            start_location: start,
            result_kind,
        }
    }

    #[test]
    fn test_uint32_group_inside_window() {
        let r = reading(RegisterKind::Holding, 8, vec![0, 0, 0xEF11, 0xFFDD, 0]);
        let value = group(10, ResultKind::Uint32).calculate(&r).unwrap();
        assert_eq!(value, CalculatedValue::Uint32(0xEF11_FFDD));
    }

    #[test]
    fn test_int32_group_is_signed() {
        let r = reading(RegisterKind::Input, 0, vec![0xFFFF, 0xFFFE]);
        let value = group(0, ResultKind::Int32).calculate(&r).unwrap();
        assert_eq!(value, CalculatedValue::Int32(-2));
    }

    #[test]
    fn test_float32_group() {
        let r = reading(RegisterKind::Holding, 20, vec![0x0020, 0xF147]);
        let value = group(20, ResultKind::Float32).calculate(&r).unwrap();
        assert_eq!(value, CalculatedValue::Float32(123456.0));
    }

    #[test]
    fn test_window_too_late() {
        let r = reading(RegisterKind::Holding, 8, vec![0; 5]);
        let err = group(7, ResultKind::Uint32).calculate(&r).unwrap_err();
        assert!(matches!(err, CalcError::WindowTooLate { .. }));
    }

    #[test]
    fn test_window_too_short() {
        let r = reading(RegisterKind::Holding, 8, vec![0; 5]);
        // Last register of the reading is 12: group at 12 needs 13
        let err = group(12, ResultKind::Uint32).calculate(&r).unwrap_err();
        assert!(matches!(err, CalcError::WindowTooShort { .. }));
        let err = group(13, ResultKind::Float32).calculate(&r).unwrap_err();
        assert!(matches!(err, CalcError::WindowTooShort { .. }));
        // Last usable start
        assert!(group(11, ResultKind::Uint32).calculate(&r).is_ok());
    }

    #[test]
    fn test_empty_reading_is_too_short() {
        let r = reading(RegisterKind::Holding, 0, vec![]);
        let err = group(0, ResultKind::Uint32).calculate(&r).unwrap_err();
        assert!(matches!(err, CalcError::WindowTooShort { .. }));
    }

    #[test]
    fn test_group_at_top_of_address_space() {
        let r = reading(RegisterKind::Holding, u16::MAX, vec![1]);
        let err = group(u16::MAX, ResultKind::Uint32).calculate(&r).unwrap_err();
        assert!(matches!(err, CalcError::WindowTooShort { .. }));
    }

    #[test]
    fn test_coil_reading_rejected() {
        let r = reading(RegisterKind::Coil, 0, vec![1, 0, 1]);
        let err = group(0, ResultKind::Uint32).calculate(&r).unwrap_err();
        assert_eq!(err, CalcError::UnsupportedRegisterKind(RegisterKind::Coil));
        assert!(err.to_string().contains("coil"));
    }

    #[test]
    fn test_apply_read_groups_keeps_successes() {
        let mut r = reading(RegisterKind::Holding, 0, vec![0, 5, 0x0020, 0xF147]);
        let groups = vec![
            group(0, ResultKind::Uint32),
            group(2, ResultKind::Float32),
            group(3, ResultKind::Int32),
            ReadGroupSpec {
                sensor_address: 9,
                start_location: 0,
                result_kind: ResultKind::Uint32,
            },
        ];

        let failures = apply_read_groups(&mut r, &groups);

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 3);
        assert_eq!(r.calculated_values().len(), 2);
        assert_eq!(r.calculated_values()["0"], CalculatedValue::Uint32(5));
        assert_eq!(
            r.calculated_values()["2"],
            CalculatedValue::Float32(123456.0)
        );
    }
}
