//! Modbus RTU serial transport
//!
//! Opens the serial port for each transaction and closes it afterwards, so a
//! device that was unplugged between polls is picked up again on the next one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, error};

use super::traits::{ReadRequest, Transport};
use crate::codec::{decode_bits, decode_words};
use crate::error::TransportError;

/// Max registers per read for word tables (FC 03/04)
pub const MAX_READ_WORDS: u16 = 125;
/// Max registers per read for bit tables (FC 01/02)
pub const MAX_READ_BITS: u16 = 2000;

/// Serial port configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtuConfig {
    /// Serial port path (e.g., "/dev/ttyUSB1", "COM1")
    pub port: String,
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Parity ("None", "Even", "Odd")
    pub parity: String,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Bound on one whole transaction: write plus full response
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RtuConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB1".to_string(),
            baud_rate: 115200,
            data_bits: 8,
            parity: "None".to_string(),
            stop_bits: 1,
            timeout: Duration::from_secs(5),
        }
    }
}

impl RtuConfig {
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.port.is_empty() {
            return Err(TransportError::Unsupported(
                "Port path cannot be empty".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(TransportError::Unsupported(
                "Baud rate must be greater than zero".to_string(),
            ));
        }
        if ![5, 6, 7, 8].contains(&self.data_bits) {
            return Err(TransportError::Unsupported(
                "Data bits must be 5, 6, 7, or 8".to_string(),
            ));
        }
        if ![1, 2].contains(&self.stop_bits) {
            return Err(TransportError::Unsupported(
                "Stop bits must be 1 or 2".to_string(),
            ));
        }
        if !["None", "Even", "Odd"].contains(&self.parity.as_str()) {
            return Err(TransportError::Unsupported(
                "Parity must be None, Even, or Odd".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(TransportError::Unsupported(
                "Timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn parity(&self) -> tokio_serial::Parity {
        match self.parity.as_str() {
            "Even" => tokio_serial::Parity::Even,
            "Odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        }
    }

    fn data_bits(&self) -> tokio_serial::DataBits {
        match self.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        }
    }

    fn stop_bits(&self) -> tokio_serial::StopBits {
        match self.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        }
    }
}

/// Modbus CRC16 (poly 0xA001, init 0xFFFF), sent low byte first
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= u16::from(*byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

fn check_length(request: &ReadRequest) -> Result<(), TransportError> {
    let max = if request.kind.is_bit() {
        MAX_READ_BITS
    } else {
        MAX_READ_WORDS
    };
    if request.length == 0 || request.length > max {
        return Err(TransportError::Unsupported(format!(
            "{} read length {} outside 1..={}",
            request.kind, request.length, max
        )));
    }
    Ok(())
}

/// Build a read request frame: `[slave][fc][start hi lo][qty hi lo][crc lo hi]`
pub fn build_read_frame(request: &ReadRequest) -> Result<Vec<u8>, TransportError> {
    check_length(request)?;

    let mut frame = Vec::with_capacity(8);
    frame.push(request.address);
    frame.push(request.kind.function_code());
    frame.extend_from_slice(&request.start.to_be_bytes());
    frame.extend_from_slice(&request.length.to_be_bytes());
    let crc = crc16_modbus(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Payload byte count a well-formed response to `request` carries
pub fn expected_byte_count(request: &ReadRequest) -> usize {
    let length = usize::from(request.length);
    if request.kind.is_bit() {
        length.div_ceil(8)
    } else {
        length * 2
    }
}

/// Validate a response frame and decode its payload into register values
pub fn parse_read_response(
    request: &ReadRequest,
    frame: &[u8],
) -> Result<Vec<u16>, TransportError> {
    if frame.len() < 5 {
        return Err(TransportError::InvalidFrame(format!(
            "response too short: {} bytes",
            frame.len()
        )));
    }

    let (body, crc_bytes) = frame.split_at(frame.len() - 2);
    let received_crc = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    let computed_crc = crc16_modbus(body);
    if received_crc != computed_crc {
        return Err(TransportError::InvalidFrame(format!(
            "CRC mismatch: received 0x{:04X}, computed 0x{:04X}",
            received_crc, computed_crc
        )));
    }

    if body[0] != request.address {
        return Err(TransportError::InvalidFrame(format!(
            "slave id mismatch: expected {}, got {}",
            request.address, body[0]
        )));
    }

    let function = request.kind.function_code();
    if body[1] == function | 0x80 {
        return Err(TransportError::Exception { code: body[2] });
    }
    if body[1] != function {
        return Err(TransportError::InvalidFrame(format!(
            "function code mismatch: expected 0x{:02X}, got 0x{:02X}",
            function, body[1]
        )));
    }

    let byte_count = usize::from(body[2]);
    let payload = &body[3..];
    if byte_count != payload.len() || byte_count != expected_byte_count(request) {
        return Err(TransportError::InvalidFrame(format!(
            "byte count {} does not match payload {} / expected {}",
            byte_count,
            payload.len(),
            expected_byte_count(request)
        )));
    }

    let values = if request.kind.is_bit() {
        decode_bits(payload, usize::from(request.length))
    } else {
        decode_words(payload)
    };
    Ok(values)
}

fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Serial Modbus RTU transport
#[derive(Debug)]
pub struct RtuTransport {
    config: RtuConfig,
}

impl RtuTransport {
    pub fn new(config: RtuConfig) -> Result<Self, TransportError> {
        config.validate()?;
        Ok(Self { config })
    }

    fn open(&self) -> Result<SerialStream, TransportError> {
        debug!("Opening serial port: {}", self.config.port);
        tokio_serial::new(&self.config.port, self.config.baud_rate)
            .data_bits(self.config.data_bits())
            .parity(self.config.parity())
            .stop_bits(self.config.stop_bits())
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(self.config.timeout)
            .open_native_async()
            .map_err(|e| {
                let msg = format!("Failed to open serial port {}: {e}", self.config.port);
                error!("{msg}");
                TransportError::ConnectionFailed(msg)
            })
    }

    async fn exchange(
        port: &mut SerialStream,
        request: &ReadRequest,
        frame: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        port.write_all(frame)
            .await
            .map_err(|e| TransportError::Io(format!("write failed: {e}")))?;
        port.flush()
            .await
            .map_err(|e| TransportError::Io(format!("flush failed: {e}")))?;
        debug!(hex_data = %hex(frame), direction = "send", "[RTU] Raw packet");

        let normal_len = 3 + expected_byte_count(request) + 2;
        let mut response = Vec::with_capacity(normal_len);
        let mut buf = [0u8; 256];
        loop {
            let n = port
                .read(&mut buf)
                .await
                .map_err(|e| TransportError::Io(format!("read failed: {e}")))?;
            if n == 0 {
                return Err(TransportError::Io("port closed mid-response".to_string()));
            }
            response.extend_from_slice(&buf[..n]);

            // Exception responses are always 5 bytes
            let wanted = if response.len() >= 2 && response[1] & 0x80 != 0 {
                5
            } else {
                normal_len
            };
            if response.len() >= wanted {
                response.truncate(wanted);
                break;
            }
        }
        debug!(hex_data = %hex(&response), direction = "recv", "[RTU] Raw packet");
        Ok(response)
    }
}

#[async_trait]
impl Transport for RtuTransport {
    fn name(&self) -> &str {
        "modbus-rtu"
    }

    async fn read(&mut self, request: ReadRequest) -> Result<Vec<u16>, TransportError> {
        let frame = build_read_frame(&request)?;
        let mut port = self.open()?;

        let response = timeout(
            self.config.timeout,
            Self::exchange(&mut port, &request, &frame),
        )
        .await
        .map_err(|_| {
            TransportError::Timeout(format!(
                "no complete response from {} within {:?}",
                request, self.config.timeout
            ))
        })??;
        // Port closes on drop
        drop(port);

        parse_read_response(&request, &response)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::model::RegisterKind;

    fn with_crc(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        frame.extend_from_slice(&crc16_modbus(body).to_le_bytes());
        frame
    }

    #[test]
    fn test_crc16_known_vector() {
        // Read holding registers, slave 1, start 0, qty 10
        let frame = [0x01, 0x03, 0x00, 0x00, 0x00, 0x0A];
        assert_eq!(crc16_modbus(&frame).to_le_bytes(), [0xC5, 0xCD]);
    }

    #[test]
    fn test_build_read_frame() {
        let request = ReadRequest::new(1, RegisterKind::Holding, 0, 10);
        let frame = build_read_frame(&request).unwrap();
        assert_eq!(frame, vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD]);

        let request = ReadRequest::new(17, RegisterKind::Coil, 0x0013, 37);
        let frame = build_read_frame(&request).unwrap();
        assert_eq!(&frame[..6], &[0x11, 0x01, 0x00, 0x13, 0x00, 0x25]);
    }

    #[test]
    fn test_build_read_frame_rejects_length() {
        let request = ReadRequest::new(1, RegisterKind::Holding, 0, 126);
        assert!(matches!(
            build_read_frame(&request),
            Err(TransportError::Unsupported(_))
        ));
        let request = ReadRequest::new(1, RegisterKind::Input, 0, 0);
        assert!(build_read_frame(&request).is_err());
        let request = ReadRequest::new(1, RegisterKind::Coil, 0, 2000);
        assert!(build_read_frame(&request).is_ok());
    }

    #[test]
    fn test_parse_word_response() {
        let request = ReadRequest::new(1, RegisterKind::Holding, 10, 2);
        let frame = with_crc(&[0x01, 0x03, 0x04, 0x00, 0x20, 0xF1, 0x47]);
        let values = parse_read_response(&request, &frame).unwrap();
        assert_eq!(values, vec![0x0020, 0xF147]);
    }

    #[test]
    fn test_parse_bit_response() {
        let request = ReadRequest::new(2, RegisterKind::InputDiscrete, 0, 10);
        let frame = with_crc(&[0x02, 0x02, 0x02, 0x05, 0x03]);
        let values = parse_read_response(&request, &frame).unwrap();
        assert_eq!(values, vec![1, 0, 1, 0, 0, 0, 0, 0, 1, 1]);
    }

    #[test]
    fn test_parse_exception_response() {
        let request = ReadRequest::new(1, RegisterKind::Input, 0, 1);
        let frame = with_crc(&[0x01, 0x84, 0x02]);
        let err = parse_read_response(&request, &frame).unwrap_err();
        assert!(matches!(err, TransportError::Exception { code: 0x02 }));
    }

    #[test]
    fn test_parse_rejects_bad_frames() {
        let request = ReadRequest::new(1, RegisterKind::Holding, 0, 1);

        let mut frame = with_crc(&[0x01, 0x03, 0x02, 0x00, 0x01]);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(matches!(
            parse_read_response(&request, &frame),
            Err(TransportError::InvalidFrame(_))
        ));

        let frame = with_crc(&[0x02, 0x03, 0x02, 0x00, 0x01]);
        assert!(parse_read_response(&request, &frame).is_err());

        let frame = with_crc(&[0x01, 0x03, 0x04, 0x00, 0x01, 0x00, 0x02]);
        assert!(parse_read_response(&request, &frame).is_err());

        assert!(parse_read_response(&request, &[0x01, 0x03]).is_err());
    }

    #[test]
    fn test_config_defaults_and_validation() {
        let config = RtuConfig::default();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());

        let bad = RtuConfig {
            parity: "Mark".to_string(),
            ..RtuConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[tokio::test]
    async fn test_missing_port_is_connection_failure() {
        let mut transport = RtuTransport::new(RtuConfig {
            port: "/dev/pollsrv-no-such-port".to_string(),
            ..RtuConfig::default()
        })
        .unwrap();
        let err = transport
            .read(ReadRequest::new(1, RegisterKind::Holding, 0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
    }
}
