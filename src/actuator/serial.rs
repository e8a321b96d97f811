// Serial protocol for the swerve module bus.
//
// Each motor controller on the bus is addressed by ID and exposes a small
// register file. Packet format:
//   [0xAA, 0x55, ID, Length, Instruction, Params..., Checksum]
// Responses carry a status byte in place of the instruction.

use std::f64::consts::TAU;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serialport::{self, SerialPort};
use tracing::{debug, info, warn};

use super::{ActuatorError, ModuleActuator};

/// Default serial configuration for the module bus
pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Broadcast address (sync writes, never a motor ID)
pub const BROADCAST_ID: u8 = 0xFE;

/// Packet header bytes
const HEADER: [u8; 2] = [0xAA, 0x55];

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    SyncWrite = 0x53,
}

/// Register addresses on the motor controllers
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    FirmwareVersion = 0x00, // 1 byte, read-only
    MotorId = 0x04,         // 1 byte

    ControlMode = 0x10,  // 1 byte: 0=idle, 1=voltage
    GoalVoltage = 0x12,  // 2 bytes, signed millivolts
    PresentPosition = 0x20, // 4 bytes, signed encoder counts, accumulates
    PresentVelocity = 0x24, // 4 bytes, signed counts/s
    FaultFlags = 0x28,   // 1 byte, read-only
}

/// Control modes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlMode {
    Idle = 0,
    Voltage = 1,
}

/// Error types for module bus communication
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from controller {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for controller {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Controller {id} reports fault flags 0x{flags:02X}")]
    Fault { id: u8, flags: u8 },

    #[error("Timeout waiting for response from controller {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, BusError>;

/// Swerve module bus - serial link shared by all motor controllers.
pub struct SwerveBus {
    port: Box<dyn SerialPort>,
    active_ids: Vec<u8>,
}

impl SwerveBus {
    /// Open a new connection to the module bus
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self {
            port,
            active_ids: Vec::new(),
        })
    }

    /// Calculate checksum for a packet (excluding header)
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    /// Build a packet with header and checksum
    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // instruction + params + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        // Checksum over id, length, instruction, params
        let checksum_data = &packet[2..];
        packet.push(Self::checksum(checksum_data));

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read a response packet, returning its parameter bytes
    fn read_response(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        Self::read_frame(&mut self.port, expected_id)
    }

    /// Read and validate one response frame from `reader`
    fn read_frame(reader: &mut impl Read, expected_id: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        reader.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                BusError::Timeout { id: expected_id }
            } else {
                BusError::Io(e)
            }
        })?;

        if header != HEADER {
            return Err(BusError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        reader.read_exact(&mut id_length)?;
        let id = id_length[0];
        let length = id_length[1] as usize;

        if id != expected_id {
            return Err(BusError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }

        // Shortest legal body is status + checksum
        if length < 2 {
            return Err(BusError::InvalidResponse {
                id,
                reason: format!("Length byte {} too short", length),
            });
        }

        // Remaining bytes: status + params + checksum
        let mut remaining = vec![0u8; length];
        reader.read_exact(&mut remaining)?;

        let mut checksum_data = vec![id, length as u8];
        checksum_data.extend_from_slice(&remaining[..remaining.len() - 1]);
        let expected_checksum = Self::checksum(&checksum_data);
        let received_checksum = remaining[remaining.len() - 1];

        if expected_checksum != received_checksum {
            return Err(BusError::ChecksumMismatch { id });
        }

        let status = remaining[0];
        if status != 0 {
            return Err(BusError::Fault { id, flags: status });
        }

        Ok(remaining[1..remaining.len() - 1].to_vec())
    }

    /// Ping a controller to check if it's on the bus
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        let packet = Self::build_packet(id, Instruction::Ping, &[]);
        self.send_packet(&packet)?;

        match self.read_response(id) {
            Ok(_) => Ok(true),
            Err(BusError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write a single byte to a register
    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        let params = [register as u8, value];
        let packet = Self::build_packet(id, Instruction::Write, &params);
        debug!("Write u8 to controller {}: reg={:?}, value={}", id, register, value);
        self.send_packet(&packet)?;

        let _ = self.read_response(id)?;
        Ok(())
    }

    /// Write a signed 16-bit value (little-endian) to a register
    pub fn write_i16(&mut self, id: u8, register: Register, value: i16) -> Result<()> {
        let bytes = value.to_le_bytes();
        let params = [register as u8, bytes[0], bytes[1]];
        let packet = Self::build_packet(id, Instruction::Write, &params);
        debug!("Write i16 to controller {}: reg={:?}, value={}", id, register, value);
        self.send_packet(&packet)?;

        let _ = self.read_response(id)?;
        Ok(())
    }

    /// Read a single byte from a register
    pub fn read_u8(&mut self, id: u8, register: Register) -> Result<u8> {
        let params = [register as u8, 1]; // address, length
        let packet = Self::build_packet(id, Instruction::Read, &params);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        if response.is_empty() {
            return Err(BusError::InvalidResponse {
                id,
                reason: "Empty response".to_string(),
            });
        }
        Ok(response[0])
    }

    /// Read a signed 32-bit value (little-endian) from a register
    pub fn read_i32(&mut self, id: u8, register: Register) -> Result<i32> {
        let params = [register as u8, 4]; // address, length
        let packet = Self::build_packet(id, Instruction::Read, &params);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        if response.len() < 4 {
            return Err(BusError::InvalidResponse {
                id,
                reason: format!("Expected 4 bytes, got {}", response.len()),
            });
        }
        Ok(i32::from_le_bytes([
            response[0],
            response[1],
            response[2],
            response[3],
        ]))
    }

    /// Sync write: same register on multiple controllers in one packet.
    /// data: [(id, value), ...]
    pub fn sync_write_i16(&mut self, register: Register, data: &[(u8, i16)]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        // [start_addr, bytes_per_id, id1, lo1, hi1, id2, lo2, hi2, ...]
        let mut params = vec![register as u8, 2];
        for &(id, value) in data {
            let bytes = value.to_le_bytes();
            params.push(id);
            params.push(bytes[0]);
            params.push(bytes[1]);
        }

        let packet = Self::build_packet(BROADCAST_ID, Instruction::SyncWrite, &params);
        debug!("Sync write to {} controllers: reg={:?}", data.len(), register);
        self.send_packet(&packet)?;

        // Sync write has no response
        Ok(())
    }

    // === High-level convenience methods ===

    /// Command a motor's output voltage (clamped to the i16 millivolt range)
    pub fn set_voltage(&mut self, id: u8, volts: f64) -> Result<()> {
        self.write_i16(id, Register::GoalVoltage, volts_to_millivolts(volts))
    }

    /// Accumulated encoder position, counts
    pub fn position(&mut self, id: u8) -> Result<i32> {
        self.read_i32(id, Register::PresentPosition)
    }

    /// Encoder velocity, counts/s
    pub fn velocity(&mut self, id: u8) -> Result<i32> {
        self.read_i32(id, Register::PresentVelocity)
    }

    /// Ping every controller, switch it to voltage mode, and zero its output.
    /// Must be called before actuators are handed out.
    pub fn initialize(&mut self, ids: &[u8]) -> Result<()> {
        info!("Initializing module bus controllers {:?}", ids);

        for &id in ids {
            match self.ping(id) {
                Ok(true) => debug!("Controller {} responding", id),
                Ok(false) => {
                    warn!("Controller {} not responding to ping", id);
                    return Err(BusError::Timeout { id });
                }
                Err(e) => return Err(e),
            }
        }

        for &id in ids {
            self.write_u8(id, Register::ControlMode, ControlMode::Voltage as u8)?;
            self.set_voltage(id, 0.0)?;
        }

        self.active_ids = ids.to_vec();
        info!("Module bus initialized");
        Ok(())
    }

    /// Zero every initialized controller's output in one sync write
    pub fn stop_all(&mut self) -> Result<()> {
        let data: Vec<(u8, i16)> = self.active_ids.iter().map(|&id| (id, 0)).collect();
        self.sync_write_i16(Register::GoalVoltage, &data)
    }
}

impl Drop for SwerveBus {
    fn drop(&mut self) {
        // Safety stop for anything we initialized
        if !self.active_ids.is_empty() {
            if let Err(e) = self.stop_all() {
                warn!("Failed to stop controllers on drop: {}", e);
            }
        }
    }
}

fn volts_to_millivolts(volts: f64) -> i16 {
    let mv = (volts * 1000.0).round();
    mv.clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// One module's pair of bus channels, hardware side of the actuator port.
/// The bus is shared across all modules behind a mutex.
pub struct BusActuator {
    bus: Arc<Mutex<SwerveBus>>,
    drive_id: u8,
    turn_id: u8,
    rad_per_count: f64,
}

impl BusActuator {
    pub fn new(bus: Arc<Mutex<SwerveBus>>, drive_id: u8, turn_id: u8, counts_per_rev: f64) -> Self {
        Self {
            bus,
            drive_id,
            turn_id,
            rad_per_count: TAU / counts_per_rev,
        }
    }

    fn with_bus<T>(
        &mut self,
        f: impl FnOnce(&mut SwerveBus) -> Result<T>,
    ) -> std::result::Result<T, ActuatorError> {
        let mut bus = self.bus.lock().map_err(|_| ActuatorError::Poisoned)?;
        Ok(f(&mut bus)?)
    }
}

impl ModuleActuator for BusActuator {
    fn set_drive_output(&mut self, volts: f64) -> std::result::Result<(), ActuatorError> {
        let id = self.drive_id;
        self.with_bus(|bus| bus.set_voltage(id, volts))
    }

    fn set_turn_output(&mut self, volts: f64) -> std::result::Result<(), ActuatorError> {
        let id = self.turn_id;
        self.with_bus(|bus| bus.set_voltage(id, volts))
    }

    fn drive_velocity(&mut self) -> std::result::Result<f64, ActuatorError> {
        let id = self.drive_id;
        let rad_per_count = self.rad_per_count;
        self.with_bus(|bus| Ok(bus.velocity(id)? as f64 * rad_per_count))
    }

    fn turn_angle(&mut self) -> std::result::Result<f64, ActuatorError> {
        let id = self.turn_id;
        let rad_per_count = self.rad_per_count;
        self.with_bus(|bus| Ok(bus.position(id)? as f64 * rad_per_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Response frame as a controller would send it.
    fn reply_frame(id: u8, status: u8, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8;
        let mut frame = vec![HEADER[0], HEADER[1], id, length, status];
        frame.extend_from_slice(params);
        frame.push(SwerveBus::checksum(&frame[2..]));
        frame
    }

    #[test]
    fn test_checksum() {
        // ID=1, Length=4, Instruction=WRITE, Addr=0x12, Data=0, 2
        let data = [1u8, 4, 0x03, 0x12, 0, 2];
        let checksum = SwerveBus::checksum(&data);
        // ~(1+4+3+18+0+2) = ~28 = 227
        assert_eq!(checksum, 227);
    }

    #[test]
    fn test_build_packet() {
        let packet = SwerveBus::build_packet(1, Instruction::Ping, &[]);
        // Header (2) + ID (1) + Length (1) + Instruction (1) + Checksum (1)
        assert_eq!(packet.len(), 6);
        assert_eq!(packet[0], 0xAA);
        assert_eq!(packet[1], 0x55);
        assert_eq!(packet[2], 1); // ID
        assert_eq!(packet[3], 2); // Length (instruction + checksum)
        assert_eq!(packet[4], 0x01); // PING instruction

        // Checksum covers everything after the header
        let expected = SwerveBus::checksum(&packet[2..5]);
        assert_eq!(packet[5], expected);
    }

    #[test]
    fn test_build_sync_write_packet() {
        let params = [Register::GoalVoltage as u8, 2, 1, 0x10, 0x00, 2, 0xF0, 0xFF];
        let packet = SwerveBus::build_packet(BROADCAST_ID, Instruction::SyncWrite, &params);
        assert_eq!(packet[2], BROADCAST_ID);
        assert_eq!(packet[4], Instruction::SyncWrite as u8);
        // Length = instruction + params + checksum
        assert_eq!(packet[3] as usize, params.len() + 2);
    }

    #[test]
    fn test_volts_to_millivolts() {
        assert_eq!(volts_to_millivolts(0.0), 0);
        assert_eq!(volts_to_millivolts(1.5), 1500);
        assert_eq!(volts_to_millivolts(-12.0), -12000);
        // Saturates instead of wrapping
        assert_eq!(volts_to_millivolts(100.0), i16::MAX);
        assert_eq!(volts_to_millivolts(-100.0), i16::MIN);
    }

    #[test]
    fn test_read_frame_returns_params() {
        let frame = reply_frame(2, 0, &(-1000i32).to_le_bytes());
        let mut reader = Cursor::new(frame);
        let params = SwerveBus::read_frame(&mut reader, 2).unwrap();
        assert_eq!(params, (-1000i32).to_le_bytes());
    }

    #[test]
    fn test_undersized_length_byte_is_rejected() {
        // The body must hold at least a status byte and a checksum; a frame
        // claiming less is corrupt and must surface as an error
        for length in [0u8, 1] {
            let mut reader = Cursor::new(vec![0xAA, 0x55, 0x02, length, 0x00]);
            let err = SwerveBus::read_frame(&mut reader, 2).unwrap_err();
            assert!(matches!(err, BusError::InvalidResponse { id: 2, .. }));
        }
    }

    #[test]
    fn test_corrupted_checksum_is_rejected() {
        let mut frame = reply_frame(3, 0, &[0x01]);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        let mut reader = Cursor::new(frame);
        let err = SwerveBus::read_frame(&mut reader, 3).unwrap_err();
        assert!(matches!(err, BusError::ChecksumMismatch { id: 3 }));
    }
}
