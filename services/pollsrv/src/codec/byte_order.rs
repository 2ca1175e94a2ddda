//! Byte order for 32-bit values spread over two registers
//!
//! For registers `[0x1234, 0x5678]`:
//! - `BigEndian`: bytes read as `[0x12, 0x34, 0x56, 0x78]`
//! - `LittleEndian`: bytes read as `[0x78, 0x56, 0x34, 0x12]`

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// First register is the high word
    BigEndian,
    /// Fully reversed, second register's low byte first
    LittleEndian,
}

/// Arrange the four bytes of two registers into a big-endian buffer
fn regs_to_bytes_4(regs: [u16; 2], order: ByteOrder) -> [u8; 4] {
    let [h0, h1] = [regs[0].to_be_bytes(), regs[1].to_be_bytes()];

    match order {
        ByteOrder::BigEndian => [h0[0], h0[1], h1[0], h1[1]],
        ByteOrder::LittleEndian => [h1[1], h1[0], h0[1], h0[0]],
    }
}

pub fn regs_to_u32(regs: [u16; 2], order: ByteOrder) -> u32 {
    u32::from_be_bytes(regs_to_bytes_4(regs, order))
}

pub fn regs_to_i32(regs: [u16; 2], order: ByteOrder) -> i32 {
    i32::from_be_bytes(regs_to_bytes_4(regs, order))
}

pub fn regs_to_f32(regs: [u16; 2], order: ByteOrder) -> f32 {
    f32::from_be_bytes(regs_to_bytes_4(regs, order))
}
