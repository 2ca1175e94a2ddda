//! Register codec
//!
//! Pure conversions between wire bytes, 16-bit register words, and the
//! 32-bit values read groups assemble from word pairs.

pub mod byte_order;
pub mod registers;

pub use byte_order::{regs_to_f32, regs_to_i32, regs_to_u32, ByteOrder};
pub use registers::{decode_bits, decode_words};
