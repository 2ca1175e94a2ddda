//! Wire payload to register values

/// Pair payload bytes big-endian into 16-bit words
///
/// An odd trailing byte becomes the high byte of a final word with a zero low byte.
pub fn decode_words(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| {
            let hi = pair[0];
            let lo = pair.get(1).copied().unwrap_or(0);
            u16::from_be_bytes([hi, lo])
        })
        .collect()
}

/// Unpack bit-packed coil/discrete payloads, LSB first within each byte
///
/// Produces at most `wanted` values (each 0 or 1), stopping mid-byte if needed.
pub fn decode_bits(bytes: &[u8], wanted: usize) -> Vec<u16> {
    let mut values = Vec::with_capacity(wanted.min(bytes.len() * 8));
    'outer: for byte in bytes {
        for bit in 0..8 {
            if values.len() >= wanted {
                break 'outer;
            }
            values.push(u16::from(byte & (1 << bit) != 0));
        }
    }
    values
}
