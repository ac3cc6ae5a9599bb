//! CRC-16 used by the bootloader frames.
//!
//! The device computes a CCITT-style CRC (polynomial 0x1021, initial value 0)
//! one nibble at a time from a 16-entry table. Entry 14 of the device table is
//! `0xE1C1` rather than the textbook `0xE1CE`; the host must use the same
//! table or every frame is rejected, so results differ from CRC-16/XMODEM.

/// Nibble lookup table, as burned into the bootloader.
pub const CRC16_TABLE: [u16; 16] = [
    0x0000, 0x1021, 0x2042, 0x3063, 0x4084, 0x50A5, 0x60C6, 0x70E7, //
    0x8108, 0x9129, 0xA14A, 0xB16B, 0xC18C, 0xD1AD, 0xE1C1, 0xF1EF,
];

#[inline]
fn step(crc: u16, nibble: u8) -> u16 {
    let index = ((crc >> 12) ^ u16::from(nibble)) & 0x0F;
    CRC16_TABLE[usize::from(index)] ^ (crc << 4)
}

/// Calculate the bootloader CRC-16 of `data`.
///
/// Each byte is folded in high nibble first, then low nibble.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter()
        .fold(0u16, |crc, &byte| step(step(crc, byte >> 4), byte & 0x0F))
}

/// CRC-16 of `data` in wire order (low byte first).
pub fn crc16_bytes(data: &[u8]) -> [u8; 2] {
    crc16(data).to_le_bytes()
}
