//! Byte classification for the control-byte scrubber.
//!
//! Text bytes are printable ASCII, the whole 0x80-0xFF range and a handful of
//! meaningful control codes (bell, backspace, tab, line feed, form feed,
//! carriage return, escape). Control bytes are the remaining codes below 0x20.
//! DEL (0x7F) is neither: it is not removed, but it marks a file as binary.

const MEANINGFUL_CONTROLS: [u8; 7] = [0x07, 0x08, 0x09, 0x0a, 0x0c, 0x0d, 0x1b];

const fn text_table() -> [bool; 256] {
    let mut table = [false; 256];

    let mut byte = 0x20;
    while byte < 0x7f {
        table[byte] = true;
        byte += 1;
    }

    let mut byte = 0x80;
    while byte < 0x100 {
        table[byte] = true;
        byte += 1;
    }

    let mut i = 0;
    while i < MEANINGFUL_CONTROLS.len() {
        table[MEANINGFUL_CONTROLS[i] as usize] = true;
        i += 1;
    }

    table
}

static TEXT: [bool; 256] = text_table();

pub fn is_text(byte: u8) -> bool {
    TEXT[byte as usize]
}

/// Bytes the scrubber removes
pub fn is_control(byte: u8) -> bool {
    byte < 0x20 && !is_text(byte)
}

/// Every control byte, ascending
pub fn control_bytes() -> impl Iterator<Item = u8> {
    (0u8..0x20).filter(|b| is_control(*b))
}
