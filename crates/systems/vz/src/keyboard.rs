//! VZ keyboard matrix.
//!
//! Eight rows selected by low address lines A0–A7 (active low), six key
//! columns on D0–D5 (active low), D6 is the cassette input. A read of the
//! keyboard region ANDs together every selected row, so multi-row scans
//! behave like the real hardware.
//!
//! Rows are atomics: the frontend presses and releases keys from its own
//! thread while the worker scans the matrix mid-run.

use std::sync::atomic::{AtomicU8, Ordering};

use retro8_core::{HostKey, InputSink};

/// All six key columns released.
const ROW_IDLE: u8 = 0x3F;
/// Cassette input idles high.
const CASSETTE_BIT: u8 = 0x40;

pub struct VzKeyboard {
    rows: [AtomicU8; 8],
}

impl VzKeyboard {
    pub fn new() -> Self {
        Self {
            rows: [
                AtomicU8::new(ROW_IDLE),
                AtomicU8::new(ROW_IDLE),
                AtomicU8::new(ROW_IDLE),
                AtomicU8::new(ROW_IDLE),
                AtomicU8::new(ROW_IDLE),
                AtomicU8::new(ROW_IDLE),
                AtomicU8::new(ROW_IDLE),
                AtomicU8::new(ROW_IDLE),
            ],
        }
    }

    /// Scan the rows selected by the (active-low) address lines. Bits 0–5
    /// carry the combined key columns, bit 6 the cassette input.
    pub fn read(&self, address: u16) -> u8 {
        let mut columns = ROW_IDLE;
        for (row, bits) in self.rows.iter().enumerate() {
            if address & (1 << row) == 0 {
                columns &= bits.load(Ordering::Acquire);
            }
        }
        CASSETTE_BIT | columns
    }

    /// Release everything, e.g. when the display loses focus.
    pub fn reset(&self) {
        for row in &self.rows {
            row.store(ROW_IDLE, Ordering::Release);
        }
    }

    /// Matrix position (row, column bit) for a host key.
    fn matrix_position(key: HostKey) -> Option<(usize, u8)> {
        use HostKey::*;
        let (row, column) = match key {
            R => (0, 0),
            Q => (0, 1),
            E => (0, 2),
            W => (0, 4),
            T => (0, 5),
            F => (1, 0),
            A => (1, 1),
            D => (1, 2),
            Control => (1, 3),
            S => (1, 4),
            G => (1, 5),
            V => (2, 0),
            Z => (2, 1),
            C => (2, 2),
            LeftShift | RightShift => (2, 3),
            X => (2, 4),
            B => (2, 5),
            Digit4 => (3, 0),
            Digit1 => (3, 1),
            Digit3 => (3, 2),
            Digit2 => (3, 4),
            Digit5 => (3, 5),
            M => (4, 0),
            Space => (4, 1),
            Comma => (4, 2),
            Period => (4, 4),
            N => (4, 5),
            Digit7 => (5, 0),
            Digit0 => (5, 1),
            Digit8 => (5, 2),
            Minus => (5, 3),
            Digit9 => (5, 4),
            Digit6 => (5, 5),
            U => (6, 0),
            P => (6, 1),
            I => (6, 2),
            Enter => (6, 3),
            O => (6, 4),
            Y => (6, 5),
            J => (7, 0),
            Semicolon => (7, 1),
            K => (7, 2),
            Colon => (7, 3),
            L => (7, 4),
            H => (7, 5),
            // No such keys on the VZ.
            _ => return None,
        };
        Some((row, 1 << column))
    }
}

impl Default for VzKeyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSink for VzKeyboard {
    fn key_event(&self, key: HostKey, pressed: bool) {
        if let Some((row, bit)) = Self::matrix_position(key) {
            if pressed {
                self.rows[row].fetch_and(!bit, Ordering::AcqRel);
            } else {
                self.rows[row].fetch_or(bit, Ordering::AcqRel);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_matrix_reads_all_released() {
        let keyboard = VzKeyboard::new();
        // 0x68FE selects row 0 only.
        assert_eq!(keyboard.read(0x68FE), 0x7F);
    }

    #[test]
    fn pressed_key_pulls_its_column_low() {
        let keyboard = VzKeyboard::new();
        keyboard.key_event(HostKey::R, true);

        // R is row 0 column 0, selected when A0 is low.
        assert_eq!(keyboard.read(0x68FE), 0x7E);
        // Other rows are unaffected.
        assert_eq!(keyboard.read(0x68FD), 0x7F);

        keyboard.key_event(HostKey::R, false);
        assert_eq!(keyboard.read(0x68FE), 0x7F);
    }

    #[test]
    fn multi_row_scan_combines_rows() {
        let keyboard = VzKeyboard::new();
        keyboard.key_event(HostKey::R, true); // row 0, bit 0
        keyboard.key_event(HostKey::A, true); // row 1, bit 1

        // Selecting both rows (A0 and A1 low) ANDs the columns.
        assert_eq!(keyboard.read(0x68FC), 0x7C);
    }

    #[test]
    fn reset_releases_everything() {
        let keyboard = VzKeyboard::new();
        keyboard.key_event(HostKey::Enter, true);
        assert_ne!(keyboard.read(0x68BF), 0x7F);

        keyboard.reset();
        assert_eq!(keyboard.read(0x68BF), 0x7F);
    }
}
