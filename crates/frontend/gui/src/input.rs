//! Host key translation for the minifb window.

use minifb::Key;
use retro8_core::HostKey;

/// Map a minifb key to the emulator's host key space. Keys with no machine
/// meaning translate to `None` and are dropped.
pub fn translate(key: Key) -> Option<HostKey> {
    let host = match key {
        Key::A => HostKey::A,
        Key::B => HostKey::B,
        Key::C => HostKey::C,
        Key::D => HostKey::D,
        Key::E => HostKey::E,
        Key::F => HostKey::F,
        Key::G => HostKey::G,
        Key::H => HostKey::H,
        Key::I => HostKey::I,
        Key::J => HostKey::J,
        Key::K => HostKey::K,
        Key::L => HostKey::L,
        Key::M => HostKey::M,
        Key::N => HostKey::N,
        Key::O => HostKey::O,
        Key::P => HostKey::P,
        Key::Q => HostKey::Q,
        Key::R => HostKey::R,
        Key::S => HostKey::S,
        Key::T => HostKey::T,
        Key::U => HostKey::U,
        Key::V => HostKey::V,
        Key::W => HostKey::W,
        Key::X => HostKey::X,
        Key::Y => HostKey::Y,
        Key::Z => HostKey::Z,
        Key::Key0 => HostKey::Digit0,
        Key::Key1 => HostKey::Digit1,
        Key::Key2 => HostKey::Digit2,
        Key::Key3 => HostKey::Digit3,
        Key::Key4 => HostKey::Digit4,
        Key::Key5 => HostKey::Digit5,
        Key::Key6 => HostKey::Digit6,
        Key::Key7 => HostKey::Digit7,
        Key::Key8 => HostKey::Digit8,
        Key::Key9 => HostKey::Digit9,
        Key::Enter => HostKey::Enter,
        Key::Space => HostKey::Space,
        Key::LeftShift => HostKey::LeftShift,
        Key::RightShift => HostKey::RightShift,
        Key::LeftCtrl | Key::RightCtrl => HostKey::Control,
        Key::Comma => HostKey::Comma,
        Key::Period => HostKey::Period,
        Key::Semicolon => HostKey::Semicolon,
        Key::Apostrophe => HostKey::Colon,
        Key::Minus => HostKey::Minus,
        Key::Backspace => HostKey::Backspace,
        Key::Up => HostKey::Up,
        Key::Down => HostKey::Down,
        Key::Left => HostKey::Left,
        Key::Right => HostKey::Right,
        _ => return None,
    };
    Some(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_and_digits_translate() {
        assert_eq!(translate(Key::A), Some(HostKey::A));
        assert_eq!(translate(Key::Key0), Some(HostKey::Digit0));
        assert_eq!(translate(Key::Enter), Some(HostKey::Enter));
    }

    #[test]
    fn function_keys_do_not_translate() {
        assert_eq!(translate(Key::F1), None);
        assert_eq!(translate(Key::F12), None);
    }
}
