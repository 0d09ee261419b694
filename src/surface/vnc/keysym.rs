//! X11 keysym lookup for VNC key events.
use crate::errors::{PilotError, PilotResult};

const NAMED_KEYS: &[(&str, u32)] = &[
    ("backspace", 0xff08),
    ("tab", 0xff09),
    ("enter", 0xff0d),
    ("return", 0xff0d),
    ("escape", 0xff1b),
    ("esc", 0xff1b),
    ("delete", 0xffff),
    ("insert", 0xff63),
    ("home", 0xff50),
    ("end", 0xff57),
    ("pageup", 0xff55),
    ("pagedown", 0xff56),
    ("left", 0xff51),
    ("up", 0xff52),
    ("right", 0xff53),
    ("down", 0xff54),
    ("f1", 0xffbe),
    ("f2", 0xffbf),
    ("f3", 0xffc0),
    ("f4", 0xffc1),
    ("f5", 0xffc2),
    ("f6", 0xffc3),
    ("f7", 0xffc4),
    ("f8", 0xffc5),
    ("f9", 0xffc6),
    ("f10", 0xffc7),
    ("f11", 0xffc8),
    ("f12", 0xffc9),
    ("shift", 0xffe1),
    ("ctrl", 0xffe3),
    ("control", 0xffe3),
    ("alt", 0xffe9),
    ("meta", 0xffe7),
    ("super", 0xffeb),
    ("win", 0xffeb),
    ("capslock", 0xffe5),
    ("printscreen", 0xff61),
    ("space", 0x0020),
];

/// Resolve a key name (case-insensitive) or a single character.
pub fn keysym_for_key(key: &str) -> PilotResult<u32> {
    let lower = key.to_ascii_lowercase();
    if let Some((_, sym)) = NAMED_KEYS.iter().find(|(name, _)| *name == lower) {
        return Ok(*sym);
    }
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(keysym_for_char(c)),
        _ => Err(PilotError::UnknownKey(key.to_string())),
    }
}

/// Keysym for a typed character.
pub fn keysym_for_char(c: char) -> u32 {
    match c {
        '\n' | '\r' => 0xff0d,
        '\t' => 0xff09,
        '\u{8}' => 0xff08,
        ' '..='~' | '\u{a0}'..='\u{ff}' => c as u32,
        other => 0x0100_0000 | other as u32,
    }
}
