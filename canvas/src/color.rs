//! Stable per-user cursor colours.

#[cfg(test)]
#[path = "color_test.rs"]
mod color_test;

use frames::ANONYMOUS;

/// Map a username to a `#RRGGBB` colour. The same name always yields the
/// same colour on every client.
#[must_use]
pub fn cursor_color(username: &str) -> String {
    let name = if username.is_empty() { ANONYMOUS } else { username };
    let hash = name
        .encode_utf16()
        .fold(0i32, |hash, unit| i32::from(unit).wrapping_add(hash.wrapping_shl(5).wrapping_sub(hash)));
    format!("#{:06X}", hash & 0x00FF_FFFF)
}
