//! Escape-sequence aware text helpers.
//!
//! Captured pane buffers keep their SGR escape sequences so previews retain
//! colour. These helpers measure, clip and strip such text by display width.

use unicode_width::UnicodeWidthChar;

const ESC: char = '\x1b';

/// Split `s` into visible characters and escape sequences, calling `f` with
/// `(segment, is_escape)` for each piece in order.
fn scan(s: &str, mut f: impl FnMut(&str, bool) -> bool) {
    let mut rest = s;
    while let Some(c) = rest.chars().next() {
        let len = if c == ESC {
            escape_len(rest)
        } else {
            c.len_utf8()
        };
        let (segment, tail) = rest.split_at(len);
        if !f(segment, c == ESC) {
            return;
        }
        rest = tail;
    }
}

/// Byte length of the escape sequence at the start of `s`.
fn escape_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    match bytes.get(1) {
        // CSI: ESC [ params... final byte in 0x40..=0x7e
        Some(b'[') => bytes[2..]
            .iter()
            .position(|b| (0x40..=0x7e).contains(b))
            .map_or(bytes.len(), |p| p + 3),
        // OSC: terminated by BEL or ESC \
        Some(b']') => {
            let mut i = 2;
            while i < bytes.len() {
                if bytes[i] == 0x07 {
                    return i + 1;
                }
                if bytes[i] == 0x1b && bytes.get(i + 1) == Some(&b'\\') {
                    return i + 2;
                }
                i += 1;
            }
            bytes.len()
        }
        Some(b) if b.is_ascii() => 2,
        _ => 1,
    }
}

/// Display width of `s`, ignoring escape sequences.
pub fn display_width(s: &str) -> usize {
    let mut width = 0;
    scan(s, |segment, escape| {
        if !escape {
            width += segment.chars().map(|c| c.width().unwrap_or(0)).sum::<usize>();
        }
        true
    });
    width
}

/// Remove every escape sequence from `s`.
pub fn strip_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    scan(s, |segment, escape| {
        if !escape {
            out.push_str(segment);
        }
        true
    });
    out
}

/// Clip or pad `s` to exactly `width` display columns.
///
/// Escape sequences are kept. If the line carried any, a reset (`ESC[0m`)
/// is appended so colour does not bleed into the next cell.
pub fn fit(s: &str, width: usize) -> String {
    let mut out = String::with_capacity(s.len() + width);
    let mut used = 0;
    let mut styled = false;
    scan(s, |segment, escape| {
        if escape {
            styled = true;
            out.push_str(segment);
            return true;
        }
        let w = segment.chars().map(|c| c.width().unwrap_or(0)).sum::<usize>();
        if used + w > width {
            return false;
        }
        used += w;
        out.push_str(segment);
        true
    });
    if styled {
        out.push_str("\x1b[0m");
    }
    out.extend(std::iter::repeat_n(' ', width - used));
    out
}

/// SGR foreground sequence for a colour given by name or `#rrggbb`.
///
/// Unknown names yield an empty string (no colouring).
pub fn fg(color: &str) -> String {
    let code = match color.to_ascii_lowercase().as_str() {
        "black" => "30",
        "red" => "31",
        "green" => "32",
        "yellow" => "33",
        "blue" => "34",
        "magenta" => "35",
        "cyan" => "36",
        "white" => "37",
        "default" => "39",
        hex if hex.len() == 7 && hex.starts_with('#') => {
            let channel = |r: std::ops::Range<usize>| u8::from_str_radix(&hex[r], 16).ok();
            return match (channel(1..3), channel(3..5), channel(5..7)) {
                (Some(r), Some(g), Some(b)) => format!("\x1b[38;2;{r};{g};{b}m"),
                _ => String::new(),
            };
        }
        _ => return String::new(),
    };
    format!("\x1b[{code}m")
}
