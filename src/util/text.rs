use std::borrow::Cow;

/// Clamps a string to at most `max_chars` Unicode scalar values.
///
/// Discord measures its length limits (message content, thread names) in
/// characters, not bytes, so slicing happens on a char boundary. Returns
/// `Cow::Borrowed` when the input already fits.
///
/// # Examples
///
/// ```
/// use feedcord::util::clamp_chars;
///
/// assert_eq!(clamp_chars("Short", 10), "Short");
/// assert_eq!(clamp_chars("Hello, world", 5), "Hello");
/// assert_eq!(clamp_chars("日本語のタイトル", 3), "日本語");
/// ```
pub fn clamp_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => Cow::Owned(s[..byte_idx].to_string()),
        None => Cow::Borrowed(s),
    }
}

/// Strips terminal escape sequences and C0 control characters.
///
/// Feed titles are untrusted; this removes ANSI CSI/OSC sequences, bare ESC,
/// DEL and every C0 control except tab, newline and carriage return. Returns
/// `Cow::Borrowed` when nothing needs stripping.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();
    let len = bytes.len();

    if !bytes.iter().any(|&b| is_stripped(b)) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(len);
    let mut i = 0;

    while i < len {
        let b = bytes[i];

        if b == 0x1b {
            if i + 1 < len && bytes[i + 1] == b'[' {
                // CSI: skip parameter/intermediate bytes through the final byte
                i += 2;
                while i < len {
                    let c = bytes[i];
                    i += 1;
                    if (0x40..=0x7e).contains(&c) {
                        break;
                    }
                }
            } else if i + 1 < len && bytes[i + 1] == b']' {
                // OSC: skip through BEL or ST
                i += 2;
                while i < len {
                    if bytes[i] == 0x07 {
                        i += 1;
                        break;
                    }
                    if bytes[i] == 0x1b && i + 1 < len && bytes[i + 1] == b'\\' {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            } else {
                i += 1;
            }
        } else if is_stripped(b) {
            i += 1;
        } else {
            let start = i;
            i += 1;
            while i < len && !is_stripped(bytes[i]) {
                i += 1;
            }
            // Only ASCII control bytes end a run, and those never appear
            // mid-codepoint in UTF-8, so the slice is on char boundaries.
            out.push_str(&s[start..i]);
        }
    }

    Cow::Owned(out)
}

fn is_stripped(b: u8) -> bool {
    b == 0x1b || b == 0x7f || (b < 0x20 && b != 0x09 && b != 0x0a && b != 0x0d)
}
