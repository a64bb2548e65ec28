//! DATA body encoding.

/// Encodes a message for transmission after a 354 reply.
///
/// CRLF, bare LF and bare CR all end a line and are written as CRLF. Every
/// line starting with `.` gets an extra leading `.` (RFC 5321 section 4.5.2),
/// and the `.` terminator line is appended. A trailing line break in
/// `message` does not produce an extra blank line.
#[must_use]
pub fn encode_data(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + message.len() / 64 + 5);
    let mut line_start = true;

    let mut bytes = message.iter().copied().peekable();
    while let Some(byte) = bytes.next() {
        match byte {
            b'\r' | b'\n' => {
                if byte == b'\r' {
                    bytes.next_if_eq(&b'\n');
                }
                out.extend_from_slice(b"\r\n");
                line_start = true;
            }
            _ => {
                if line_start && byte == b'.' {
                    out.push(b'.');
                }
                out.push(byte);
                line_start = false;
            }
        }
    }

    if !line_start {
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lone_dot_line_is_stuffed() {
        let encoded = encode_data(b"Subject: hi\r\n\r\n.\r\nbye\r\n");
        assert_eq!(encoded, b"Subject: hi\r\n\r\n..\r\nbye\r\n.\r\n");
    }

    #[test]
    fn test_leading_dots_are_stuffed() {
        let encoded = encode_data(b".hidden\r\n..two\r\nend");
        assert_eq!(encoded, b"..hidden\r\n...two\r\nend\r\n.\r\n");
    }

    #[test]
    fn test_bare_lf_is_normalized() {
        let encoded = encode_data(b"a\nb\n");
        assert_eq!(encoded, b"a\r\nb\r\n.\r\n");
    }

    #[test]
    fn test_bare_cr_is_normalized() {
        assert_eq!(encode_data(b"a\rb"), b"a\r\nb\r\n.\r\n");
        assert_eq!(encode_data(b"a\r.\r"), b"a\r\n..\r\n.\r\n");
    }

    #[test]
    fn test_missing_final_newline() {
        assert_eq!(encode_data(b"body"), b"body\r\n.\r\n");
    }

    #[test]
    fn test_empty_message() {
        assert_eq!(encode_data(b""), b".\r\n");
    }

    #[test]
    fn test_trailing_blank_line_kept() {
        assert_eq!(encode_data(b"a\r\n\r\n"), b"a\r\n\r\n.\r\n");
    }

    /// Reverses the wire encoding the way a relay would.
    fn unstuff(wire: &[u8]) -> Option<Vec<Vec<u8>>> {
        let text = wire.strip_suffix(b".\r\n")?;
        if text.is_empty() {
            return Some(Vec::new());
        }
        let text = text.strip_suffix(b"\r\n")?;
        let mut lines = Vec::new();
        let mut rest = text;
        loop {
            let (line, tail) = match rest.windows(2).position(|w| w == b"\r\n") {
                Some(i) => (&rest[..i], Some(&rest[i + 2..])),
                None => (rest, None),
            };
            if line == b"." {
                return None;
            }
            lines.push(line.strip_prefix(b".").unwrap_or(line).to_vec());
            match tail {
                Some(t) => rest = t,
                None => break,
            }
        }
        Some(lines)
    }

    proptest! {
        #[test]
        fn terminator_only_at_end(body in "[a-z.\r\n]{0,64}") {
            let encoded = encode_data(body.as_bytes());
            prop_assert!(encoded.ends_with(b".\r\n"));

            let data = &encoded[..encoded.len() - 3];
            prop_assert!(!data.windows(5).any(|w| w == b"\r\n.\r\n"));
            prop_assert!(!data.starts_with(b".\r\n"));
        }

        #[test]
        fn lines_survive_unstuffing(lines in proptest::collection::vec("[a-z.]{0,8}", 1..8)) {
            let body = lines.join("\r\n");
            let decoded = unstuff(&encode_data(body.as_bytes())).unwrap();
            let mut expected: Vec<Vec<u8>> = lines.iter().map(|l| l.as_bytes().to_vec()).collect();
            // A trailing empty line is the final line break of the body.
            if body.is_empty() {
                expected.clear();
            } else if expected.len() > 1 && expected.last().is_some_and(Vec::is_empty) {
                expected.pop();
            }
            prop_assert_eq!(decoded, expected);
        }
    }
}
