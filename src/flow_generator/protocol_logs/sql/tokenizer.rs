#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    Quote,
    Number,
    Whitespace,
    Other,
}

fn is_whitespace(b: u8) -> bool {
    b == b' ' || (9..=13).contains(&b)
}

fn is_word_start(b: u8) -> bool {
    b.is_ascii_alphabetic()
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'$' || b == b'_'
}

/// Returns the length and kind of the token starting at `query[0]`.
///
/// Quoted strings honor backslash escapes and extend to end-of-input when
/// unterminated. A word must start with a letter, so a digit run glued to
/// letters stays two tokens. Calling this on empty input is a programmer
/// error.
pub fn scan_token(query: &[u8]) -> (usize, TokenKind) {
    assert!(!query.is_empty(), "scan_token called with empty input");

    let b = query[0];
    match b {
        b'\'' | b'"' => {
            let mut escaped = false;
            for (i, &c) in query.iter().enumerate().skip(1) {
                if c == b && !escaped {
                    return (i + 1, TokenKind::Quote);
                }
                escaped = c == b'\\' && !escaped;
            }
            (query.len(), TokenKind::Quote)
        }
        b'0'..=b'9' => {
            let len = query
                .iter()
                .position(|c| !c.is_ascii_digit())
                .unwrap_or(query.len());
            (len, TokenKind::Number)
        }
        _ if is_whitespace(b) => {
            let len = query
                .iter()
                .position(|&c| !is_whitespace(c))
                .unwrap_or(query.len());
            (len, TokenKind::Whitespace)
        }
        _ if is_word_start(b) => {
            let len = query
                .iter()
                .position(|&c| !is_word_byte(c))
                .unwrap_or(query.len());
            (len, TokenKind::Word)
        }
        _ => (1, TokenKind::Other),
    }
}

#[cfg(test)]
mod tests {
    use super::TokenKind::*;
    use super::*;

    #[test]
    fn token_classes() {
        let cases: &[(&[u8], usize, TokenKind)] = &[
            (b"select 1", 6, Word),
            (b"tbl$_2 x", 6, Word),
            (b"42abc", 2, Number),
            (b"12345", 5, Number),
            (b"  \t\n x", 5, Whitespace),
            (b"'abc' rest", 5, Quote),
            (b"\"abc\" rest", 5, Quote),
            (b"= 1", 1, Other),
            (b"(1)", 1, Other),
        ];
        for &(input, len, kind) in cases {
            assert_eq!(
                scan_token(input),
                (len, kind),
                "input {:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn escaped_quote_stays_inside_token() {
        // 'O\'Brien' is one quote token
        let input = br"'O\'Brien' x";
        assert_eq!(scan_token(input), (10, Quote));
    }

    #[test]
    fn escaped_backslash_then_quote_terminates() {
        let input = br"'a\\' x";
        assert_eq!(scan_token(input), (5, Quote));
    }

    #[test]
    fn unterminated_quote_extends_to_end() {
        assert_eq!(scan_token(b"'oops"), (5, Quote));
    }

    #[test]
    fn digit_leading_identifier_splits() {
        // a known quirk: words must start with a letter
        assert_eq!(scan_token(b"2compiled"), (1, Number));
        assert_eq!(scan_token(b"compiled2x"), (10, Word));
    }

    #[test]
    #[should_panic(expected = "empty input")]
    fn empty_input_panics() {
        scan_token(b"");
    }
}
