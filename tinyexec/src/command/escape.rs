//! Escaping for command lines run through `cmd.exe`.
//!
//! Each metacharacter is prefixed with `^` so the shell takes it literally.
//! Arguments are additionally quoted, with the backslash runs that `cmd.exe`
//! (and the C runtime argv parser behind it) would collapse doubled first.

/// The native shell's escape character.
pub const ESCAPE_CHAR: char = '^';

const META_CHARS: &[char] = &[
    '(', ')', '[', ']', '%', '!', '^', '"', '`', '<', '>', '&', '|', ';', ',', ' ', '*', '?',
];

/// Returns `true` if `c` has a meaning to `cmd.exe`.
pub fn is_meta_char(c: char) -> bool {
    META_CHARS.contains(&c)
}

fn escape_meta_chars(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 2);
    for c in input.chars() {
        if is_meta_char(c) {
            out.push(ESCAPE_CHAR);
        }
        out.push(c);
    }
    out
}

/// Escape a command name.
pub fn escape_command(command: &str) -> String {
    escape_meta_chars(command)
}

/// Escape and quote a single argument.
///
/// With `double_escape`, every escape is applied twice (so `^` becomes
/// `^^^`). Shims that re-invoke `cmd.exe` consume one layer themselves.
pub fn escape_argument(arg: &str, double_escape: bool) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');

    let mut backslashes = 0usize;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                push_backslashes(&mut quoted, backslashes * 2 + 1);
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                push_backslashes(&mut quoted, backslashes);
                quoted.push(c);
                backslashes = 0;
            }
        }
    }
    // Backslashes before the closing quote would escape it.
    push_backslashes(&mut quoted, backslashes * 2);
    quoted.push('"');

    let escaped = escape_meta_chars(&quoted);
    if double_escape {
        escape_meta_chars(&escaped)
    } else {
        escaped
    }
}

fn push_backslashes(out: &mut String, count: usize) {
    out.push_str(&"\\".repeat(count));
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const METAS: &[char] = &[
        '(', ')', ']', '[', '%', '!', '^', '"', '`', '<', '>', '&', '|', ';', ',', ' ', '*', '?',
    ];

    #[test]
    fn command_escapes_meta_chars() {
        for chr in METAS {
            assert_eq!(escape_command(&format!("foo {chr} bar")), format!("foo^ ^{chr}^ bar"));
        }
    }

    #[test]
    fn command_leaves_plain_text() {
        assert_eq!(escape_command("foo"), "foo");
    }

    #[test]
    fn argument_doubles_backslashes_before_quotes() {
        assert_eq!(escape_argument(r#"\\""#, false), r#"^"\\\\\^"^""#);
    }

    #[test]
    fn argument_doubles_trailing_backslashes() {
        assert_eq!(escape_argument(r"foo\\", false), r#"^"foo\\\\^""#);
    }

    #[test]
    fn argument_keeps_inner_backslashes() {
        assert_eq!(escape_argument(r"a\b", false), r#"^"a\b^""#);
    }

    #[test]
    fn argument_is_wrapped_in_quotes() {
        assert_eq!(escape_argument("foo", false), r#"^"foo^""#);
    }

    #[test]
    fn argument_escapes_meta_chars() {
        for chr in METAS {
            let quote = if *chr == '"' { "\\" } else { "" };
            assert_eq!(
                escape_argument(&format!("foo {chr} bar"), false),
                format!("^\"foo^ {quote}^{chr}^ bar^\"")
            );
        }
    }

    #[test]
    fn argument_double_escapes_meta_chars() {
        for chr in METAS {
            let quote = if *chr == '"' { "\\" } else { "" };
            assert_eq!(
                escape_argument(&format!("foo {chr} bar"), true),
                format!("^^^\"foo^^^ {quote}^^^{chr}^^^ bar^^^\"")
            );
        }
    }

    proptest! {
        #[test]
        fn clean_tokens_are_only_quoted(token in "[A-Za-z0-9._/=:+-]{0,24}") {
            prop_assert_eq!(escape_argument(&token, false), format!("^\"{token}^\""));
            prop_assert_eq!(escape_command(&token), token);
        }

        #[test]
        fn double_escape_triples_escape_chars(token in "[^^]{0,32}") {
            let single = escape_argument(&token, false).matches(ESCAPE_CHAR).count();
            let double = escape_argument(&token, true).matches(ESCAPE_CHAR).count();
            prop_assert_eq!(double, single * 3);
        }
    }
}
