use crate::constants::method;

/// Splits a comma separated header value, trimming whitespace around each
/// token and skipping empty ones.
pub fn split_tokens(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(',')
        .map(|token| token.trim_matches(is_http_whitespace))
        .filter(|token| !token.is_empty())
}

/// RFC 7230 `token`: printable ASCII without separators.
pub fn is_http_token(value: &str) -> bool {
    !value.is_empty()
        && value.bytes().all(|byte| {
            matches!(
                byte,
                b'0'..=b'9'
                    | b'A'..=b'Z'
                    | b'a'..=b'z'
                    | b'!'
                    | b'#'
                    | b'$'
                    | b'%'
                    | b'&'
                    | b'\''
                    | b'*'
                    | b'+'
                    | b'-'
                    | b'.'
                    | b'^'
                    | b'_'
                    | b'`'
                    | b'|'
                    | b'~'
            )
        })
}

/// Methods a preflight never has to list explicitly.
pub fn is_simple_method(value: &str) -> bool {
    matches!(value, method::GET | method::HEAD | method::POST)
}

/// Methods the preflight cache treats as implicitly approved.
pub(crate) fn is_cache_exempt_method(value: &str) -> bool {
    matches!(value, method::GET | method::POST)
}

pub fn equals_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

fn is_http_whitespace(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\r' | '\n')
}

#[cfg(test)]
#[path = "util_test.rs"]
mod util_test;
