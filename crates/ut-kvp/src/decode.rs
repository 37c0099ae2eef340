//! Scalar text decoders used by the typed getters.

/// Case-insensitive `true`; anything else is `false`.
pub(crate) fn parse_bool(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case("true")
}

/// Parses an unsigned integer no larger than `max`.
///
/// A `0x`/`0X` prefix selects base 16, otherwise base 10. Trailing garbage,
/// a missing number, or a value above `max` all fail.
pub(crate) fn parse_unsigned(text: &str, max: u64) -> Option<u64> {
    let trimmed = text.trim();
    let (digits, radix) = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => (hex, 16),
        None => (trimmed, 10),
    };
    if digits.starts_with('+') {
        return None;
    }
    let value = u64::from_str_radix(digits, radix).ok()?;
    (value <= max).then_some(value)
}

pub(crate) fn parse_f64(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    yaml_special(trimmed).or_else(|| trimmed.parse::<f64>().ok())
}

pub(crate) fn parse_f32(text: &str) -> Option<f32> {
    let trimmed = text.trim();
    match yaml_special(trimmed) {
        Some(value) if value.is_nan() => Some(f32::NAN),
        Some(value) if value.is_sign_negative() => Some(f32::NEG_INFINITY),
        Some(_) => Some(f32::INFINITY),
        None => trimmed.parse::<f32>().ok(),
    }
}

/// Parses a byte list such as `0x01, 0x02 255`.
///
/// Tokens are separated by commas or whitespace and each must fit in a byte.
/// On failure the offending token is returned.
pub(crate) fn parse_bytes(text: &str) -> Result<Vec<u8>, &str> {
    text.split(|c: char| c == ',' || c.is_ascii_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            parse_unsigned(token, u64::from(u8::MAX))
                .and_then(|value| u8::try_from(value).ok())
                .ok_or(token)
        })
        .collect()
}

fn yaml_special(text: &str) -> Option<f64> {
    match text {
        ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" => Some(f64::INFINITY),
        "-.inf" | "-.Inf" | "-.INF" => Some(f64::NEG_INFINITY),
        ".nan" | ".NaN" | ".NAN" => Some(f64::NAN),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("true", true)]
    #[case("TRUE", true)]
    #[case("True", true)]
    #[case("false", false)]
    #[case("yes", false)]
    #[case("", false)]
    fn bool_decoding(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(parse_bool(text), expected);
    }

    #[rstest]
    #[case("0xde", 0xff, Some(0xde))]
    #[case("0XDE", 0xff, Some(0xde))]
    #[case("222", 0xff, Some(222))]
    #[case("256", 0xff, None)]
    #[case("0x100", 0xff, None)]
    #[case("12abc", u64::MAX, None)]
    #[case("-1", u64::MAX, None)]
    #[case("+1", u64::MAX, None)]
    #[case("0x", u64::MAX, None)]
    #[case("", u64::MAX, None)]
    #[case("0xdeadbeefdeadbeef", u64::MAX, Some(0xdead_beef_dead_beef))]
    fn unsigned_decoding(#[case] text: &str, #[case] max: u64, #[case] expected: Option<u64>) {
        assert_eq!(parse_unsigned(text, max), expected);
    }

    #[test]
    fn float_decoding_rejects_trailing_garbage() {
        assert!(parse_f64("-4.2e8").is_some_and(|value| value.is_sign_negative()));
        assert_eq!(parse_f64("4.2e8"), Some(4.2e8));
        assert_eq!(parse_f64("3.0f"), None);
        assert_eq!(parse_f32("5.1"), Some(5.1));
        assert_eq!(parse_f64(".inf"), Some(f64::INFINITY));
        assert!(parse_f32(".nan").is_some_and(f32::is_nan));
    }

    #[test]
    fn byte_lists_split_on_commas_and_spaces() {
        assert_eq!(parse_bytes("0x01, 0x02 255"), Ok(vec![1, 2, 255]));
        assert_eq!(parse_bytes(""), Ok(Vec::new()));
        assert_eq!(parse_bytes("1, 300"), Err("300"));
    }
}
