//! Structural completeness check applied to generated output.

/// Returns true when `{`/`}` and `[`/`]` each balance to zero.
///
/// This only counts characters. It does not tokenize JSON, so brackets inside quoted
/// strings are counted as well and can make truncated output look complete or complete
/// output look truncated.
///
/// ```rust
/// use pprovider::is_structurally_complete;
///
/// assert!(is_structurally_complete(r#"{"items":[1,2]}"#));
/// assert!(!is_structurally_complete(r#"{"items":[1,2"#));
/// ```
pub fn is_structurally_complete(text: &str) -> bool {
    let mut curly = 0_i64;
    let mut square = 0_i64;

    for character in text.chars() {
        match character {
            '{' => curly += 1,
            '}' => curly -= 1,
            '[' => square += 1,
            ']' => square -= 1,
            _ => {}
        }
    }

    curly == 0 && square == 0
}
