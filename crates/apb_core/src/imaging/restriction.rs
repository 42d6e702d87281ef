//! Detection of restricted records.

/// Token that marks a record as restricted.
pub const RESTRICTED_TOKEN: &str = "restricted";

/// Whether a rights/source description marks the image as restricted.
///
/// Matches the whole word "restricted" in any case. Words break where a
/// regex `\b` would, so "RESTRICTED;" and "restricted-use" count while
/// "Unrestricted" and "non_restricted" do not.
pub fn is_restricted(text: Option<&str>) -> bool {
    let Some(text) = text else {
        return false;
    };
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|token| token.eq_ignore_ascii_case(RESTRICTED_TOKEN))
}
