//! Slugification of a user message into a directory name.

/// Maximum length of a generated slug, before disambiguation suffixes.
pub const MAX_SLUG_LEN: usize = 48;

/// Slugify `text`: lowercase, restrict to `[a-z0-9-]`, collapse runs of `-`,
/// trim leading/trailing `-`, and truncate to [`MAX_SLUG_LEN`] characters.
///
/// Falls back to `"workspace"` if the input contains no sluggable
/// characters at all (e.g. a message that is pure emoji or CJK text).
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_was_dash = false;
    for ch in text.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() {
            slug.push(lower);
            last_was_dash = false;
        } else if !last_was_dash && !slug.is_empty() {
            slug.push('-');
            last_was_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug.truncate(MAX_SLUG_LEN);
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "workspace".to_owned()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugifies_mixed_case_and_punctuation() {
        assert_eq!(slugify("Fix the Login Bug!!"), "fix-the-login-bug");
    }

    #[test]
    fn collapses_runs_of_separators() {
        assert_eq!(slugify("a   b---c"), "a-b-c");
    }

    #[test]
    fn truncates_to_max_len() {
        let long = "word ".repeat(30);
        let slug = slugify(&long);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn falls_back_for_unsluggable_input() {
        assert_eq!(slugify("你好"), "workspace");
        assert_eq!(slugify(""), "workspace");
    }
}
