//! Text normalisation shared by capture and scoring.

/// Collapses whitespace runs into a single space, trims and lowercases.
///
/// Capture and resolution must agree byte-for-byte on this, so every text
/// comparison in the engine goes through here.
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for word in raw.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out.to_lowercase()
}

/// Truncates to at most `max` characters on a char boundary.
pub fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}

/// Collapses whitespace without changing case. Used for exact text filters.
pub fn squash_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase, dash-separated slug used for guide shortcuts.
pub fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut pending_dash = false;
    for ch in raw.chars().flat_map(|c| c.to_lowercase()) {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_and_lowercases() {
        assert_eq!(normalize_text("  Save \n\t Draft  "), "save draft");
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn slugify_matches_shortcut_format() {
        assert_eq!(slugify("Create a Card!"), "create-a-card");
        assert_eq!(slugify("--Weird   name--"), "weird-name");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn squash_keeps_case() {
        assert_eq!(squash_whitespace(" Add\n card "), "Add card");
    }
}
