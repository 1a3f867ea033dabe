fn is_valid_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'
}

/// Strips every character a project name may not carry.
///
/// Underscores and hyphens are kept as they are: `my_lib` and `my-lib` are
/// distinct projects and are never rewritten into each other.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| is_valid_name_char(*c))
        .collect::<String>()
        .trim_start_matches(['.', '-'])
        .to_string()
}

/// URL-safe identifier derived from a display name, matching how forges
/// slugify owners and repositories: lowercase, punctuation dropped, runs of
/// whitespace and hyphens collapsed into one hyphen.
#[must_use]
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;

    for c in value.to_lowercase().chars() {
        if c.is_whitespace() || c == '-' {
            pending_dash = true;
        } else if c.is_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        }
    }

    slug.trim_matches(['-', '_']).to_string()
}
