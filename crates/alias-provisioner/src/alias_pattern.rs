//! Alias normalization and allow-list pattern matching.

/// Pattern granted to administrators in addition to the configured allow-list.
pub const CATCH_ALL_ALIAS_PATTERN: &str = "#*";

/// Appends `:<domain>` unless the alias already carries it.
pub fn normalize_alias(alias: &str, alias_domain: &str) -> String {
    let suffix = format!(":{alias_domain}");
    if alias.ends_with(&suffix) {
        alias.to_string()
    } else {
        format!("{alias}{suffix}")
    }
}

/// Anchored glob match: `*` matches any run of characters, `?` exactly one.
pub fn wildcard_pattern_matches(pattern: &str, value: &str) -> bool {
    let pattern = pattern.chars().collect::<Vec<_>>();
    let value = value.chars().collect::<Vec<_>>();

    let (mut p, mut v) = (0_usize, 0_usize);
    let mut backtrack: Option<(usize, usize)> = None;
    while v < value.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, v));
                p += 1;
            }
            Some('?') => {
                p += 1;
                v += 1;
            }
            Some(expected) if *expected == value[v] => {
                p += 1;
                v += 1;
            }
            _ => {
                let Some((star_p, star_v)) = backtrack else {
                    return false;
                };
                p = star_p + 1;
                v = star_v + 1;
                backtrack = Some((star_p, star_v + 1));
            }
        }
    }
    pattern[p..].iter().all(|ch| *ch == '*')
}

/// Returns the first pattern that matches `alias`, if any.
pub fn matching_alias_pattern<'a>(patterns: &'a [String], alias: &str) -> Option<&'a str> {
    patterns
        .iter()
        .map(String::as_str)
        .find(|pattern| wildcard_pattern_matches(pattern, alias))
}
