//! Shared utility functions

/// Normalize a room label for comparison: lowercase, trimmed, internal
/// whitespace collapsed, trailing punctuation removed.
pub fn normalize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for word in label.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    while out.ends_with(['.', '!', ',', ':', ';']) {
        out.pop();
    }
    out
}

/// Similarity of two labels in [0, 1] after normalization.
#[inline]
pub fn label_similarity(a: &str, b: &str) -> f32 {
    let a = normalize_label(a);
    let b = normalize_label(b);
    normalized_similarity(&a, &b)
}

/// Similarity of two already-normalized labels in [0, 1].
#[inline]
pub fn normalized_similarity(a: &str, b: &str) -> f32 {
    if a == b {
        return 1.0;
    }
    strsim::normalized_levenshtein(a, b) as f32
}

/// Milliseconds elapsed since `origin`, saturating at `u64::MAX`.
#[inline]
pub fn millis_since(origin: std::time::Instant) -> u64 {
    u64::try_from(origin.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("  A Long   Hallway. "), "a long hallway");
        assert_eq!(normalize_label("Temple Square!"), "temple square");
        assert_eq!(normalize_label(""), "");
    }

    #[test]
    fn test_label_similarity_exact_and_near() {
        assert_eq!(label_similarity("The Inn", "the inn."), 1.0);
        let near = label_similarity("a long hallway", "a long halway");
        assert!(near > 0.9 && near < 1.0);
        assert!(label_similarity("market", "dungeon") < 0.5);
    }
}
