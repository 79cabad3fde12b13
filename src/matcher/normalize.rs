//! Text normalization for similarity comparison
//!
//! Titles are compared after stripping bracketed qualifiers, lowercasing,
//! collapsing punctuation, and truncating at a featuring marker. Marker
//! detection (live, cover, official) runs on the loose form so punctuation
//! never hides a word.

/// Remove bracketed segments: `(...)`, `[...]`, `{...}`.
///
/// Nested brackets are handled with a depth counter; unbalanced closers are
/// dropped rather than panicking.
pub fn strip_brackets(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0u32;
    for c in text.chars() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// Lowercase, map non-alphanumerics to spaces, collapse runs of whitespace
pub fn normalize_loose(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            for lower in c.to_lowercase() {
                out.push(lower);
            }
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Full comparison form: brackets stripped, loose-normalized, truncated at
/// the first featuring marker
pub fn normalize(text: &str) -> String {
    let loose = normalize_loose(&strip_brackets(text));
    let mut words: Vec<&str> = Vec::new();
    for word in loose.split(' ') {
        if matches!(word, "feat" | "featuring" | "ft") {
            break;
        }
        words.push(word);
    }
    words.join(" ")
}

/// Similarity of two already-raw strings on a 0-100 scale
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    strsim::normalized_levenshtein(&a, &b) * 100.0
}

fn has_word(text: &str, words: &[&str]) -> bool {
    normalize_loose(text)
        .split(' ')
        .any(|w| words.contains(&w))
}

/// True if the text signals a live performance
pub fn has_live_marker(text: &str) -> bool {
    has_word(text, &["live", "concert", "unplugged"])
}

/// True if the text signals a cover, instrumental, or karaoke version
pub fn has_cover_marker(text: &str) -> bool {
    has_word(text, &["cover", "instrumental", "karaoke"])
}

/// True if the text signals an official upload
pub fn has_official_marker(text: &str) -> bool {
    let loose = normalize_loose(text);
    loose.contains("official audio")
        || loose.contains("official video")
        || loose.contains("official music video")
}
