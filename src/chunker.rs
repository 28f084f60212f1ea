//! Splits page content into overlapping windows for embedding.
//!
//! Windows prefer to break at paragraph boundaries, then line boundaries,
//! then spaces, falling back to a raw character split only when no boundary
//! produces a window within the size budget. The split is fully
//! deterministic for a given `(content, size, overlap)`.

/// Target window size and overlap, measured in characters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkConfig {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: 1000,
            overlap: 150,
        }
    }
}

/// Boundary kinds tried in priority order.
const BOUNDARIES: [&str; 3] = ["\n\n", "\n", " "];

/// Splits `text` into overlapping windows according to `config`.
///
/// Empty or whitespace-only input yields no chunks.
pub fn split_text(text: &str, config: &ChunkConfig) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    split_with(trimmed, &BOUNDARIES, config)
}

fn split_with(text: &str, boundaries: &[&str], config: &ChunkConfig) -> Vec<String> {
    if char_len(text) <= config.size {
        return vec![text.to_string()];
    }
    let Some((separator, rest)) = boundaries.split_first() else {
        return hard_split(text, config);
    };
    if !text.contains(separator) {
        return split_with(text, rest, config);
    }

    // Fragments that still exceed the budget get re-split at the next
    // boundary priority before merging.
    let mut fragments = Vec::new();
    for piece in text.split(separator) {
        if piece.is_empty() {
            continue;
        }
        if char_len(piece) > config.size {
            fragments.extend(split_with(piece, rest, config));
        } else {
            fragments.push(piece.to_string());
        }
    }
    merge_fragments(fragments, separator, config)
}

/// Greedily packs fragments into windows, carrying an overlap tail from one
/// window into the next.
fn merge_fragments(fragments: Vec<String>, separator: &str, config: &ChunkConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: Vec<String> = Vec::new();

    for fragment in fragments {
        let fragment_len = char_len(&fragment);
        if fits(&window, fragment_len, separator, config.size) {
            window.push(fragment);
            continue;
        }
        chunks.push(window.join(separator));
        // Carry an overlap tail forward, shrinking it further if the tail
        // plus the incoming fragment would still bust the budget.
        while !window.is_empty()
            && (joined_len(&window, separator) > config.overlap
                || !fits(&window, fragment_len, separator, config.size))
        {
            window.remove(0);
        }
        window.push(fragment);
    }
    if !window.is_empty() {
        chunks.push(window.join(separator));
    }
    chunks
}

/// Raw character split with stride `size - overlap`, used only when no
/// boundary fits.
fn hard_split(text: &str, config: &ChunkConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = config.size.saturating_sub(config.overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + config.size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Would appending a fragment of `fragment_len` chars keep the window within
/// `size`? An empty window always accepts, so oversized fragments still land
/// somewhere.
fn fits(window: &[String], fragment_len: usize, separator: &str, size: usize) -> bool {
    if window.is_empty() {
        return true;
    }
    joined_len(window, separator) + char_len(separator) + fragment_len <= size
}

fn joined_len(parts: &[String], separator: &str) -> usize {
    if parts.is_empty() {
        return 0;
    }
    let content: usize = parts.iter().map(|part| char_len(part)).sum();
    content + char_len(separator) * (parts.len() - 1)
}
