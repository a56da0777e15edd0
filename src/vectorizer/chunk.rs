//! Sentence-aware text chunking with overlap.
//!
//! Chunks target [`CHUNK_SIZE`] characters and carry roughly
//! [`OVERLAP_SIZE`] characters of trailing context into their successor so
//! retrieval does not lose meaning at chunk seams.

use regex::Regex;
use std::sync::OnceLock;

/// Maximum size of each chunk in characters
pub const CHUNK_SIZE: usize = 800;

/// Overlap between consecutive chunks to maintain context
pub const OVERLAP_SIZE: usize = 100;

fn sentence_boundary() -> &'static Regex {
    static BOUNDARY: OnceLock<Regex> = OnceLock::new();
    BOUNDARY.get_or_init(|| Regex::new(r"[.!?]+\s+").expect("static regex"))
}

/// Split text into overlapping, sentence-aligned chunks.
///
/// Sentences are packed greedily; when the next sentence would push a chunk
/// past [`CHUNK_SIZE`], the chunk is emitted and the next one is seeded with
/// the last whole words of it. Text without sentence boundaries falls back
/// to fixed-stride slicing with the same overlap.
pub fn chunk_text(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    // No sentence boundaries at all: slice by character count instead.
    if sentence_boundary().find(text).is_none() && text.len() > CHUNK_SIZE {
        return fixed_stride(text);
    }

    let sentences = split_sentences(text);

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for sentence in &sentences {
        if sentence.is_empty() {
            continue;
        }

        // Emit the buffer before it would overflow, seeding the next chunk
        // with the tail of this one.
        if !current.is_empty() && current.len() + sentence.len() > CHUNK_SIZE {
            let finished = current.trim().to_string();
            current = overlap_tail(&finished).to_string();
            chunks.push(finished);
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(sentence);
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks
}

/// Split on sentence terminators, keeping the terminator with its sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut last = 0;

    for m in sentence_boundary().find_iter(text) {
        let terminator_end = m.start() + m.as_str().trim_end().len();
        let sentence = text[last..terminator_end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        last = m.end();
    }
    if last < text.len() {
        let tail = text[last..].trim();
        if !tail.is_empty() {
            sentences.push(tail);
        }
    }

    sentences
}

/// The last whole words of a chunk, totaling roughly [`OVERLAP_SIZE`].
fn overlap_tail(chunk: &str) -> &str {
    if chunk.len() <= OVERLAP_SIZE {
        return "";
    }

    let mut start = chunk.len() - OVERLAP_SIZE;
    while !chunk.is_char_boundary(start) {
        start += 1;
    }

    // Advance to a word boundary so the overlap never splits a word.
    match chunk[start..].find(' ') {
        Some(space) => chunk[start + space..].trim_start(),
        None => "",
    }
}

/// Fixed-stride character slicing used when no sentence boundaries exist.
fn fixed_stride(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let stride = CHUNK_SIZE - OVERLAP_SIZE;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + CHUNK_SIZE).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += stride;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(chunk_text("").is_empty());
        assert!(chunk_text("   ").is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("One sentence. Another sentence.");
        assert_eq!(chunks, vec!["One sentence. Another sentence."]);
    }

    #[test]
    fn test_chunks_respect_size_budget() {
        let text = "The quick brown fox jumps over the lazy dog near the river bank. ".repeat(60);
        let chunks = chunk_text(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            // A chunk may exceed the target by at most one sentence tail.
            assert!(chunk.len() <= CHUNK_SIZE + 70, "chunk of {} chars", chunk.len());
        }
    }

    #[test]
    fn test_overlap_carries_trailing_words() {
        let text = "The quick brown fox jumps over the lazy dog near the river bank. ".repeat(60);
        let chunks = chunk_text(&text);
        for pair in chunks.windows(2) {
            let head_of_next: String = pair[1].chars().take(30).collect();
            assert!(
                pair[0].contains(head_of_next.trim()),
                "successor must start inside its predecessor's tail"
            );
        }
    }

    #[test]
    fn test_overlap_preserves_word_boundaries() {
        let text = "Wordone wordtwo wordthree wordfour. ".repeat(40);
        let chunks = chunk_text(&text);
        for chunk in &chunks {
            assert!(chunk.starts_with("Word") || chunk.starts_with("word"));
        }
    }

    #[test]
    fn test_no_sentence_boundaries_falls_back() {
        let text = "x".repeat(2000);
        let chunks = chunk_text(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= CHUNK_SIZE));
        // Fixed stride: consecutive chunks share OVERLAP_SIZE characters.
        assert_eq!(chunks[0].len(), CHUNK_SIZE);
    }

    #[test]
    fn test_full_coverage_without_gaps() {
        // Distinct sentences so suffix/prefix matching below is unambiguous.
        let text = (0..60)
            .map(|i| format!("Sentence number {i} covers the subject of topic {i}."))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&text);

        // Walking the chunks and skipping each one's overlap into the next
        // must reproduce the input with no characters lost.
        let mut reconstructed = chunks[0].clone();
        for pair in chunks.windows(2) {
            let overlap = longest_suffix_prefix(&pair[0], &pair[1]);
            reconstructed.push(' ');
            reconstructed.push_str(pair[1][overlap..].trim_start());
        }
        assert_eq!(reconstructed, text);
    }

    fn longest_suffix_prefix(a: &str, b: &str) -> usize {
        (0..=b.len().min(a.len()))
            .rev()
            .find(|&n| b.is_char_boundary(n) && a.ends_with(&b[..n]))
            .unwrap_or(0)
    }
}
