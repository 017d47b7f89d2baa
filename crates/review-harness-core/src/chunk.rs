//! Paragraph-boundary chunker for uploaded artifacts.
//!
//! Splits an artifact's text into [`IngestionChunk`]s no longer than
//! `max_tokens` (approximated at 4 chars per token). Paragraphs (`\n\n`)
//! are packed greedily; a paragraph that alone exceeds the limit is
//! hard-split at the last newline or space before the limit.
//!
//! Chunk ids are UUID v5 values of `collection:source_file:index`, so
//! ingesting the same file twice produces the same ids and an upsert
//! replaces rather than duplicates.
//!
//! ```rust
//! use review_harness_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("code", "driver.c", "int main(void);\n\nstatic int x;", 700);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].source_file, "driver.c");
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::IngestionChunk;

const CHARS_PER_TOKEN: usize = 4;

/// Split `text` into chunks with contiguous indices starting at 0.
///
/// Whitespace-only text produces no chunks.
pub fn chunk_text(
    collection: &str,
    source_file: &str,
    text: &str,
    max_tokens: usize,
) -> Vec<IngestionChunk> {
    let max_chars = (max_tokens * CHARS_PER_TOKEN).max(1);
    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let joined_len = if buf.is_empty() {
            para.len()
        } else {
            buf.len() + 2 + para.len()
        };

        if joined_len > max_chars && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }

        if para.len() > max_chars {
            pieces.extend(hard_split(para, max_chars));
            continue;
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(para);
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, text)| IngestionChunk {
            id: chunk_id(collection, source_file, i as i64),
            source_file: source_file.to_string(),
            chunk_index: i as i64,
            text,
        })
        .collect()
}

/// Deterministic chunk id for a position within a source file.
pub fn chunk_id(collection: &str, source_file: &str, index: i64) -> String {
    let name = format!("{}:{}:{}", collection, source_file, index);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

/// Lowercase hex SHA-256 of a byte slice.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Break an oversized paragraph into pieces of at most `max_chars` bytes,
/// preferring newline then space boundaries.
fn hard_split(para: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = para;

    while !rest.is_empty() {
        let limit = snap_to_char_boundary(rest, rest.len().min(max_chars));
        let cut = if limit < rest.len() {
            rest[..limit]
                .rfind('\n')
                .or_else(|| rest[..limit].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };
        // A single char wider than max_chars still has to make progress.
        let cut = if cut == 0 {
            rest.char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(rest.len())
        } else {
            cut
        };

        let piece = rest[..cut].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        rest = &rest[cut..];
    }

    out
}

fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_is_one_chunk() {
        let chunks = chunk_text("c", "a.c", "int x = 1;", 700);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "int x = 1;");
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(chunk_text("c", "a.c", "", 700).is_empty());
        assert!(chunk_text("c", "a.c", "  \n\n \n", 700).is_empty());
    }

    #[test]
    fn paragraphs_split_when_limit_exceeded() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = chunk_text("c", "a.md", text, 5);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert!(c.text.len() <= 20);
        }
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let chunks = chunk_text("c", "box.txt", text, 3);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| !c.text.is_empty()));
    }

    #[test]
    fn ids_are_stable_across_runs() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let a = chunk_text("code", "x.c", text, 2);
        let b = chunk_text("code", "x.c", text, 2);
        assert_eq!(a, b);
    }

    #[test]
    fn ids_differ_per_collection_and_file() {
        assert_ne!(chunk_id("code", "x.c", 0), chunk_id("docs", "x.c", 0));
        assert_ne!(chunk_id("code", "x.c", 0), chunk_id("code", "y.c", 0));
        assert_ne!(chunk_id("code", "x.c", 0), chunk_id("code", "x.c", 1));
    }

    #[test]
    fn content_hash_is_sha256_hex() {
        let h = content_hash(b"abc");
        assert_eq!(
            h,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
