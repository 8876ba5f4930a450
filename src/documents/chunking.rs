//! Text normalization and the sliding-window chunker.
//!
//! Extracted text is normalized once (hyphenated line breaks collapsed, remaining
//! newlines flattened to spaces, casefolded) and then windowed into fixed-size
//! overlapping chunks. Queries go through the same normalization so query and
//! chunk embeddings live in the same space.

use thiserror::Error;

/// Errors produced while windowing text into chunks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// The configured window length cannot produce any chunk.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// The configured overlap would prevent the window from advancing.
    #[error("overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge {
        /// Configured overlap length.
        overlap: usize,
        /// Configured window length.
        chunk_size: usize,
    },
}

/// Normalize raw text ahead of chunking or query embedding.
///
/// Collapses hyphenation line breaks (`-\n`), flattens remaining newlines to
/// single spaces, and casefolds.
pub fn normalize_text(text: &str) -> String {
    text.replace("-\n", "").replace('\n', " ").to_lowercase()
}

/// Split normalized text into successive overlapping windows.
///
/// Windows are `chunk_size` characters long and each window after the first
/// repeats the final `overlap` characters of its predecessor. The final window
/// is clipped to the end of the text rather than discarded, so the last chunk
/// may be shorter. Empty input yields no chunks.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if overlap >= chunk_size {
        return Err(ChunkingError::OverlapTooLarge {
            overlap,
            chunk_size,
        });
    }

    // Windowing is defined over characters, not bytes, so multibyte text
    // cannot split a code point.
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total {
        let end = (start + chunk_size).min(total);
        chunks.push(chars[start..end].iter().collect());
        if end == total {
            break;
        }
        start = end - overlap;
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_hyphenation_and_newlines() {
        let text = "Inter-\nnational law\napplies";
        assert_eq!(normalize_text(text), "international law applies");
    }

    #[test]
    fn normalize_casefolds() {
        assert_eq!(normalize_text("Hello WORLD"), "hello world");
    }

    #[test]
    fn chunk_text_handles_empty_input() {
        let chunks = chunk_text("", 10, 3).expect("valid geometry");
        assert!(chunks.is_empty());
    }

    #[test]
    fn chunk_text_windows_with_overlap() {
        let text = "abcdefghij";
        let chunks = chunk_text(text, 4, 2).expect("valid geometry");
        assert_eq!(chunks, vec!["abcd", "cdef", "efgh", "ghij"]);
    }

    #[test]
    fn final_window_is_clipped_not_discarded() {
        let text = "abcdefg";
        let chunks = chunk_text(text, 4, 1).expect("valid geometry");
        assert_eq!(chunks, vec!["abcd", "defg"]);

        let chunks = chunk_text("abcdefgh", 4, 1).expect("valid geometry");
        assert_eq!(chunks.last().map(String::as_str), Some("gh"));
    }

    #[test]
    fn removing_overlaps_reconstructs_the_input() {
        let text = "the quick brown fox jumps over the lazy dog";
        for (chunk_size, overlap) in [(5, 2), (8, 3), (150, 50), (4, 0)] {
            let chunks = chunk_text(text, chunk_size, overlap).expect("valid geometry");
            let mut rebuilt = String::new();
            for (index, chunk) in chunks.iter().enumerate() {
                let skip = if index == 0 { 0 } else { overlap };
                rebuilt.extend(chunk.chars().skip(skip));
            }
            assert_eq!(rebuilt, text, "chunk_size={chunk_size} overlap={overlap}");
        }
    }

    #[test]
    fn only_the_final_chunk_may_be_short() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunk_text(text, 7, 3).expect("valid geometry");
        for chunk in &chunks[..chunks.len() - 1] {
            assert_eq!(chunk.chars().count(), 7);
        }
    }

    #[test]
    fn chunking_respects_char_boundaries() {
        let text = "héllo wörld ünïcode tèxt";
        let chunks = chunk_text(text, 5, 2).expect("valid geometry");
        let rebuilt: String = chunks
            .iter()
            .enumerate()
            .flat_map(|(index, chunk)| chunk.chars().skip(if index == 0 { 0 } else { 2 }))
            .collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn zero_chunk_size_fails_fast() {
        assert_eq!(
            chunk_text("hello", 0, 0).unwrap_err(),
            ChunkingError::InvalidChunkSize
        );
    }

    #[test]
    fn overlap_not_smaller_than_chunk_size_fails_fast() {
        assert_eq!(
            chunk_text("hello", 3, 3).unwrap_err(),
            ChunkingError::OverlapTooLarge {
                overlap: 3,
                chunk_size: 3
            }
        );
        assert!(chunk_text("hello", 3, 7).is_err());
    }
}
