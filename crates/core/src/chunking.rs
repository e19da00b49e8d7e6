use crate::error::IngestError;
use crate::models::{Chunk, Page, RagOptions};
use sha2::{Digest, Sha256};

/// Window size and overlap, both in characters. Only constructible with
/// `overlap < chunk_size`, so splitting always advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, IngestError> {
        if chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap ({overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

impl TryFrom<&RagOptions> for ChunkingConfig {
    type Error = IngestError;

    fn try_from(value: &RagOptions) -> Result<Self, Self::Error> {
        Self::new(value.chunk_size, value.chunk_overlap)
    }
}

/// Splits `text` into windows of `chunk_size` characters whose starts are
/// `chunk_size - overlap` apart. Returns `(char_offset, text)` pairs.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Vec<(usize, String)> {
    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + config.chunk_size).min(chars.len());
        pieces.push((start, chars[start..end].iter().collect()));
        if end == chars.len() {
            break;
        }
        start += config.step();
    }

    pieces
}

/// Chunks every page in order. `global_index` is the batch position of the
/// first emitted chunk; the returned cursor is the position after the last.
pub fn build_chunks(
    pages: &[Page],
    config: ChunkingConfig,
    global_index: u64,
) -> (Vec<Chunk>, u64) {
    let mut chunks = Vec::new();
    let mut cursor = global_index;

    for page in pages {
        for (offset, text) in chunk_text(&page.text, config) {
            chunks.push(Chunk {
                chunk_id: make_chunk_id(&page.document_id, page.number, cursor, &text),
                document_id: page.document_id.clone(),
                page_number: page.number,
                offset,
                chunk_index: cursor,
                text,
            });
            cursor = cursor.saturating_add(1);
        }
    }

    (chunks, cursor)
}

pub fn split(pages: &[Page], config: ChunkingConfig) -> Vec<Chunk> {
    build_chunks(pages, config, 0).0
}

fn make_chunk_id(document_id: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn page(number: u32, text: &str) -> Page {
        Page {
            document_id: "doc-1".to_string(),
            number,
            text: text.to_string(),
        }
    }

    fn expected_count(len: usize, size: usize, overlap: usize) -> usize {
        if len == 0 {
            0
        } else if len <= size {
            1
        } else {
            (len - overlap).div_ceil(size - overlap)
        }
    }

    #[test]
    fn overlap_equal_to_size_is_rejected() {
        assert!(matches!(
            ChunkingConfig::new(10, 10),
            Err(IngestError::InvalidChunkConfig(_))
        ));
        assert!(ChunkingConfig::new(0, 0).is_err());
        assert!(ChunkingConfig::new(10, 9).is_ok());
    }

    #[test]
    fn windows_advance_by_size_minus_overlap() {
        let config = ChunkingConfig::new(4, 1).unwrap();
        let pieces = chunk_text("abcdefghijk", config);
        let texts: Vec<_> = pieces.iter().map(|(_, text)| text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "defg", "ghij", "jk"]);
        let offsets: Vec<_> = pieces.iter().map(|(offset, _)| *offset).collect();
        assert_eq!(offsets, vec![0, 3, 6, 9]);
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let config = ChunkingConfig::new(50, 0).unwrap();
        let chunks = split(&[page(1, "The sky is blue.")], config);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "The sky is blue.");
        assert_eq!(chunks[0].page_number, 1);
        assert_eq!(chunks[0].document_id, "doc-1");
    }

    #[test]
    fn empty_page_yields_no_chunks() {
        let config = ChunkingConfig::new(50, 10).unwrap();
        assert!(split(&[page(1, ""), page(2, "")], config).is_empty());
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let config = ChunkingConfig::new(3, 1).unwrap();
        let pieces = chunk_text("héllo wörld", config);
        assert!(pieces.iter().all(|(_, text)| text.chars().count() <= 3));
        assert_eq!(pieces[0].1, "hél");
    }

    #[test]
    fn chunk_indices_continue_across_pages() {
        let config = ChunkingConfig::new(5, 0).unwrap();
        let (chunks, cursor) = build_chunks(&[page(1, "abcdefg"), page(2, "xyz")], config, 7);
        let indices: Vec<_> = chunks.iter().map(|chunk| chunk.chunk_index).collect();
        assert_eq!(indices, vec![7, 8, 9]);
        assert_eq!(cursor, 10);
        assert_eq!(chunks[2].page_number, 2);
        assert_ne!(chunks[0].chunk_id, chunks[1].chunk_id);
    }

    proptest! {
        #[test]
        fn chunk_count_matches_formula(
            text in "[a-z ]{0,300}",
            size in 1usize..60,
            overlap_seed in 0usize..60,
        ) {
            let overlap = overlap_seed % size;
            let config = ChunkingConfig::new(size, overlap).unwrap();
            let pieces = chunk_text(&text, config);
            prop_assert_eq!(pieces.len(), expected_count(text.chars().count(), size, overlap));
        }

        #[test]
        fn consecutive_chunks_share_exactly_the_overlap(
            text in "[a-zé ]{1,300}",
            size in 2usize..60,
            overlap_seed in 0usize..60,
        ) {
            let overlap = overlap_seed % size;
            let config = ChunkingConfig::new(size, overlap).unwrap();
            let pieces = chunk_text(&text, config);
            for pair in pieces.windows(2) {
                let previous: Vec<char> = pair[0].1.chars().collect();
                let next: Vec<char> = pair[1].1.chars().collect();
                let tail = &previous[previous.len() - overlap..];
                prop_assert_eq!(tail, &next[..overlap]);
                prop_assert_eq!(pair[1].0 - pair[0].0, size - overlap);
            }
        }

        #[test]
        fn removing_overlap_reconstructs_text(
            text in "[a-zA-Z0-9 .,é]{0,400}",
            size in 1usize..80,
            overlap_seed in 0usize..80,
        ) {
            let overlap = overlap_seed % size;
            let config = ChunkingConfig::new(size, overlap).unwrap();
            let pieces = chunk_text(&text, config);
            let mut rebuilt = String::new();
            for (position, (_, piece)) in pieces.iter().enumerate() {
                if position == 0 {
                    rebuilt.push_str(piece);
                } else {
                    rebuilt.extend(piece.chars().skip(overlap));
                }
            }
            prop_assert_eq!(rebuilt, text);
        }
    }
}
