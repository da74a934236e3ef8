pub const CHUNK_CHARS: usize = 24;

/// Split `text` into pieces of at most `size` characters.
pub fn chunk_text(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (offset, _) in text.char_indices() {
        if count == size {
            chunks.push(&text[start..offset]);
            start = offset;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_reassemble() {
        for len in [0, 1, 23, 24, 25, 48, 100] {
            let text: String = "abcdefghij".chars().cycle().take(len).collect();
            let chunks = chunk_text(&text, CHUNK_CHARS);
            assert_eq!(chunks.concat(), text);
            assert!(chunks.iter().all(|chunk| chunk.chars().count() <= CHUNK_CHARS));
            assert_eq!(chunks.len(), len.div_ceil(CHUNK_CHARS));
        }
    }

    #[test]
    fn never_splits_a_character() {
        let text = "가나다라마바사".repeat(5);
        let chunks = chunk_text(&text, 4);
        assert_eq!(chunks.concat(), text);
        assert_eq!(chunks[0], "가나다라");
    }
}
