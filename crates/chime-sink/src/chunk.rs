//! Outbound text splitting.
//!
//! Large reminder texts are split first on blank-line ("semantic")
//! boundaries, then into size-capped physical chunks, preserving order.

/// Split text on runs of blank lines, trimming each segment.
///
/// Returns the original text as a single segment when no non-empty segment
/// survives, so callers always have something to send.
pub fn split_semantic_messages(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let mut segments = Vec::new();
    for segment in normalized.split("\n\n") {
        let trimmed = segment.trim();
        if !trimmed.is_empty() {
            segments.push(trimmed.to_string());
        }
    }
    if segments.is_empty() {
        return vec![text.to_string()];
    }
    segments
}

/// Split text into chunks of at most `chunk_size` characters.
///
/// Counts characters, not bytes, so multi-byte text never splits inside a
/// code point. Empty input yields one empty chunk.
pub fn split_text_chunks(text: &str, chunk_size: usize) -> Vec<String> {
    let size = chunk_size.max(1);
    if text.is_empty() {
        return vec![String::new()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_semantic_split_on_blank_lines() {
        let segments = split_semantic_messages("first part\n\nsecond part\n\n\nthird");
        assert_eq!(segments, vec!["first part", "second part", "third"]);
    }

    #[test]
    fn test_semantic_split_normalizes_crlf() {
        let segments = split_semantic_messages("a\r\n\r\nb");
        assert_eq!(segments, vec!["a", "b"]);
    }

    #[test]
    fn test_semantic_split_keeps_blank_input_whole() {
        assert_eq!(split_semantic_messages("   "), vec!["   ".to_string()]);
    }

    #[test]
    fn test_chunk_split_preserves_order() {
        let chunks = split_text_chunks("abcdefgh", 3);
        assert_eq!(chunks, vec!["abc", "def", "gh"]);
    }

    #[test]
    fn test_chunk_split_empty_input() {
        assert_eq!(split_text_chunks("", 10), vec![String::new()]);
    }

    #[test]
    fn test_chunk_split_multibyte_safe() {
        let chunks = split_text_chunks("日程提醒测试", 2);
        assert_eq!(chunks, vec!["日程", "提醒", "测试"]);
    }

    proptest! {
        // Rejoining chunks reproduces the input exactly.
        #[test]
        fn chunks_concatenate_to_input(text in ".{0,200}", chunk_size in 1usize..50) {
            let chunks = split_text_chunks(&text, chunk_size);
            prop_assert_eq!(chunks.concat(), text);
        }

        // No chunk exceeds the cap.
        #[test]
        fn chunks_respect_cap(text in ".{1,200}", chunk_size in 1usize..50) {
            for chunk in split_text_chunks(&text, chunk_size) {
                prop_assert!(chunk.chars().count() <= chunk_size);
            }
        }
    }
}
