//! Size-bounded text chunking.
//!
//! Chunks target an approximate size measured in tokens (1 token ≈ 4
//! characters). Paragraph boundaries are preferred; a paragraph that alone
//! exceeds the budget falls back to sentence boundaries. Sentence splitting
//! keeps its delimiters, so no non-whitespace character of the input is ever
//! dropped.

/// Token-to-character heuristic used for the chunk budget.
pub const APPROX_CHARS_PER_TOKEN: usize = 4;

/// Split `text` into chunks of roughly `chunk_size_tokens` tokens.
///
/// Whitespace-only input yields no chunks. Concatenating the returned
/// chunks reproduces every non-whitespace character of the input, in order.
///
/// # Examples
///
/// ```
/// use inkstream::document::chunk_text;
///
/// assert!(chunk_text("", 500).is_empty());
/// assert_eq!(chunk_text("short text", 500), vec!["short text".to_string()]);
/// ```
pub fn chunk_text(text: &str, chunk_size_tokens: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let budget = chunk_size_tokens
        .saturating_mul(APPROX_CHARS_PER_TOKEN)
        .max(1);

    let mut chunks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if paragraph.len() > budget {
            // Oversized paragraph: close the running chunk, then pack
            // sentences.
            flush(&mut chunks, &mut current, &mut current_len);
            for sentence in split_sentences(paragraph) {
                if current_len + sentence.len() > budget {
                    flush(&mut chunks, &mut current, &mut current_len);
                }
                current.push(sentence);
                current_len += sentence.len();
            }
        } else if current_len + paragraph.len() > budget {
            flush(&mut chunks, &mut current, &mut current_len);
            current.push(paragraph);
            current_len = paragraph.len();
        } else {
            current.push(paragraph);
            current_len += paragraph.len();
        }
    }

    flush(&mut chunks, &mut current, &mut current_len);
    chunks
}

fn flush(chunks: &mut Vec<String>, current: &mut Vec<&str>, current_len: &mut usize) {
    if !current.is_empty() {
        chunks.push(current.join("\n\n"));
        current.clear();
        *current_len = 0;
    }
}

/// Sentence split that keeps the ". " delimiter attached, so nothing is
/// lost when sentences are rejoined.
fn split_sentences(paragraph: &str) -> impl Iterator<Item = &str> {
    paragraph.split_inclusive(". ").filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn strip_whitespace(text: &str) -> String {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn empty_and_whitespace_input_yield_no_chunks() {
        assert!(chunk_text("", 500).is_empty());
        assert!(chunk_text("   \n\n  \t ", 500).is_empty());
        assert!(chunk_text("", 1).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("hello world", 500);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn paragraphs_are_packed_up_to_the_budget() {
        // Budget of 10 tokens = 40 chars; each paragraph is 20 chars.
        let para = "a".repeat(20);
        let text = format!("{para}\n\n{para}\n\n{para}");
        let chunks = chunk_text(&text, 10);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], format!("{para}\n\n{para}"));
        assert_eq!(chunks[1], para);
    }

    #[test]
    fn oversized_paragraph_falls_back_to_sentences() {
        // One paragraph of five 30-char sentences against a 40-char budget.
        let sentence = format!("{}. ", "b".repeat(28));
        let paragraph = sentence.repeat(5);
        let chunks = chunk_text(&paragraph, 10);

        assert!(chunks.len() > 1, "expected sentence-level split");
        assert_eq!(
            strip_whitespace(&chunks.concat()),
            strip_whitespace(&paragraph)
        );
    }

    #[test]
    fn single_sentence_beyond_budget_is_kept_whole() {
        let long = "c".repeat(200);
        let chunks = chunk_text(&long, 10);
        assert_eq!(chunks, vec![long]);
    }

    proptest! {
        #[test]
        fn never_drops_non_whitespace(text in "[ -~\n]{0,600}", size in 1usize..200) {
            let chunks = chunk_text(&text, size);
            prop_assert_eq!(
                strip_whitespace(&chunks.concat()),
                strip_whitespace(&text)
            );
        }

        #[test]
        fn empty_input_is_empty_for_any_size(size in 1usize..10_000) {
            prop_assert!(chunk_text("", size).is_empty());
        }
    }
}
