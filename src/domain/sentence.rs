//! Tokenisation and sentence-boundary placement (spec §4.5 "Sentence
//! parsing"), shared by the Node's write session, commit merge, and undo
//! machinery.

/// A single sentence: its words in order, including any terminal
/// delimiter attached to the last word.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sentence {
    pub words: Vec<String>,
}

impl Sentence {
    /// The character a sentence is considered "closed" by, if any. A
    /// trailing fragment with no terminal delimiter returns `None`.
    pub fn terminal_delimiter(&self) -> Option<char> {
        self.words.last().and_then(|w| w.chars().last()).filter(|c| is_terminator(*c))
    }

    pub fn is_terminated(&self) -> bool {
        self.terminal_delimiter().is_some()
    }

    pub fn render(&self) -> String {
        self.words.join(" ")
    }
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Splits whitespace-delimited `content` into an ordered sequence of
/// sentences. A sentence boundary falls after every word ending in `.`,
/// `!`, or `?`; a trailing run of words with no terminator forms one
/// final, unterminated sentence. An empty or all-whitespace input yields
/// no sentences (callers treat that as "one writable slot", see
/// [`writable_sentence_count`]).
pub fn split_sentences(content: &str) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    let mut current = Sentence::default();

    for word in content.split_whitespace() {
        current.words.push(word.to_string());
        if word.chars().last().is_some_and(is_terminator) {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.words.is_empty() {
        sentences.push(current);
    }
    sentences
}

/// Reassembles sentences back into single-spaced text, matching spec §9's
/// note that the three-way merge reserialises with single spaces rather
/// than preserving original whitespace.
pub fn render_sentences(sentences: &[Sentence]) -> String {
    sentences.iter().map(Sentence::render).collect::<Vec<_>>().join(" ")
}

/// Number of sentence slots open to `WRITE`: `sentences.len()`, or `1` for
/// an empty file (spec: "An empty file is treated as having one writable
/// sentence slot").
pub fn writable_sentence_count(sentences: &[Sentence]) -> usize {
    sentences.len().max(1)
}

/// Highest 1-based sentence index a `WRITE` may target: `sentences + 1`
/// when the last existing sentence is delimiter-terminated (or the file is
/// empty), else `sentences` (appending mid-fragment is not a new slot).
pub fn max_write_index(sentences: &[Sentence]) -> usize {
    match sentences.last() {
        None => 1,
        Some(last) if last.is_terminated() => sentences.len() + 1,
        Some(_) => sentences.len(),
    }
}

/// Inserts `new_words` at the 1-based `word_index` within `sentence`,
/// preserving (and reattaching) the sentence's terminal delimiter to the
/// new last word. `word_index` must be in `[1, words_in_sentence + 1]`.
pub fn insert_words(sentence: &Sentence, word_index: usize, new_words: &[String]) -> Option<Sentence> {
    let len = sentence.words.len();
    if word_index < 1 || word_index > len + 1 {
        return None;
    }

    let delimiter = sentence.terminal_delimiter();
    let mut body: Vec<String> = sentence.words.clone();
    if delimiter.is_some() {
        if let Some(last) = body.last_mut() {
            strip_trailing_terminator(last);
        }
    }

    let idx = word_index - 1;
    for (offset, word) in new_words.iter().enumerate() {
        body.insert(idx + offset, word.clone());
    }

    if let Some(delim) = delimiter {
        if let Some(last) = body.last_mut() {
            last.push(delim);
        }
    }

    Some(Sentence { words: body })
}

fn strip_trailing_terminator(word: &mut String) {
    if word.chars().last().is_some_and(is_terminator) {
        word.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_sentences() {
        let sentences = split_sentences("one two. three four five! six?");
        assert_eq!(sentences.len(), 3);
        assert_eq!(sentences[0].render(), "one two.");
        assert_eq!(sentences[1].render(), "three four five!");
        assert_eq!(sentences[2].render(), "six?");
    }

    #[test]
    fn trailing_fragment_is_its_own_sentence() {
        let sentences = split_sentences("one. two three");
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].is_terminated());
        assert!(!sentences[1].is_terminated());
    }

    #[test]
    fn empty_content_has_one_writable_slot() {
        let sentences = split_sentences("");
        assert_eq!(writable_sentence_count(&sentences), 1);
        assert_eq!(max_write_index(&sentences), 1);
    }

    #[test]
    fn terminated_file_allows_append_slot() {
        let sentences = split_sentences("one. two.");
        assert_eq!(max_write_index(&sentences), 3);
    }

    #[test]
    fn unterminated_file_does_not_allow_append_slot() {
        let sentences = split_sentences("one. two");
        assert_eq!(max_write_index(&sentences), 2);
    }

    #[test]
    fn insert_reattaches_delimiter() {
        let sentence = Sentence { words: vec!["hello".into(), "world.".into()] };
        let edited = insert_words(&sentence, 1, &["ZERO".to_string()]).unwrap();
        assert_eq!(edited.render(), "ZERO hello world.");
    }

    #[test]
    fn insert_at_end_of_sentence() {
        let sentence = Sentence { words: vec!["hello".into(), "world.".into()] };
        let edited = insert_words(&sentence, 3, &["done".to_string()]).unwrap();
        assert_eq!(edited.render(), "hello world done.");
    }

    #[test]
    fn insert_out_of_range_fails() {
        let sentence = Sentence { words: vec!["hello.".into()] };
        assert!(insert_words(&sentence, 0, &["x".to_string()]).is_none());
        assert!(insert_words(&sentence, 3, &["x".to_string()]).is_none());
    }
}
