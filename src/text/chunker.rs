//! Sentence chunking
//!
//! Splits normalized text into paragraphs (newlines), then sentences, then
//! enforces a soft word bound by re-packing clause pieces. Locales that write
//! sentences without spaces are cut on their own full stops and skip the
//! word bound.

use serde::Serialize;
use tracing::debug;

/// Default soft bound on words per chunk.
pub const DEFAULT_MAX_WORDS: usize = 24;

const TERMINALS: &[char] = &['.', '!', '?'];
const CLAUSE_SEPARATORS: &[char] = &[',', ';', ':'];
const UNSPACED_TERMINALS: &[char] = &['。', '！', '？'];

const EN_ABBREVIATIONS: &[&str] = &[
    "mr.", "mrs.", "ms.", "dr.", "prof.", "sr.", "jr.", "st.", "vs.", "etc.", "e.g.", "i.e.",
    "no.", "fig.", "approx.",
];

/// One synthesis unit. `paragraph` groups chunks, `sentence` orders them
/// inside the paragraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub paragraph: usize,
    pub sentence: usize,
    pub text: String,
}

/// Locale-aware sentence splitter. Returns `None` when it does not handle
/// the locale, in which case the punctuation split is used.
pub trait SentenceTokenizer: Send + Sync {
    fn split_sentences(&self, paragraph: &str, locale: &str) -> Option<Vec<String>>;
}

/// English tokenizer that refuses to split after common abbreviations.
#[derive(Debug, Default, Clone, Copy)]
pub struct AbbreviationAwareTokenizer;

impl SentenceTokenizer for AbbreviationAwareTokenizer {
    fn split_sentences(&self, paragraph: &str, locale: &str) -> Option<Vec<String>> {
        if crate::request::primary_subtag(locale) != "en" {
            return None;
        }
        Some(split_on_terminals(paragraph, |before| {
            let last_word = before
                .rsplit(char::is_whitespace)
                .next()
                .unwrap_or_default()
                .to_lowercase();
            !EN_ABBREVIATIONS.contains(&last_word.as_str())
        }))
    }
}

pub struct SentenceChunker {
    max_words: usize,
    tokenizer: Option<Box<dyn SentenceTokenizer>>,
}

impl Default for SentenceChunker {
    fn default() -> Self {
        Self {
            max_words: DEFAULT_MAX_WORDS,
            tokenizer: Some(Box::new(AbbreviationAwareTokenizer)),
        }
    }
}

impl std::fmt::Debug for SentenceChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentenceChunker")
            .field("max_words", &self.max_words)
            .field("tokenizer", &self.tokenizer.is_some())
            .finish()
    }
}

impl SentenceChunker {
    pub fn new(max_words: usize, tokenizer: Option<Box<dyn SentenceTokenizer>>) -> Self {
        Self {
            max_words: max_words.max(1),
            tokenizer,
        }
    }

    pub fn max_words(&self) -> usize {
        self.max_words
    }

    /// Split normalized text. Never returns an empty sequence.
    pub fn split(&self, text: &str, locale: &str) -> Vec<Chunk> {
        let unspaced = is_unspaced(locale);
        let mut chunks = Vec::new();

        let paragraphs = text.lines().map(str::trim).filter(|p| !p.is_empty());
        for (paragraph, para_text) in paragraphs.enumerate() {
            let sentences = if unspaced {
                split_unspaced(para_text)
            } else {
                self.tokenizer
                    .as_ref()
                    .and_then(|t| t.split_sentences(para_text, locale))
                    .unwrap_or_else(|| split_on_terminals(para_text, |_| true))
            };

            let pieces = sentences.into_iter().flat_map(|sentence| {
                if unspaced {
                    vec![sentence]
                } else {
                    bound_words(&sentence, self.max_words)
                }
            });

            let mut sentence = 0;
            for piece in pieces {
                let piece = piece.trim();
                if piece.is_empty() {
                    continue;
                }
                chunks.push(Chunk {
                    paragraph,
                    sentence,
                    text: piece.to_string(),
                });
                sentence += 1;
            }
        }

        if chunks.is_empty() {
            debug!("no sentence boundaries found; returning text as a single chunk");
            chunks.push(Chunk {
                paragraph: 0,
                sentence: 0,
                text: text.to_string(),
            });
        }
        chunks
    }
}

/// Locales that do not put spaces between sentences.
pub fn is_unspaced(locale: &str) -> bool {
    matches!(crate::request::primary_subtag(locale).as_str(), "zh" | "ja")
}

/// Rebuilds the paragraph/sentence layout the chunks were cut from.
pub fn reassemble(chunks: &[Chunk], locale: &str) -> String {
    let joiner = if is_unspaced(locale) { "" } else { " " };
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 {
            if chunk.paragraph != chunks[i - 1].paragraph {
                out.push('\n');
            } else {
                out.push_str(joiner);
            }
        }
        out.push_str(&chunk.text);
    }
    out
}

/// Splits after terminal punctuation that is followed by whitespace.
/// `accept` sees the text up to and including the punctuation and may veto
/// the boundary.
fn split_on_terminals(text: &str, accept: impl Fn(&str) -> bool) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if !TERMINALS.contains(&c) {
            continue;
        }
        // swallow runs like "?!" or "..."
        let mut end = idx + c.len_utf8();
        while let Some(&(next_idx, next)) = chars.peek() {
            if TERMINALS.contains(&next) {
                end = next_idx + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let followed_by_space = chars.peek().is_some_and(|(_, next)| next.is_whitespace());
        if followed_by_space && accept(&text[start..end]) {
            sentences.push(text[start..end].trim().to_string());
            start = end;
        }
    }
    if start < text.len() {
        sentences.push(text[start..].trim().to_string());
    }
    sentences.retain(|s| !s.is_empty());
    sentences
}

fn split_unspaced(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if UNSPACED_TERMINALS.contains(&c) {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current);
    }
    sentences
}

/// Breaks an over-long sentence at clause punctuation and greedily packs the
/// pieces back together without exceeding `max_words`. A single piece longer
/// than the bound is kept whole.
fn bound_words(sentence: &str, max_words: usize) -> Vec<String> {
    if word_count(sentence) <= max_words {
        return vec![sentence.to_string()];
    }

    let mut clauses = Vec::new();
    let mut start = 0;
    for (idx, c) in sentence.char_indices() {
        if CLAUSE_SEPARATORS.contains(&c) {
            let end = idx + c.len_utf8();
            clauses.push(&sentence[start..end]);
            start = end;
        }
    }
    clauses.push(&sentence[start..]);

    let mut packed: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_words = 0;
    for clause in clauses.into_iter().map(str::trim).filter(|c| !c.is_empty()) {
        let words = word_count(clause);
        if current_words > 0 && current_words + words > max_words {
            packed.push(std::mem::take(&mut current));
            current_words = 0;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(clause);
        current_words += words;
    }
    if !current.is_empty() {
        packed.push(current);
    }
    packed
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
