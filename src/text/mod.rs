//! Text normalization
//!
//! Turns raw request text into its canonical speakable form:
//! 1. Unicode canonical composition (NFC)
//! 2. optional locale grammar normalizer (best effort)
//! 3. punctuation and whitespace tidy-up
//! 4. acronym substitution
//! 5. numeral / date / time / percentage expansion
//!
//! The pipeline is pure and idempotent when no grammar normalizer is plugged in.

pub mod chunker;
pub mod numbers;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

pub use chunker::{Chunk, SentenceChunker, SentenceTokenizer};
pub use numbers::{NumeralLocale, number_to_words};

static REPEATED_TERMINAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([.!?])(?:[ \t]*[.!?])+").expect("valid regex"));
static SPACE_BEFORE_PUNCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]+([,.!?;:])").expect("valid regex"));
static HORIZONTAL_SPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\S\n]+").expect("valid regex"));

const STRIPPED_QUOTES: &[char] = &['"', '\u{201C}', '\u{201D}', '\u{201E}', '\u{00AB}', '\u{00BB}'];

static VI_ACRONYMS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        ("AI", "ây ai"),
        ("TV", "ti vi"),
        ("OK", "ô kê"),
        ("CEO", "xi i âu"),
        ("USD", "đô la Mỹ"),
        ("VN", "Việt Nam"),
    ]
    .into_iter()
    .map(|(from, to)| {
        let re = Regex::new(&format!(r"\b{from}\b")).expect("valid regex");
        (re, to)
    })
    .collect()
});

/// Locale grammar normalizer living outside this crate (e.g. a
/// language-specific text normalization service).
pub trait GrammarNormalizer: Send + Sync {
    fn normalize(&self, text: &str, locale: &str) -> anyhow::Result<String>;
}

#[derive(Default)]
pub struct TextNormalizer {
    grammar: Option<Box<dyn GrammarNormalizer>>,
}

impl std::fmt::Debug for TextNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextNormalizer")
            .field("grammar", &self.grammar.is_some())
            .finish()
    }
}

impl TextNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grammar(grammar: Box<dyn GrammarNormalizer>) -> Self {
        Self {
            grammar: Some(grammar),
        }
    }

    /// Normalize `text` for `locale`. Never fails; empty in, empty out.
    pub fn normalize(&self, text: &str, locale: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }

        let mut result: String = text.nfc().collect();

        if let Some(grammar) = &self.grammar {
            match grammar.normalize(&result, locale) {
                Ok(normalized) => result = normalized.nfc().collect(),
                Err(e) => debug!("grammar normalizer failed, keeping input: {e:#}"),
            }
        }

        result = tidy_punctuation(&result);
        result = substitute_acronyms(&result, locale);

        if let Some(numerals) = NumeralLocale::from_code(locale) {
            result = numbers::expand_numerals(&result, numerals);
        }
        result
    }
}

/// Strips quotes, squeezes whitespace, removes spaces before punctuation
/// and collapses repeated terminals. Paragraph breaks survive as single
/// newlines.
fn tidy_punctuation(text: &str) -> String {
    let text = text
        .replace('\u{2026}', ".")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(STRIPPED_QUOTES, "");
    let text = HORIZONTAL_SPACE_RE.replace_all(&text, " ");
    let text = SPACE_BEFORE_PUNCT_RE.replace_all(&text, "$1");
    let text = REPEATED_TERMINAL_RE.replace_all(&text, "$1");

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn substitute_acronyms(text: &str, locale: &str) -> String {
    if crate::request::primary_subtag(locale) != "vi" {
        return text.to_string();
    }
    VI_ACRONYMS
        .iter()
        .fold(text.to_string(), |acc, (re, to)| re.replace_all(&acc, *to).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Shouting;

    impl GrammarNormalizer for Shouting {
        fn normalize(&self, text: &str, _locale: &str) -> anyhow::Result<String> {
            Ok(text.to_uppercase())
        }
    }

    struct Broken;

    impl GrammarNormalizer for Broken {
        fn normalize(&self, _text: &str, _locale: &str) -> anyhow::Result<String> {
            anyhow::bail!("service unavailable")
        }
    }

    #[test]
    fn empty_input_stays_empty() {
        let normalizer = TextNormalizer::new();
        assert_eq!(normalizer.normalize("", "vi"), "");
        assert_eq!(normalizer.normalize("  \n\t ", "vi"), "");
    }

    #[test]
    fn composes_unicode() {
        let normalizer = TextNormalizer::new();
        // "e" + combining circumflex + combining acute
        let decomposed = "Tie\u{0302}\u{0301}ng Vie\u{0323}\u{0302}t";
        assert_eq!(normalizer.normalize(decomposed, "vi"), "Tiếng Việt");
    }

    #[test]
    fn tidies_punctuation_and_quotes() {
        let normalizer = TextNormalizer::new();
        assert_eq!(
            normalizer.normalize("Xin chào !!!  \u{201C}Bạn\u{201D} khỏe không ??", "vi"),
            "Xin chào! Bạn khỏe không?"
        );
        assert_eq!(normalizer.normalize("Wait\u{2026} what", "en"), "Wait. what");
        assert_eq!(normalizer.normalize("Xin chào ! !", "vi"), "Xin chào!");
    }

    #[test]
    fn keeps_paragraphs_as_single_newlines() {
        let normalizer = TextNormalizer::new();
        assert_eq!(
            normalizer.normalize("  First line.  \n\n\n   Second   line. ", "en"),
            "First line.\nSecond line."
        );
    }

    #[test]
    fn acronyms_are_vietnamese_only() {
        let normalizer = TextNormalizer::new();
        assert_eq!(normalizer.normalize("Công nghệ AI", "vi"), "Công nghệ ây ai");
        assert_eq!(normalizer.normalize("Modern AI", "en"), "Modern AI");
        assert_eq!(normalizer.normalize("MAIL", "vi"), "MAIL");
    }

    #[test]
    fn expands_numerals_for_known_locales_only() {
        let normalizer = TextNormalizer::new();
        assert_eq!(
            normalizer.normalize("Giảm 50% vào ngày 5/3/2024.", "vi"),
            "Giảm năm mươi phần trăm vào ngày năm tháng ba năm hai nghìn không trăm hai mươi tư."
        );
        assert_eq!(normalizer.normalize("I have 5 apples", "en-US"), "I have five apples");
        assert_eq!(normalizer.normalize("私は5個", "ja"), "私は5個");
    }

    #[test]
    fn normalization_is_idempotent() {
        let normalizer = TextNormalizer::new();
        let samples = [
            ("Hôm nay, ngày 5/3/2024 lúc 7h30 giá tăng 3,5% !!", "vi"),
            ("\u{201C}Xin chào\u{201D}  AI ... 1.000.000 đồng -5 độ", "vi"),
            ("Tỉ số 45/67 và 25:99, còn 1.2.3 thì sao?", "vi"),
            ("Meet at 9:05 on 12/11. Cost: 1,250.50 dollars!!", "en"),
            ("Line one.\n\n\nLine two ?", "en"),
            ("Xin chào ! !", "vi"),
            ("Really ? ! . Yes\u{00A0}!", "en"),
            ("Thật sao ,  \u{201C}!\u{201D} .", "vi"),
            ("", "vi"),
            ("数字123。下一句", "zh"),
        ];
        for (input, locale) in samples {
            let once = normalizer.normalize(input, locale);
            let twice = normalizer.normalize(&once, locale);
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn grammar_normalizer_is_applied() {
        let normalizer = TextNormalizer::with_grammar(Box::new(Shouting));
        assert_eq!(normalizer.normalize("hello", "en"), "HELLO");
    }

    #[test]
    fn grammar_failures_are_swallowed() {
        let normalizer = TextNormalizer::with_grammar(Box::new(Broken));
        assert_eq!(normalizer.normalize("hello  world", "en"), "hello world");
    }
}
