//! Numeral, date, time and percentage expansion.
//!
//! Integers are split into base-1000 groups and every group is read with a
//! three-digit reader. Every group except the most significant one is read in
//! "full" form, which pronounces an absent hundreds digit ("không trăm") and an
//! absent tens digit ("linh") in Vietnamese.
//!
//! Numbers longer than the magnitude table covers are read digit by digit.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static VI_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\bngày\s+)?\b(\d{1,2})/(\d{1,2})(?:/(\d+))?").expect("valid regex")
});
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d+))?").expect("valid regex"));
static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})(?::|h)(\d{2})(?::(\d{2}))?\b").expect("valid regex")
});
static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d(?:[\d.,]*\d)?)\s*%").expect("valid regex"));
static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(-?)(\d[\d.,/:]*)").expect("valid regex"));

const VI_DIGITS: [&str; 10] = [
    "không", "một", "hai", "ba", "bốn", "năm", "sáu", "bảy", "tám", "chín",
];
const VI_MAGNITUDES: [&str; 7] = ["", "nghìn", "triệu", "tỷ", "nghìn tỷ", "triệu tỷ", "tỷ tỷ"];

const EN_DIGITS: [&str; 10] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
];
const EN_TEENS: [&str; 10] = [
    "ten", "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen",
    "eighteen", "nineteen",
];
const EN_TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];
const EN_MAGNITUDES: [&str; 7] = [
    "", "thousand", "million", "billion", "trillion", "quadrillion", "quintillion",
];
const EN_MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

/// Locales with a numeral vocabulary. Everything else keeps its digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumeralLocale {
    Vietnamese,
    English,
}

impl NumeralLocale {
    pub fn from_code(code: &str) -> Option<Self> {
        match crate::request::primary_subtag(code).as_str() {
            "vi" => Some(Self::Vietnamese),
            "en" => Some(Self::English),
            _ => None,
        }
    }

    fn digit(self, d: usize) -> &'static str {
        match self {
            Self::Vietnamese => VI_DIGITS[d],
            Self::English => EN_DIGITS[d],
        }
    }

    fn magnitudes(self) -> &'static [&'static str] {
        match self {
            Self::Vietnamese => &VI_MAGNITUDES,
            Self::English => &EN_MAGNITUDES,
        }
    }

    fn negative(self) -> &'static str {
        match self {
            Self::Vietnamese => "âm",
            Self::English => "negative",
        }
    }

    fn point(self) -> &'static str {
        match self {
            Self::Vietnamese => "phẩy",
            Self::English => "point",
        }
    }

    fn percent(self) -> &'static str {
        match self {
            Self::Vietnamese => "phần trăm",
            Self::English => "percent",
        }
    }

    /// (thousands separator, decimal separator)
    fn separators(self) -> (char, char) {
        match self {
            Self::Vietnamese => ('.', ','),
            Self::English => (',', '.'),
        }
    }

    /// Reads a value below 1000. `full` pronounces absent leading digits.
    fn read_group(self, value: usize, full: bool) -> Vec<String> {
        let (h, t, u) = (value / 100, (value / 10) % 10, value % 10);
        let mut words: Vec<String> = Vec::new();
        match self {
            Self::Vietnamese => {
                if h > 0 || full {
                    words.push(self.digit(h).into());
                    words.push("trăm".into());
                }
                match t {
                    0 if u > 0 && (h > 0 || full) => words.push("linh".into()),
                    0 => {}
                    1 => words.push("mười".into()),
                    _ => {
                        words.push(self.digit(t).into());
                        words.push("mươi".into());
                    }
                }
                let unit = match u {
                    0 => None,
                    1 if t >= 2 => Some("mốt"),
                    4 if t >= 2 => Some("tư"),
                    5 if t >= 1 => Some("lăm"),
                    _ => Some(self.digit(u)),
                };
                words.extend(unit.map(String::from));
            }
            Self::English => {
                if h > 0 {
                    words.push(self.digit(h).into());
                    words.push("hundred".into());
                }
                match (t, u) {
                    (0, 0) => {}
                    (0, _) => words.push(self.digit(u).into()),
                    (1, _) => words.push(EN_TEENS[u].into()),
                    (_, 0) => words.push(EN_TENS[t].into()),
                    _ => words.push(format!("{}-{}", EN_TENS[t], self.digit(u))),
                }
            }
        }
        words
    }

    fn month_word(self, month: usize) -> String {
        match self {
            // April is read "tháng tư", never "tháng bốn".
            Self::Vietnamese if month == 4 => "tư".to_string(),
            Self::Vietnamese => integer_to_words(&month.to_string(), self),
            Self::English => EN_MONTHS[month - 1].to_string(),
        }
    }
}

/// Spells out a non-negative integer.
pub fn number_to_words(n: u64, locale: NumeralLocale) -> String {
    integer_to_words(&n.to_string(), locale)
}

/// Spells out an integer given as a string of ASCII digits.
pub fn integer_to_words(digits: &str, locale: NumeralLocale) -> String {
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return locale.digit(0).to_string();
    }

    let magnitudes = locale.magnitudes();
    if digits.len() > magnitudes.len() * 3 {
        return digits_to_words(digits, locale);
    }

    let bytes = digits.as_bytes();
    let mut groups = Vec::new();
    let mut end = bytes.len();
    while end > 0 {
        let start = end.saturating_sub(3);
        let value = bytes[start..end]
            .iter()
            .fold(0usize, |acc, b| acc * 10 + usize::from(b - b'0'));
        groups.push(value);
        end = start;
    }

    let top = groups.len() - 1;
    let mut words = Vec::new();
    for (position, value) in groups.iter().enumerate().rev() {
        if *value == 0 {
            continue;
        }
        words.extend(locale.read_group(*value, position != top));
        if !magnitudes[position].is_empty() {
            words.push(magnitudes[position].to_string());
        }
    }
    words.join(" ")
}

/// Reads each digit on its own.
pub fn digits_to_words(digits: &str, locale: NumeralLocale) -> String {
    digits
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| locale.digit(d as usize))
        .collect::<Vec<_>>()
        .join(" ")
}

fn decimal_to_words(int_part: &str, frac: &str, locale: NumeralLocale) -> String {
    let mut out = integer_to_words(int_part, locale);
    if !frac.is_empty() {
        out.push(' ');
        out.push_str(locale.point());
        out.push(' ');
        out.push_str(&digits_to_words(frac, locale));
    }
    out
}

/// Runs every numeral pass in order: dates, times, percentages, bare numbers.
pub fn expand_numerals(text: &str, locale: NumeralLocale) -> String {
    let text = expand_dates(text, locale);
    let text = expand_times(&text, locale);
    let text = expand_percentages(&text, locale);
    expand_bare_numbers(&text, locale)
}

fn expand_dates(text: &str, locale: NumeralLocale) -> String {
    let (re, offset) = match locale {
        NumeralLocale::Vietnamese => (&*VI_DATE_RE, 1),
        NumeralLocale::English => (&*DATE_RE, 0),
    };
    re.replace_all(text, |caps: &Captures| {
        let original = caps[0].to_string();
        let day: usize = caps[1 + offset].parse().unwrap_or(0);
        let month: usize = caps[2 + offset].parse().unwrap_or(0);
        let year = caps.get(3 + offset).map(|m| m.as_str());
        if !(1..=31).contains(&day) || !(1..=12).contains(&month) {
            return original;
        }
        if year.is_some_and(|y| y.len() != 4) {
            return original;
        }

        match locale {
            NumeralLocale::Vietnamese => {
                let prefix = caps.get(1).map_or("ngày ", |m| m.as_str());
                let mut out = format!(
                    "{prefix}{} tháng {}",
                    integer_to_words(&day.to_string(), locale),
                    locale.month_word(month)
                );
                if let Some(year) = year {
                    out.push_str(" năm ");
                    out.push_str(&integer_to_words(year, locale));
                }
                out
            }
            NumeralLocale::English => {
                let mut out = format!(
                    "{} {}",
                    locale.month_word(month),
                    integer_to_words(&day.to_string(), locale)
                );
                if let Some(year) = year {
                    out.push(' ');
                    out.push_str(&integer_to_words(year, locale));
                }
                out
            }
        }
    })
    .into_owned()
}

fn expand_times(text: &str, locale: NumeralLocale) -> String {
    TIME_RE
        .replace_all(text, |caps: &Captures| {
            let original = caps[0].to_string();
            let hours: usize = caps[1].parse().unwrap_or(99);
            let minutes: usize = caps[2].parse().unwrap_or(99);
            let seconds: Option<usize> = caps.get(3).and_then(|m| m.as_str().parse().ok());
            if hours > 23 || minutes > 59 || seconds.is_some_and(|s| s > 59) {
                return original;
            }
            let h = integer_to_words(&hours.to_string(), locale);
            let m = integer_to_words(&minutes.to_string(), locale);

            match locale {
                NumeralLocale::Vietnamese => {
                    let mut out = format!("{h} giờ");
                    if minutes > 0 || seconds.is_some() {
                        out.push_str(&format!(" {m} phút"));
                    }
                    if let Some(s) = seconds.filter(|s| *s > 0) {
                        out.push_str(&format!(" {} giây", integer_to_words(&s.to_string(), locale)));
                    }
                    out
                }
                NumeralLocale::English => {
                    let mut out = match minutes {
                        0 => format!("{h} o'clock"),
                        1..=9 => format!("{h} oh {m}"),
                        _ => format!("{h} {m}"),
                    };
                    if let Some(s) = seconds.filter(|s| *s > 0) {
                        out.push_str(&format!(
                            " and {} seconds",
                            integer_to_words(&s.to_string(), locale)
                        ));
                    }
                    out
                }
            }
        })
        .into_owned()
}

fn expand_percentages(text: &str, locale: NumeralLocale) -> String {
    PERCENT_RE
        .replace_all(text, |caps: &Captures| match read_numeral(&caps[1], locale) {
            Some(words) => format!("{words} {}", locale.percent()),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn expand_bare_numbers(text: &str, locale: NumeralLocale) -> String {
    NUMBER_RE
        .replace_all(text, |caps: &Captures| {
            let whole = caps[0].to_string();
            let start = caps.get(0).map_or(0, |m| m.start());
            let token = &caps[2];

            // A hyphen only reads as a sign when it opens a word: "2-3" stays a range.
            let signed = !caps[1].is_empty()
                && text[..start]
                    .chars()
                    .next_back()
                    .is_none_or(|c| !c.is_alphanumeric());

            let core = token.trim_end_matches(|c: char| !c.is_ascii_digit());
            let tail = &token[core.len()..];

            let Some(words) = read_numeral(core, locale) else {
                return whole;
            };
            let sign = match (caps[1].is_empty(), signed) {
                (true, _) => String::new(),
                (false, true) => format!("{} ", locale.negative()),
                (false, false) => "-".to_string(),
            };
            format!("{sign}{words}{tail}")
        })
        .into_owned()
}

/// Reads one numeric token. Returns `None` for anything that is not a plain
/// integer or decimal, including leftovers of the date and time passes.
fn read_numeral(core: &str, locale: NumeralLocale) -> Option<String> {
    if core.contains(['/', ':']) {
        return None;
    }
    let (thousands, decimal) = locale.separators();

    let (int_part, frac) = match core.rsplit_once(decimal) {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (core, None),
    };

    if let Some(frac) = frac {
        if frac.is_empty() || !frac.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
    }

    if let Some(digits) = ungroup(int_part, thousands) {
        return Some(match frac {
            Some(frac) => decimal_to_words(&digits, frac, locale),
            None => integer_to_words(&digits, locale),
        });
    }

    // "3.5" in a locale grouping with '.' is still a decimal.
    if frac.is_none() {
        if let Some((int_part, frac)) = core.split_once(thousands) {
            let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
            if all_digits(int_part) && all_digits(frac) {
                return Some(decimal_to_words(int_part, frac, locale));
            }
        }
    }
    None
}

/// Strips well-formed thousands grouping: "1.234.567" -> "1234567".
fn ungroup(int_part: &str, separator: char) -> Option<String> {
    if int_part.is_empty() {
        return None;
    }
    if int_part.chars().all(|c| c.is_ascii_digit()) {
        return Some(int_part.to_string());
    }
    let mut parts = int_part.split(separator);
    let head = parts.next()?;
    if head.is_empty() || head.len() > 3 || !head.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut digits = head.to_string();
    for part in parts {
        if part.len() != 3 || !part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        digits.push_str(part);
    }
    Some(digits)
}
