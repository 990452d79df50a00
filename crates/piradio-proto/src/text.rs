//! Text shaping for character displays.
//!
//! The panels only render printable ASCII, so every line goes through
//! `beautify` before it is queued. Track titles can additionally be stripped
//! of "noise" qualifiers such as `(Radio Edit)` to save precious columns.

use tracing::trace;

const LOWERCASE_ONLY_CHARS: &str = "0123456789abcdefghijklmnopqrstuvwxyz.+-*/%&!# _,;:()[]{}";
const NOISE_KEYWORDS: [&str; 6] = ["edit", "mix", "cdm", "cut", "rmx", "cover"];
const TITLE_SEPARATOR: &str = " - ";

fn transliterate(c: char) -> Option<&'static str> {
    let s = match c {
        '\u{2019}' | '\u{b4}' => "'",
        'á' | 'à' => "a",
        'é' | 'ê' | 'è' => "e",
        'í' => "i",
        'ä' => "ae",
        'Ä' => "Ae",
        'ö' => "oe",
        'Ö' => "Oe",
        'ü' => "ue",
        'Ü' => "Ue",
        'ß' => "ss",
        '…' => "...",
        'Ó' => "O",
        'ó' | 'õ' | 'ø' => "o",
        'ñ' => "n",
        'É' => "E",
        _ => return None,
    };
    Some(s)
}

/// True when `text` consists only of lowercase letters, digits and common
/// punctuation. Such text is left alone by camel casing.
pub fn is_only_lowercase(text: &str) -> bool {
    text.chars().all(|c| LOWERCASE_ONLY_CHARS.contains(c))
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !(c.is_ascii_alphanumeric() || c == '_');
    }
    out
}

/// Map `text` onto printable ASCII, optionally camel casing it.
pub fn beautify(text: &str, camel_case: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match transliterate(c) {
            Some(s) => out.push_str(s),
            None if (' '..='~').contains(&c) => out.push(c),
            None => trace!("Dropping unprintable char {:?}", c),
        }
    }

    if !camel_case || is_only_lowercase(&out) {
        return out;
    }

    let mut cased = title_case(&out.to_lowercase());
    // "Don'T" -> "Don't"
    if let Some(idx) = cased.find('\'') {
        if idx > 0 && idx + 1 < cased.len() {
            let tail = cased[idx + 1..].to_string();
            let mut chars = tail.chars();
            if let Some(first) = chars.next() {
                cased.truncate(idx + 1);
                cased.extend(first.to_lowercase());
                cased.push_str(chars.as_str());
            }
        }
    }
    cased
}

/// Remove a parenthesised qualifier like `(Radio Edit)` from a track title.
///
/// Only the first group is inspected. It must be non-empty, must not contain
/// a nested opening parenthesis and must mention one of the noise keywords;
/// otherwise the title is returned unchanged.
pub fn remove_noise(title: &str) -> String {
    let (Some(open), Some(close)) = (title.find('('), title.find(')')) else {
        return title.to_string();
    };
    if close <= open {
        return title.to_string();
    }

    let inner = &title[open + 1..close];
    if inner.is_empty() || inner.contains('(') {
        return title.to_string();
    }
    let lowered = inner.to_lowercase();
    if !NOISE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        return title.to_string();
    }

    let joined = format!("{}{}", &title[..open], &title[close + 1..]);
    let cleaned = joined.replace("  ", " ").replace(" .", "");
    let cleaned = cleaned.trim().to_string();
    trace!("Removed noise {:?} -> {:?}", title, cleaned);
    cleaned
}

/// Split `"Artist - Track"` into its two display segments.
pub fn split_title(title: &str) -> (&str, Option<&str>) {
    match title.find(TITLE_SEPARATOR) {
        Some(idx) if idx > 0 => (&title[..idx], Some(&title[idx + TITLE_SEPARATOR.len()..])),
        _ => (title, None),
    }
}
