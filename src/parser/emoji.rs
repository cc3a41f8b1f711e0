//! Emoji shortcode and codepoint substitution.
//!
//! Both `:smile:` and a literal 😄 end up as the same `[[emoji:1f604]]`
//! marker, which the renderer turns into a glyph image. Shortcodes missing
//! from the table stay literal text.

use crate::model::marker::emoji_marker;

/// Shortcode → codepoint(s), sorted by shortcode for binary search.
const SHORTCODES: &[(&str, &str)] = &[
    ("+1", "1f44d"),
    ("-1", "1f44e"),
    ("angry", "1f620"),
    ("birthday", "1f382"),
    ("blush", "1f60a"),
    ("broken_heart", "1f494"),
    ("cake", "1f370"),
    ("clap", "1f44f"),
    ("cry", "1f622"),
    ("disappointed", "1f61e"),
    ("fire", "1f525"),
    ("flushed", "1f633"),
    ("gift", "1f381"),
    ("grin", "1f601"),
    ("grinning", "1f600"),
    ("heart", "2764"),
    ("heart_eyes", "1f60d"),
    ("hugs", "1f917"),
    ("innocent", "1f607"),
    ("joy", "1f602"),
    ("kiss", "1f48b"),
    ("kissing_heart", "1f618"),
    ("laughing", "1f606"),
    ("ok_hand", "1f44c"),
    ("pray", "1f64f"),
    ("rage", "1f621"),
    ("relaxed", "263a"),
    ("relieved", "1f60c"),
    ("rose", "1f339"),
    ("scream", "1f631"),
    ("see_no_evil", "1f648"),
    ("slightly_smiling_face", "1f642"),
    ("smile", "1f604"),
    ("smiley", "1f603"),
    ("smirk", "1f60f"),
    ("sob", "1f62d"),
    ("star", "2b50"),
    ("stuck_out_tongue", "1f61b"),
    ("sunglasses", "1f60e"),
    ("sunny", "2600"),
    ("sweat_smile", "1f605"),
    ("tada", "1f389"),
    ("thinking", "1f914"),
    ("thumbsdown", "1f44e"),
    ("thumbsup", "1f44d"),
    ("wave", "1f44b"),
    ("wink", "1f609"),
    ("yum", "1f60b"),
    ("zzz", "1f4a4"),
];

/// Codepoint ranges rendered as glyphs rather than font text.
const EMOJI_RANGES: &[(char, char)] = &[
    ('\u{231A}', '\u{231B}'),
    ('\u{23E9}', '\u{23FA}'),
    ('\u{2600}', '\u{27BF}'),
    ('\u{2B50}', '\u{2B50}'),
    ('\u{2B55}', '\u{2B55}'),
    ('\u{1F000}', '\u{1FAFF}'),
];

const VARIATION_SELECTOR: char = '\u{FE0F}';
const ZWJ: char = '\u{200D}';

/// Longest shortcode we bother scanning for.
const MAX_SHORTCODE_LEN: usize = 32;

/// Look up a shortcode (without colons).
pub fn lookup_shortcode(name: &str) -> Option<&'static str> {
    SHORTCODES
        .binary_search_by(|(code, _)| code.cmp(&name))
        .ok()
        .map(|i| SHORTCODES[i].1)
}

/// Whether a character is drawn as an emoji glyph.
pub fn is_emoji(c: char) -> bool {
    EMOJI_RANGES.iter().any(|&(lo, hi)| (lo..=hi).contains(&c))
}

/// Replace shortcodes and emoji codepoints with glyph markers.
pub fn substitute_emoji(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == ':' {
            if let Some((codepoints, len)) = match_shortcode(&chars[i..]) {
                out.push_str(&emoji_marker(codepoints));
                i += len;
                continue;
            }
            out.push(c);
            i += 1;
        } else if is_emoji(c) {
            let (codepoints, len) = collect_sequence(&chars[i..]);
            out.push_str(&emoji_marker(&codepoints));
            i += len;
        } else if c == VARIATION_SELECTOR {
            i += 1;
        } else {
            out.push(c);
            i += 1;
        }
    }

    out
}

/// `:name:` at the start of `chars`. Returns the codepoints and chars consumed.
fn match_shortcode(chars: &[char]) -> Option<(&'static str, usize)> {
    let end = chars
        .iter()
        .skip(1)
        .take(MAX_SHORTCODE_LEN)
        .position(|&c| c == ':')?
        + 1;
    let name: String = chars[1..end].iter().collect();
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "_+-".contains(c));
    if !valid {
        return None;
    }
    lookup_shortcode(&name).map(|cp| (cp, end + 1))
}

/// One glyph: base codepoint plus skin tones, flag pairs and ZWJ joins.
fn collect_sequence(chars: &[char]) -> (String, usize) {
    let mut parts = vec![format!("{:x}", chars[0] as u32)];
    let regional = |c: char| ('\u{1F1E6}'..='\u{1F1FF}').contains(&c);
    let mut i = 1;

    if regional(chars[0]) && chars.get(1).copied().is_some_and(regional) {
        parts.push(format!("{:x}", chars[1] as u32));
        return (parts.join("-"), 2);
    }

    while i < chars.len() {
        let c = chars[i];
        if c == VARIATION_SELECTOR {
            i += 1;
        } else if ('\u{1F3FB}'..='\u{1F3FF}').contains(&c) {
            parts.push(format!("{:x}", c as u32));
            i += 1;
        } else if c == ZWJ && chars.get(i + 1).copied().is_some_and(is_emoji) {
            parts.push(format!("{:x}", ZWJ as u32));
            parts.push(format!("{:x}", chars[i + 1] as u32));
            i += 2;
        } else {
            break;
        }
    }

    (parts.join("-"), i)
}
