//! Static content rules for generated titles, tags and scripts.
//!
//! Every function returns the full list of human-readable violations; an empty list
//! means the input passes. Lengths are counted in Unicode scalar values.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::generation::schema::ScriptBeats;

pub const TITLE_MIN_CHARS: usize = 20;
pub const TITLE_MAX_CHARS: usize = 35;
pub const TITLE_MAX_EMOJIS: usize = 1;
pub const TITLE_MAX_NUMBERS: usize = 2;

pub const TAGS_MIN: usize = 5;
pub const TAGS_MAX: usize = 10;
pub const TAG_MIN_CHARS: usize = 2;
pub const TAG_MAX_CHARS: usize = 20;

/// Clickbait vocabulary banned from titles.
pub const FORBIDDEN_TITLE_WORDS: &[&str] = &["클릭", "충격", "경악", "실화", "미친", "대박", "레전드", "역대급"];

/// Personal-data vocabulary banned from tags.
pub const FORBIDDEN_TAG_WORDS: &[&str] = &["개인정보", "전화번호", "이메일", "주소", "실명"];

/// Hedging vocabulary; scripts must stay factual.
pub const SPECULATION_WORDS: &[&str] = &["추측", "아마도", "예상", "카더라", "소문"];

/// (name, min chars, max chars) per beat, in script order.
const BEAT_BOUNDS: [(&str, usize, usize); 3] = [("hook", 10, 200), ("body", 20, 500), ("cta", 10, 100)];

static EMOJI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x{1F600}-\x{1F64F}\x{1F300}-\x{1F5FF}\x{1F680}-\x{1F6FF}\x{1F1E0}-\x{1F1FF}]")
        .expect("static emoji pattern")
});

static NUMBER_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("static number pattern"));

fn found_words<'a>(text: &str, words: &[&'a str]) -> Vec<&'a str> {
    words.iter().copied().filter(|w| text.contains(w)).collect()
}

pub fn validate_titles(titles: &[String]) -> Vec<String> {
    let mut violations = Vec::new();

    for (i, title) in titles.iter().enumerate() {
        let n = i + 1;
        let len = title.chars().count();
        if !(TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&len) {
            violations.push(format!(
                "Title {n} length {len} not in range {TITLE_MIN_CHARS}-{TITLE_MAX_CHARS}: {title}"
            ));
        }

        let emojis = EMOJI.find_iter(title).count();
        if emojis > TITLE_MAX_EMOJIS {
            violations.push(format!("Title {n} has {emojis} emojis (max {TITLE_MAX_EMOJIS}): {title}"));
        }

        let forbidden = found_words(title, FORBIDDEN_TITLE_WORDS);
        if !forbidden.is_empty() {
            violations.push(format!("Title {n} contains forbidden words {forbidden:?}: {title}"));
        }

        let numbers = NUMBER_RUN.find_iter(title).count();
        if numbers > TITLE_MAX_NUMBERS {
            violations.push(format!("Title {n} has excessive numbers ({numbers}): {title}"));
        }
    }

    violations
}

pub fn validate_tags(tags: &[String]) -> Vec<String> {
    let mut violations = Vec::new();

    if !(TAGS_MIN..=TAGS_MAX).contains(&tags.len()) {
        violations.push(format!("Tag count {} not in range {TAGS_MIN}-{TAGS_MAX}", tags.len()));
    }

    for (i, tag) in tags.iter().enumerate() {
        violations.extend(tag_violations(i + 1, tag));
    }

    let unique: HashSet<&String> = tags.iter().collect();
    if unique.len() != tags.len() {
        violations.push(format!(
            "Duplicate tags found: {} total, {} unique",
            tags.len(),
            unique.len()
        ));
    }

    violations
}

/// Rules that apply to a single tag at 1-based position `n`.
pub fn tag_violations(n: usize, tag: &str) -> Vec<String> {
    let mut violations = Vec::new();

    let content = match tag.strip_prefix('#') {
        Some(rest) => rest,
        None => {
            violations.push(format!("Tag {n} must start with #: {tag}"));
            tag
        }
    };

    let len = content.chars().count();
    if !(TAG_MIN_CHARS..=TAG_MAX_CHARS).contains(&len) {
        violations.push(format!(
            "Tag {n} length {len} not in range {TAG_MIN_CHARS}-{TAG_MAX_CHARS}: {tag}"
        ));
    }

    let forbidden = found_words(tag, FORBIDDEN_TAG_WORDS);
    if !forbidden.is_empty() {
        violations.push(format!("Tag {n} contains forbidden content {forbidden:?}: {tag}"));
    }

    violations
}

pub fn validate_script(beats: &ScriptBeats) -> Vec<String> {
    let mut violations = Vec::new();
    let contents = [&beats.hook, &beats.body, &beats.cta];

    for ((name, min, max), content) in BEAT_BOUNDS.iter().zip(contents) {
        let Some(content) = content else {
            violations.push(format!("Missing required script beat: {name}"));
            continue;
        };
        if content.trim().is_empty() {
            violations.push(format!("Script beat {name} is empty"));
            continue;
        }

        let len = content.chars().count();
        if !(*min..=*max).contains(&len) {
            violations.push(format!("Script beat {name} length {len} not in range {min}-{max}"));
        }

        let speculation = found_words(content, SPECULATION_WORDS);
        if !speculation.is_empty() {
            violations.push(format!("Script {name} contains speculation words {speculation:?}"));
        }
    }

    violations
}
