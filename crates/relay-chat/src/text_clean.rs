//! Markdown and symbol stripping before speech synthesis.

use std::sync::LazyLock;

use regex::Regex;

static FENCED_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```[a-zA-Z0-9_+-]*\n?(.*?)```").unwrap());
static IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]+\)").unwrap());
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").unwrap());
static BOLD_STARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static BOLD_UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b__(.+?)__\b").unwrap());
static ITALIC_STAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*\n]+?)\*").unwrap());
static ITALIC_UNDERSCORE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b_([^_\n]+?)_\b").unwrap());
static HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#+[ \t]+").unwrap());
static BLOCKQUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^>[ \t]?").unwrap());
static SYMBOLS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x{2011}-\x{27BF}\x{E000}-\x{F8FF}\x{FE0F}\x{1F000}-\x{1FFFF}]").unwrap()
});

/// Strip markdown syntax and emoji/symbol code points that synthesis would
/// read aloud or mispronounce. `**Hello** [docs](https://x)` becomes
/// `Hello docs`.
pub fn clean_text_for_tts(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let clean = FENCED_CODE.replace_all(text, |caps: &regex::Captures<'_>| caps[1].trim().to_string());
    let clean = IMAGE.replace_all(&clean, "");
    let clean = LINK.replace_all(&clean, "$1");
    let clean = INLINE_CODE.replace_all(&clean, "$1");
    let clean = BOLD_STARS.replace_all(&clean, "$1");
    let clean = BOLD_UNDERSCORES.replace_all(&clean, "$1");
    let clean = ITALIC_STAR.replace_all(&clean, "$1");
    let clean = ITALIC_UNDERSCORE.replace_all(&clean, "$1");
    let clean = HEADER.replace_all(&clean, "");
    let clean = BLOCKQUOTE.replace_all(&clean, "");
    let clean = SYMBOLS.replace_all(&clean, "");
    clean.trim().to_string()
}
