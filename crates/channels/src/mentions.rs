use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::unwrap_used)]
static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<@!?\d+>").unwrap());

/// Remove every user-mention token (`<@123>` / `<@!123>`) and trim.
#[must_use]
pub fn strip_mentions(text: &str) -> String {
    MENTION_RE.replace_all(text, "").trim().to_string()
}

/// Whether `text` contains a mention token for `user_id`.
#[must_use]
pub fn mentions_user(text: &str, user_id: &str) -> bool {
    MENTION_RE.find_iter(text).any(|m| {
        let inner = m.as_str().trim_start_matches("<@").trim_start_matches('!');
        inner.trim_end_matches('>') == user_id
    })
}
