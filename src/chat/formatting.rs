// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Markdown and Slack mrkdwn translation
//!
//! Code spans and fenced blocks are copied through untouched.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```|`[^`\n]*`").unwrap());

static FENCE_LANGUAGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(\s*)```[\w+#.\-]+[ \t]*$").unwrap());

static MD_BOLD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*|__([^_\n]+?)__").unwrap());

static MD_ITALIC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*\n]+?)\*").unwrap());

static MD_STRIKE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"~~([^~\n]+?)~~").unwrap());

static MD_LINK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]\n]+)\]\((https?://[^)\s]+)\)").unwrap());

static MD_HEADING_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+(.+?)[ \t]*$").unwrap());

static SLACK_BOLD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*\n]+?)\*").unwrap());

static SLACK_ITALIC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[^\w])_([^_\n]+?)_($|[^\w])").unwrap());

static SLACK_STRIKE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"~([^~\n]+?)~").unwrap());

static SLACK_LINK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(https?://[^|>\s]+)\|([^>\n]+)>").unwrap());

/// Bold marker that cannot collide with text while italics are rewritten.
const BOLD_PLACEHOLDER: char = '\u{1}';

/// Prepare model output for Slack.
///
/// Fence language tags are always removed; the rest only when `translate_markdown` is set.
pub fn format_reply_for_slack(content: &str, translate_markdown: bool) -> String {
    let stripped = FENCE_LANGUAGE_PATTERN.replace_all(content, "$1```");
    if translate_markdown {
        markdown_to_slack(&stripped)
    } else {
        stripped.into_owned()
    }
}

/// Prepare a Slack message for the model.
pub fn format_message_for_model(content: &str, translate_markdown: bool) -> String {
    if translate_markdown {
        slack_to_markdown(content)
    } else {
        content.to_string()
    }
}

/// Convert Markdown emphasis, links and headings to mrkdwn.
pub fn markdown_to_slack(content: &str) -> String {
    outside_code(content, |text| {
        let placeholder = BOLD_PLACEHOLDER.to_string();
        let text = MD_BOLD_PATTERN.replace_all(text, |caps: &Captures| {
            let inner = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            format!("{placeholder}{inner}{placeholder}")
        });
        let text = MD_HEADING_PATTERN.replace_all(&text, format!("{placeholder}$1{placeholder}"));
        let text = MD_ITALIC_PATTERN.replace_all(&text, "_${1}_");
        let text = MD_STRIKE_PATTERN.replace_all(&text, "~$1~");
        let text = MD_LINK_PATTERN.replace_all(&text, "<$2|$1>");
        text.replace(BOLD_PLACEHOLDER, "*")
    })
}

/// Convert mrkdwn emphasis and links to Markdown.
pub fn slack_to_markdown(content: &str) -> String {
    outside_code(content, |text| {
        let text = SLACK_BOLD_PATTERN.replace_all(text, "**$1**");
        let text = SLACK_ITALIC_PATTERN.replace_all(&text, "$1*$2*$3");
        let text = SLACK_STRIKE_PATTERN.replace_all(&text, "~~$1~~");
        let text = SLACK_LINK_PATTERN.replace_all(&text, "[$2]($1)");
        text.into_owned()
    })
}

/// Apply `convert` to every stretch of `content` that is not code.
fn outside_code<F>(content: &str, convert: F) -> String
where
    F: Fn(&str) -> String,
{
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    for code in CODE_PATTERN.find_iter(content) {
        out.push_str(&convert(&content[last..code.start()]));
        out.push_str(code.as_str());
        last = code.end();
    }
    out.push_str(&convert(&content[last..]));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_language_stripped_without_translation() {
        let input = "Here:\n```rust\nfn main() {}\n```";
        assert_eq!(
            format_reply_for_slack(input, false),
            "Here:\n```\nfn main() {}\n```"
        );
    }

    #[test]
    fn test_no_translation_keeps_markdown() {
        assert_eq!(format_reply_for_slack("**bold**", false), "**bold**");
        assert_eq!(format_message_for_model("*bold*", false), "*bold*");
    }

    #[test]
    fn test_markdown_bold_and_italic() {
        assert_eq!(markdown_to_slack("**bold** and *it*"), "*bold* and _it_");
        assert_eq!(markdown_to_slack("__bold__"), "*bold*");
    }

    #[test]
    fn test_markdown_strike_and_link() {
        assert_eq!(markdown_to_slack("~~gone~~"), "~gone~");
        assert_eq!(
            markdown_to_slack("see [docs](https://example.com/a)"),
            "see <https://example.com/a|docs>"
        );
    }

    #[test]
    fn test_markdown_heading() {
        assert_eq!(markdown_to_slack("## Title\nbody"), "*Title*\nbody");
    }

    #[test]
    fn test_code_is_untouched() {
        let input = "**b** `*x*` and\n```\n**y**\n```";
        assert_eq!(markdown_to_slack(input), "*b* `*x*` and\n```\n**y**\n```");
    }

    #[test]
    fn test_slack_to_markdown() {
        assert_eq!(slack_to_markdown("*bold* _it_ ~s~"), "**bold** *it* ~~s~~");
        assert_eq!(
            slack_to_markdown("<https://example.com|site>"),
            "[site](https://example.com)"
        );
    }

    #[test]
    fn test_slack_italic_ignores_identifiers() {
        assert_eq!(slack_to_markdown("call snake_case_name"), "call snake_case_name");
    }

    #[test]
    fn test_translation_flag_routes() {
        assert_eq!(format_reply_for_slack("**b**", true), "*b*");
        assert_eq!(format_message_for_model("*b*", true), "**b**");
    }
}
