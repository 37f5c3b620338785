//! Channel-specific markdown normalization for outbound text.

use crate::bus::events::Channel;

/// Convert common markdown to the dialect a channel renders.
///
/// WhatsApp uses single-character markers and has no headers; other
/// channels accept standard markdown and pass through unchanged.
pub fn convert_markdown(text: &str, channel: Channel) -> String {
    match channel {
        Channel::Whatsapp => to_whatsapp(text),
        Channel::Discord | Channel::Slack | Channel::Telegram | Channel::Web => text.to_string(),
    }
}

fn to_whatsapp(text: &str) -> String {
    let mut out = Vec::new();
    let mut in_code_block = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            out.push("```".to_string());
            continue;
        }
        if in_code_block {
            out.push(line.to_string());
            continue;
        }

        // Headers become bold lines.
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix('#') {
            let rest = rest.trim_start_matches('#').trim();
            if !rest.is_empty() {
                out.push(format!("*{rest}*"));
                continue;
            }
        }

        out.push(convert_inline(line));
    }

    out.join("\n")
}

/// `**bold**` → `*bold*`, `__italic__` → `_italic_`. Inline code is kept.
fn convert_inline(line: &str) -> String {
    line.replace("**", "*").replace("__", "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn whatsapp_bold_uses_single_asterisks() {
        assert_eq!(
            convert_markdown("this is **bold** text", Channel::Whatsapp),
            "this is *bold* text"
        );
    }

    #[test]
    fn whatsapp_headers_become_bold_lines() {
        let input = indoc! {"
            # Summary
            Details follow.
        "};
        let converted = convert_markdown(input, Channel::Whatsapp);
        assert!(converted.starts_with("*Summary*\n"));
    }

    #[test]
    fn whatsapp_code_blocks_left_untouched() {
        let input = indoc! {"
            ```
            let **x** = 1;
            ```
        "};
        let converted = convert_markdown(input, Channel::Whatsapp);
        assert!(converted.contains("let **x** = 1;"));
    }

    #[test]
    fn other_channels_pass_through() {
        let input = "# Title\n**bold**";
        assert_eq!(convert_markdown(input, Channel::Telegram), input);
        assert_eq!(convert_markdown(input, Channel::Web), input);
    }
}
