//! Prompt formatting
//!
//! ChatML prompt construction for Qwen-style models and cleanup of their raw output.

use crate::types::message::{Message, Role};

const IM_START: &str = "<|im_start|>";
const IM_END: &str = "<|im_end|>";
const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Format messages as a ChatML prompt, leaving an open assistant turn
pub fn chatml(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for message in messages {
        prompt.push_str(IM_START);
        prompt.push_str(message.role.as_str());
        prompt.push('\n');
        prompt.push_str(&message.content);
        prompt.push('\n');
        prompt.push_str(IM_END);
        prompt.push('\n');
    }
    prompt.push_str(IM_START);
    prompt.push_str(Role::Assistant.as_str());
    prompt.push('\n');
    prompt
}

/// System + user prompt pair as used for translation
pub fn system_user_prompt(system_prompt: &str, user_prompt: &str) -> String {
    chatml(&[Message::system(system_prompt), Message::user(user_prompt)])
}

/// A translation extracted from raw model output
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Translation {
    pub text: String,
    /// Content of a `<think>` block, empty if the model did not think aloud
    pub thoughts: String,
}

/// Clean raw model output into a translation.
///
/// Chat markers are stripped, a `<think>...</think>` block is split off as thoughts,
/// and only the first non-empty line of what remains is kept.
pub fn parse_translation(raw: &str) -> Translation {
    let mut cleaned = raw.to_string();
    for marker in [
        "<|im_start|>assistant",
        IM_END,
        "<|im_start|>user",
        "<|im_start|>system",
    ] {
        cleaned = cleaned.replace(marker, "");
    }
    let cleaned = cleaned.trim();

    let mut thoughts = String::new();
    let mut remainder = cleaned.to_string();

    if let Some(start) = cleaned.find(THINK_OPEN) {
        let body_start = start + THINK_OPEN.len();
        if let Some(len) = cleaned[body_start..].find(THINK_CLOSE) {
            let body_end = body_start + len;
            thoughts = cleaned[body_start..body_end].trim().to_string();
            remainder = format!(
                "{}{}",
                &cleaned[..start],
                &cleaned[body_end + THINK_CLOSE.len()..]
            );
        }
    }

    let text = remainder
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string();

    Translation { text, thoughts }
}
