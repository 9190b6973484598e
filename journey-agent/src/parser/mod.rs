//! Textual Thought/Action protocol.
//!
//! The model answers with
//!
//! ```text
//! Thought: <reasoning>
//! Action: get_weather(city="Paris")
//! ```
//!
//! or `Action: Finish[<answer>]`. Models regularly keep going and invent
//! `Observation:` lines and further pairs, so a turn is first cut back to its
//! first Thought/Action pair and only then classified.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;
use thiserror::Error;

use crate::tools::ToolArgs;

const THOUGHT_LABEL: &str = "Thought:";
const ACTION_LABEL: &str = "Action:";
const LABELS: [&str; 3] = [THOUGHT_LABEL, ACTION_LABEL, "Observation:"];

static TOOL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)\(").expect("tool name pattern"));
static TOOL_ARGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((.*)\)").expect("tool arguments pattern"));
static KEYWORD_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)="([^"]*)""#).expect("keyword argument pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedAction {
    ToolCall { name: String, arguments: ToolArgs },
    Finish { answer: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("No action found. Please explicitly use Action: ... format.")]
    NoAction,
    #[error("Malformed Finish action '{0}'. Please use Finish[final answer] format.")]
    MalformedFinish(String),
    #[error(
        "Could not parse tool call '{0}'. Please use function_name(arg_name=\"arg_value\") format."
    )]
    MalformedToolCall(String),
}

impl ParseError {
    /// Text fed back to the model in place of a tool observation.
    pub fn observation(&self) -> String {
        format!("Error: {}", self)
    }
}

/// Locate the first `Thought: ... Action: ...` region. It ends right before
/// the next line that starts (after optional whitespace) with a protocol
/// label, or at end of text.
pub fn find_turn(text: &str) -> Option<&str> {
    let start = text.find(THOUGHT_LABEL)?;
    let after_thought = start + THOUGHT_LABEL.len();
    let action = after_thought + text[after_thought..].find(ACTION_LABEL)?;
    let end = label_boundary(text, action + ACTION_LABEL.len()).unwrap_or(text.len());
    Some(&text[start..end])
}

fn label_boundary(text: &str, from: usize) -> Option<usize> {
    text[from..]
        .match_indices('\n')
        .map(|(offset, _)| from + offset)
        .find(|&newline| {
            let rest = text[newline + 1..].trim_start();
            LABELS.iter().any(|label| rest.starts_with(label))
        })
}

/// Drop hallucinated extra pairs. Returns the input untouched when there is
/// nothing to cut, so applying it twice changes nothing.
pub fn truncate_turn(text: &str) -> Cow<'_, str> {
    match find_turn(text) {
        Some(region) if region.trim() != text.trim() => Cow::Owned(region.trim().to_string()),
        _ => Cow::Borrowed(text),
    }
}

/// Everything after the first `Action: ` label, trimmed.
pub fn extract_action(text: &str) -> Option<&str> {
    let label = "Action: ";
    text.find(label)
        .map(|idx| text[idx + label.len()..].trim())
}

pub fn parse_action(text: &str) -> Result<ParsedAction, ParseError> {
    let action = extract_action(text).ok_or(ParseError::NoAction)?;

    if action.starts_with("Finish") {
        return parse_finish(action);
    }
    parse_tool_call(action)
}

// The answer runs to the last `]` on the first line of the action.
fn parse_finish(action: &str) -> Result<ParsedAction, ParseError> {
    let malformed = || ParseError::MalformedFinish(action.to_string());

    let rest = action.strip_prefix("Finish[").ok_or_else(malformed)?;
    let first_line = rest.split('\n').next().unwrap_or_default();
    let close = first_line.rfind(']').ok_or_else(malformed)?;

    Ok(ParsedAction::Finish {
        answer: first_line[..close].to_string(),
    })
}

fn parse_tool_call(action: &str) -> Result<ParsedAction, ParseError> {
    let malformed = || ParseError::MalformedToolCall(action.to_string());

    let name = TOOL_NAME
        .captures(action)
        .and_then(|caps| caps.get(1))
        .ok_or_else(malformed)?
        .as_str()
        .to_string();
    let args_text = TOOL_ARGS
        .captures(action)
        .and_then(|caps| caps.get(1))
        .ok_or_else(malformed)?
        .as_str();

    let arguments = KEYWORD_ARG
        .captures_iter(args_text)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect();

    Ok(ParsedAction::ToolCall { name, arguments })
}
