use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::tools::ToolInfo;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    pub name: &'static str,
    pub template: &'static str,
}

pub const CHAT_V1: PromptTemplate = PromptTemplate {
    name: "chat_v1",
    template: "You are a helpful assistant.\n\
               User prompt:\n\
               {prompt}\n\
               Return a concise answer.",
};

pub const EXPLAIN_V1: PromptTemplate = PromptTemplate {
    name: "explain_v1",
    template: "You are an AI application engineer.\n\
               Task: Explain the topic clearly for a developer.\n\
               Topic: {topic}\n\
               Context: {context}\n\
               Return JSON with keys: summary, risks, next_steps.\n\
               Constraints:\n\
               - summary: string\n\
               - risks: array of strings (<=5)\n\
               - next_steps: array of strings (<=5)\n",
};

/// Substitute `{name}` placeholders in a single pass over the template.
/// Unknown placeholders are left in place and substituted values are never
/// rescanned.
pub fn render(template: &PromptTemplate, params: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template.template, |caps: &Captures| {
            params
                .iter()
                .find(|(key, _)| *key == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

pub fn build_travel_agent_prompt(tools: &[ToolInfo], system_prompt: Option<String>) -> String {
    if let Some(custom) = system_prompt.filter(|p| !p.is_empty()) {
        return custom;
    }

    let tools_section = if tools.is_empty() {
        "You have no tools available.".to_string()
    } else {
        tools
            .iter()
            .map(|t| format!("- `{}`: {}", t.signature(), t.description))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"You are an intelligent travel assistant. Your task is to analyze user requests and use available tools to solve problems step by step.

# Available Tools:
{}

# Output Format Requirements:
Each response must strictly follow this format, containing one Thought-Action pair:

Thought: [Your thinking process and next step plan]
Action: [The specific action you want to execute]

Action format must be one of the following:
1. Call a tool: function_name(arg_name="arg_value")
2. Finish task: Finish[final answer]

# Important Notes:
- Output only one Thought-Action pair each time
- Action must be on the same line, do not break lines
- When you have collected enough information to answer the user's question, you must use Action: Finish[final answer] format to end

Let's begin!"#,
        tools_section
    )
}
