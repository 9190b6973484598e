pub mod api;
pub mod clients;
pub mod config;
pub mod core;
pub mod memory;
pub mod parser;
pub mod prompts;
pub mod schemas;
pub mod service;
pub mod tools;

pub use clients::{LLMClient, LLMError, LLM_FAILURE_SENTINEL, Message, MessageRole, OpenAIClient};
pub use config::{Config, ConfigError};
pub use crate::core::{AgentOutcome, AgentRun, AgentState, ReactAgent, Step};
pub use memory::Transcript;
pub use parser::{ParseError, ParsedAction, parse_action, truncate_turn};
pub use prompts::build_travel_agent_prompt;
pub use service::{AIProvider, AIService, StubProvider};
pub use tools::{ToolRegistry, ToolTrait, default_tools};
