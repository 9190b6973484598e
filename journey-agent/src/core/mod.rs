use crate::clients::LLMClient;
use crate::config::DEFAULT_MAX_ITERATIONS;
use crate::memory::Transcript;
use crate::parser::{ParsedAction, parse_action, truncate_turn};
use crate::prompts::build_travel_agent_prompt;
use crate::tools::ToolRegistry;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One model turn as seen by the progress trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub iteration: usize,
    pub output: String,
    pub truncated: bool,
    pub observation: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentState {
    Running(usize),
    Done(String),
    Exhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutcome {
    Finished { answer: String, iterations: usize },
    /// The ceiling was hit without a `Finish` action.
    Exhausted { iterations: usize },
}

impl AgentOutcome {
    pub fn answer(&self) -> Option<&str> {
        match self {
            AgentOutcome::Finished { answer, .. } => Some(answer),
            AgentOutcome::Exhausted { .. } => None,
        }
    }

    pub fn iterations(&self) -> usize {
        match self {
            AgentOutcome::Finished { iterations, .. } | AgentOutcome::Exhausted { iterations } => {
                *iterations
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentRun {
    pub outcome: AgentOutcome,
    pub transcript: Transcript,
}

pub type StepCallback = Arc<dyn Fn(&Step) + Send + Sync>;

pub struct ReactAgent {
    client: Arc<dyn LLMClient>,
    tools: ToolRegistry,
    system_prompt: String,
    max_iterations: usize,
    step_callback: Option<StepCallback>,
}

impl ReactAgent {
    pub fn new(
        client: Box<dyn LLMClient>,
        tools: ToolRegistry,
        max_iterations: Option<usize>,
        step_callback: Option<StepCallback>,
    ) -> Self {
        let system_prompt = build_travel_agent_prompt(&tools.definitions(), None);
        Self {
            client: Arc::from(client),
            tools,
            system_prompt,
            max_iterations: max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
            step_callback,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: String) -> Self {
        self.system_prompt = build_travel_agent_prompt(&self.tools.definitions(), Some(system_prompt));
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Drive the Thought/Action/Observation loop until the model finishes or
    /// the iteration ceiling is reached.
    pub async fn run(&self, request: &str) -> AgentRun {
        let mut transcript = Transcript::with_request(request);
        let mut state = AgentState::Running(0);
        let mut iterations = 0;

        info!(max_iterations = self.max_iterations, "agent started");

        loop {
            state = match state {
                AgentState::Running(iteration) if iteration >= self.max_iterations => {
                    AgentState::Exhausted
                }
                AgentState::Running(iteration) => {
                    iterations = iteration + 1;
                    self.turn(iteration, &mut transcript).await
                }
                AgentState::Done(answer) => {
                    info!(iterations, "agent finished");
                    return AgentRun {
                        outcome: AgentOutcome::Finished { answer, iterations },
                        transcript,
                    };
                }
                AgentState::Exhausted => {
                    warn!(iterations, "agent gave up without a final answer");
                    return AgentRun {
                        outcome: AgentOutcome::Exhausted { iterations },
                        transcript,
                    };
                }
            };
        }
    }

    async fn turn(&self, iteration: usize, transcript: &mut Transcript) -> AgentState {
        let prompt = transcript.render();
        let raw = self.client.generate(&self.system_prompt, &prompt).await;

        let (output, truncated) = match truncate_turn(&raw) {
            Cow::Owned(cut) => (cut, true),
            Cow::Borrowed(_) => (raw.clone(), false),
        };
        if truncated {
            debug!(iteration = iteration + 1, "truncated extra Thought-Action pairs");
        }
        transcript.append(output.clone());

        let (next, observation) = match parse_action(&output) {
            Ok(ParsedAction::Finish { answer }) => (AgentState::Done(answer), None),
            Ok(ParsedAction::ToolCall { name, arguments }) => {
                info!(iteration = iteration + 1, tool = %name, "dispatching tool");
                let observation = self.tools.dispatch(&name, arguments).await;
                (AgentState::Running(iteration + 1), Some(observation))
            }
            Err(e) => {
                warn!(iteration = iteration + 1, error = %e, "could not parse model output");
                (AgentState::Running(iteration + 1), Some(e.observation()))
            }
        };

        if let Some(ref observation) = observation {
            transcript.append_observation(observation);
        }

        if let Some(ref callback) = self.step_callback {
            callback(&Step {
                iteration: iteration + 1,
                output,
                truncated,
                observation,
            });
        }

        next
    }
}
