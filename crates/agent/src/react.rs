//! Parser for the `Thought / Action / Action Input / Final Answer` format.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

pub const FINAL_ANSWER_MARKER: &str = "Final Answer:";
pub const MISSING_ACTION_AFTER_THOUGHT: &str = "Invalid Format: Missing 'Action:' after 'Thought:";
pub const MISSING_ACTION_INPUT_AFTER_ACTION: &str =
    "Invalid Format: Missing 'Action Input:' after 'Action:'";
pub const INVALID_RESPONSE: &str = "Invalid or incomplete response";

static ACTION_WITH_INPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)[\s]*Action\s*\d*\s*Input\s*\d*\s*:[\s]*(.*)")
        .unwrap_or_else(|error| unreachable!("action pattern is a literal: {error}"))
});
static ACTION_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)")
        .unwrap_or_else(|error| unreachable!("action pattern is a literal: {error}"))
});
static ACTION_INPUT_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)[\s]*Action\s*\d*\s*Input\s*\d*\s*:[\s]*(.*)")
        .unwrap_or_else(|error| unreachable!("action input pattern is a literal: {error}"))
});

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentAction {
    pub tool: String,
    pub tool_input: String,
    /// Raw model text that produced the action; replayed in the scratchpad.
    pub log: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentFinish {
    pub output: String,
    pub log: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentDecision {
    Action(AgentAction),
    Finish(AgentFinish),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct OutputParseError {
    pub message: String,
    /// Corrective hint for the model; `None` means the generic retry text is used.
    pub observation: Option<String>,
    pub llm_output: String,
}

impl OutputParseError {
    fn new(text: &str, observation: Option<&str>) -> Self {
        Self {
            message: format!("Could not parse LLM output: `{text}`"),
            observation: observation.map(str::to_string),
            llm_output: text.to_string(),
        }
    }

    pub fn feedback(&self) -> &str {
        self.observation.as_deref().unwrap_or(INVALID_RESPONSE)
    }
}

pub fn parse_react_output(text: &str) -> Result<AgentDecision, OutputParseError> {
    let includes_answer = text.contains(FINAL_ANSWER_MARKER);

    if let Some(captures) = ACTION_WITH_INPUT.captures(text) {
        if includes_answer {
            return Err(OutputParseError {
                message: format!(
                    "Parsing LLM output produced both a final answer and a parse-able action: {text}"
                ),
                observation: None,
                llm_output: text.to_string(),
            });
        }

        let tool = captures.get(1).map_or("", |m| m.as_str()).trim().to_string();
        let tool_input =
            captures.get(2).map_or("", |m| m.as_str()).trim_matches(' ').trim_matches('"');
        return Ok(AgentDecision::Action(AgentAction {
            tool,
            tool_input: tool_input.to_string(),
            log: text.to_string(),
        }));
    }

    if includes_answer {
        let output = text.rsplit(FINAL_ANSWER_MARKER).next().unwrap_or_default().trim();
        return Ok(AgentDecision::Finish(AgentFinish {
            output: output.to_string(),
            log: text.to_string(),
        }));
    }

    if !ACTION_ONLY.is_match(text) {
        Err(OutputParseError::new(text, Some(MISSING_ACTION_AFTER_THOUGHT)))
    } else if !ACTION_INPUT_ONLY.is_match(text) {
        Err(OutputParseError::new(text, Some(MISSING_ACTION_INPUT_AFTER_ACTION)))
    } else {
        Err(OutputParseError::new(text, None))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        parse_react_output, AgentDecision, MISSING_ACTION_AFTER_THOUGHT,
        MISSING_ACTION_INPUT_AFTER_ACTION,
    };

    #[test]
    fn action_and_input_are_extracted() {
        let text = " I should look at the tables.\nAction: sql_db_list_tables\nAction Input: \"\"";
        match parse_react_output(text) {
            Ok(AgentDecision::Action(action)) => {
                assert_eq!(action.tool, "sql_db_list_tables");
                assert_eq!(action.tool_input, "");
                assert_eq!(action.log, text);
            }
            other => panic!("expected an action, got {other:?}"),
        }
    }

    #[test]
    fn multiline_action_input_is_kept() {
        let text = "Action: sql_db_query\nAction Input: SELECT nome\nFROM produtos\nLIMIT 1";
        let Ok(AgentDecision::Action(action)) = parse_react_output(text) else {
            panic!("expected an action");
        };
        assert_eq!(action.tool_input, "SELECT nome\nFROM produtos\nLIMIT 1");
    }

    #[test]
    fn final_answer_takes_the_text_after_the_last_marker() {
        let text = "Thought: I now know the final answer\nFinal Answer: Temos 5 produtos em estoque.";
        let Ok(AgentDecision::Finish(finish)) = parse_react_output(text) else {
            panic!("expected a final answer");
        };
        assert_eq!(finish.output, "Temos 5 produtos em estoque.");
    }

    #[test]
    fn answer_and_action_together_is_an_error() {
        let text = "Action: sql_db_query\nAction Input: SELECT 1\nFinal Answer: 1";
        let error = parse_react_output(text).expect_err("ambiguous output");
        assert!(error.message.contains("both a final answer and a parse-able action"));
        assert_eq!(error.feedback(), "Invalid or incomplete response");
    }

    #[test]
    fn missing_pieces_carry_corrective_observations() {
        let error = parse_react_output("I think the answer is 42").expect_err("no action");
        assert_eq!(error.feedback(), MISSING_ACTION_AFTER_THOUGHT);

        let error = parse_react_output("Action: sql_db_query").expect_err("no input");
        assert_eq!(error.feedback(), MISSING_ACTION_INPUT_AFTER_ACTION);
        assert_eq!(error.llm_output, "Action: sql_db_query");
    }
}
