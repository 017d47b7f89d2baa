//! Orchestrators: a lead responder that can hand tasks to team members.
//!
//! Each member is offered to the lead's model as a tool named
//! `transfer_task_to_<member>`. The model decides whom to consult and in
//! what order; nothing here enforces a sequence. The roster is appended to
//! the lead's system prompt.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::Result;
use crate::responder::{Respond, Responder, Response};
use crate::tools::{Tool, ToolError};

/// Lowercase, runs of non-alphanumerics collapsed to one `_`.
pub fn slug(name: &str) -> String {
    let mut out = String::new();
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

pub struct Orchestrator {
    lead: Responder,
    members: Vec<Arc<dyn Respond>>,
}

impl Orchestrator {
    pub fn new(lead: Responder, members: Vec<Arc<dyn Respond>>) -> Self {
        let mut roster = String::from("Team members you can transfer tasks to:");
        let mut lead = lead;
        for member in &members {
            let tool = DelegateTool::new(member.clone());
            roster.push_str(&format!(
                "\n- {} (tool `{}`): {}",
                member.name(),
                tool.name,
                member.description()
            ));
            lead = lead.with_tool(Box::new(tool));
        }
        if !members.is_empty() {
            lead = lead.with_section(roster);
        }
        Self { lead, members }
    }

    pub fn members(&self) -> &[Arc<dyn Respond>] {
        &self.members
    }

    pub fn lead(&self) -> &Responder {
        &self.lead
    }
}

#[async_trait]
impl Respond for Orchestrator {
    fn name(&self) -> &str {
        self.lead.name()
    }

    fn description(&self) -> &str {
        self.lead.description()
    }

    async fn respond(&self, query: &str) -> Result<Response> {
        self.lead.respond(query).await
    }
}

/// Runs one team member on a task handed over by the lead.
pub struct DelegateTool {
    name: String,
    description: String,
    member: Arc<dyn Respond>,
}

impl DelegateTool {
    pub fn new(member: Arc<dyn Respond>) -> Self {
        Self {
            name: format!("transfer_task_to_{}", slug(member.name())),
            description: format!(
                "Transfer a task to {}. {}",
                member.name(),
                member.description()
            ),
            member,
        }
    }
}

#[derive(Deserialize)]
struct Transfer {
    task_description: String,
    #[serde(default)]
    expected_output: Option<String>,
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_description": { "type": "string", "description": "What the member should do" },
                "expected_output": { "type": "string", "description": "What the answer should contain" },
            },
            "required": ["task_description"],
        })
    }

    async fn execute(&self, params: Value) -> std::result::Result<Value, ToolError> {
        let args: Transfer =
            serde_json::from_value(params).map_err(|e| ToolError::InvalidArguments {
                tool: self.name.clone(),
                reason: e.to_string(),
            })?;
        if args.task_description.trim().is_empty() {
            return Err(ToolError::InvalidArguments {
                tool: self.name.clone(),
                reason: "task_description must not be empty".to_string(),
            });
        }
        let task = match args.expected_output {
            Some(expected) if !expected.trim().is_empty() => {
                format!("{}\n\nExpected output: {}", args.task_description, expected)
            }
            _ => args.task_description,
        };

        info!(member = self.member.name(), "task transferred");
        let answer = self.member.respond(&task).await?;
        Ok(json!({ "member": self.member.name(), "response": answer.text }))
    }
}
