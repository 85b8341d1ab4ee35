use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::config::Credentials;

pub const DEFAULT_FLOW_PROGRAM: &str = "pf";
pub const CLASSIFY_NODE: &str = "classify_with_llm";
pub const OUTPUT_KEY: &str = "output";

/// Named inputs handed to the classification flow for one dataset row.
#[derive(Debug, Clone, Serialize)]
pub struct FlowInputs {
    pub query: Value,
    pub truth: Value,
    pub rule_id: String,
    pub data_file: String,
}

#[derive(Debug, Clone)]
pub struct FlowRequest<'a> {
    pub flow_path: &'a Path,
    pub variant: &'a str,
    pub inputs: &'a FlowInputs,
}

impl FlowRequest<'_> {
    /// Variant selector in the `${node.variant}` form understood by prompt flow.
    pub fn variant_selector(&self) -> String {
        format!("${{{CLASSIFY_NODE}.{}}}", self.variant)
    }
}

/// Executes a classification flow. Implementations are shared across workers.
pub trait FlowClient: Send + Sync {
    /// Returns the flow's output mapping, which carries the answer under `output`.
    fn invoke(&self, request: &FlowRequest<'_>) -> Result<Value>;
}

/// Runs flows through the prompt-flow command line, one process per call.
#[derive(Debug, Clone)]
pub struct CommandFlowClient {
    program: PathBuf,
    credentials: Credentials,
}

impl CommandFlowClient {
    pub fn new(program: impl Into<PathBuf>, credentials: Credentials) -> Self {
        Self {
            program: program.into(),
            credentials,
        }
    }

    fn build_command(&self, request: &FlowRequest<'_>) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("flow")
            .arg("test")
            .arg("--flow")
            .arg(request.flow_path)
            .arg("--variant")
            .arg(request.variant_selector())
            .arg("--inputs")
            .arg(format!("query={}", input_arg(&request.inputs.query)))
            .arg(format!("truth={}", input_arg(&request.inputs.truth)))
            .arg(format!("rule_id={}", request.inputs.rule_id))
            .arg(format!("data_file={}", request.inputs.data_file));

        command
            .env("AZURE_OPENAI_API_KEY", &self.credentials.api_key)
            .env("AZURE_OPENAI_ENDPOINT", &self.credentials.endpoint)
            .env("AOAI_CONNECTION_NAME", &self.credentials.connection_name);
        command
    }
}

impl FlowClient for CommandFlowClient {
    fn invoke(&self, request: &FlowRequest<'_>) -> Result<Value> {
        debug!(
            flow = %request.flow_path.display(),
            variant = request.variant,
            "invoking flow"
        );

        let output = self.build_command(request).output().with_context(|| {
            format!(
                "failed to execute {} for flow {}",
                self.program.display(),
                request.flow_path.display()
            )
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} returned non-zero exit status for flow {}: {}",
                self.program.display(),
                request.flow_path.display(),
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_flow_stdout(&stdout).with_context(|| {
            format!(
                "flow {} printed no JSON output",
                request.flow_path.display()
            )
        })
    }
}

fn input_arg(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Finds the last top-level JSON object printed by the flow runner.
pub fn parse_flow_stdout(stdout: &str) -> Option<Value> {
    let mut last = None;
    let mut cursor = 0;

    while let Some(offset) = stdout[cursor..].find('{') {
        let start = cursor + offset;
        let mut stream = serde_json::Deserializer::from_str(&stdout[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value @ Value::Object(_))) => {
                cursor = start + stream.byte_offset();
                last = Some(value);
            }
            _ => cursor = start + 1,
        }
    }

    last
}

/// Parses raw LLM text into a mapping, substituting a null verdict on failure.
pub fn convert_to_dict(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        Ok(other) => {
            error!(input = %other, "the input is not a JSON object");
            parse_failure()
        }
        Err(err) => {
            error!(error = %err, "the input is not valid JSON");
            parse_failure()
        }
    }
}

fn parse_failure() -> Value {
    json!({"violation": null, "reason": "Failed to parse LLM output."})
}

/// Pulls the raw answer for `result_key` out of a flow response.
pub fn extract_answer(response: &Value, result_key: &str) -> Option<Value> {
    match response.get(OUTPUT_KEY)? {
        Value::String(raw) => convert_to_dict(raw).get(result_key).cloned(),
        output => output.get(result_key).cloned(),
    }
}
