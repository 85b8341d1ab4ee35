use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::Value;

use crate::util::read_json;

/// Looks up the rule context a flow feeds into its prompt. Ids are case-sensitive.
pub fn prepare_rule_data(data_file: &Path, rule_id: &str) -> Result<Value> {
    let rules: Value = read_json(data_file)?;
    find_rule(rules, rule_id).with_context(|| format!("invalid rule data: {}", data_file.display()))
}

fn find_rule(rules: Value, rule_id: &str) -> Result<Value> {
    let Value::Array(rules) = rules else {
        bail!("rule data must be a JSON array of rule objects");
    };

    rules
        .into_iter()
        .find(|rule| rule.get("id").and_then(Value::as_str) == Some(rule_id))
        .with_context(|| format!("rule `{rule_id}` not found"))
}
