use std::io::{self, Write};

use anyhow::{Context, Result};

use crate::cli::PrepareRuleArgs;
use crate::rules::prepare_rule_data;

pub fn run(args: PrepareRuleArgs) -> Result<()> {
    let rule = prepare_rule_data(&args.data_file, &args.rule)?;

    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, &rule).context("failed to serialize rule json")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}
