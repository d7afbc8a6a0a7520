use std::path::Path;

use anyhow::{Context, Result};

use weekwise_core::plan::validate;

use crate::config::{CliOverrides, WeekwiseConfig};
use crate::output::{self, OutputPaths};

/// Re-validate a saved plan JSON file and export it again.
///
/// With no explicit paths, the CSV, calendar and summary land next to each
/// other under `<output dir>/<slug>/`. The JSON is not rewritten.
pub fn run_export(plan_path: &Path, outputs: OutputPaths) -> Result<()> {
    let raw = std::fs::read_to_string(plan_path)
        .with_context(|| format!("cannot read plan file: {}", plan_path.display()))?;
    let plan = validate(&raw).with_context(|| format!("invalid plan file: {}", plan_path.display()))?;

    let outputs = if outputs.is_empty() {
        let config = WeekwiseConfig::resolve(&CliOverrides::default())?;
        OutputPaths {
            plan_json: None,
            ..outputs.or_defaults(&config.output_dir, &plan)
        }
    } else {
        outputs
    };

    let written = output::write_exports(&plan, &outputs)?;
    output::report(&plan, &written);
    Ok(())
}
