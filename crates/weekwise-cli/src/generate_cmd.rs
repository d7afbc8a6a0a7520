use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;

use weekwise_core::PlanBuilder;

use crate::config::{CliOverrides, WeekwiseConfig};
use crate::output::{self, OutputPaths};

/// What to plan: shared by `generate` and `prompt`.
#[derive(Debug, Args)]
pub struct PlanRequest {
    /// Project description text
    #[arg(long, conflicts_with = "description_file", required_unless_present = "description_file")]
    pub description: Option<String>,
    /// Read the project description from a file
    #[arg(long)]
    pub description_file: Option<PathBuf>,
    /// First day of week 1 (YYYY-MM-DD, default: today)
    #[arg(long)]
    pub start: Option<NaiveDate>,
    /// Number of weeks to plan
    #[arg(long)]
    pub weeks: u32,
    /// Hours available per week, passed to the model as a budget hint
    #[arg(long)]
    pub hours_per_week: Option<f64>,
}

impl PlanRequest {
    pub fn description(&self) -> Result<String> {
        match (&self.description, &self.description_file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("cannot read description file: {}", path.display())),
            (None, None) => anyhow::bail!("one of --description or --description-file is required"),
        }
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

/// Execute `weekwise generate`.
pub async fn run_generate(
    request: &PlanRequest,
    overrides: &CliOverrides,
    outputs: OutputPaths,
) -> Result<()> {
    let config = WeekwiseConfig::resolve(overrides)?;
    let description = request.description()?;
    let start = request.start_date();

    let builder = PlanBuilder::new(
        Arc::new(config.provider()),
        config.builder_config(request.hours_per_week),
    );
    let plan = builder
        .build(&description, start, request.weeks, config.max_retries)
        .await?;

    let outputs = outputs.or_defaults(&config.output_dir, &plan);
    let written = output::write_exports(&plan, &outputs)?;
    output::report(&plan, &written);
    Ok(())
}
