//! Writing exported plan files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use weekwise_core::Plan;
use weekwise_core::export::{slugify, to_calendar, to_markdown, to_table};

/// Explicit output paths. When none is given, every format is written
/// under `<output dir>/<plan slug>/`.
#[derive(Debug, Default, Args)]
pub struct OutputPaths {
    /// Write the CSV task table here
    #[arg(long)]
    pub table: Option<PathBuf>,
    /// Write the iCalendar file here
    #[arg(long)]
    pub calendar: Option<PathBuf>,
    /// Write the Markdown summary here
    #[arg(long)]
    pub summary: Option<PathBuf>,
    /// Write the validated plan JSON here
    #[arg(long)]
    pub plan_json: Option<PathBuf>,
}

impl OutputPaths {
    pub fn is_empty(&self) -> bool {
        self.table.is_none()
            && self.calendar.is_none()
            && self.summary.is_none()
            && self.plan_json.is_none()
    }

    /// Fill every slot with `<dir>/<slug>/plan.<ext>` if nothing was given.
    pub fn or_defaults(self, output_dir: &Path, plan: &Plan) -> Self {
        if !self.is_empty() {
            return self;
        }
        let dir = output_dir.join(slugify(&plan.title));
        Self {
            table: Some(dir.join("plan.csv")),
            calendar: Some(dir.join("plan.ics")),
            summary: Some(dir.join("plan.md")),
            plan_json: Some(dir.join("plan.json")),
        }
    }
}

/// Render and write every requested format. Returns the paths written.
pub fn write_exports(plan: &Plan, paths: &OutputPaths) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    let jobs: [(&Option<PathBuf>, fn(&Plan) -> String); 4] = [
        (&paths.table, to_table),
        (&paths.calendar, to_calendar),
        (&paths.summary, to_markdown),
        (&paths.plan_json, Plan::to_json),
    ];
    for (path, render) in jobs {
        if let Some(path) = path {
            write_file(path, &render(plan))?;
            written.push(path.clone());
        }
    }
    Ok(written)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create output directory: {}", parent.display()))?;
    }
    std::fs::write(path, contents)
        .with_context(|| format!("cannot write output file: {}", path.display()))?;
    info!(path = %path.display(), bytes = contents.len(), "wrote export");
    Ok(())
}

/// Print where the plan went and any repairs made to it.
pub fn report(plan: &Plan, written: &[PathBuf]) {
    println!(
        "Plan \"{}\": {} week(s), {} task(s) from {} to {}",
        plan.title,
        plan.weeks.len(),
        plan.task_count(),
        plan.start_date,
        plan.end_date()
    );
    for path in written {
        println!("  wrote {}", path.display());
    }
    if !plan.warnings.is_empty() {
        println!("{} warning(s):", plan.warnings.len());
        for warning in &plan.warnings {
            println!("  - {warning}");
        }
    }
}
