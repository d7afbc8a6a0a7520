//! Human-readable Markdown summary of a plan.

use std::fmt::Write;

use crate::plan::Plan;

/// Render a Markdown overview: totals, one section per week, then the
/// model's assumptions and any validation warnings.
pub fn to_markdown(plan: &Plan) -> String {
    let mut md = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(md, "# Plan: {}\n", plan.title);
    let _ = writeln!(md, "- Start: {}", plan.start_date);
    let _ = writeln!(md, "- Weeks: {} (through {})", plan.weeks.len(), plan.end_date());
    let _ = writeln!(md, "- Tasks: {}", plan.task_count());
    let _ = writeln!(md, "- Estimated total hours: {:.1}", plan.total_hours());

    for week in &plan.weeks {
        let (first, last) = plan.week_range(week.index);
        let _ = writeln!(md, "\n## Week {}: {} ({first} → {last})\n", week.index, week.label);
        if week.tasks.is_empty() {
            md.push_str("_No tasks scheduled._\n");
        }
        for task in &week.tasks {
            let hours = task
                .estimated_hours
                .map(|h| format!("{h}h, "))
                .unwrap_or_default();
            let overflow = if task.overflow { " *(overflow)*" } else { "" };
            let _ = writeln!(
                md,
                "- **{}** ({hours}{} → {}){overflow}",
                task.title, task.start, task.end
            );
            if let Some(desc) = &task.description {
                let _ = writeln!(md, "  {}", desc.replace('\n', "\n  "));
            }
            if !task.depends_on.is_empty() {
                let _ = writeln!(md, "  Depends on: {}", task.depends_on.join(", "));
            }
        }
    }

    if let Some(assumptions) = &plan.assumptions {
        let _ = writeln!(md, "\n## Assumptions\n\n{assumptions}");
    }

    if !plan.warnings.is_empty() {
        md.push_str("\n## Warnings\n\n");
        for warning in &plan.warnings {
            let _ = writeln!(md, "- {warning}");
        }
    }
    md
}

/// Directory-safe slug for a plan title. Falls back to `project`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.trim().chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "project".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::plan::{PlanWarning, Task, Week};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn summary_sections() {
        let plan = Plan {
            title: "Essay".to_string(),
            start_date: d("2025-01-06"),
            weeks: vec![
                Week {
                    index: 1,
                    label: "Research".to_string(),
                    tasks: vec![Task {
                        title: "Read".to_string(),
                        description: Some("Three sources".to_string()),
                        start: d("2025-01-06"),
                        end: d("2025-01-08"),
                        estimated_hours: Some(4.0),
                        overflow: false,
                        depends_on: vec![],
                    }],
                },
                Week {
                    index: 2,
                    label: "Rest".to_string(),
                    tasks: vec![],
                },
            ],
            assumptions: None,
            warnings: vec![PlanWarning::WeekCountMismatch {
                expected: 3,
                actual: 2,
            }],
        };
        let md = to_markdown(&plan);
        assert!(md.starts_with("# Plan: Essay\n"));
        assert!(md.contains("- Weeks: 2 (through 2025-01-19)"));
        assert!(md.contains("- Estimated total hours: 4.0"));
        assert!(md.contains("## Week 1: Research (2025-01-06 → 2025-01-12)"));
        assert!(md.contains("- **Read** (4h, 2025-01-06 → 2025-01-08)"));
        assert!(md.contains("  Three sources"));
        assert!(md.contains("_No tasks scheduled._"));
        assert!(md.contains("## Warnings\n\n- requested 3 weeks but model returned 2"));
        assert!(!md.contains("Depends on"));
        assert!(!md.contains("## Assumptions"));
    }

    #[test]
    fn lists_dependencies_and_assumptions() {
        let task = |title: &str, depends_on: &[&str]| Task {
            title: title.to_string(),
            description: None,
            start: d("2025-01-06"),
            end: d("2025-01-06"),
            estimated_hours: None,
            overflow: false,
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        };
        let plan = Plan {
            title: "Novel".to_string(),
            start_date: d("2025-01-06"),
            weeks: vec![Week {
                index: 1,
                label: "Start".to_string(),
                tasks: vec![
                    task("Outline", &[]),
                    task("Characters", &[]),
                    task("Chapter 1", &["Outline", "Characters"]),
                ],
            }],
            assumptions: Some("- Writes on weekends\n- Has a laptop".to_string()),
            warnings: vec![PlanWarning::WeekCountMismatch {
                expected: 2,
                actual: 1,
            }],
        };
        let md = to_markdown(&plan);
        assert!(md.contains("- **Chapter 1** (2025-01-06 → 2025-01-06)\n  Depends on: Outline, Characters\n"));
        assert_eq!(md.matches("Depends on").count(), 1);
        let assumptions = md.find("## Assumptions\n\n- Writes on weekends\n- Has a laptop\n").unwrap();
        assert!(assumptions < md.find("## Warnings").unwrap());
    }

    #[test]
    fn slugify_titles() {
        assert_eq!(slugify("My Science Fair!"), "my-science-fair");
        assert_eq!(slugify("  --C++ & Rust--  "), "c-rust");
        assert_eq!(slugify("日本語"), "project");
        assert_eq!(slugify(""), "project");
    }
}
