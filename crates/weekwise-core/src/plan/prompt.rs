//! Prompt composition for plan generation.
//!
//! Builds the instruction text sent to the provider: the JSON schema the
//! validator accepts, the project description, and the requested calendar
//! window. Pure string assembly, no I/O.

use chrono::NaiveDate;

use super::model::{checked_week_range, is_supported_date, week_range};
use super::schema::ValidationError;
use crate::error::{ErrorKind, PlanError};

/// JSON schema reference included in every prompt.
///
/// Field names here must stay in sync with [`super::schema`].
const SCHEMA_REFERENCE: &str = r#"## Plan JSON Schema

```json
{
  "title": "string",              // REQUIRED. Short project title.
  "start_date": "YYYY-MM-DD",     // REQUIRED. First day of week 1.
  "weeks": [                      // REQUIRED. One entry per week, in order.
    {
      "index": 1,                 // REQUIRED. Integer, 1 for the first week, no gaps.
      "label": "string",          // REQUIRED. Short theme for the week.
      "tasks": [                  // REQUIRED. May be empty for a rest week.
        {
          "title": "string",            // REQUIRED. Short, actionable task name.
          "description": "string",      // Optional. Why the task matters or how to do it.
          "start": "YYYY-MM-DD",        // REQUIRED. First day of work on the task.
          "end": "YYYY-MM-DD",          // REQUIRED. Last day of work (inclusive, >= start).
          "estimated_hours": 2.5,       // Optional. Non-negative number.
          "depends_on": ["string"]      // Optional. Titles of tasks that must finish first.
        }
      ]
    }
  ],
  "assumptions": "string"         // Optional. What you assumed about skills, tools, or budget.
}
```
"#;

/// Planning guidelines included in every prompt.
const PLANNING_GUIDELINES: &str = r#"## Planning Guidelines

1. **Keep tasks small.** Each task should take 1-6 hours and produce something concrete ("Collect 3 sources", "Draft intro", "Build first prototype").
2. **Respect logical order.** Research and setup come before building; review and polish come last. List prerequisites in `depends_on` using exact task titles, and never create a cycle.
3. **Stay inside the week.** A task's start and end dates must fall within its week's date range.
4. **Keep totals realistic.** Spread effort evenly and leave slack before the final week.
"#;

/// Options for [`compose_with`].
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeOptions {
    /// Hours per week the person can spend on the project, if known.
    pub hours_per_week: Option<f64>,
    /// Descriptions longer than this many characters are truncated.
    pub max_description_chars: usize,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            hours_per_week: None,
            max_description_chars: 8000,
        }
    }
}

/// Build the plan-generation prompt with default options.
pub fn compose(
    project_description: &str,
    start_date: NaiveDate,
    week_count: u32,
) -> Result<String, PlanError> {
    compose_with(
        project_description,
        start_date,
        week_count,
        &ComposeOptions::default(),
    )
}

/// Build the plan-generation prompt.
///
/// Fails with [`PlanError`] when `week_count` is zero, the description is
/// blank, or `hours_per_week` is not a positive number.
pub fn compose_with(
    project_description: &str,
    start_date: NaiveDate,
    week_count: u32,
    options: &ComposeOptions,
) -> Result<String, PlanError> {
    if week_count < 1 {
        return Err(PlanError::InvalidWeekCount(week_count));
    }
    let description = project_description.trim();
    if description.is_empty() {
        return Err(PlanError::EmptyDescription);
    }
    if let Some(h) = options.hours_per_week {
        if !(h.is_finite() && h > 0.0) {
            return Err(PlanError::InvalidHoursPerWeek(h));
        }
    }
    let fits = is_supported_date(start_date)
        && checked_week_range(start_date, week_count)
            .is_some_and(|(_, last)| is_supported_date(last));
    if !fits {
        return Err(PlanError::DateOutOfRange {
            start: start_date,
            weeks: week_count,
        });
    }

    let mut prompt = String::with_capacity(4096 + description.len());

    // Role and output contract.
    prompt.push_str("# Weekly Project Planner\n\n");
    prompt.push_str(
        "You are a project planning assistant. Break the project below into a \
         week-by-week schedule of concrete tasks.\n\n",
    );
    prompt.push_str(
        "Output STRICT JSON only: a single object matching the schema below. \
         Do NOT wrap it in Markdown code fences. Do NOT add commentary before or after it.\n\n",
    );

    prompt.push_str(SCHEMA_REFERENCE);
    prompt.push('\n');
    prompt.push_str(PLANNING_GUIDELINES);
    prompt.push('\n');

    // Calendar window.
    prompt.push_str("## Schedule\n\n");
    prompt.push_str(&format!("- **Start date:** {start_date}\n"));
    prompt.push_str(&format!("- **Number of weeks:** {week_count}\n"));
    if let Some(h) = options.hours_per_week {
        prompt.push_str(&format!("- **Available hours per week:** {h}\n"));
    }
    prompt.push_str("\n### Week date ranges\n\n");
    for index in 1..=week_count {
        let (first, last) = week_range(start_date, index);
        prompt.push_str(&format!("- Week {index}: {first} to {last}\n"));
    }

    // Project description, fenced so its content cannot be mistaken for
    // instructions.
    prompt.push_str("\n## Project Description\n\n\"\"\"\n");
    prompt.push_str(truncate_chars(description, options.max_description_chars));
    prompt.push_str("\n\"\"\"\n");

    Ok(prompt)
}

/// How failed attempts are described in the retry prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackPolicy {
    /// Quote the rejected output back to the model.
    pub include_previous_output: bool,
    /// Maximum characters of rejected output to quote.
    pub max_quoted_chars: usize,
    /// Maximum number of defects to list.
    pub max_defects: usize,
}

impl Default for FeedbackPolicy {
    fn default() -> Self {
        Self {
            include_previous_output: true,
            max_quoted_chars: 2000,
            max_defects: 50,
        }
    }
}

/// Append correction feedback from a failed attempt to the base prompt.
///
/// The base prompt is always the original composed prompt, so feedback from
/// earlier attempts does not accumulate.
pub fn augment_for_retry(
    base_prompt: &str,
    error: &ValidationError,
    previous_output: Option<&str>,
    policy: &FeedbackPolicy,
) -> String {
    let mut prompt = String::with_capacity(base_prompt.len() + 1024);
    prompt.push_str(base_prompt);
    prompt.push_str("\n## Correction Required\n\n");
    prompt.push_str("Your previous output had these problems. Fix all of them and return the complete corrected JSON object:\n\n");

    match error.kind {
        ErrorKind::Unparseable => {
            prompt.push_str(&format!(
                "- The output was not a parseable JSON object ({}).\n",
                error.detail
            ));
        }
        _ => {
            for defect in error.defects.iter().take(policy.max_defects) {
                prompt.push_str(&format!("- `{}`: {}\n", defect.path, defect.message));
            }
            let hidden = error.defects.len().saturating_sub(policy.max_defects);
            if hidden > 0 {
                prompt.push_str(&format!("- ...and {hidden} more problems of the same kind.\n"));
            }
        }
    }

    if policy.include_previous_output {
        if let Some(previous) = previous_output.map(str::trim).filter(|p| !p.is_empty()) {
            prompt.push_str("\n### Previous output\n\n\"\"\"\n");
            prompt.push_str(truncate_chars(previous, policy.max_quoted_chars));
            prompt.push_str("\n\"\"\"\n");
        }
    }

    prompt
}

/// Truncate to at most `max` characters on a char boundary.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::schema::{Defect, DefectKind};

    fn start() -> NaiveDate {
        "2025-01-06".parse().unwrap()
    }

    #[test]
    fn prompt_contains_schema_markers() {
        let prompt = compose("Build a birdhouse", start(), 2).unwrap();
        assert!(prompt.contains("Plan JSON Schema"));
        for field in ["\"title\"", "\"start_date\"", "\"weeks\"", "\"index\"", "\"label\"", "\"tasks\"", "\"start\"", "\"end\"", "\"estimated_hours\"", "\"depends_on\"", "\"assumptions\""] {
            assert!(prompt.contains(field), "missing {field}");
        }
        assert!(prompt.contains("REQUIRED"));
    }

    #[test]
    fn prompt_includes_description_and_schedule() {
        let prompt = compose("  Build a birdhouse  ", start(), 3).unwrap();
        assert!(prompt.contains("\"\"\"\nBuild a birdhouse\n\"\"\""));
        assert!(prompt.contains("Start date:** 2025-01-06"));
        assert!(prompt.contains("Number of weeks:** 3"));
        assert!(prompt.contains("Week 3: 2025-01-20 to 2025-01-26"));
        assert!(!prompt.contains("Week 4:"));
    }

    #[test]
    fn prompt_demands_bare_json() {
        let prompt = compose("x", start(), 1).unwrap();
        assert!(prompt.contains("STRICT JSON only"));
        assert!(prompt.contains("Do NOT wrap it in Markdown code fences"));
    }

    #[test]
    fn rejects_zero_weeks() {
        assert_eq!(compose("x", start(), 0), Err(PlanError::InvalidWeekCount(0)));
    }

    #[test]
    fn rejects_start_dates_beyond_the_calendar() {
        assert_eq!(
            compose("x", NaiveDate::MAX, 1),
            Err(PlanError::DateOutOfRange {
                start: NaiveDate::MAX,
                weeks: 1
            })
        );
        let late: NaiveDate = "9999-12-20".parse().unwrap();
        assert!(compose("x", late, 1).is_ok());
        assert!(matches!(
            compose("x", late, 2),
            Err(PlanError::DateOutOfRange { weeks: 2, .. })
        ));
    }

    #[test]
    fn rejects_blank_description() {
        assert_eq!(compose(" \n\t", start(), 1), Err(PlanError::EmptyDescription));
    }

    #[test]
    fn hours_per_week_is_optional_and_checked() {
        let opts = ComposeOptions {
            hours_per_week: Some(8.0),
            ..ComposeOptions::default()
        };
        let prompt = compose_with("x", start(), 1, &opts).unwrap();
        assert!(prompt.contains("Available hours per week:** 8"));

        let without = compose("x", start(), 1).unwrap();
        assert!(!without.contains("Available hours per week"));

        let bad = ComposeOptions {
            hours_per_week: Some(-2.0),
            ..ComposeOptions::default()
        };
        assert_eq!(
            compose_with("x", start(), 1, &bad),
            Err(PlanError::InvalidHoursPerWeek(-2.0))
        );
    }

    #[test]
    fn long_description_is_truncated_on_char_boundary() {
        let opts = ComposeOptions {
            max_description_chars: 3,
            ..ComposeOptions::default()
        };
        let prompt = compose_with("éééééé", start(), 1, &opts).unwrap();
        assert!(prompt.contains("\"\"\"\nééé\n\"\"\""));
    }

    #[test]
    fn retry_prompt_lists_defects_and_quotes_output() {
        let base = compose("x", start(), 1).unwrap();
        let err = ValidationError::schema(vec![
            Defect {
                path: "weeks[0].tasks[0].end".to_string(),
                kind: DefectKind::Uncoercible,
                message: "expected ISO-8601 date (YYYY-MM-DD), got \"soon\"".to_string(),
            },
            Defect {
                path: "title".to_string(),
                kind: DefectKind::Missing,
                message: "required field is missing".to_string(),
            },
        ]);
        let prompt = augment_for_retry(&base, &err, Some("{\"weeks\": []}"), &FeedbackPolicy::default());
        assert!(prompt.starts_with(&base));
        assert!(prompt.contains("Correction Required"));
        assert!(prompt.contains("`weeks[0].tasks[0].end`"));
        assert!(prompt.contains("`title`: required field is missing"));
        assert!(prompt.contains("### Previous output"));
        assert!(prompt.contains("{\"weeks\": []}"));
    }

    #[test]
    fn retry_prompt_respects_policy() {
        let base = "BASE";
        let defects = (0..5)
            .map(|i| Defect {
                path: format!("weeks[{i}].index"),
                kind: DefectKind::Missing,
                message: "required field is missing".to_string(),
            })
            .collect();
        let err = ValidationError::schema(defects);
        let policy = FeedbackPolicy {
            include_previous_output: false,
            max_quoted_chars: 10,
            max_defects: 2,
        };
        let prompt = augment_for_retry(base, &err, Some("junk"), &policy);
        assert!(prompt.contains("weeks[1].index"));
        assert!(!prompt.contains("weeks[2].index"));
        assert!(prompt.contains("and 3 more problems"));
        assert!(!prompt.contains("junk"));
    }

    #[test]
    fn retry_prompt_for_unparseable_output() {
        let err = ValidationError::unparseable("no JSON object found in output");
        let prompt = augment_for_retry("BASE", &err, None, &FeedbackPolicy::default());
        assert!(prompt.contains("not a parseable JSON object (no JSON object found in output)"));
        assert!(!prompt.contains("Previous output"));
    }
}
