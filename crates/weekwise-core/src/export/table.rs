//! CSV export: one row per task.

use crate::plan::Plan;

pub const TABLE_HEADER: &str = "Week,WeekLabel,Task,Start,End,EstimatedHours,Description";

/// Render `plan` as CSV. Always starts with [`TABLE_HEADER`]; an empty plan
/// produces only the header line.
///
/// Every record occupies exactly one line: line breaks inside text fields
/// are flattened to spaces before RFC 4180 quoting.
pub fn to_table(plan: &Plan) -> String {
    let mut out = String::with_capacity(TABLE_HEADER.len() + 1 + plan.task_count() * 96);
    out.push_str(TABLE_HEADER);
    out.push('\n');

    for (week, task) in plan.tasks() {
        let hours = task.estimated_hours.map(|h| h.to_string()).unwrap_or_default();
        let row = [
            week.index.to_string(),
            csv_field(&week.label),
            csv_field(&task.title),
            task.start.to_string(),
            task.end.to_string(),
            hours,
            csv_field(task.description.as_deref().unwrap_or("")),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Quote a text field when it contains a delimiter or quote character.
fn csv_field(s: &str) -> String {
    let flat = s.replace("\r\n", " ").replace(['\n', '\r'], " ");
    if flat.contains([',', '"']) {
        format!("\"{}\"", flat.replace('"', "\"\""))
    } else {
        flat
    }
}
