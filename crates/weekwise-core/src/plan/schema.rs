//! Schema validation for model output.
//!
//! Converts the raw text returned by a [`crate::provider::PlanProvider`] into
//! a typed [`Plan`]. The validator is the single boundary between untyped
//! model output and the rest of the crate:
//!
//! - Extracts the JSON object from surrounding prose or code fences.
//! - Walks every field, coercing safe cases (numeric strings, RFC 3339
//!   timestamps, whole-number floats) and collecting a [`Defect`] for each
//!   field that cannot be used. All defects are reported together.
//! - Enforces week-index contiguity, task dependency references and
//!   acyclicity (fatal) and date ordering (repaired, recorded as a
//!   [`PlanWarning`]).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use thiserror::Error;

use super::model::{Plan, PlanWarning, Task, Week, checked_week_range, is_supported_date, week_range};
use crate::error::ErrorKind;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// What went wrong with a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefectKind {
    /// A required field is absent or null.
    Missing,
    /// The field is present but has the wrong JSON type.
    WrongType,
    /// The field has the right shape but its value cannot be used.
    Uncoercible,
    /// Fields are individually valid but break a plan invariant.
    Invariant,
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defect {
    /// JSON path of the offending field, e.g. `weeks[0].tasks[2].start`.
    pub path: String,
    pub kind: DefectKind,
    pub message: String,
}

impl Defect {
    fn new(path: impl Into<String>, kind: DefectKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Model output could not be turned into a [`Plan`].
///
/// `kind` is either [`ErrorKind::Unparseable`] or
/// [`ErrorKind::SchemaViolation`]. Schema violations carry every defect
/// found in one pass.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", self.summary())]
pub struct ValidationError {
    pub kind: ErrorKind,
    pub defects: Vec<Defect>,
    /// Parser message for unparseable output; empty otherwise.
    pub detail: String,
}

impl ValidationError {
    pub fn unparseable(detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Unparseable,
            defects: Vec::new(),
            detail: detail.into(),
        }
    }

    pub fn schema(defects: Vec<Defect>) -> Self {
        Self {
            kind: ErrorKind::SchemaViolation,
            defects,
            detail: String::new(),
        }
    }

    fn summary(&self) -> String {
        match self.kind {
            ErrorKind::Unparseable => format!("output is not parseable JSON: {}", self.detail),
            _ => {
                let listed: Vec<String> = self.defects.iter().map(Defect::to_string).collect();
                format!(
                    "output violates the plan schema ({} defect{}): {}",
                    self.defects.len(),
                    if self.defects.len() == 1 { "" } else { "s" },
                    listed.join("; ")
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// What the caller asked the model for. Used to fill in and cross-check
/// fields the model may omit or get wrong.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expectations {
    /// Requested plan start date. Overrides any date in the payload.
    pub start_date: Option<NaiveDate>,
    /// Requested number of weeks. A mismatch is only a warning.
    pub week_count: Option<u32>,
}

/// Validate raw model output with no caller expectations.
pub fn validate(raw_text: &str) -> Result<Plan, ValidationError> {
    validate_with(raw_text, &Expectations::default())
}

/// Validate raw model output against the schema and the caller's request.
pub fn validate_with(raw_text: &str, expect: &Expectations) -> Result<Plan, ValidationError> {
    let value = parse_payload(raw_text)?;

    let Value::Object(root) = value else {
        return Err(ValidationError::schema(vec![Defect::new(
            "$",
            DefectKind::WrongType,
            format!("expected an object with title and weeks, got {}", type_name(&value)),
        )]));
    };

    let mut walker = Walker::default();
    let title = walker.required_string(&root, "title", "title");
    let payload_start = walker.optional_date(&root, "start_date", "start_date");
    let assumptions = walker.optional_text(&root, "assumptions", "assumptions");
    let weeks = walker.weeks(&root);

    // Resolve the plan start date before deciding whether defects are fatal,
    // so a missing start date is reported alongside everything else.
    let mut warnings = Vec::new();
    let start_date = match (expect.start_date, payload_start) {
        (Some(requested), Some(returned)) => {
            if requested != returned {
                warnings.push(PlanWarning::StartDateOverridden {
                    requested,
                    returned,
                });
            }
            Some(requested)
        }
        (Some(requested), None) => Some(requested),
        (None, Some(returned)) => Some(returned),
        (None, None) => {
            let earliest = weeks
                .iter()
                .flat_map(|w| w.tasks.iter().map(|t| t.task.start))
                .min();
            // An unusable start_date value already produced its own defect.
            if earliest.is_none() && Walker::field(&root, "start_date").is_none() {
                walker.push("start_date", DefectKind::Missing, "required when no task has a start date");
            }
            earliest
        }
    };

    let mut weeks = weeks;
    weeks.sort_by_key(|w| w.index);
    walker.check_contiguity(&weeks);
    walker.check_dependencies(&weeks);
    if let (Some(start), Some(last)) = (start_date, weeks.last()) {
        let fits = checked_week_range(start, last.index).is_some_and(|(_, end)| is_supported_date(end));
        if !fits {
            walker.push(
                "start_date",
                DefectKind::Invariant,
                format!("week {} of a plan starting {start} runs past year 9999", last.index),
            );
        }
    }

    if !walker.defects.is_empty() {
        return Err(ValidationError::schema(walker.defects));
    }
    // Both are Some here: a None would have produced a defect above.
    let (Some(title), Some(start_date)) = (title, start_date) else {
        return Err(ValidationError::schema(vec![Defect::new(
            "$",
            DefectKind::Missing,
            "title or start date unavailable",
        )]));
    };

    let weeks: Vec<Week> = weeks
        .into_iter()
        .map(|w| finish_week(w, start_date, &mut warnings))
        .collect();

    if let Some(expected) = expect.week_count {
        let actual = weeks.len() as u32;
        if actual != expected {
            warnings.push(PlanWarning::WeekCountMismatch { expected, actual });
        }
    }

    Ok(Plan {
        title,
        start_date,
        weeks,
        assumptions,
        warnings,
    })
}

/// Parse the JSON value in free-form model output.
///
/// The whole text (minus a surrounding code fence) is tried first, so any
/// well-formed document is judged on its shape. Otherwise the first value
/// that parses from some `{` onward is taken and whatever follows it is
/// ignored, which covers a sentence before or after the object.
fn parse_payload(raw: &str) -> Result<Value, ValidationError> {
    let body = strip_fence(raw.trim());
    let first_error = match serde_json::from_str::<Value>(body) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let mut detail = None;
    for (start, _) in raw.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&raw[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => return Ok(value),
            Some(Err(e)) => {
                detail.get_or_insert_with(|| e.to_string());
            }
            None => {}
        }
    }
    Err(ValidationError::unparseable(match detail {
        Some(detail) => detail,
        None if body.starts_with(['[', '"']) => first_error.to_string(),
        None => "no JSON object found in output".to_string(),
    }))
}

/// Remove a Markdown code fence wrapping the whole text, if present.
fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (`json`) on the opening line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

// ---------------------------------------------------------------------------
// Field walker
// ---------------------------------------------------------------------------

struct ParsedWeek {
    /// Position in the payload array, for defect paths.
    pos: usize,
    index: u32,
    label: String,
    tasks: Vec<ParsedTask>,
}

struct ParsedTask {
    path: String,
    task: Task,
}

#[derive(Default)]
struct Walker {
    defects: Vec<Defect>,
    /// Every task title seen, including tasks dropped for other defects, so
    /// a dependency on them is not misreported as unknown.
    titles: BTreeSet<String>,
}

impl Walker {
    fn push(&mut self, path: impl Into<String>, kind: DefectKind, message: impl Into<String>) {
        self.defects.push(Defect::new(path, kind, message));
    }

    fn wrong_type(&mut self, path: &str, expected: &str, got: &Value) {
        self.push(
            path,
            DefectKind::WrongType,
            format!("expected {expected}, got {}", type_name(got)),
        );
    }

    /// Look up `key`, treating JSON `null` as absent.
    fn field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
        obj.get(key).filter(|v| !v.is_null())
    }

    fn coerce_string(&mut self, value: &Value, path: &str) -> Option<String> {
        match value {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            other => {
                self.wrong_type(path, "string", other);
                None
            }
        }
    }

    fn required_string(&mut self, obj: &Map<String, Value>, key: &str, path: &str) -> Option<String> {
        let Some(value) = Self::field(obj, key) else {
            self.push(path, DefectKind::Missing, "required field is missing");
            return None;
        };
        let s = self.coerce_string(value, path)?;
        if s.is_empty() {
            self.push(path, DefectKind::Uncoercible, "must not be empty");
            return None;
        }
        Some(s)
    }

    fn optional_string(&mut self, obj: &Map<String, Value>, key: &str, path: &str) -> Option<String> {
        let value = Self::field(obj, key)?;
        self.coerce_string(value, path).filter(|s| !s.is_empty())
    }

    /// Free text that models sometimes send as a list of lines; lists are
    /// joined as Markdown bullets.
    fn optional_text(&mut self, obj: &Map<String, Value>, key: &str, path: &str) -> Option<String> {
        let Value::Array(items) = Self::field(obj, key)? else {
            return self.optional_string(obj, key, path);
        };
        let mut lines = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            if let Some(line) = self.coerce_string(item, &format!("{path}[{i}]")) {
                if !line.is_empty() {
                    lines.push(format!("- {line}"));
                }
            }
        }
        (!lines.is_empty()).then(|| lines.join("\n"))
    }

    /// A list of task titles. A single string is accepted as a list of one.
    fn title_list(&mut self, obj: &Map<String, Value>, key: &str, path: &str) -> Vec<String> {
        let path = format!("{path}.{key}");
        let items = match Self::field(obj, key) {
            None => return Vec::new(),
            Some(Value::Array(items)) => items.as_slice(),
            Some(single) if single.is_string() => std::slice::from_ref(single),
            Some(other) => {
                self.wrong_type(&path, "array of task titles", other);
                return Vec::new();
            }
        };
        let mut titles = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            if let Some(title) = self.coerce_string(item, &format!("{path}[{i}]")) {
                if !title.is_empty() && !titles.contains(&title) {
                    titles.push(title);
                }
            }
        }
        titles
    }

    fn coerce_date(&mut self, value: &Value, path: &str) -> Option<NaiveDate> {
        let Value::String(s) = value else {
            self.wrong_type(path, "ISO-8601 date string", value);
            return None;
        };
        let parsed = parse_date(s.trim());
        if parsed.is_none() {
            self.push(
                path,
                DefectKind::Uncoercible,
                format!("expected ISO-8601 date (YYYY-MM-DD) with a year from 1 to 9999, got {s:?}"),
            );
        }
        parsed
    }

    fn required_date(&mut self, obj: &Map<String, Value>, key: &str, path: &str) -> Option<NaiveDate> {
        match Self::field(obj, key) {
            Some(value) => self.coerce_date(value, path),
            None => {
                self.push(path, DefectKind::Missing, "required field is missing");
                None
            }
        }
    }

    fn optional_date(&mut self, obj: &Map<String, Value>, key: &str, path: &str) -> Option<NaiveDate> {
        let value = Self::field(obj, key)?;
        self.coerce_date(value, path)
    }

    fn optional_hours(&mut self, obj: &Map<String, Value>, path: &str) -> Option<f64> {
        let (key, value) = ["estimated_hours", "hours"]
            .iter()
            .find_map(|k| Self::field(obj, k).map(|v| (*k, v)))?;
        let path = format!("{path}.{key}");
        let hours = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            other => {
                self.wrong_type(&path, "number", other);
                return None;
            }
        };
        match hours {
            Some(h) if h.is_finite() && h >= 0.0 => Some(h),
            _ => {
                self.push(
                    path,
                    DefectKind::Uncoercible,
                    format!("expected a non-negative number of hours, got {value}"),
                );
                None
            }
        }
    }

    fn optional_flag(&mut self, obj: &Map<String, Value>, key: &str, path: &str) -> bool {
        match Self::field(obj, key) {
            None => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                self.wrong_type(&format!("{path}.{key}"), "boolean", other);
                false
            }
        }
    }

    fn week_index(&mut self, value: &Value, path: &str) -> Option<u32> {
        let index = match value {
            Value::Number(n) => n.as_u64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                    .map(|f| f as u64)
            }),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            other => {
                self.wrong_type(path, "positive integer", other);
                return None;
            }
        };
        match index.and_then(|i| u32::try_from(i).ok()) {
            Some(i) if i >= 1 => Some(i),
            _ => {
                self.push(
                    path,
                    DefectKind::Uncoercible,
                    format!("expected a positive integer, got {value}"),
                );
                None
            }
        }
    }

    fn weeks(&mut self, root: &Map<String, Value>) -> Vec<ParsedWeek> {
        let items = match Self::field(root, "weeks") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                self.wrong_type("weeks", "array", other);
                return Vec::new();
            }
            None => {
                self.push("weeks", DefectKind::Missing, "required field is missing");
                return Vec::new();
            }
        };

        // Positional indices are only trusted when no week carries one.
        let positional = items
            .iter()
            .all(|w| w.as_object().is_some_and(|o| Self::field(o, "index").is_none()));

        let mut weeks = Vec::with_capacity(items.len());
        for (pos, item) in items.iter().enumerate() {
            let path = format!("weeks[{pos}]");
            let Value::Object(obj) = item else {
                self.wrong_type(&path, "object", item);
                continue;
            };

            let index = if positional {
                u32::try_from(pos + 1).ok()
            } else {
                match Self::field(obj, "index") {
                    Some(v) => self.week_index(v, &format!("{path}.index")),
                    None => {
                        self.push(format!("{path}.index"), DefectKind::Missing, "required field is missing");
                        None
                    }
                }
            };
            let label = self.optional_string(obj, "label", &format!("{path}.label"));
            let tasks = self.tasks(obj, &path);

            if let Some(index) = index {
                weeks.push(ParsedWeek {
                    pos,
                    index,
                    label: label.unwrap_or_else(|| format!("Week {index}")),
                    tasks,
                });
            }
        }
        weeks
    }

    fn tasks(&mut self, week: &Map<String, Value>, week_path: &str) -> Vec<ParsedTask> {
        let path = format!("{week_path}.tasks");
        let items = match Self::field(week, "tasks") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                self.wrong_type(&path, "array", other);
                return Vec::new();
            }
            None => {
                self.push(path, DefectKind::Missing, "required field is missing");
                return Vec::new();
            }
        };

        let mut tasks = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let path = format!("{week_path}.tasks[{i}]");
            let Value::Object(obj) = item else {
                self.wrong_type(&path, "object", item);
                continue;
            };
            let title = self.required_string(obj, "title", &format!("{path}.title"));
            if let Some(title) = &title {
                self.titles.insert(title.clone());
            }
            let description = self.optional_string(obj, "description", &format!("{path}.description"));
            let start = self.required_date(obj, "start", &format!("{path}.start"));
            let end = self.required_date(obj, "end", &format!("{path}.end"));
            let estimated_hours = self.optional_hours(obj, &path);
            let depends_on = self.title_list(obj, "depends_on", &path);
            let overflow = self.optional_flag(obj, "overflow", &path);

            if let (Some(title), Some(start), Some(end)) = (title, start, end) {
                tasks.push(ParsedTask {
                    path,
                    task: Task {
                        title,
                        description,
                        start,
                        end,
                        estimated_hours,
                        depends_on,
                        overflow,
                    },
                });
            }
        }
        tasks
    }

    /// Weeks must be sorted; reports duplicates and gaps in `1..=max`.
    fn check_contiguity(&mut self, weeks: &[ParsedWeek]) {
        let mut seen = BTreeSet::new();
        for w in weeks {
            if !seen.insert(w.index) {
                self.push(
                    format!("weeks[{}].index", w.pos),
                    DefectKind::Invariant,
                    format!("duplicate week index {}", w.index),
                );
            }
        }
        let Some(&max) = seen.last() else { return };
        let missing: Vec<String> = (1..=max)
            .filter(|i| !seen.contains(i))
            .map(|i| i.to_string())
            .collect();
        if !missing.is_empty() {
            self.push(
                "weeks",
                DefectKind::Invariant,
                format!(
                    "week indices must run 1..{max} without gaps; missing {}",
                    missing.join(", ")
                ),
            );
        }
    }
}

impl Walker {
    /// Every dependency must name a task in the plan, and the dependency
    /// graph must be acyclic. Tasks are identified by title.
    fn check_dependencies(&mut self, weeks: &[ParsedWeek]) {
        let mut graph: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut first_path: BTreeMap<&str, &str> = BTreeMap::new();
        let mut unknown = Vec::new();

        for parsed in weeks.iter().flat_map(|w| &w.tasks) {
            let title = parsed.task.title.as_str();
            first_path.entry(title).or_insert(parsed.path.as_str());
            for (i, dep) in parsed.task.depends_on.iter().enumerate() {
                if self.titles.contains(dep) {
                    graph.entry(title).or_default().push(dep.as_str());
                } else {
                    unknown.push((format!("{}.depends_on[{i}]", parsed.path), dep.clone()));
                }
            }
        }

        for (path, dep) in unknown {
            self.push(path, DefectKind::Invariant, format!("depends on unknown task {dep:?}"));
        }
        for cycle in find_cycles(&graph) {
            let path = first_path.get(cycle[0]).copied().unwrap_or("weeks");
            self.push(
                format!("{path}.depends_on"),
                DefectKind::Invariant,
                format!("dependency cycle: {}", cycle.join(" -> ")),
            );
        }
    }
}

/// Cycles in a dependency graph, each as the node list with the first node
/// repeated at the end. Deterministic for a given graph.
fn find_cycles<'a>(graph: &BTreeMap<&'a str, Vec<&'a str>>) -> Vec<Vec<&'a str>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Active,
        Done,
    }

    fn visit<'a>(
        node: &'a str,
        graph: &BTreeMap<&'a str, Vec<&'a str>>,
        marks: &mut BTreeMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
        cycles: &mut Vec<Vec<&'a str>>,
    ) {
        marks.insert(node, Mark::Active);
        stack.push(node);
        for &next in graph.get(node).into_iter().flatten() {
            match marks.get(next) {
                Some(Mark::Active) => {
                    let from = stack.iter().position(|n| *n == next).unwrap_or(0);
                    let mut cycle = stack[from..].to_vec();
                    cycle.push(next);
                    cycles.push(cycle);
                }
                Some(Mark::Done) => {}
                None => visit(next, graph, marks, stack, cycles),
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
    }

    let mut marks = BTreeMap::new();
    let mut cycles = Vec::new();
    for &node in graph.keys() {
        if !marks.contains_key(node) {
            visit(node, graph, &mut marks, &mut Vec::new(), &mut cycles);
        }
    }
    cycles
}

/// Apply date repairs to a week that already passed structural checks.
fn finish_week(week: ParsedWeek, plan_start: NaiveDate, warnings: &mut Vec<PlanWarning>) -> Week {
    let (first, last) = week_range(plan_start, week.index);
    let tasks = week
        .tasks
        .into_iter()
        .map(|ParsedTask { path, mut task }| {
            if task.end < task.start {
                warnings.push(PlanWarning::DateClamped {
                    path: path.clone(),
                    start: task.start,
                    original_end: task.end,
                });
                task.end = task.start;
            }
            let outside = task.start < first || task.end > last;
            if outside && !task.overflow {
                warnings.push(PlanWarning::Overflow {
                    path,
                    week: week.index,
                });
                task.overflow = true;
            }
            task
        })
        .collect();

    Week {
        index: week.index,
        label: week.label,
        tasks,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    parse_any_date(s).filter(|d| is_supported_date(*d))
}

fn parse_any_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
