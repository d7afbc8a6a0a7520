//! iCalendar (RFC 5545) export.
//!
//! Every task becomes an all-day `VEVENT`. Output is fully deterministic:
//! UIDs are hashed from the plan title, week index, and task position, and
//! `DTSTAMP` is pinned to the plan start date, so exporting the same plan
//! twice yields byte-identical documents.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::plan::Plan;

pub const PRODID: &str = "-//Weekwise//Plan Export//EN";

/// Maximum content-line length in octets before folding.
const FOLD_WIDTH: usize = 75;

/// Render `plan` as an iCalendar document with CRLF line endings.
pub fn to_calendar(plan: &Plan) -> String {
    let mut out = String::with_capacity(256 + plan.task_count() * 320);
    let dtstamp = format!("{}T000000Z", plan.start_date.format("%Y%m%d"));

    push_line(&mut out, "BEGIN:VCALENDAR");
    push_line(&mut out, "VERSION:2.0");
    push_line(&mut out, &format!("PRODID:{PRODID}"));
    push_line(&mut out, "CALSCALE:GREGORIAN");
    push_line(&mut out, "METHOD:PUBLISH");
    push_line(&mut out, &format!("X-WR-CALNAME:{}", escape_text(&plan.title)));

    for week in &plan.weeks {
        for (i, task) in week.tasks.iter().enumerate() {
            // End dates are stored inclusive; DTEND for all-day events is
            // exclusive. Validated plans end by 9999-12-30, so the next day
            // always exists and keeps a four-digit year.
            let exclusive_end = task.end.succ_opt().unwrap_or(task.end);

            push_line(&mut out, "BEGIN:VEVENT");
            push_line(&mut out, &format!("UID:{}", event_uid(&plan.title, week.index, i + 1)));
            push_line(&mut out, &format!("DTSTAMP:{dtstamp}"));
            push_line(&mut out, &format!("DTSTART;VALUE=DATE:{}", ical_date(task.start)));
            push_line(&mut out, &format!("DTEND;VALUE=DATE:{}", ical_date(exclusive_end)));
            push_line(&mut out, &format!("SUMMARY:{}", escape_text(&task.title)));
            if let Some(desc) = &task.description {
                push_line(&mut out, &format!("DESCRIPTION:{}", escape_text(desc)));
            }
            push_line(&mut out, &format!("CATEGORIES:{}", escape_text(&week.label)));
            push_line(&mut out, "END:VEVENT");
        }
    }

    push_line(&mut out, "END:VCALENDAR");
    out
}

/// Stable event identifier for the task at 1-based `position` in `week`.
pub fn event_uid(title: &str, week: u32, position: usize) -> String {
    let digest = Sha256::digest(format!("{title}\u{1f}{week}\u{1f}{position}").as_bytes());
    format!("{}@weekwise", &hex::encode(digest)[..32])
}

/// Escape a TEXT property value.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\\n");
            }
            other => out.push(other),
        }
    }
    out
}

fn ical_date(d: NaiveDate) -> String {
    d.format("%Y%m%d").to_string()
}

/// Append a content line, folding at 75 octets without splitting a UTF-8
/// sequence. Continuation lines start with a single space.
fn push_line(out: &mut String, line: &str) {
    let mut width = 0;
    for c in line.chars() {
        let len = c.len_utf8();
        if width + len > FOLD_WIDTH {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(c);
        width += len;
    }
    out.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Task, Week};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn plan() -> Plan {
        Plan {
            title: "Robotics, Inc; v2".to_string(),
            start_date: d("2025-01-06"),
            weeks: vec![Week {
                index: 1,
                label: "Setup".to_string(),
                tasks: vec![
                    Task {
                        title: "Order parts".to_string(),
                        description: Some("Motors, wheels\nand a battery".to_string()),
                        start: d("2025-01-06"),
                        end: d("2025-01-06"),
                        estimated_hours: Some(1.0),
                        overflow: false,
                        depends_on: vec![],
                    },
                    Task {
                        title: "Assemble chassis".to_string(),
                        description: None,
                        start: d("2025-01-08"),
                        end: d("2025-01-10"),
                        estimated_hours: None,
                        overflow: false,
                        depends_on: vec![],
                    },
                ],
            }],
            assumptions: None,
            warnings: vec![],
        }
    }

    #[test]
    fn document_structure() {
        let ics = to_calendar(&plan());
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        assert!(ics.contains(&format!("PRODID:{PRODID}\r\n")));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
        assert_eq!(ics.matches("END:VEVENT").count(), 2);
        assert!(ics.contains("X-WR-CALNAME:Robotics\\, Inc\\; v2\r\n"));
    }

    #[test]
    fn all_day_end_is_exclusive() {
        let ics = to_calendar(&plan());
        assert!(ics.contains("DTSTART;VALUE=DATE:20250106\r\nDTEND;VALUE=DATE:20250107\r\n"));
        assert!(ics.contains("DTSTART;VALUE=DATE:20250108\r\nDTEND;VALUE=DATE:20250111\r\n"));
    }

    #[test]
    fn exclusive_end_stays_four_digit_at_calendar_edge() {
        let raw = r#"{"title":"Edge","start_date":"9999-12-24","weeks":[{"index":1,"tasks":[
            {"title":"Last","start":"9999-12-30","end":"9999-12-30"}
        ]}]}"#;
        let ics = to_calendar(&crate::plan::validate(raw).unwrap());
        assert!(ics.contains("DTSTART;VALUE=DATE:99991230\r\nDTEND;VALUE=DATE:99991231\r\n"));

        let past_edge = raw.replace("\"end\":\"9999-12-30\"", "\"end\":\"9999-12-31\"");
        assert!(crate::plan::validate(&past_edge).is_err());
    }

    #[test]
    fn description_is_optional_and_escaped() {
        let ics = to_calendar(&plan());
        assert_eq!(ics.matches("DESCRIPTION:").count(), 1);
        assert!(ics.contains("DESCRIPTION:Motors\\, wheels\\nand a battery\r\n"));
    }

    #[test]
    fn escape_rules() {
        assert_eq!(escape_text(r"a\b"), r"a\\b");
        assert_eq!(escape_text("a;b,c"), r"a\;b\,c");
        assert_eq!(escape_text("one\r\ntwo\nthree\rfour"), r"one\ntwo\nthree\nfour");
    }

    #[test]
    fn uid_is_deterministic_and_position_sensitive() {
        let a = event_uid("Plan", 1, 1);
        assert_eq!(a, event_uid("Plan", 1, 1));
        assert_ne!(a, event_uid("Plan", 1, 2));
        assert_ne!(a, event_uid("Plan", 2, 1));
        assert_ne!(a, event_uid("Other", 1, 1));
        assert!(a.ends_with("@weekwise"));
        assert_eq!(a.len(), 32 + "@weekwise".len());
    }

    #[test]
    fn long_lines_are_folded_at_75_octets() {
        let mut p = plan();
        p.weeks[0].tasks[0].title = "é".repeat(100);
        let ics = to_calendar(&p);
        for line in ics.split("\r\n") {
            assert!(line.len() <= 75, "line too long ({}): {line}", line.len());
        }
        // Unfolding restores the original value.
        let unfolded = ics.replace("\r\n ", "");
        assert!(unfolded.contains(&format!("SUMMARY:{}\r\n", "é".repeat(100))));
    }

    #[test]
    fn dtstamp_is_pinned_to_start_date() {
        let ics = to_calendar(&plan());
        assert_eq!(ics.matches("DTSTAMP:20250106T000000Z\r\n").count(), 2);
    }
}
