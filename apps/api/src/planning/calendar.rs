//! iCalendar (RFC 5545) export of a plan's tasks.
//!
//! One VEVENT per task, starting 09:00 floating local time on the task date.

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};

use crate::models::plan::{Task, TaskStatus};
use crate::planning::topology::PlanTopology;

pub const DEFAULT_EVENT_MINUTES: i64 = 60;
const MAX_RESOURCES: usize = 5;
const FOLD_WIDTH: usize = 75;
const PRODID: &str = "-//Interview Coach//Study Plan//EN";
const UID_DOMAIN: &str = "interview-coach";

pub fn render_ics(topology: &PlanTopology, now: DateTime<Utc>) -> String {
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{PRODID}"),
        format!("X-WR-CALNAME:{}", escape_text(&format!("Study Plan - {}", topology.plan_id()))),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
    ];

    let mut tasks: Vec<&Task> = topology.tasks.iter().collect();
    tasks.sort_by_key(|t| t.task_date);
    for task in tasks {
        push_event(&mut lines, task, now);
    }
    lines.push("END:VCALENDAR".to_string());

    let mut out = String::new();
    for line in lines {
        out.push_str(&fold_line(&line));
        out.push_str("\r\n");
    }
    out
}

fn push_event(lines: &mut Vec<String>, task: &Task, now: DateTime<Utc>) {
    let start = task.calendar_date().and_time(study_start());
    let minutes = if task.estimated_minutes > 0 {
        i64::from(task.estimated_minutes)
    } else {
        DEFAULT_EVENT_MINUTES
    };
    let end = start
        .checked_add_signed(Duration::minutes(minutes))
        .unwrap_or(start);

    lines.push("BEGIN:VEVENT".to_string());
    lines.push(format!("UID:{}@{UID_DOMAIN}", task.id));
    lines.push(format!("DTSTAMP:{}", now.format("%Y%m%dT%H%M%SZ")));
    lines.push(format!("CREATED:{}", task.created_at.format("%Y%m%dT%H%M%SZ")));
    lines.push(format!("DTSTART:{}", floating(start)));
    lines.push(format!("DTEND:{}", floating(end)));
    lines.push(format!("SUMMARY:{}", escape_text(&task.title)));

    let description = describe(task);
    if !description.is_empty() {
        lines.push(format!("DESCRIPTION:{}", escape_text(&description)));
    }
    if !task.skill_names.is_empty() {
        lines.push(format!(
            "LOCATION:{}",
            escape_text(&format!("Skills: {}", task.skill_names.join(", ")))
        ));
    }
    lines.push(format!("STATUS:{}", event_status(task)));
    lines.push("END:VEVENT".to_string());
}

fn study_start() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn floating(at: NaiveDateTime) -> String {
    at.format("%Y%m%dT%H%M%S").to_string()
}

fn event_status(task: &Task) -> &'static str {
    match task.status {
        TaskStatus::Skipped => "CANCELLED",
        _ => "CONFIRMED",
    }
}

fn describe(task: &Task) -> String {
    let mut parts = Vec::new();
    if !task.description.is_empty() {
        parts.push(task.description.clone());
    }

    let content = &task.content;
    let sections = [
        ("Study Materials", &content.study_materials[..]),
        ("Key Concepts", &content.key_concepts[..]),
        (
            "Resources",
            &content.resources[..content.resources.len().min(MAX_RESOURCES)],
        ),
    ];
    for (heading, items) in sections {
        if items.is_empty() {
            continue;
        }
        let mut section = format!("{heading}:");
        for item in items {
            section.push_str("\n- ");
            section.push_str(item);
        }
        parts.push(section);
    }
    parts.join("\n\n")
}

/// Escapes TEXT values: backslash, semicolon, comma, newline.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Folds a content line to at most 75 octets per physical line, never
/// splitting a UTF-8 sequence. Continuations start with a single space.
fn fold_line(line: &str) -> String {
    if line.len() <= FOLD_WIDTH {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + line.len() / FOLD_WIDTH * 3);
    let mut width = 0;
    for c in line.chars() {
        if width + c.len_utf8() > FOLD_WIDTH {
            out.push_str("\r\n ");
            // The leading space counts toward the next line's octets.
            width = 1;
        }
        out.push(c);
        width += c.len_utf8();
    }
    out
}
