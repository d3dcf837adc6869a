//! End-to-end tests for the `cs` binary.
//!
//! Each test runs against its own database, calendar export and project
//! catalog in a temp directory; Harvest is never contacted.

use std::path::Path;
use std::process::{Command, Output};

use chrono::{Datelike, Duration, Local, NaiveDate};
use serde_json::{Value, json};
use tempfile::TempDir;

fn cs_binary() -> String {
    env!("CARGO_BIN_EXE_cs").to_string()
}

/// Monday of last week, so every fixture event is in the past.
fn last_monday() -> NaiveDate {
    let today = Local::now().date_naive();
    today - Duration::days(i64::from(today.weekday().num_days_from_monday()) + 7)
}

fn event(id: &str, summary: &str, day: NaiveDate, hour: u32, hours: f64, extra: &Value) -> Value {
    let start = format!("{day}T{hour:02}:00:00+00:00");
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "fixture durations are small")]
    let minutes = (hours * 60.0) as u32;
    let end_hour = hour + minutes / 60;
    let end = format!("{day}T{end_hour:02}:{:02}:00+00:00", minutes % 60);
    let mut value = json!({
        "id": id,
        "summary": summary,
        "start": start,
        "end": end,
        "duration": hours,
        "attendance_status": "accepted",
    });
    if let (Some(target), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
        target.extend(extra.clone());
    }
    value
}

struct Workspace {
    temp: TempDir,
    monday: NaiveDate,
}

impl Workspace {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let monday = last_monday();
        let tuesday = monday + Duration::days(1);

        let events = json!([
            event("e1", "DP standup", monday, 9, 0.25, &json!({"color_id": "8"})),
            event("e2", "Sales call Acme", monday, 14, 1.0, &json!({})),
            event("e3", "AI tooling demo", tuesday, 10, 1.5, &json!({"color_id": "6"})),
            event("e4", "AI prompt review", tuesday, 13, 1.0, &json!({"color_id": "6"})),
        ]);
        std::fs::write(temp.path().join("events.json"), events.to_string()).unwrap();

        let catalog = json!([
            {"id": 1, "name": "Direct People", "tasks": [{"id": 10, "name": "Meetings"}]},
            {"id": 2, "name": "Sales", "tasks": [{"id": 20, "name": "Calls"}]},
            {"id": 3, "name": "AI", "tasks": [{"id": 30, "name": "Research"}]}
        ]);
        std::fs::write(temp.path().join("projects.json"), catalog.to_string()).unwrap();

        Self { temp, monday }
    }

    fn path(&self) -> &Path {
        self.temp.path()
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(cs_binary())
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path().join(".config"))
            .env("XDG_DATA_HOME", self.path().join(".local/share"))
            .env("CS_DATABASE_PATH", self.path().join("cs.db"))
            .env("CS_EVENTS_PATH", self.path().join("events.json"))
            .env("CS_CATALOG_PATH", self.path().join("projects.json"))
            .env("CS_USER_ID", "jana")
            .env_remove("CS_HARVEST_ACCOUNT_ID")
            .env_remove("CS_HARVEST_ACCESS_TOKEN")
            .env_remove("RUST_LOG")
            .args(args)
            .output()
            .expect("failed to run cs")
    }

    fn ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "cs {args:?} should succeed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).unwrap()
    }

    fn json(&self, args: &[&str]) -> Value {
        let mut args = args.to_vec();
        args.push("--json");
        serde_json::from_str(&self.ok(&args)).unwrap()
    }
}

#[test]
fn label_rule_maps_events_of_the_week() {
    let ws = Workspace::new();
    let week = ws.monday.to_string();

    let added = ws.ok(&["rules", "add", "DP", "--project", "1", "--task", "10"]);
    assert_eq!(added.trim(), "Created rule 'DP' → Direct People / Meetings");

    let report = ws.json(&["process", "--week", &week]);
    assert_eq!(report["week_start"], week);
    assert_eq!(report["total_events"], 4);
    assert_eq!(report["mapped_events"], 1);
    assert_eq!(report["timesheet_entries"][0]["event_summary"], "DP standup");
    assert_eq!(report["timesheet_entries"][0]["hours"], 0.5);
    assert_eq!(report["timesheet_entries"][0]["project_name"], "Direct People");
}

#[test]
fn rule_for_unknown_task_is_rejected() {
    let ws = Workspace::new();
    let output = ws.run(&["rules", "add", "DP", "--project", "1", "--task", "20"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("task 20 is not assigned to project 'Direct People'"));
}

#[test]
fn pattern_rules_create_label_rules() {
    let ws = Workspace::new();
    ws.ok(&[
        "patterns", "add", "Sales calls", "--value", "sales", "--type", "starts-with",
        "--project", "2", "--task", "20",
    ]);

    let report = ws.json(&["patterns", "apply"]);
    assert_eq!(report["total_events"], 4);
    assert_eq!(report["mappings_created"], 1);
    assert_eq!(report["applied_rules"][0]["rule_name"], "Sales calls");

    let rules = ws.json(&["rules", "list"]);
    assert_eq!(rules[0]["calendar_label"], "Sales call Acme");
    assert_eq!(rules[0]["target"]["project_name"], "Sales");

    let patterns = ws.json(&["patterns", "list"]);
    assert_eq!(patterns[0]["applied_count"], 1);
}

#[test]
fn suggestions_cover_unmapped_colour_labels() {
    let ws = Workspace::new();
    let suggestions = ws.json(&["suggest", "--weeks", "2"]);
    let first = &suggestions[0];
    assert_eq!(first["calendar_label"], "AI");
    assert_eq!(first["project_name"], "AI");
    assert_eq!(first["frequency"], 2);
    assert_eq!(first["reasoning"], "Exact match: 'AI' → 'AI'");
}

#[test]
fn insights_count_recent_events() {
    let ws = Workspace::new();
    let insights = ws.json(&["insights", "--weeks", "2"]);
    assert_eq!(insights["total_events"], 4);
    assert_eq!(insights["weeks_analyzed"], 2);
    assert_eq!(insights["total_hours"], 3.75);
}

#[test]
fn submit_requires_harvest_credentials() {
    let ws = Workspace::new();
    let output = ws.run(&["submit", "--dry-run"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Harvest is not configured"));
}

#[test]
fn status_reports_fresh_database() {
    let ws = Workspace::new();
    let output = ws.ok(&["status"]);
    assert!(output.contains("User: jana"));
    assert!(output.contains("Label rules: 0"));
    assert!(output.contains("Last submission: never"));
    assert!(ws.path().join("cs.db").exists());
}

#[test]
fn history_of_unsubmitted_week_is_empty() {
    let ws = Workspace::new();
    let week = ws.monday.to_string();
    let records = ws.json(&["history", "--week", &week]);
    assert_eq!(records, json!([]));
    let cleared = ws.ok(&["history", "--week", &week, "--clear"]);
    assert_eq!(cleared.trim(), format!("Cleared 0 records for the week of {week}"));
}

#[test]
fn applied_suggestions_become_label_rules() {
    let ws = Workspace::new();
    let applied = ws.json(&["suggest", "--weeks", "2", "--apply", "--label", "AI"]);
    assert_eq!(applied["created_count"], 1);
    assert_eq!(applied["created"], json!(["AI"]));

    let rules = ws.json(&["rules", "list"]);
    assert_eq!(rules.as_array().map(Vec::len), Some(1));
    assert_eq!(rules[0]["calendar_label"], "AI");
    assert_eq!(rules[0]["target"]["project_id"], 3);
    assert_eq!(rules[0]["target"]["task_id"], 30);
}

#[test]
fn event_suggestions_need_submitted_history() {
    let ws = Workspace::new();
    let ranked = ws.json(&["suggest", "--event", "e2"]);
    assert_eq!(ranked, json!([]));

    let output = ws.run(&["suggest", "--event", "missing"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("event missing not found in calendar export"));
}

#[test]
fn assigned_rules_survive_export_and_import() {
    let ws = Workspace::new();
    let report = ws.json(&["rules", "assign", "e1", "e2", "--project", "1", "--task", "10"]);
    assert_eq!(report["successful"], 2);
    assert_eq!(report["assigned"][1]["calendar_label"], "Sales call Acme");

    let export = ws.path().join("rules-export.json");
    let export_arg = export.to_str().unwrap();
    let written = ws.ok(&["rules", "export", "--output", export_arg]);
    assert!(written.starts_with("Exported 2 rules to "));

    let other = Workspace::new();
    other.ok(&["rules", "add", "AI", "--project", "3", "--task", "30"]);
    let imported = other.json(&["rules", "import", export_arg, "--strategy", "replace"]);
    assert_eq!(imported["replaced"], 1);
    assert_eq!(imported["imported"], 2);

    let labels: Vec<Value> = other
        .json(&["rules", "list"])
        .as_array()
        .unwrap()
        .iter()
        .map(|rule| rule["calendar_label"].clone())
        .collect();
    assert_eq!(labels, vec![json!("DP standup"), json!("Sales call Acme")]);
}
