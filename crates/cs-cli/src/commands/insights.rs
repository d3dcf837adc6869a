//! Insights command for calendar statistics.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;
use cs_core::store::CalendarSource;
use cs_core::{CalendarInsights, SuggestionEngine, UserId};

pub fn format_insights(insights: &CalendarInsights) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "CALENDAR INSIGHTS (last {} weeks)",
        insights.weeks_analyzed
    );
    if insights.total_events == 0 {
        let _ = writeln!(output, "No events in this period.");
        return output;
    }
    let _ = writeln!(
        output,
        "{} events, {:.1}h total, {:.1}h average",
        insights.total_events, insights.total_hours, insights.avg_event_duration
    );
    for line in &insights.insights {
        let _ = writeln!(output, "- {line}");
    }
    if !insights.long_events.is_empty() {
        let _ = writeln!(output, "Long events:");
        for event in &insights.long_events {
            let _ = writeln!(output, "- {} ({:.1}h)", event.summary, event.duration);
        }
    }
    output
}

pub fn run<W, C>(writer: &mut W, calendar: &C, user: &UserId, weeks: u32, json: bool) -> Result<()>
where
    W: Write,
    C: CalendarSource + ?Sized,
{
    let insights = SuggestionEngine::default().insights_for_user(calendar, user, weeks);
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&insights)?)?;
    } else {
        write!(writer, "{}", format_insights(&insights))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use cs_core::CalendarEvent;
    use insta::assert_snapshot;

    use super::super::util::FileCalendar;
    use super::*;

    #[test]
    fn insights_summarize_recent_events() {
        let events: Vec<CalendarEvent> = serde_json::from_str(
            r#"[
                {"id": "e1", "summary": "Roadmap planning", "start": "2025-06-30T09:00:00+02:00",
                 "end": "2025-06-30T12:00:00+02:00", "duration": 3.0},
                {"id": "e2", "summary": "Roadmap sync", "start": "2025-06-30T14:00:00+02:00",
                 "end": "2025-06-30T15:00:00+02:00", "duration": 1.0},
                {"id": "e3", "summary": "Team sync", "start": "2025-07-01T09:00:00+02:00",
                 "end": "2025-07-01T10:00:00+02:00", "duration": 1.0}
            ]"#,
        )
        .unwrap();
        let now: DateTime<Utc> = "2025-07-02T12:00:00Z".parse().unwrap();
        let calendar = FileCalendar::new(events, now);
        let user = UserId::new("jana").unwrap();

        let mut output = Vec::new();
        run(&mut output, &calendar, &user, 2, false).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        CALENDAR INSIGHTS (last 2 weeks)
        3 events, 5.0h total, 1.7h average
        - Busiest day: Monday (2 events)
        - Peak meeting hour: 9:00 (2 events)
        - Most common keywords: roadmap (2), sync (2), planning (1), team (1)
        - Average meeting time: 2.5 hours/week
        Long events:
        - Roadmap planning (3.0h)
        ");
    }

    #[test]
    fn empty_window_has_no_statistics() {
        let calendar = FileCalendar::new(Vec::new(), Utc::now());
        let user = UserId::new("jana").unwrap();
        let mut output = Vec::new();
        run(&mut output, &calendar, &user, 8, false).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        CALENDAR INSIGHTS (last 8 weeks)
        No events in this period.
        ");
    }
}
