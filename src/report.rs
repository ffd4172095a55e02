use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{ProgressEntry, ProgressStats, WeeklySummary};
use crate::stats;

pub fn format_weight(weight: Option<f64>) -> String {
    match weight {
        Some(value) => format!("{value:.1}"),
        None => "not recorded".to_string(),
    }
}

pub fn format_goal(stats: &ProgressStats, target_weight: Option<f64>) -> String {
    match target_weight {
        Some(target) => format!("{:.0}% (target {:.1})", stats.progress_toward_goal, target),
        None => "no target weight set".to_string(),
    }
}

pub fn format_week(week: &WeeklySummary) -> String {
    format!(
        "Week {} ({} to {}): weight {}, energy {:.1}, adherence {}%",
        week.week_index,
        week.week_start,
        week.week_end,
        format_weight(week.average_weight),
        week.average_energy,
        week.average_adherence
    )
}

pub fn build_report(
    label: &str,
    window_start: NaiveDate,
    weeks: u32,
    entries: &[ProgressEntry],
    target_weight: Option<f64>,
) -> String {
    let summary = stats::compute_stats(entries, target_weight);
    let weekly = stats::weekly_summary(entries, window_start, weeks);
    let window_end = stats::window_end(window_start, weeks);

    let mut output = String::new();

    let _ = writeln!(output, "# Progress Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} to {})",
        label, window_start, window_end
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");

    if entries.is_empty() {
        let _ = writeln!(output, "No progress logged for this window.");
    } else {
        let _ = writeln!(output, "- Entries: {}", entries.len());
        let _ = writeln!(
            output,
            "- Current weight: {}",
            format_weight(summary.current_weight)
        );
        let _ = writeln!(output, "- Weight change: {:+.1}", summary.weight_change);
        let _ = writeln!(
            output,
            "- Average energy: {:.1}/10",
            summary.average_energy_level
        );
        let _ = writeln!(output, "- Average adherence: {}%", summary.average_adherence);
        let _ = writeln!(
            output,
            "- Progress toward goal: {}",
            format_goal(&summary, target_weight)
        );
        let _ = writeln!(output, "- Trend: {}", summary.trend);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Breakdown");

    if weekly.is_empty() {
        let _ = writeln!(output, "No weeks with logged progress.");
    } else {
        for week in weekly.iter() {
            let _ = writeln!(output, "- {}", format_week(week));
        }
    }

    let mut noted: Vec<&ProgressEntry> = entries
        .iter()
        .filter(|entry| entry.notes.as_deref().is_some_and(|note| !note.trim().is_empty()))
        .collect();
    noted.sort_by(|a, b| b.date.cmp(&a.date));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Notes");

    if noted.is_empty() {
        let _ = writeln!(output, "No notes recorded for this window.");
    } else {
        for entry in noted.iter().take(5) {
            let _ = writeln!(
                output,
                "- {}: {}",
                entry.date,
                entry.notes.as_deref().unwrap_or_default()
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn sample_entry(date: NaiveDate, weight: f64, note: Option<&str>) -> ProgressEntry {
        ProgressEntry {
            date,
            weight: Some(weight),
            energy_level: 8,
            adherence_score: 90,
            notes: note.map(str::to_string),
        }
    }

    #[test]
    fn empty_report_explains_missing_data() {
        let report = build_report("demo@mealplan.app", day(1), 2, &[], Some(68.0));
        assert!(report.contains("Generated for demo@mealplan.app (2024-01-01 to 2024-01-14)"));
        assert!(report.contains("No progress logged for this window."));
        assert!(report.contains("No weeks with logged progress."));
        assert!(report.contains("No notes recorded for this window."));
    }

    #[test]
    fn report_lists_summary_weeks_and_notes() {
        let entries = vec![
            sample_entry(day(2), 72.0, Some("Started")),
            sample_entry(day(9), 70.5, None),
            sample_entry(day(10), 69.0, Some("  ")),
            sample_entry(day(12), 69.0, Some("Great week")),
        ];

        let report = build_report("demo", day(1), 2, &entries, Some(68.0));
        assert!(report.contains("- Current weight: 69.0"));
        assert!(report.contains("- Weight change: -3.0"));
        assert!(report.contains("- Progress toward goal: 75% (target 68.0)"));
        assert!(report.contains("- Trend: decreasing"));
        assert!(report.contains(
            "Week 1 (2024-01-01 to 2024-01-07): weight 72.0, energy 8.0, adherence 90%"
        ));
        assert!(report.contains("Week 2 (2024-01-08 to 2024-01-14): weight 69.5"));

        let great = report.find("2024-01-12: Great week").unwrap();
        let started = report.find("2024-01-02: Started").unwrap();
        assert!(great < started);
        assert!(!report.contains("2024-01-10:"));
    }

    #[test]
    fn goal_line_without_target() {
        let entries = vec![sample_entry(day(3), 70.0, None)];
        let report = build_report("demo", day(1), 1, &entries, None);
        assert!(report.contains("- Progress toward goal: no target weight set"));
    }
}
