use chrono::{Duration, NaiveDate};

use crate::models::{ProgressEntry, ProgressStats, Trend, WeeklySummary};

/// Weight swing (in the caller's unit) below which the trend reads as stable.
pub const TREND_THRESHOLD: f64 = 0.5;

pub fn compute_stats(entries: &[ProgressEntry], target_weight: Option<f64>) -> ProgressStats {
    if entries.is_empty() {
        return ProgressStats {
            current_weight: None,
            weight_change: 0.0,
            average_energy_level: 0.0,
            average_adherence: 0,
            progress_toward_goal: 0.0,
            trend: Trend::Stable,
        };
    }

    // Most recent first; sort_by is stable so same-day entries keep input order.
    let mut sorted: Vec<&ProgressEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| b.date.cmp(&a.date));

    let current_weight = sorted.first().and_then(|entry| entry.weight);
    let baseline_weight = sorted.last().and_then(|entry| entry.weight);

    let weight_change = match (current_weight, baseline_weight) {
        (Some(current), Some(baseline)) => current - baseline,
        _ => 0.0,
    };

    let count = entries.len() as f64;
    let average_energy_level = entries
        .iter()
        .map(|entry| entry.energy_level as f64)
        .sum::<f64>()
        / count;
    let average_adherence = entries
        .iter()
        .map(|entry| entry.adherence_score as f64)
        .sum::<f64>()
        / count;

    let progress_toward_goal = match (target_weight, current_weight, baseline_weight) {
        (Some(target), Some(current), Some(baseline)) => goal_progress(target, current, baseline),
        _ => 0.0,
    };

    ProgressStats {
        current_weight,
        weight_change,
        average_energy_level: round_tenth(average_energy_level),
        average_adherence: average_adherence.round() as i32,
        progress_toward_goal,
        trend: classify_trend(&sorted),
    }
}

/// Percent of the baseline-to-target distance covered so far. Overshoot
/// reads above 100.
pub fn goal_progress(target: f64, current: f64, baseline: f64) -> f64 {
    let needed_change = (target - baseline).abs();
    let actual_change = (current - baseline).abs();
    if needed_change > 0.0 {
        (actual_change / needed_change * 100.0).round()
    } else {
        0.0
    }
}

/// Compares the newest weight with the third-newest one. Expects entries
/// sorted most recent first.
pub fn classify_trend(sorted: &[&ProgressEntry]) -> Trend {
    let mut weights = sorted.iter().filter_map(|entry| entry.weight);
    let (Some(newest), Some(_), Some(third)) = (weights.next(), weights.next(), weights.next())
    else {
        return Trend::Stable;
    };

    // Weights are recorded to two decimals; compare at that precision so a
    // decimal 0.5 swing is not pushed over the threshold by float error.
    let delta = round_hundredth(newest - third);
    if delta.abs() > TREND_THRESHOLD {
        if delta < 0.0 {
            Trend::Decreasing
        } else {
            Trend::Increasing
        }
    } else {
        Trend::Stable
    }
}

/// Inclusive bounds of bucket `index`. `None` once the start no longer fits
/// in the calendar; the end is clamped to the last representable day.
fn week_bounds(window_start: NaiveDate, index: u32) -> Option<(NaiveDate, NaiveDate)> {
    let week_start = window_start.checked_add_signed(Duration::days(7 * i64::from(index)))?;
    let week_end = week_start
        .checked_add_signed(Duration::days(6))
        .unwrap_or(NaiveDate::MAX);
    Some((week_start, week_end))
}

pub fn weekly_summary(
    entries: &[ProgressEntry],
    window_start: NaiveDate,
    week_count: u32,
) -> Vec<WeeklySummary> {
    let Some(latest) = entries.iter().map(|entry| entry.date).max() else {
        return Vec::new();
    };

    let mut summaries = Vec::new();
    for index in 0..week_count {
        let Some((week_start, week_end)) = week_bounds(window_start, index) else {
            break;
        };
        if week_start > latest {
            break;
        }

        let week: Vec<&ProgressEntry> = entries
            .iter()
            .filter(|entry| entry.date >= week_start && entry.date <= week_end)
            .collect();

        if week.is_empty() {
            continue;
        }

        let count = week.len() as f64;
        let weights: Vec<f64> = week.iter().filter_map(|entry| entry.weight).collect();
        let average_weight = if weights.is_empty() {
            None
        } else {
            Some(round_tenth(weights.iter().sum::<f64>() / weights.len() as f64))
        };
        let average_energy =
            week.iter().map(|entry| entry.energy_level as f64).sum::<f64>() / count;
        let average_adherence =
            week.iter().map(|entry| entry.adherence_score as f64).sum::<f64>() / count;

        summaries.push(WeeklySummary {
            week_index: index + 1,
            week_start,
            week_end,
            average_weight,
            average_energy: round_tenth(average_energy),
            average_adherence: average_adherence.round() as i32,
        });
    }

    summaries
}

/// First day of a `weeks`-long window whose last bucket ends on `today`.
/// Clamps to the earliest representable day.
pub fn window_start(today: NaiveDate, weeks: u32) -> NaiveDate {
    today
        .checked_sub_signed(Duration::days(7 * i64::from(weeks) - 1))
        .unwrap_or(NaiveDate::MIN)
}

pub fn window_end(window_start: NaiveDate, weeks: u32) -> NaiveDate {
    window_start
        .checked_add_signed(Duration::days(7 * i64::from(weeks) - 1))
        .unwrap_or(NaiveDate::MAX)
}

pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round_hundredth(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
