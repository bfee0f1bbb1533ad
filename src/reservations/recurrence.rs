#![forbid(unsafe_code)]

//! Recurring reservation expansion (daily/weekly/monthly), bounded by a
//! horizon and an occurrence cap so a `"never"` end policy can't walk off
//! into an unbounded insert storm.

use chrono::{DateTime, Datelike, Duration, Months, Utc};

use crate::utils::config::ReservationConfig;
use crate::utils::db_types::RecurrenceRule;

/// One instance's (start, end) pair, still to be conflict-checked and
/// inserted by the caller.
pub type Occurrence = (DateTime<Utc>, DateTime<Utc>);

pub fn expand(
    rule: &RecurrenceRule,
    first_start: DateTime<Utc>,
    first_end: DateTime<Utc>,
    cfg: &ReservationConfig,
) -> Vec<Occurrence> {
    let duration = first_end - first_start;
    let horizon = first_start + Duration::days(cfg.recurrence_horizon_days);
    let cap = cfg.recurrence_max_occurrences;

    let mut out = Vec::new();
    match rule.frequency.as_str() {
        "daily" => expand_daily(rule, first_start, duration, horizon, cap, &mut out),
        "weekly" => expand_weekly(rule, first_start, duration, horizon, cap, &mut out),
        "monthly" => expand_monthly(rule, first_start, duration, horizon, cap, &mut out),
        _ => out.push((first_start, first_end)),
    }
    out
}

fn keep_going(rule: &RecurrenceRule, occurrence_start: DateTime<Utc>, horizon: DateTime<Utc>, count_so_far: usize, cap: usize) -> bool {
    if count_so_far >= cap || occurrence_start > horizon {
        return false;
    }
    match rule.end_policy.as_str() {
        "on_date" => rule.end_date.map(|d| occurrence_start.date_naive() <= d).unwrap_or(true),
        "after_count" => rule.occurrence_count.map(|n| count_so_far < n as usize).unwrap_or(true),
        _ => true,
    }
}

fn expand_daily(
    rule: &RecurrenceRule,
    first_start: DateTime<Utc>,
    duration: Duration,
    horizon: DateTime<Utc>,
    cap: usize,
    out: &mut Vec<Occurrence>,
) {
    let interval = rule.interval.max(1) as i64;
    let mut cursor = first_start;
    while keep_going(rule, cursor, horizon, out.len(), cap) {
        out.push((cursor, cursor + duration));
        cursor += Duration::days(interval);
    }
}

fn expand_weekly(
    rule: &RecurrenceRule,
    first_start: DateTime<Utc>,
    duration: Duration,
    horizon: DateTime<Utc>,
    cap: usize,
    out: &mut Vec<Occurrence>,
) {
    let interval = rule.interval.max(1) as i64;
    let bitmap = rule.days_of_week.unwrap_or(1 << first_start.weekday().num_days_from_sunday());
    let first_week_start = first_start - Duration::days(first_start.weekday().num_days_from_sunday() as i64);

    let mut day = first_start;
    while day <= horizon && out.len() < cap {
        let days_since_week_start = (day - first_week_start).num_days();
        let week_index = days_since_week_start.div_euclid(7);
        let weekday_bit = 1i16 << day.weekday().num_days_from_sunday();
        if week_index % interval == 0 && bitmap & weekday_bit != 0 && day >= first_start {
            if !keep_going(rule, day, horizon, out.len(), cap) {
                break;
            }
            out.push((day, day + duration));
        }
        day += Duration::days(1);
    }
}

fn expand_monthly(
    rule: &RecurrenceRule,
    first_start: DateTime<Utc>,
    duration: Duration,
    horizon: DateTime<Utc>,
    cap: usize,
    out: &mut Vec<Occurrence>,
) {
    let interval = rule.interval.max(1) as u32;
    let target_day = first_start.day();
    let mut month_offset: u32 = 0;

    loop {
        let candidate = first_start.checked_add_months(Months::new(interval * month_offset));
        let Some(candidate) = candidate else { break };
        // `checked_add_months` clamps to the last day of the target month
        // when `target_day` doesn't exist there (e.g. the 31st in April);
        // skip that occurrence entirely rather than shifting it.
        if candidate.day() == target_day {
            if !keep_going(rule, candidate, horizon, out.len(), cap) {
                break;
            }
            out.push((candidate, candidate + duration));
        } else if candidate > horizon {
            break;
        }
        if candidate > horizon || out.len() >= cap {
            break;
        }
        month_offset += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn rule(frequency: &str, interval: i32, days_of_week: Option<i16>) -> RecurrenceRule {
        RecurrenceRule {
            id: Uuid::new_v4(),
            frequency: frequency.to_string(),
            interval,
            days_of_week,
            end_policy: "after_count".to_string(),
            end_date: None,
            occurrence_count: Some(5),
        }
    }

    #[test]
    fn daily_expands_with_interval() {
        let cfg = ReservationConfig {
            min_duration_minutes: 15,
            max_duration_minutes: 1440,
            grace_minutes: 0,
            daily_quota_per_user: 10,
            recurrence_horizon_days: 365,
            recurrence_max_occurrences: 500,
            expire_sweep_seconds: 60,
            enforce_business_hours: false,
        };
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let end = start + Duration::minutes(30);
        let occ = expand(&rule("daily", 2, None), start, end, &cfg);
        assert_eq!(occ.len(), 5);
        assert_eq!(occ[1].0, start + Duration::days(2));
    }

    #[test]
    fn monthly_skips_missing_day_of_month() {
        let cfg = ReservationConfig {
            min_duration_minutes: 15,
            max_duration_minutes: 1440,
            grace_minutes: 0,
            daily_quota_per_user: 10,
            recurrence_horizon_days: 365,
            recurrence_max_occurrences: 500,
            expire_sweep_seconds: 60,
            enforce_business_hours: false,
        };
        let mut r = rule("monthly", 1, None);
        r.end_policy = "after_count".to_string();
        r.occurrence_count = Some(3);
        let start = Utc.with_ymd_and_hms(2026, 1, 31, 9, 0, 0).unwrap();
        let end = start + Duration::minutes(30);
        let occ = expand(&r, start, end, &cfg);
        // Feb has no 31st -- it's skipped, so we still land on Jan/Mar/Apr.
        assert_eq!(occ.len(), 3);
        assert_eq!(occ[1].0.month(), 3);
    }
}
