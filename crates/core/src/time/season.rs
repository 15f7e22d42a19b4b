use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

const REGULAR_SEASON_WEEKS: u32 = 18;

/// Accepts RFC 3339 or a bare `YYYY-MM-DD` (taken as noon UTC). Defaults to `now`.
pub fn resolve_as_of(arg: Option<&str>, now_utc: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    let Some(s) = arg else {
        return Ok(now_utc);
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid as-of '{s}': expected RFC 3339 or YYYY-MM-DD"))?;
    Ok(date.and_time(NaiveTime::MIN + chrono::Duration::hours(12)).and_utc())
}

/// Week of the regular season containing `date`. Weeks start on the season's opening day.
/// Dates before kickoff map to week 1, dates after the final week to the last one.
pub fn week_for_date(season_start: NaiveDate, date: NaiveDate) -> u32 {
    let days = (date - season_start).num_days();
    if days < 0 {
        return 1;
    }
    let week = (days / 7) as u32 + 1;
    week.min(REGULAR_SEASON_WEEKS)
}

/// From the switch date on, rest-of-season value stops counting toward the horizon signal.
pub fn is_late_season(horizon_switch: NaiveDate, as_of: DateTime<Utc>) -> bool {
    as_of.date_naive() >= horizon_switch
}
