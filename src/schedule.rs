use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use crate::types::Schedule;

static RE_CLOCK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{1,2}):(\d{2})").unwrap());
static RE_EXPLICIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2}) (\w+)(?: в)? (\d{2}):(\d{2})").unwrap());

const TODAY: &str = "сегодня";
const TOMORROW: &str = "завтра";

/// Genitive month names as the listing renders them ("15 марта").
const MONTHS: [&str; 12] = [
    "января",
    "февраля",
    "марта",
    "апреля",
    "мая",
    "июня",
    "июля",
    "августа",
    "сентября",
    "октября",
    "ноября",
    "декабря",
];

/// Resolve listing schedule text against `now`.
///
/// Accepted shapes: `сегодня HH:MM`, `завтра HH:MM` and `<day> <month> [в] HH:MM`
/// (year taken from `now`). Anything else is [`Schedule::unknown`]. No timezone
/// conversion happens here; `now` must already be in the reference frame.
pub fn parse_schedule_text(text: &str, now: NaiveDateTime) -> Schedule {
    let text = text.trim().to_lowercase();

    let resolved = if text.starts_with(TODAY) {
        clock_time(&text).map(|t| now.date().and_time(t))
    } else if text.starts_with(TOMORROW) {
        clock_time(&text)
            .zip(now.date().succ_opt())
            .map(|(t, day)| day.and_time(t))
    } else {
        explicit_date(&text, now.year())
    };

    resolved.map(Schedule::At).unwrap_or_else(Schedule::unknown)
}

fn clock_time(text: &str) -> Option<NaiveTime> {
    let caps = RE_CLOCK.captures(text)?;
    hm(&caps[1], &caps[2])
}

fn explicit_date(text: &str, year: i32) -> Option<NaiveDateTime> {
    let caps = RE_EXPLICIT.captures(text)?;
    let day: u32 = caps[1].parse().ok()?;
    let month = month_number(&caps[2])?;
    let time = hm(&caps[3], &caps[4])?;
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.and_time(time))
}

fn month_number(name: &str) -> Option<u32> {
    MONTHS
        .iter()
        .position(|m| *m == name)
        .map(|idx| idx as u32 + 1)
}

fn hm(hour: &str, minute: &str) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_ts;

    fn now() -> NaiveDateTime {
        parse_ts("2024-03-10 08:00:00").unwrap()
    }

    fn at(raw: &str) -> Schedule {
        Schedule::At(parse_ts(raw).unwrap())
    }

    #[test]
    fn today_uses_current_date() {
        assert_eq!(parse_schedule_text("сегодня 19:30", now()), at("2024-03-10 19:30:00"));
        assert_eq!(parse_schedule_text("  Сегодня в 9:05 ", now()), at("2024-03-10 09:05:00"));
    }

    #[test]
    fn tomorrow_rolls_date_forward() {
        assert_eq!(parse_schedule_text("завтра 10:00", now()), at("2024-03-11 10:00:00"));

        let new_year_eve = parse_ts("2024-12-31 23:00:00").unwrap();
        assert_eq!(
            parse_schedule_text("завтра 01:15", new_year_eve),
            at("2025-01-01 01:15:00")
        );
    }

    #[test]
    fn explicit_day_and_month() {
        assert_eq!(parse_schedule_text("15 марта в 18:00", now()), at("2024-03-15 18:00:00"));
        assert_eq!(parse_schedule_text("2 декабря 07:45", now()), at("2024-12-02 07:45:00"));
    }

    #[test]
    fn unrecognised_text_is_unknown() {
        assert_eq!(parse_schedule_text("garbage text", now()), Schedule::unknown());
        assert_eq!(parse_schedule_text("сегодня", now()), Schedule::unknown());
        assert_eq!(parse_schedule_text("15 мартобря в 18:00", now()), Schedule::unknown());
        assert_eq!(parse_schedule_text("31 февраля в 18:00", now()), Schedule::unknown());
        assert_eq!(parse_schedule_text("сегодня 25:00", now()), Schedule::unknown());
        assert_eq!(parse_schedule_text("unknown", now()), Schedule::unknown());
    }
}
