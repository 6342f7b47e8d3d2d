use chrono::{
  DateTime,
  Datelike,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Offset,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;

pub const TIMEZONE_ENV_VAR: &str =
  "STUDYPLAN_TIMEZONE";

/// Picks the timezone due dates are
/// interpreted in: env override, then
/// the configured value, then UTC.
pub fn resolve_timezone(
  configured: Option<&str>
) -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(raw) = configured
    && let Some(tz) =
      parse_timezone(raw, "config")
  {
    return tz;
  }

  tracing::debug!(
    "no timezone configured; using UTC"
  );
  chrono_tz::UTC
}

pub fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Combines a wall-clock date and time
/// into a UTC instant.
///
/// A folded local time resolves to the
/// earlier instant. A local time inside
/// a DST gap is pushed forward by the
/// length of the gap.
#[must_use]
pub fn local_to_utc(
  tz: &Tz,
  date: NaiveDate,
  time: NaiveTime
) -> DateTime<Utc> {
  let local_naive =
    NaiveDateTime::new(date, time);

  match tz
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      local_dt.with_timezone(&Utc)
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      let chosen = if first <= second {
        first
      } else {
        second
      };
      chosen.with_timezone(&Utc)
    }
    | LocalResult::None => {
      let before_gap = tz
        .from_local_datetime(
          &(local_naive
            - Duration::hours(3))
        )
        .earliest();
      let offset_secs = before_gap
        .map(|dt| {
          dt.offset()
            .fix()
            .local_minus_utc()
        })
        .unwrap_or(0);
      tracing::warn!(
        local = %local_naive,
        "local time falls in a DST gap; shifting forward"
      );
      Utc.from_utc_datetime(
        &(local_naive
          - Duration::seconds(
            i64::from(offset_secs)
          ))
      )
    }
  }
}

/// Parses a due date typed by a user:
/// `YYYY-MM-DD`, `today`, `tomorrow`, or
/// a weekday name (the next such day).
pub fn parse_due_date(
  input: &str,
  today: NaiveDate
) -> Option<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Some(today),
    | "tomorrow" => {
      return today.succ_opt();
    }
    | _ => {}
  }

  if let Some(target) =
    parse_weekday_name(&lower)
  {
    return Some(next_weekday_date(
      today, target
    ));
  }

  NaiveDate::parse_from_str(
    token, "%Y-%m-%d"
  )
  .ok()
}

/// Parses a due time: `HH:MM`,
/// `HH:MM:SS`, or `h:mm` with an am/pm
/// suffix.
pub fn parse_due_time(
  input: &str
) -> Option<NaiveTime> {
  let token = input.trim();

  for fmt in ["%H:%M", "%H:%M:%S"] {
    if let Ok(time) =
      NaiveTime::parse_from_str(
        token, fmt
      )
    {
      return Some(time);
    }
  }

  let (hour, minute) =
    parse_clock_time(token)?;
  NaiveTime::from_hms_opt(
    hour, minute, 0
  )
}

#[must_use]
pub fn format_local(
  dt: DateTime<Utc>,
  tz: &Tz,
  fmt: &str
) -> String {
  dt.with_timezone(tz)
    .format(fmt)
    .to_string()
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = i64::from(
    from
      .weekday()
      .num_days_from_monday()
  );
  let target_idx = i64::from(
    target.num_days_from_monday()
  );
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}

fn parse_clock_time(
  token: &str
) -> Option<(u32, u32)> {
  let clock_re = Regex::new(
    r"(?i)^(?P<hour>\d{1,2})(?::(?P<minute>\d{2}))?\s*(?P<ampm>[ap]m)$",
  )
  .ok()?;
  let captures =
    clock_re.captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = match captures
    .name("minute")
  {
    | Some(m) => {
      m.as_str().parse::<u32>().ok()?
    }
    | None => 0
  };
  if minute > 59
    || raw_hour == 0
    || raw_hour > 12
  {
    return None;
  }

  let ampm = captures
    .name("ampm")?
    .as_str()
    .to_ascii_lowercase();
  let hour = match ampm.as_str() {
    | "am" => raw_hour % 12,
    | "pm" => raw_hour % 12 + 12,
    | _ => return None
  };

  Some((hour, minute))
}

/// `YYYY-MM-DD` on the wire.
pub mod date_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  const FORMAT: &str = "%Y-%m-%d";

  pub fn serialize<S>(
    date: &NaiveDate,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &date.format(FORMAT).to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDate, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    NaiveDate::parse_from_str(
      raw.trim(),
      FORMAT
    )
    .map_err(serde::de::Error::custom)
  }
}

/// `HH:MM` on the wire; seconds are
/// tolerated on read.
pub mod time_serde {
  use chrono::NaiveTime;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    time: &NaiveTime,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &time.format("%H:%M").to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveTime, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(
      trimmed, "%H:%M"
    )
    .or_else(|_| {
      NaiveTime::parse_from_str(
        trimmed, "%H:%M:%S"
      )
    })
    .map_err(serde::de::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    NaiveTime,
    TimeZone,
    Utc
  };

  use super::{
    local_to_utc,
    parse_due_date,
    parse_due_time
  };

  fn day(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn parses_relative_and_weekday_dates()
  {
    // 2026-02-17 is a Tuesday.
    let today = day(2026, 2, 17);
    assert_eq!(
      parse_due_date("today", today),
      Some(today)
    );
    assert_eq!(
      parse_due_date(
        "Tomorrow", today
      ),
      Some(day(2026, 2, 18))
    );
    assert_eq!(
      parse_due_date(
        "wednesday",
        today
      ),
      Some(day(2026, 2, 18))
    );
    assert_eq!(
      parse_due_date("tue", today),
      Some(day(2026, 2, 24))
    );
    assert_eq!(
      parse_due_date(
        "2025-01-10",
        today
      ),
      Some(day(2025, 1, 10))
    );
    assert_eq!(
      parse_due_date("soon", today),
      None
    );
  }

  #[test]
  fn parses_clock_times() {
    let hm = |h, m| {
      NaiveTime::from_hms_opt(h, m, 0)
        .expect("valid time")
    };
    assert_eq!(
      parse_due_time("09:00"),
      Some(hm(9, 0))
    );
    assert_eq!(
      parse_due_time("9:05pm"),
      Some(hm(21, 5))
    );
    assert_eq!(
      parse_due_time("12am"),
      Some(hm(0, 0))
    );
    assert_eq!(
      parse_due_time("12:30PM"),
      Some(hm(12, 30))
    );
    assert_eq!(
      parse_due_time("25:00"),
      None
    );
    assert_eq!(
      parse_due_time("13pm"),
      None
    );
  }

  #[test]
  fn converts_local_wall_time_to_utc() {
    let tz: chrono_tz::Tz =
      "America/New_York"
        .parse()
        .expect("tz");
    let utc = local_to_utc(
      &tz,
      day(2025, 1, 10),
      NaiveTime::from_hms_opt(9, 0, 0)
        .expect("time")
    );
    assert_eq!(
      utc,
      Utc
        .with_ymd_and_hms(
          2025, 1, 10, 14, 0, 0
        )
        .single()
        .expect("valid")
    );
  }

  #[test]
  fn dst_gap_shifts_forward() {
    let tz: chrono_tz::Tz =
      "America/New_York"
        .parse()
        .expect("tz");
    // 02:30 does not exist on
    // 2025-03-09 in New York.
    let utc = local_to_utc(
      &tz,
      day(2025, 3, 9),
      NaiveTime::from_hms_opt(2, 30, 0)
        .expect("time")
    );
    assert_eq!(
      utc,
      Utc
        .with_ymd_and_hms(
          2025, 3, 9, 7, 30, 0
        )
        .single()
        .expect("valid")
    );
  }

  #[test]
  fn dst_fold_takes_earliest_instant() {
    let tz: chrono_tz::Tz =
      "America/New_York"
        .parse()
        .expect("tz");
    // 01:30 happens twice on
    // 2025-11-02 in New York: EDT
    // first, then EST.
    let utc = local_to_utc(
      &tz,
      day(2025, 11, 2),
      NaiveTime::from_hms_opt(1, 30, 0)
        .expect("time")
    );
    assert_eq!(
      utc,
      Utc
        .with_ymd_and_hms(
          2025, 11, 2, 5, 30, 0
        )
        .single()
        .expect("valid")
    );
  }
}
