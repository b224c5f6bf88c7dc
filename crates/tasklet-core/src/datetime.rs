use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Days,
  Local,
  NaiveDate,
  NaiveTime,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;

/// Calendar used to decide what "today"
/// means for labels and reminders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Zone {
  Local,
  Named(Tz)
}

impl Zone {
  pub fn from_config(
    raw: Option<&str>
  ) -> anyhow::Result<Self> {
    let Some(raw) = raw else {
      return Ok(Zone::Local);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty()
      || trimmed
        .eq_ignore_ascii_case("local")
    {
      return Ok(Zone::Local);
    }

    match trimmed.parse::<Tz>() {
      | Ok(tz) => {
        tracing::info!(
          timezone = %trimmed,
          "configured timezone"
        );
        Ok(Zone::Named(tz))
      }
      | Err(err) => {
        Err(anyhow!(
          "invalid timezone \
           {trimmed}: {err}"
        ))
      }
    }
  }

  #[must_use]
  pub fn today(
    &self,
    now: DateTime<Utc>
  ) -> NaiveDate {
    match self {
      | Zone::Local => {
        now
          .with_timezone(&Local)
          .date_naive()
      }
      | Zone::Named(tz) => {
        now
          .with_timezone(tz)
          .date_naive()
      }
    }
  }
}

#[must_use]
pub fn next_day(
  day: NaiveDate
) -> NaiveDate {
  day
    .checked_add_days(Days::new(1))
    .unwrap_or(day)
}

/// `Today`, `Tomorrow`, or a
/// `Mon D, YYYY` string.
#[must_use]
pub fn date_label(
  date: Option<NaiveDate>,
  today: NaiveDate
) -> String {
  match date {
    | None => "No date".to_string(),
    | Some(d) if d == today => {
      "Today".to_string()
    }
    | Some(d) if d == next_day(today) => {
      "Tomorrow".to_string()
    }
    | Some(d) => {
      d.format("%b %-d, %Y").to_string()
    }
  }
}

#[tracing::instrument(skip(today))]
pub fn parse_date_input(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let lower =
    input.trim().to_ascii_lowercase();
  match lower.as_str() {
    | "today" => Ok(today),
    | "tomorrow" => Ok(next_day(today)),
    | other => {
      NaiveDate::parse_from_str(
        other, "%Y-%m-%d"
      )
      .map_err(|err| {
        anyhow!(
          "invalid date {other}: {err} \
           (expected YYYY-MM-DD, today \
           or tomorrow)"
        )
      })
    }
  }
}

fn clock_regex()
-> &'static Result<Regex, regex::Error> {
  static CLOCK_RE: OnceLock<
    Result<Regex, regex::Error>
  > = OnceLock::new();
  CLOCK_RE.get_or_init(|| {
    Regex::new(
      r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>[ap]m)?$",
    )
  })
}

pub fn parse_clock_time(
  token: &str
) -> anyhow::Result<NaiveTime> {
  let clock_re = clock_regex()
    .as_ref()
    .map_err(|err| {
      anyhow!(
        "invalid clock pattern: {err}"
      )
    })?;
  let captures = clock_re
    .captures(token.trim())
    .ok_or_else(|| {
      anyhow!(
        "invalid time {token} \
         (expected HH:MM)"
      )
    })?;

  let raw_hour = captures["hour"]
    .parse::<u32>()?;
  let minute = captures["minute"]
    .parse::<u32>()?;

  let hour = match captures
    .name("ampm")
    .map(|m| m.as_str().to_ascii_lowercase())
  {
    | Some(ampm) => {
      if raw_hour == 0 || raw_hour > 12 {
        return Err(anyhow!(
          "invalid 12-hour clock time: \
           {token}"
        ));
      }
      match (ampm.as_str(), raw_hour) {
        | ("am", 12) => 0,
        | ("am", h) => h,
        | (_, 12) => 12,
        | (_, h) => h + 12
      }
    }
    | None => raw_hour
  };

  NaiveTime::from_hms_opt(hour, minute, 0)
    .ok_or_else(|| {
      anyhow!("invalid time: {token}")
    })
}

/// `Option<NaiveDate>` as `YYYY-MM-DD`,
/// with the empty string standing for
/// "no date".
pub mod task_date_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    date: &Option<NaiveDate>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match date {
      | Some(d) => {
        serializer.serialize_str(
          &d.format("%Y-%m-%d")
            .to_string()
        )
      }
      | None => serializer.serialize_str("")
    }
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<Option<NaiveDate>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw =
      Option::<String>::deserialize(
        deserializer
      )?;
    match raw.as_deref().map(str::trim) {
      | None | Some("") => Ok(None),
      | Some(text) => {
        NaiveDate::parse_from_str(
          text, "%Y-%m-%d"
        )
        .map(Some)
        .map_err(serde::de::Error::custom)
      }
    }
  }
}

/// `Option<NaiveTime>` as `HH:MM`.
pub mod clock_time_serde {
  use chrono::NaiveTime;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    time: &Option<NaiveTime>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match time {
      | Some(t) => {
        serializer.serialize_str(
          &t.format("%H:%M").to_string()
        )
      }
      | None => serializer.serialize_str("")
    }
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<Option<NaiveTime>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw =
      Option::<String>::deserialize(
        deserializer
      )?;
    match raw.as_deref().map(str::trim) {
      | None | Some("") => Ok(None),
      | Some(text) => {
        NaiveTime::parse_from_str(
          text, "%H:%M"
        )
        .or_else(|_| {
          NaiveTime::parse_from_str(
            text, "%H:%M:%S"
          )
        })
        .map(Some)
        .map_err(serde::de::Error::custom)
      }
    }
  }
}
