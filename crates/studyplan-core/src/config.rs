use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::Duration;
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{
  debug,
  info,
  warn
};

use crate::datetime::resolve_timezone;

pub const CONFIG_ENV_VAR: &str =
  "STUDYPLAN_CONFIG";
/// One year; anything longer is
/// clamped.
const MAX_REMINDER_SECS: u64 =
  365 * 24 * 60 * 60;

#[derive(
  Debug, Clone, Default, Deserialize,
)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  pub data:         DataSection,
  pub time:         TimeSection,
  pub reminder:     ReminderSection,
  pub display:      DisplaySection,
  #[serde(skip)]
  pub loaded_files: Vec<PathBuf>
}

#[derive(
  Debug, Clone, Default, Deserialize,
)]
#[serde(default, deny_unknown_fields)]
pub struct DataSection {
  pub location: Option<String>
}

#[derive(
  Debug, Clone, Default, Deserialize,
)]
#[serde(default, deny_unknown_fields)]
pub struct TimeSection {
  pub timezone: Option<String>
}

#[derive(
  Debug, Clone, Deserialize,
)]
#[serde(default, deny_unknown_fields)]
pub struct ReminderSection {
  pub interval_secs:  u64,
  pub lookahead_mins: u64
}

impl Default for ReminderSection {
  fn default() -> Self {
    Self {
      interval_secs:  60,
      lookahead_mins: 60
    }
  }
}

#[derive(
  Debug, Clone, Deserialize,
)]
#[serde(default, deny_unknown_fields)]
pub struct DisplaySection {
  pub color: bool
}

impl Default for DisplaySection {
  fn default() -> Self {
    Self {
      color: true
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    config_override
  ))]
  pub fn load(
    config_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let Some(path) = resolve_config_path(
      config_override
    )?
    else {
      debug!(
        "no config file found; using \
         defaults"
      );
      return Ok(Self::default());
    };

    info!(config = %path.display(), "loading config");
    Self::load_file(&path)
  }

  pub fn load_file(
    path: &Path
  ) -> anyhow::Result<Self> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    let mut cfg =
      Self::from_toml(&text)
        .with_context(|| {
          format!(
            "failed to parse {}",
            path.display()
          )
        })?;
    cfg.loaded_files.push(path);
    Ok(cfg)
  }

  pub fn from_toml(
    text: &str
  ) -> anyhow::Result<Self> {
    let cfg: Config =
      toml::from_str(text)?;
    cfg.validate()?;
    Ok(cfg)
  }

  /// Applies `key=value` overrides
  /// such as `reminder.interval_secs=30`.
  /// A leading `rc.` is ignored.
  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) -> anyhow::Result<()>
  where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .trim()
        .to_string();
      let value = v.trim().to_string();
      debug!(key = %key, value = %value, "applying override");

      match key.as_str() {
        | "data.location" => {
          self.data.location =
            Some(value);
        }
        | "time.timezone" => {
          self.time.timezone =
            Some(value);
        }
        | "reminder.interval_secs" => {
          self.reminder.interval_secs =
            parse_number(&key, &value)?;
        }
        | "reminder.lookahead_mins" => {
          self.reminder.lookahead_mins =
            parse_number(&key, &value)?;
        }
        | "display.color" => {
          self.display.color =
            parse_bool(&value);
        }
        | other => {
          return Err(anyhow!(
            "unknown config key: \
             {other}"
          ));
        }
      }
    }

    self.validate()
  }

  pub fn timezone(&self) -> Tz {
    resolve_timezone(
      self.time.timezone.as_deref()
    )
  }

  pub fn reminder_interval(
    &self
  ) -> Duration {
    Duration::seconds(
      self
        .reminder
        .interval_secs
        .min(MAX_REMINDER_SECS)
        as i64
    )
  }

  pub fn reminder_lookahead(
    &self
  ) -> Duration {
    Duration::minutes(
      self
        .reminder
        .lookahead_mins
        .min(MAX_REMINDER_SECS / 60)
        as i64
    )
  }

  fn validate(
    &self
  ) -> anyhow::Result<()> {
    if self.reminder.interval_secs == 0
    {
      return Err(anyhow!(
        "reminder.interval_secs must \
         be positive"
      ));
    }
    if self.reminder.lookahead_mins == 0
    {
      return Err(anyhow!(
        "reminder.lookahead_mins must \
         be positive"
      ));
    }
    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.data.location.as_deref()
  {
    expand_tilde(Path::new(cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_config_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(env_path) =
    std::env::var(CONFIG_ENV_VAR)
  {
    if env_path == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      env_path
    )));
  }

  let Some(config_dir) =
    dirs::config_dir()
  else {
    warn!(
      "cannot determine config \
       directory; using defaults"
    );
    return Ok(None);
  };
  let candidate = config_dir
    .join("studyplan")
    .join("config.toml");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let base = dirs::data_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine data \
         directory"
      )
    })?;
  Ok(base.join("studyplan"))
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_number(
  key: &str,
  value: &str
) -> anyhow::Result<u64> {
  value.parse::<u64>().with_context(
    || {
      format!(
        "invalid number for {key}: \
         {value}"
      )
    }
  )
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::fs;

  use chrono::Duration;
  use tempfile::tempdir;

  use super::{
    Config,
    resolve_data_dir
  };

  #[test]
  fn defaults_without_file() {
    let cfg = Config::default();
    assert_eq!(
      cfg.reminder_interval(),
      Duration::seconds(60)
    );
    assert_eq!(
      cfg.reminder_lookahead(),
      Duration::hours(1)
    );
    assert!(cfg.display.color);
  }

  #[test]
  fn parses_toml_sections() {
    let cfg = Config::from_toml(
      r#"
        [time]
        timezone = "Europe/Berlin"

        [reminder]
        interval_secs = 15
      "#
    )
    .expect("parse");
    assert_eq!(
      cfg.time.timezone.as_deref(),
      Some("Europe/Berlin")
    );
    assert_eq!(
      cfg.reminder.interval_secs,
      15
    );
    assert_eq!(
      cfg.reminder.lookahead_mins,
      60
    );
  }

  #[test]
  fn rejects_unknown_keys_and_zero_interval()
  {
    assert!(
      Config::from_toml(
        "[reminder]\nevery = 3\n"
      )
      .is_err()
    );
    assert!(
      Config::from_toml(
        "[reminder]\ninterval_secs = \
         0\n"
      )
      .is_err()
    );
  }

  #[test]
  fn overrides_apply_by_dotted_key() {
    let mut cfg = Config::default();
    cfg
      .apply_overrides(vec![
        (
          "rc.display.color".to_string(),
          "off".to_string()
        ),
        (
          "reminder.lookahead_mins"
            .to_string(),
          "30".to_string()
        ),
      ])
      .expect("overrides");
    assert!(!cfg.display.color);
    assert_eq!(
      cfg.reminder_lookahead(),
      Duration::minutes(30)
    );

    assert!(
      cfg
        .apply_overrides(vec![(
          "nope".to_string(),
          "1".to_string()
        )])
        .is_err()
    );
  }

  #[test]
  fn loads_file_and_creates_data_dir() {
    let temp =
      tempdir().expect("tempdir");
    let data = temp.path().join("data");
    let cfg_path =
      temp.path().join("config.toml");
    fs::write(
      &cfg_path,
      format!(
        "[data]\nlocation = {:?}\n",
        data.display().to_string()
      )
    )
    .expect("write config");

    let cfg = Config::load(Some(
      &cfg_path
    ))
    .expect("load");
    assert_eq!(cfg.loaded_files.len(), 1);

    let dir = resolve_data_dir(&cfg, None)
      .expect("data dir");
    assert_eq!(dir, data);
    assert!(dir.exists());
  }
}
