use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::datetime::Zone;
use crate::store::{
  Backend,
  StoreSettings
};
use crate::task::Profile;

pub const RC_ENV_VAR: &str =
  "TASKLETRC";
pub const RC_FILE_NAME: &str =
  ".taskletrc";
pub const DEFAULT_DATA_DIR: &str =
  "~/.tasklet";
/// Cookie the web version of the board
/// writes, so its jar loads as is.
pub const DEFAULT_COOKIE: &str =
  "studentTasks";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  pub fn defaults() -> Self {
    let mut map = HashMap::new();
    for (k, v) in [
      ("data.location", DEFAULT_DATA_DIR),
      ("profile", "full"),
      ("store.cookie", DEFAULT_COOKIE),
      ("store.key", "tasks"),
      ("confirm.delete", "on"),
      ("reminder.interval", "60"),
      ("color", "on")
    ] {
      map.insert(
        k.to_string(),
        v.to_string()
      );
    }
    Config {
      map,
      loaded_files: vec![]
    }
  }

  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::defaults();

    let rc =
      resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading config");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no config file found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn set(
    &mut self,
    key: &str,
    value: &str
  ) {
    self.map.insert(
      key.to_string(),
      value.to_string()
    );
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if self
          .loaded_files
          .contains(&include_path)
        {
          warn!(include = %include_path.display(), "include cycle; skipping");
        } else if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

/// Typed view over the raw key/value
/// config.
#[derive(Debug, Clone)]
pub struct Settings {
  pub profile:           Profile,
  pub store:             StoreSettings,
  pub confirm_delete:    bool,
  pub desktop_notify:    Option<bool>,
  pub reminder_interval: Duration,
  pub zone:              Zone
}

impl Settings {
  #[tracing::instrument(skip(cfg))]
  pub fn from_config(
    cfg: &Config
  ) -> anyhow::Result<Self> {
    let profile = cfg
      .get("profile")
      .map(|raw| raw.parse::<Profile>())
      .transpose()?
      .unwrap_or_default();

    let backend = match cfg
      .get("store.backend")
    {
      | Some(raw)
        if !raw.trim().is_empty() =>
      {
        raw.parse::<Backend>()?
      }
      | _ => Backend::default_for(profile)
    };

    let interval_secs = cfg
      .get("reminder.interval")
      .map(|raw| {
        raw.trim().parse::<u64>().map_err(
          |err| {
            anyhow!(
              "invalid \
               reminder.interval \
               {raw}: {err}"
            )
          }
        )
      })
      .transpose()?
      .unwrap_or(60)
      .max(1);

    let zone = Zone::from_config(
      cfg.get("timezone").as_deref()
    )?;

    let settings = Settings {
      profile,
      store: StoreSettings {
        backend,
        profile,
        cookie_name: cfg
          .get("store.cookie")
          .unwrap_or_else(|| {
            DEFAULT_COOKIE.to_string()
          }),
        storage_key: cfg
          .get("store.key")
          .unwrap_or_else(|| {
            "tasks".to_string()
          })
      },
      confirm_delete: cfg
        .get_bool("confirm.delete")
        .unwrap_or(true),
      desktop_notify: cfg
        .get_bool("notify.desktop"),
      reminder_interval:
        Duration::from_secs(
          interval_secs
        ),
      zone
    };
    debug!(?settings, "resolved settings");
    Ok(settings)
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
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    expand_tilde(Path::new(
      DEFAULT_DATA_DIR
    ))
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
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping config"
    );
    return Ok(None);
  };
  let candidate = home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
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

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
