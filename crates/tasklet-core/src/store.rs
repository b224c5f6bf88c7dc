//! Persistence boundary between the in-memory board and local storage.
//!
//! Two backends: a cookie jar holding one base64-encoded JSON cookie, and a
//! key-value file holding a plain JSON array under a fixed key. Every save is
//! a full replace of the task entry. Loading never fails: it falls back to an
//! empty collection and logs why.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, anyhow};
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::task::{Profile, SimpleRecord, Task};

pub const COOKIE_JAR_FILE: &str = "cookies.txt";
pub const LOCAL_STORAGE_FILE: &str = "local_storage.json";
pub const COOKIE_MAX_AGE_SECS: i64 = 31_536_000;

const COOKIE_EXPIRES_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

pub trait TaskStore {
    /// Reads the whole collection. Absent or undecodable state is an empty
    /// collection.
    fn load(&self) -> Vec<Task>;

    /// Overwrites the stored collection with `tasks`.
    fn save(&mut self, tasks: &[Task]) -> anyhow::Result<()>;
}

impl<T: TaskStore + ?Sized> TaskStore for Box<T> {
    fn load(&self) -> Vec<Task> {
        (**self).load()
    }

    fn save(&mut self, tasks: &[Task]) -> anyhow::Result<()> {
        (**self).save(tasks)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Cookie,
    Local,
}

impl Backend {
    pub fn default_for(profile: Profile) -> Self {
        match profile {
            Profile::Full => Backend::Cookie,
            Profile::Simple => Backend::Local,
        }
    }
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cookie" | "cookies" => Ok(Backend::Cookie),
            "local" | "localstorage" => Ok(Backend::Local),
            other => Err(anyhow!("invalid store backend: {other} (expected cookie or local)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub backend: Backend,
    pub profile: Profile,
    pub cookie_name: String,
    pub storage_key: String,
}

#[tracing::instrument(skip(settings, data_dir), fields(backend = ?settings.backend))]
pub fn open(settings: &StoreSettings, data_dir: &Path) -> anyhow::Result<Box<dyn TaskStore>> {
    fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;

    let store: Box<dyn TaskStore> = match settings.backend {
        Backend::Cookie => Box::new(CookieJarStore::new(
            data_dir.join(COOKIE_JAR_FILE),
            &settings.cookie_name,
            settings.profile,
        )),
        Backend::Local => Box::new(LocalStorageStore::new(
            data_dir.join(LOCAL_STORAGE_FILE),
            &settings.storage_key,
            settings.profile,
        )),
    };

    info!(
        data_dir = %data_dir.display(),
        profile = ?settings.profile,
        "opened task store"
    );
    Ok(store)
}

/// Serializes the collection in the shape the profile persists.
pub fn encode_tasks(tasks: &[Task], profile: Profile) -> anyhow::Result<String> {
    let json = match profile {
        Profile::Full => serde_json::to_string(tasks)?,
        Profile::Simple => {
            let records: Vec<SimpleRecord> = tasks.iter().map(SimpleRecord::from).collect();
            serde_json::to_string(&records)?
        }
    };
    Ok(json)
}

pub fn decode_tasks(raw: &str) -> anyhow::Result<Vec<Task>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(vec![]);
    }
    Ok(serde_json::from_str(trimmed)?)
}

/// A cookie jar file with one `name=value; attr=...` line per cookie.
#[derive(Debug)]
pub struct CookieJarStore {
    path: PathBuf,
    name: String,
    profile: Profile,
}

impl CookieJarStore {
    pub fn new(path: PathBuf, name: &str, profile: Profile) -> Self {
        Self {
            path,
            name: name.to_string(),
            profile,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_payload(&self, now: DateTime<Utc>) -> anyhow::Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let jar = fs::read_to_string(&self.path)
            .with_context(|| format!("failed reading {}", self.path.display()))?;

        let Some(cookie) = jar.lines().filter_map(Cookie::parse).find(|c| c.name == self.name)
        else {
            return Ok(None);
        };

        if cookie.expires.map(|at| at <= now).unwrap_or(false) {
            debug!(cookie = %self.name, "cookie expired");
            return Ok(None);
        }

        let bytes = BASE64_STANDARD
            .decode(cookie.value.as_bytes())
            .context("cookie value is not valid base64")?;
        let text = String::from_utf8(bytes).context("cookie value is not utf-8")?;
        Ok(Some(text))
    }

    fn load_at(&self, now: DateTime<Utc>) -> Vec<Task> {
        let decoded = self
            .read_payload(now)
            .and_then(|payload| payload.map(|raw| decode_tasks(&raw)).transpose());

        match decoded {
            Ok(Some(tasks)) => {
                debug!(count = tasks.len(), "loaded tasks from cookie jar");
                tasks
            }
            Ok(None) => vec![],
            Err(err) => {
                warn!(
                    file = %self.path.display(),
                    error = %format!("{err:#}"),
                    "discarding unreadable task cookie"
                );
                vec![]
            }
        }
    }

    fn save_at(&mut self, tasks: &[Task], now: DateTime<Utc>) -> anyhow::Result<()> {
        let value = BASE64_STANDARD.encode(encode_tasks(tasks, self.profile)?);
        let expires = now + Duration::seconds(COOKIE_MAX_AGE_SECS);
        let entry = format!(
            "{}={}; path=/; max-age={}; expires={}",
            self.name,
            value,
            COOKIE_MAX_AGE_SECS,
            expires.format(COOKIE_EXPIRES_FORMAT)
        );

        let existing = if self.path.exists() {
            fs::read_to_string(&self.path).unwrap_or_else(|err| {
                warn!(
                    file = %self.path.display(),
                    error = %err,
                    "replacing unreadable cookie jar"
                );
                String::new()
            })
        } else {
            String::new()
        };

        let mut lines: Vec<String> = existing
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter(|line| Cookie::parse(line).map(|c| c.name != self.name).unwrap_or(true))
            .map(str::to_string)
            .collect();
        lines.push(entry);

        let mut body = lines.join("\n");
        body.push('\n');
        write_atomic(&self.path, &body)
    }
}

impl TaskStore for CookieJarStore {
    #[tracing::instrument(skip(self), fields(cookie = %self.name))]
    fn load(&self) -> Vec<Task> {
        self.load_at(Utc::now())
    }

    #[tracing::instrument(skip(self, tasks), fields(cookie = %self.name, count = tasks.len()))]
    fn save(&mut self, tasks: &[Task]) -> anyhow::Result<()> {
        self.save_at(tasks, Utc::now())
            .with_context(|| format!("failed to save cookie {}", self.name))
    }
}

#[derive(Debug)]
struct Cookie<'a> {
    name: &'a str,
    value: &'a str,
    expires: Option<DateTime<Utc>>,
}

impl<'a> Cookie<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let mut parts = line.split(';');
        let (name, value) = parts.next()?.trim().split_once('=')?;

        let mut expires = None;
        for attr in parts {
            let Some((key, val)) = attr.trim().split_once('=') else {
                continue;
            };
            if key.eq_ignore_ascii_case("expires") {
                expires = NaiveDateTime::parse_from_str(val.trim(), COOKIE_EXPIRES_FORMAT)
                    .ok()
                    .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
            }
        }

        Some(Self {
            name: name.trim(),
            value: value.trim(),
            expires,
        })
    }
}

/// A JSON object file of string keys to string values.
#[derive(Debug)]
pub struct LocalStorageStore {
    path: PathBuf,
    key: String,
    profile: Profile,
}

impl LocalStorageStore {
    pub fn new(path: PathBuf, key: &str, profile: Profile) -> Self {
        Self {
            path,
            key: key.to_string(),
            profile,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> anyhow::Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed reading {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.path.display()))
    }
}

impl TaskStore for LocalStorageStore {
    #[tracing::instrument(skip(self), fields(key = %self.key))]
    fn load(&self) -> Vec<Task> {
        let decoded = self
            .read_map()
            .and_then(|map| map.get(&self.key).map(|raw| decode_tasks(raw)).transpose());

        match decoded {
            Ok(Some(tasks)) => {
                debug!(count = tasks.len(), "loaded tasks from local storage");
                tasks
            }
            Ok(None) => vec![],
            Err(err) => {
                warn!(
                    file = %self.path.display(),
                    error = %format!("{err:#}"),
                    "discarding unreadable local storage entry"
                );
                vec![]
            }
        }
    }

    #[tracing::instrument(skip(self, tasks), fields(key = %self.key, count = tasks.len()))]
    fn save(&mut self, tasks: &[Task]) -> anyhow::Result<()> {
        let mut map = self.read_map().unwrap_or_else(|err| {
            warn!(error = %format!("{err:#}"), "replacing unreadable local storage file");
            BTreeMap::new()
        });
        map.insert(self.key.clone(), encode_tasks(tasks, self.profile)?);

        let body = serde_json::to_string_pretty(&map)?;
        write_atomic(&self.path, &body)
            .with_context(|| format!("failed to save local storage key {}", self.key))
    }
}

/// Keeps the collection in process; counts saves so callers can observe
/// persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: Vec<Task>,
    saves: usize,
}

impl MemoryStore {
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self { tasks, saves: 0 }
    }

    pub fn save_count(&self) -> usize {
        self.saves
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }
}

impl TaskStore for MemoryStore {
    fn load(&self) -> Vec<Task> {
        self.tasks.clone()
    }

    fn save(&mut self, tasks: &[Task]) -> anyhow::Result<()> {
        self.tasks = tasks.to_vec();
        self.saves += 1;
        Ok(())
    }
}

#[tracing::instrument(skip(path, contents))]
fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    debug!(file = %path.display(), bytes = contents.len(), "writing atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents.as_bytes())?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};
    use tempfile::tempdir;

    use super::*;
    use crate::task::{Priority, TaskDraft};

    fn sample(now: DateTime<Utc>) -> Vec<Task> {
        let mut first = Task::from_draft(
            &TaskDraft::new("Read chapter 3")
                .with_priority(Priority::High)
                .with_date(NaiveDate::from_ymd_opt(2024, 1, 5).expect("date")),
            1,
            now,
        );
        first.description = "Pages 40-61".to_string();
        let mut second = Task::from_draft(&TaskDraft::new("Lab report"), 2, now);
        second.completed = true;
        vec![first, second]
    }

    #[test]
    fn cookie_jar_keeps_other_cookies_and_encodes_base64() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(COOKIE_JAR_FILE);
        fs::write(&path, "theme=night; path=/\n").expect("seed jar");

        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).single().expect("now");
        let mut store = CookieJarStore::new(path.clone(), "tasklet", Profile::Full);
        store.save_at(&sample(now), now).expect("save");

        let jar = fs::read_to_string(&path).expect("read jar");
        assert!(jar.contains("theme=night"));
        let line = jar
            .lines()
            .find(|l| l.starts_with("tasklet="))
            .expect("task cookie");
        assert!(line.contains("path=/"));
        assert!(line.contains("max-age=31536000"));
        assert!(line.contains("expires=Tue, 31 Dec 2024 09:00:00 GMT"));
        assert!(!line.contains("Read chapter"));

        let loaded = store.load_at(now);
        assert_eq!(loaded, sample(now));
    }

    #[test]
    fn expired_cookie_loads_empty() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(COOKIE_JAR_FILE);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).single().expect("now");

        let mut store = CookieJarStore::new(path, "tasklet", Profile::Full);
        store.save_at(&sample(now), now).expect("save");

        let later = now + Duration::seconds(COOKIE_MAX_AGE_SECS + 1);
        assert!(store.load_at(later).is_empty());
    }

    #[test]
    fn garbage_cookie_loads_empty() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(COOKIE_JAR_FILE);
        fs::write(&path, "tasklet=!!not-base64!!; path=/\n").expect("seed jar");

        let store = CookieJarStore::new(path, "tasklet", Profile::Full);
        assert!(store.load().is_empty());
    }

    #[test]
    fn web_form_jar_loads_under_default_cookie_name() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(COOKIE_JAR_FILE);
        let json = r#"[{"id":1704184200000,"title":"Essay","description":"","category":"School","priority":"high","date":"2024-01-05","time":"","completed":false,"createdAt":"2024-01-02T08:30:00.000Z"}]"#;
        fs::write(
            &path,
            format!("studentTasks={}; path=/; max-age=31536000\n", BASE64_STANDARD.encode(json)),
        )
        .expect("seed jar");

        let store = CookieJarStore::new(path, crate::config::DEFAULT_COOKIE, Profile::Full);
        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].title, "Essay");
        assert_eq!(loaded[0].priority, Priority::High);
        assert_eq!(loaded[0].time, None);
        assert!(!loaded[0].reminder_sent);
    }

    #[test]
    fn unreadable_jar_is_replaced_on_save() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(COOKIE_JAR_FILE);
        fs::write(&path, [0xff_u8, 0xfe, 0x00, b'\n']).expect("seed jar");
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).single().expect("now");

        let mut store = CookieJarStore::new(path.clone(), "tasklet", Profile::Full);
        assert!(store.load_at(now).is_empty());
        store.save_at(&sample(now), now).expect("save");

        let jar = fs::read_to_string(&path).expect("jar is utf-8 again");
        assert_eq!(jar.lines().count(), 1);
        assert_eq!(store.load_at(now), sample(now));
    }

    #[test]
    fn local_storage_writes_plain_simple_records() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(LOCAL_STORAGE_FILE);
        let now = Utc::now();

        let mut store = LocalStorageStore::new(path.clone(), "tasks", Profile::Simple);
        store.save(&sample(now)).expect("save");

        let map: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("parse map");
        let records: serde_json::Value = serde_json::from_str(&map["tasks"]).expect("parse tasks");
        assert_eq!(
            records,
            serde_json::json!([
                {"name": "Read chapter 3", "date": "2024-01-05", "completed": false},
                {"name": "Lab report", "date": "", "completed": true}
            ])
        );

        let loaded = store.load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].title, "Read chapter 3");
        assert!(loaded[1].completed);
    }

    #[test]
    fn malformed_local_storage_loads_empty_and_recovers_on_save() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(LOCAL_STORAGE_FILE);
        fs::write(&path, "{not json").expect("seed");

        let mut store = LocalStorageStore::new(path, "tasks", Profile::Simple);
        assert!(store.load().is_empty());

        store.save(&sample(Utc::now())).expect("save");
        assert_eq!(store.load().len(), 2);
    }

    #[test]
    fn backend_defaults_follow_profile() {
        assert_eq!(Backend::default_for(Profile::Full), Backend::Cookie);
        assert_eq!(Backend::default_for(Profile::Simple), Backend::Local);
        assert_eq!("localStorage".parse::<Backend>().expect("parse"), Backend::Local);
    }
}
