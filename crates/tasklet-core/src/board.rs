//! The task board: sole owner of the in-memory collection.
//!
//! Every mutation runs the same sequence: change the collection, save the
//! whole collection through the store, then let the caller re-render from
//! [`TaskBoard::visible`] and [`TaskBoard::stats`].

use std::collections::HashSet;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};

use crate::datetime::{Zone, next_day};
use crate::filter::ViewFilter;
use crate::notify::{Notifier, Prompter};
use crate::render::{Stats, visible_tasks};
use crate::store::TaskStore;
use crate::task::{Profile, Task, TaskDraft};

pub const EMPTY_TITLE_ALERT: &str = "Please enter a task name.";
pub const PAST_DATE_ALERT: &str = "Please choose a due date of today or later.";
pub const DUPLICATE_ALERT: &str = "A task with that name and date already exists.";
pub const DELETE_CONFIRM: &str = "Are you sure you want to delete this task?";

/// A control activation, as carried by the `data-action` / `data-id`
/// attributes on rendered markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Toggle(u64),
    Delete(u64),
}

impl Action {
    pub fn parse(action: &str, id: &str) -> anyhow::Result<Self> {
        let id = id
            .trim()
            .parse::<u64>()
            .map_err(|err| anyhow!("invalid task id {id}: {err}"))?;
        match action.trim() {
            "toggle" | "complete" => Ok(Action::Toggle(id)),
            "delete" => Ok(Action::Delete(id)),
            other => Err(anyhow!("unknown action: {other}")),
        }
    }
}

impl FromStr for Action {
    type Err = anyhow::Error;

    /// `toggle:17` or `delete:17`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (action, id) = s
            .split_once(':')
            .ok_or_else(|| anyhow!("expected ACTION:ID, got: {s}"))?;
        Action::parse(action, id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderReport {
    /// Ids reminded during this check.
    pub reminded: Vec<u64>,
    /// Incomplete tasks dated before today. Reported only.
    pub overdue: Vec<u64>,
}

#[derive(Debug)]
pub struct TaskBoard<S: TaskStore> {
    store: S,
    tasks: Vec<Task>,
    filter: ViewFilter,
    profile: Profile,
    confirm_delete: bool,
    zone: Zone,
}

impl<S: TaskStore> TaskBoard<S> {
    #[instrument(skip(store))]
    pub fn open(store: S, profile: Profile) -> Self {
        let mut tasks = store.load();
        assign_missing_ids(&mut tasks);
        info!(count = tasks.len(), "loaded task board");
        Self {
            store,
            tasks,
            filter: ViewFilter::All,
            profile,
            confirm_delete: profile.is_full(),
            zone: Zone::Local,
        }
    }

    /// Calendar used to decide which due dates lie in the past.
    pub fn with_zone(mut self, zone: Zone) -> Self {
        self.zone = zone;
        self
    }

    /// Only meaningful for the full profile; the simple profile never asks.
    pub fn with_delete_confirmation(mut self, enabled: bool) -> Self {
        self.confirm_delete = enabled && self.profile.is_full();
        self
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn filter(&self) -> ViewFilter {
        self.filter
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Filters only exist in the full profile.
    pub fn set_filter(&mut self, filter: ViewFilter) {
        self.filter = if self.profile.is_full() { filter } else { ViewFilter::All };
        debug!(filter = %self.filter, "view filter set");
    }

    pub fn visible(&self) -> Vec<&Task> {
        visible_tasks(&self.tasks, self.filter, self.profile)
    }

    pub fn stats(&self) -> Stats {
        Stats::of(&self.tasks)
    }

    /// Counters as displayed; the simple profile shows none.
    pub fn summary(&self) -> Option<Stats> {
        self.profile.is_full().then(|| self.stats())
    }

    /// Re-reads the store, replacing the in-memory collection.
    pub fn reload(&mut self) {
        let mut tasks = self.store.load();
        assign_missing_ids(&mut tasks);
        debug!(count = tasks.len(), "reloaded task board");
        self.tasks = tasks;
    }

    #[instrument(skip(self, draft, now, ui), fields(title = %draft.title))]
    pub fn add_task<U>(
        &mut self,
        draft: &TaskDraft,
        now: DateTime<Utc>,
        ui: &mut U,
    ) -> anyhow::Result<Option<Task>>
    where
        U: Prompter + Notifier,
    {
        if draft.title.trim().is_empty() {
            debug!("rejected task with empty title");
            ui.alert(EMPTY_TITLE_ALERT);
            return Ok(None);
        }

        let today = self.zone.today(now);
        if self.profile.is_full() && draft.date.is_some_and(|date| date < today) {
            debug!(date = ?draft.date, %today, "rejected past due date");
            ui.alert(PAST_DATE_ALERT);
            return Ok(None);
        }

        let id = self.next_id(now);
        let task = Task::from_draft(draft, id, now);

        if !self.profile.is_full() && self.tasks.iter().any(|t| t.same_identity(&task)) {
            debug!("rejected duplicate name/date pair");
            ui.alert(DUPLICATE_ALERT);
            return Ok(None);
        }

        self.tasks.push(task.clone());
        self.persist()?;
        info!(id, count = self.tasks.len(), "task added");

        if self.profile.is_full() {
            ui.notify("Task added successfully! 🎉");
        }
        Ok(Some(task))
    }

    /// Returns the new completion state, or `None` when no task has `id`.
    #[instrument(skip(self, notifier))]
    pub fn toggle_complete<N: Notifier>(
        &mut self,
        id: u64,
        notifier: &mut N,
    ) -> anyhow::Result<Option<bool>> {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!(id, "toggle for unknown id ignored");
            return Ok(None);
        };
        task.completed = !task.completed;
        let completed = task.completed;

        self.persist()?;
        info!(id, completed, "task toggled");

        if self.profile.is_full() {
            notifier.notify(if completed { "Task completed! ✅" } else { "Task reopened" });
        }
        Ok(Some(completed))
    }

    /// Returns whether anything was removed.
    #[instrument(skip(self, ui))]
    pub fn delete_task<U>(&mut self, id: u64, ui: &mut U) -> anyhow::Result<bool>
    where
        U: Prompter + Notifier,
    {
        let Some(target) = self.get(id).cloned() else {
            debug!(id, "delete for unknown id ignored");
            return Ok(false);
        };

        if self.confirm_delete && !ui.confirm(DELETE_CONFIRM) {
            debug!(id, "delete declined");
            return Ok(false);
        }

        let before = self.tasks.len();
        match self.profile {
            Profile::Full => self.tasks.retain(|t| t.id != id),
            Profile::Simple => self.tasks.retain(|t| !t.same_identity(&target)),
        }
        self.persist()?;
        info!(id, removed = before - self.tasks.len(), "task deleted");

        if self.profile.is_full() {
            ui.notify("Task deleted");
        }
        Ok(true)
    }

    pub fn dispatch<U>(&mut self, action: Action, ui: &mut U) -> anyhow::Result<()>
    where
        U: Prompter + Notifier,
    {
        debug!(?action, "dispatching action");
        match action {
            Action::Toggle(id) => self.toggle_complete(id, ui).map(|_| ()),
            Action::Delete(id) => self.delete_task(id, ui).map(|_| ()),
        }
    }

    /// Reminds once about each incomplete task due the day after `today`.
    #[instrument(skip(self, notifier))]
    pub fn check_reminders<N: Notifier>(
        &mut self,
        today: NaiveDate,
        notifier: &mut N,
    ) -> anyhow::Result<ReminderReport> {
        let mut report = ReminderReport::default();
        if !self.profile.is_full() {
            return Ok(report);
        }

        let tomorrow = next_day(today);
        for task in self.tasks.iter_mut().filter(|t| !t.completed) {
            if task.date == Some(tomorrow) && !task.reminder_sent {
                notifier.notify(&format!("⏰ Reminder: \"{}\" is due tomorrow!", task.title));
                task.reminder_sent = true;
                report.reminded.push(task.id);
            }

            if task.is_overdue(today) {
                report.overdue.push(task.id);
            }
        }

        if !report.reminded.is_empty() {
            self.persist()?;
        }
        debug!(
            reminded = report.reminded.len(),
            overdue = report.overdue.len(),
            "reminder check finished"
        );
        Ok(report)
    }

    /// Creation time in milliseconds, bumped past every existing id.
    fn next_id(&mut self, now: DateTime<Utc>) -> u64 {
        let stamp = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let max = self.tasks.iter().map(|t| t.id).max().unwrap_or(0);
        let floor = match max.checked_add(1) {
            Some(floor) => floor,
            None => {
                warn!(count = self.tasks.len(), "task ids exhausted, renumbering");
                renumber(&mut self.tasks);
                self.tasks.len() as u64 + 1
            }
        };
        stamp.max(floor)
    }

    fn persist(&mut self) -> anyhow::Result<()> {
        self.store.save(&self.tasks)
    }
}

/// Records persisted without an id (the simple profile) get sequential ids
/// after the highest one present.
fn assign_missing_ids(tasks: &mut [Task]) {
    let mut next = tasks.iter().map(|t| t.id).max().unwrap_or(0);
    let mut seen = HashSet::new();
    let mut exhausted = false;
    for task in tasks.iter_mut() {
        if task.id == 0 || !seen.insert(task.id) {
            let Some(bumped) = next.checked_add(1) else {
                exhausted = true;
                break;
            };
            next = bumped;
            task.id = next;
            seen.insert(next);
        }
    }

    if exhausted {
        warn!(count = tasks.len(), "task ids exhausted, renumbering");
        renumber(tasks);
    }
}

/// Ids `1..=n` in collection order.
fn renumber(tasks: &mut [Task]) {
    for (id, task) in (1..).zip(tasks.iter_mut()) {
        task.id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn parses_actions() {
        assert_eq!(Action::parse("toggle", "12").expect("parse"), Action::Toggle(12));
        assert_eq!("delete:7".parse::<Action>().expect("parse"), Action::Delete(7));
        assert!(Action::parse("archive", "1").is_err());
        assert!(Action::parse("toggle", "x").is_err());
    }

    #[test]
    fn missing_and_duplicate_ids_are_reassigned() {
        let raw = r#"[
            {"name":"a","date":"","completed":false},
            {"name":"b","date":"","completed":false},
            {"id":5,"title":"c"},
            {"id":5,"title":"d"}
        ]"#;
        let tasks: Vec<Task> = serde_json::from_str(raw).expect("decode");
        let board = TaskBoard::open(MemoryStore::with_tasks(tasks), Profile::Simple);
        let ids: Vec<u64> = board.tasks().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![6, 7, 5, 8]);
    }

    #[test]
    fn next_id_stays_monotonic() {
        let now = Utc::now();
        let ahead = now.timestamp_millis() as u64 + 1000;
        let task = Task::from_draft(&TaskDraft::new("future"), ahead, now);
        let mut board = TaskBoard::open(MemoryStore::with_tasks(vec![task]), Profile::Full);
        assert_eq!(board.next_id(now), ahead + 1);
    }

    #[test]
    fn maximal_stored_id_does_not_overflow() {
        let raw = format!(r#"[{{"id":{},"title":"x"}}]"#, u64::MAX);
        let tasks: Vec<Task> = serde_json::from_str(&raw).expect("decode");
        let mut ui = crate::notify::Recorder::default();
        let mut board = TaskBoard::open(MemoryStore::with_tasks(tasks), Profile::Full);

        let added = board
            .add_task(&TaskDraft::new("next"), Utc::now(), &mut ui)
            .expect("add")
            .expect("task");
        let ids: Vec<u64> = board.tasks().iter().map(|t| t.id).collect();
        assert_eq!(ids[0], 1);
        assert_eq!(ids[1], added.id);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn missing_id_beside_maximal_id_renumbers() {
        let raw = format!(
            r#"[{{"id":{},"title":"a"}},{{"name":"b","date":"","completed":false}}]"#,
            u64::MAX
        );
        let tasks: Vec<Task> = serde_json::from_str(&raw).expect("decode");
        let board = TaskBoard::open(MemoryStore::with_tasks(tasks), Profile::Full);
        let ids: Vec<u64> = board.tasks().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn summary_counters_only_in_full_profile() {
        let task = Task::from_draft(&TaskDraft::new("a"), 1, Utc::now());
        let full = TaskBoard::open(MemoryStore::with_tasks(vec![task.clone()]), Profile::Full);
        assert_eq!(full.summary().map(|s| s.total), Some(1));

        let simple = TaskBoard::open(MemoryStore::with_tasks(vec![task]), Profile::Simple);
        assert!(simple.summary().is_none());
    }

    #[test]
    fn simple_profile_ignores_filters() {
        let mut board = TaskBoard::open(MemoryStore::default(), Profile::Simple);
        board.set_filter(ViewFilter::High);
        assert_eq!(board.filter(), ViewFilter::All);
    }
}
