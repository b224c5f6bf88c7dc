use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;

use crate::task::{
  Priority,
  Task
};

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub enum ViewFilter {
  #[default]
  All,
  Pending,
  Completed,
  High
}

impl ViewFilter {
  pub fn as_str(self) -> &'static str {
    match self {
      | ViewFilter::All => "all",
      | ViewFilter::Pending => "pending",
      | ViewFilter::Completed => {
        "completed"
      }
      | ViewFilter::High => "high"
    }
  }

  #[must_use]
  pub fn matches(
    self,
    task: &Task
  ) -> bool {
    match self {
      | ViewFilter::All => true,
      | ViewFilter::Pending => {
        !task.completed
      }
      | ViewFilter::Completed => {
        task.completed
      }
      | ViewFilter::High => {
        task.priority == Priority::High
      }
    }
  }

  /// Keeps collection order.
  pub fn apply<'a>(
    self,
    tasks: &'a [Task]
  ) -> Vec<&'a Task> {
    let kept: Vec<&Task> = tasks
      .iter()
      .filter(|t| self.matches(t))
      .collect();
    tracing::trace!(
      filter = self.as_str(),
      total = tasks.len(),
      kept = kept.len(),
      "applied view filter"
    );
    kept
  }
}

impl fmt::Display for ViewFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ViewFilter {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "" | "all" => Ok(ViewFilter::All),
      | "pending" => {
        Ok(ViewFilter::Pending)
      }
      | "completed" | "done" => {
        Ok(ViewFilter::Completed)
      }
      | "high" => Ok(ViewFilter::High),
      | other => {
        Err(anyhow!(
          "unknown filter: {other} \
           (expected all, pending, \
           completed or high)"
        ))
      }
    }
  }
}
