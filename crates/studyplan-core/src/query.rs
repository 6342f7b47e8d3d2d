use std::cmp::Ordering;

use chrono::{
  DateTime,
  Utc
};
use chrono_tz::Tz;
use clap::ValueEnum;
use deunicode::deunicode;
use tracing::{
  trace,
  warn
};

use crate::task::{
  Priority,
  Task
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  ValueEnum,
)]
pub enum PriorityFilter {
  #[default]
  All,
  High,
  Medium,
  Low
}

impl PriorityFilter {
  pub fn matches(
    self,
    priority: Priority
  ) -> bool {
    match self {
      | PriorityFilter::All => true,
      | PriorityFilter::High => {
        priority == Priority::High
      }
      | PriorityFilter::Medium => {
        priority == Priority::Medium
      }
      | PriorityFilter::Low => {
        priority == Priority::Low
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  ValueEnum,
)]
pub enum StatusFilter {
  #[default]
  All,
  Completed,
  Pending
}

impl StatusFilter {
  pub fn matches(
    self,
    completed: bool
  ) -> bool {
    match self {
      | StatusFilter::All => true,
      | StatusFilter::Completed => {
        completed
      }
      | StatusFilter::Pending => {
        !completed
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum SortKey {
  #[default]
  Date,
  Priority,
  Subject,
  /// Leaves the snapshot order alone.
  Insertion
}

impl SortKey {
  /// Unknown keys fall back to
  /// insertion order rather than
  /// failing.
  pub fn parse_lenient(
    raw: &str
  ) -> Self {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "date" | "due" => Self::Date,
      | "priority" => Self::Priority,
      | "subject" => Self::Subject,
      | "" | "none" | "insertion" => {
        Self::Insertion
      }
      | other => {
        warn!(
          key = other,
          "unrecognized sort key; keeping insertion order"
        );
        Self::Insertion
      }
    }
  }
}

/// Filter and sort selections coming
/// from the presentation layer.
#[derive(
  Debug, Clone, Copy, Default,
)]
pub struct Query {
  pub priority: PriorityFilter,
  pub status:   StatusFilter,
  pub sort:     SortKey
}

impl Query {
  pub fn new(
    priority: PriorityFilter,
    status: StatusFilter,
    sort: SortKey
  ) -> Self {
    Self {
      priority,
      status,
      sort
    }
  }

  pub fn matches(
    &self,
    task: &Task
  ) -> bool {
    self.priority.matches(task.priority)
      && self
        .status
        .matches(task.completed)
  }

  /// Filters then stably sorts into a
  /// fresh vector; `snapshot` is not
  /// touched.
  #[tracing::instrument(skip(
    self, snapshot, tz
  ))]
  pub fn apply(
    &self,
    snapshot: &[Task],
    tz: &Tz
  ) -> Vec<Task> {
    let mut rows: Vec<Task> = snapshot
      .iter()
      .filter(|task| self.matches(task))
      .cloned()
      .collect();

    trace!(
      kept = rows.len(),
      total = snapshot.len(),
      "filtered tasks"
    );

    match self.sort {
      | SortKey::Date => {
        rows.sort_by(|a, b| {
          compare_due(a, b, tz)
        })
      }
      | SortKey::Priority => {
        rows.sort_by_key(|task| {
          task.priority.rank()
        })
      }
      | SortKey::Subject => {
        rows.sort_by(|a, b| {
          compare_subjects(
            &a.subject, &b.subject
          )
        })
      }
      | SortKey::Insertion => {}
    }

    rows
  }
}

pub fn query(
  snapshot: &[Task],
  priority: PriorityFilter,
  status: StatusFilter,
  sort: SortKey,
  tz: &Tz
) -> Vec<Task> {
  Query::new(priority, status, sort)
    .apply(snapshot, tz)
}

/// Every task, ordered by due-instant.
pub fn timeline(
  snapshot: &[Task],
  tz: &Tz
) -> Vec<Task> {
  query(
    snapshot,
    PriorityFilter::All,
    StatusFilter::All,
    SortKey::Date,
    tz
  )
}

/// Pending tasks whose due-instant has
/// passed, earliest first.
pub fn overdue(
  snapshot: &[Task],
  now: DateTime<Utc>,
  tz: &Tz
) -> Vec<Task> {
  timeline(snapshot, tz)
    .into_iter()
    .filter(|task| {
      task.is_overdue(now, tz)
    })
    .collect()
}

fn compare_due(
  a: &Task,
  b: &Task,
  tz: &Tz
) -> Ordering {
  a.due_instant(tz)
    .cmp(&b.due_instant(tz))
}

/// Accents fold onto their base letter
/// (`É` sorts with `e`), then
/// case-insensitive, with lowercase
/// ahead of uppercase on a tie.
fn compare_subjects(
  a: &str,
  b: &str
) -> Ordering {
  collation_key(a)
    .cmp(&collation_key(b))
    .then_with(|| {
      a.to_lowercase()
        .cmp(&b.to_lowercase())
    })
    .then_with(|| b.cmp(a))
}

fn collation_key(s: &str) -> String {
  deunicode(s).to_lowercase()
}
