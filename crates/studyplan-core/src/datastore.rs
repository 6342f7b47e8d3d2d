use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::keyvalue::{KeyValueStore, TASKS_KEY};
use crate::task::{Priority, Task, TaskId};

pub const TASKS_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct TaskDocument<'a> {
    version: u32,
    tasks: &'a [Task],
}

/// Field-wise edit of a task. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub priority: Option<Priority>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Moving the due date or time re-arms the reminder.
    fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(subject) = &self.subject {
            task.subject = subject.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }

        let mut due_moved = false;
        if let Some(date) = self.date {
            due_moved |= task.date != date;
            task.date = date;
        }
        if let Some(time) = self.time {
            due_moved |= task.time != time;
            task.time = time;
        }
        if due_moved && task.reminder_shown {
            debug!(id = %task.id, "due moved; re-arming reminder");
            task.reminder_shown = false;
        }
    }
}

/// Sole owner of the task list. Every mutation writes the whole list back.
#[derive(Debug)]
pub struct TaskStore<K: KeyValueStore> {
    kv: K,
    tasks: Vec<Task>,
    /// `None` once a stored id reached `u64::MAX`.
    next_id: Option<u64>,
    unsaved: bool,
}

impl<K: KeyValueStore> TaskStore<K> {
    /// Never fails: unreadable or malformed data yields an empty store.
    #[tracing::instrument(skip(kv))]
    pub fn load(kv: K) -> Self {
        let tasks = match kv.get(TASKS_KEY) {
            Ok(Some(raw)) => decode_tasks(&raw),
            Ok(None) => {
                debug!("no stored tasks; starting empty");
                vec![]
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed reading stored tasks; starting empty");
                vec![]
            }
        };

        let mut store = Self {
            kv,
            tasks: Vec::with_capacity(tasks.len()),
            next_id: Some(1),
            unsaved: false,
        };

        let mut seen = BTreeSet::new();
        for mut task in tasks {
            if task.id.0 == 0 || !seen.insert(task.id) {
                let fresh = store.allocate_id_skipping(&seen);
                warn!(old = %task.id, new = %fresh, "duplicate or zero id in stored data; reassigned");
                task.id = fresh;
                seen.insert(fresh);
            }
            store.bump_past(task.id);
            store.tasks.push(task);
        }

        info!(count = store.tasks.len(), "loaded tasks");
        store
    }

    pub fn key_value(&self) -> &K {
        &self.kv
    }

    /// Owned copy in insertion order.
    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.clone()
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.tasks.iter().find(|t| t.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Keeps a caller-supplied id only when it is non-zero and unused.
    #[tracing::instrument(skip(self, task), fields(title = %task.title))]
    pub fn add(&mut self, mut task: Task) -> StoreResult<TaskId> {
        let taken = task.id.0 == 0 || self.tasks.iter().any(|t| t.id == task.id);
        if taken {
            task.id = self.allocate_id();
        } else {
            self.bump_past(task.id);
        }

        let id = task.id;
        self.tasks.push(task);
        debug!(%id, count = self.tasks.len(), "task added");
        self.persist()?;
        Ok(id)
    }

    #[tracing::instrument(skip(self, patch), fields(id = %id))]
    pub fn update(&mut self, id: TaskId, patch: &TaskPatch) -> StoreResult<Task> {
        self.modify(id, |task| patch.apply_to(task))
    }

    /// Runs `edit` against one task, then persists.
    #[tracing::instrument(skip(self, edit), fields(id = %id))]
    pub fn modify<F>(&mut self, id: TaskId, edit: F) -> StoreResult<Task>
    where
        F: FnOnce(&mut Task),
    {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::NotFound(id))?;
        edit(task);
        let updated = task.clone();
        self.persist()?;
        Ok(updated)
    }

    /// Runs `edit` over every task; those for which it returns `true` count
    /// as changed. Persists once, and only if something changed.
    #[tracing::instrument(skip(self, edit))]
    pub fn modify_where<F>(&mut self, edit: F) -> StoreResult<Vec<Task>>
    where
        F: FnMut(&mut Task) -> bool,
    {
        let changed = self.mark_where(edit);
        if !changed.is_empty() {
            self.persist()?;
        }
        Ok(changed)
    }

    /// Like [`TaskStore::modify_where`] without the write. Changes stay
    /// unsaved until the caller runs [`TaskStore::persist`].
    pub fn mark_where<F>(&mut self, mut edit: F) -> Vec<Task>
    where
        F: FnMut(&mut Task) -> bool,
    {
        let mut changed = Vec::new();
        for task in &mut self.tasks {
            if edit(task) {
                changed.push(task.clone());
            }
        }
        if !changed.is_empty() {
            self.unsaved = true;
        }
        changed
    }

    /// True after a mutation whose write has not yet succeeded.
    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn remove(&mut self, id: TaskId) -> StoreResult<Task> {
        let idx = self
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(StoreError::NotFound(id))?;
        let removed = self.tasks.remove(idx);
        self.persist()?;
        Ok(removed)
    }

    #[tracing::instrument(skip(self, predicate))]
    pub fn remove_where<P>(&mut self, mut predicate: P) -> StoreResult<usize>
    where
        P: FnMut(&Task) -> bool,
    {
        let before = self.tasks.len();
        self.tasks.retain(|task| !predicate(task));
        let removed = before - self.tasks.len();

        info!(before, after = self.tasks.len(), "removed matching tasks");
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Writes the full list. Public so callers can retry after a failure.
    #[tracing::instrument(skip(self))]
    pub fn persist(&mut self) -> StoreResult<()> {
        self.unsaved = true;
        let doc = TaskDocument {
            version: TASKS_SCHEMA_VERSION,
            tasks: &self.tasks,
        };
        let payload = serde_json::to_string_pretty(&doc).map_err(|err| StoreError::Persist {
            key: TASKS_KEY,
            source: err.into(),
        })?;

        self.kv
            .set(TASKS_KEY, &payload)
            .map_err(|err| StoreError::Persist {
                key: TASKS_KEY,
                source: err.into(),
            })?;
        self.unsaved = false;
        debug!(count = self.tasks.len(), "persisted tasks");
        Ok(())
    }

    fn bump_past(&mut self, id: TaskId) {
        if let Some(next) = self.next_id {
            if id.0 >= next {
                self.next_id = id.0.checked_add(1);
            }
        }
    }

    fn allocate_id(&mut self) -> TaskId {
        self.allocate_id_skipping(&BTreeSet::new())
    }

    /// Hands out `next_id` and counts up. Once the counter is spent, falls
    /// back to the lowest id not in use.
    fn allocate_id_skipping(&mut self, reserved: &BTreeSet<TaskId>) -> TaskId {
        while let Some(next) = self.next_id {
            self.next_id = next.checked_add(1);
            let id = TaskId(next);
            if !reserved.contains(&id) && self.tasks.iter().all(|t| t.id != id) {
                return id;
            }
        }

        let used: BTreeSet<u64> = self
            .tasks
            .iter()
            .map(|t| t.id.0)
            .chain(reserved.iter().map(|id| id.0))
            .collect();
        let mut candidate = 1_u64;
        for id in used.range(1..) {
            if *id != candidate {
                break;
            }
            candidate = candidate.saturating_add(1);
        }
        warn!(id = candidate, "task id counter exhausted; reusing lowest free id");
        TaskId(candidate)
    }
}

/// Accepts the versioned document or the legacy bare array. Records that
/// fail to parse are dropped individually.
fn decode_tasks(raw: &str) -> Vec<Task> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "stored tasks are not valid json; starting empty");
            return vec![];
        }
    };

    let records = match value {
        Value::Array(records) => {
            debug!("reading legacy unversioned task list");
            records
        }
        Value::Object(mut doc) => {
            let version = doc.get("version").and_then(Value::as_u64).unwrap_or(0);
            if version > u64::from(TASKS_SCHEMA_VERSION) {
                warn!(version, supported = TASKS_SCHEMA_VERSION, "task document is newer than supported; reading known fields");
            }
            match doc.remove("tasks") {
                Some(Value::Array(records)) => records,
                _ => {
                    warn!("task document has no task array; starting empty");
                    return vec![];
                }
            }
        }
        Value::Null => vec![],
        _ => {
            warn!("unexpected stored task layout; starting empty");
            return vec![];
        }
    };

    records
        .into_iter()
        .enumerate()
        .filter_map(|(idx, record)| match serde_json::from_value::<Task>(record) {
            Ok(task) => Some(task),
            Err(err) => {
                warn!(index = idx, error = %err, "skipping malformed task record");
                None
            }
        })
        .collect()
}
