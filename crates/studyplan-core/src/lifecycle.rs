//! Create, edit, complete and delete tasks. Each operation is one store
//! transition followed by a write of the whole list.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::{debug, info};

use crate::datastore::{TaskPatch, TaskStore};
use crate::datetime::{parse_due_date, parse_due_time};
use crate::error::{StoreError, StoreResult};
use crate::keyvalue::KeyValueStore;
use crate::task::{Priority, Task, TaskId};

/// Raw form values as typed by the user.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub title: String,
    pub subject: String,
    pub date: String,
    pub time: String,
    pub priority: String,
    pub description: String,
}

/// Draft that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub subject: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub priority: Priority,
    pub description: Option<String>,
}

impl TaskDraft {
    /// `today` anchors relative dates such as `tomorrow`.
    pub fn validate(&self, today: NaiveDate) -> StoreResult<NewTask> {
        Ok(NewTask {
            title: required("title", &self.title)?.to_string(),
            subject: required("subject", &self.subject)?.to_string(),
            date: parse_date_field(&self.date, today)?,
            time: parse_time_field(&self.time)?,
            priority: parse_priority_field(&self.priority)?,
            description: optional_text(&self.description),
        })
    }
}

impl NewTask {
    pub fn into_task(self, now: DateTime<Utc>) -> Task {
        Task {
            id: TaskId(0),
            title: self.title,
            subject: self.subject,
            date: self.date,
            time: self.time,
            priority: self.priority,
            description: self.description,
            completed: false,
            created_at: now,
            reminder_shown: false,
        }
    }
}

/// Edit form: only the fields that are `Some` change.
#[derive(Debug, Clone, Default)]
pub struct EditDraft {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub priority: Option<String>,
    /// An empty string clears the description.
    pub description: Option<String>,
}

impl EditDraft {
    pub fn validate(&self, today: NaiveDate) -> StoreResult<TaskPatch> {
        Ok(TaskPatch {
            title: self
                .title
                .as_deref()
                .map(|raw| required("title", raw).map(str::to_string))
                .transpose()?,
            subject: self
                .subject
                .as_deref()
                .map(|raw| required("subject", raw).map(str::to_string))
                .transpose()?,
            date: self
                .date
                .as_deref()
                .map(|raw| parse_date_field(raw, today))
                .transpose()?,
            time: self.time.as_deref().map(parse_time_field).transpose()?,
            priority: self
                .priority
                .as_deref()
                .map(parse_priority_field)
                .transpose()?,
            description: self.description.as_deref().map(optional_text),
        })
    }
}

#[tracing::instrument(skip(store, draft, now))]
pub fn add_task<K: KeyValueStore>(
    store: &mut TaskStore<K>,
    draft: &TaskDraft,
    now: DateTime<Utc>,
    today: NaiveDate,
) -> StoreResult<TaskId> {
    let new_task = draft.validate(today)?;
    let id = store.add(new_task.into_task(now))?;
    info!(%id, "task created");
    Ok(id)
}

#[tracing::instrument(skip(store, draft), fields(id = %id))]
pub fn edit_task<K: KeyValueStore>(
    store: &mut TaskStore<K>,
    id: TaskId,
    draft: &EditDraft,
    today: NaiveDate,
) -> StoreResult<Task> {
    let patch = draft.validate(today)?;
    if store.get(id).is_none() {
        return Err(StoreError::NotFound(id));
    }
    if patch.is_empty() {
        debug!("empty edit; nothing to write");
        return store.get(id).ok_or(StoreError::NotFound(id));
    }
    let task = store.update(id, &patch)?;
    info!("task updated");
    Ok(task)
}

/// Flips `completed` and nothing else.
#[tracing::instrument(skip(store), fields(id = %id))]
pub fn toggle_complete<K: KeyValueStore>(store: &mut TaskStore<K>, id: TaskId) -> StoreResult<Task> {
    let task = store.modify(id, |task| task.completed = !task.completed)?;
    info!(completed = task.completed, "task toggled");
    Ok(task)
}

/// Confirmation is the caller's job; this always deletes.
#[tracing::instrument(skip(store), fields(id = %id))]
pub fn delete_task<K: KeyValueStore>(store: &mut TaskStore<K>, id: TaskId) -> StoreResult<Task> {
    let task = store.remove(id)?;
    info!("task deleted");
    Ok(task)
}

#[tracing::instrument(skip(store))]
pub fn clear_completed<K: KeyValueStore>(store: &mut TaskStore<K>) -> StoreResult<usize> {
    let removed = store.remove_where(|task| task.completed)?;
    info!(removed, "cleared completed tasks");
    Ok(removed)
}

fn required<'a>(field: &'static str, raw: &'a str) -> StoreResult<&'a str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(StoreError::MissingField(field));
    }
    Ok(trimmed)
}

fn optional_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_date_field(raw: &str, today: NaiveDate) -> StoreResult<NaiveDate> {
    let value = required("date", raw)?;
    parse_due_date(value, today).ok_or_else(|| StoreError::InvalidField {
        field: "date",
        value: value.to_string(),
    })
}

fn parse_time_field(raw: &str) -> StoreResult<NaiveTime> {
    let value = required("time", raw)?;
    parse_due_time(value).ok_or_else(|| StoreError::InvalidField {
        field: "time",
        value: value.to_string(),
    })
}

fn parse_priority_field(raw: &str) -> StoreResult<Priority> {
    let value = required("priority", raw)?;
    value.parse().map_err(|_| StoreError::InvalidField {
        field: "priority",
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::keyvalue::MemoryKeyValueStore;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 8).expect("date")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 8, 12, 0, 0).unwrap()
    }

    fn draft() -> TaskDraft {
        TaskDraft {
            title: "  Flashcards ".to_string(),
            subject: "Spanish".to_string(),
            date: "2025-01-10".to_string(),
            time: "09:00".to_string(),
            priority: "high".to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn add_populates_defaults() {
        let kv = MemoryKeyValueStore::new();
        let mut store = TaskStore::load(&kv);
        let id = add_task(&mut store, &draft(), now(), today()).expect("add");

        let task = store.get(id).expect("stored");
        assert_eq!(task.title, "Flashcards");
        assert_eq!(task.subject, "Spanish");
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.description, None);
        assert_eq!(task.created_at, now());
        assert!(!task.completed);
        assert!(!task.reminder_shown);
    }

    #[test]
    fn missing_field_rejects_before_mutation() {
        let kv = MemoryKeyValueStore::new();
        let mut store = TaskStore::load(&kv);

        for field in ["title", "subject", "date", "time", "priority"] {
            let mut d = draft();
            match field {
                "title" => d.title = " ".to_string(),
                "subject" => d.subject.clear(),
                "date" => d.date.clear(),
                "time" => d.time.clear(),
                _ => d.priority.clear(),
            }
            let err = add_task(&mut store, &d, now(), today()).expect_err("rejected");
            assert!(matches!(err, StoreError::MissingField(name) if name == field));
        }

        let mut bad = draft();
        bad.priority = "urgent".to_string();
        let err = add_task(&mut store, &bad, now(), today()).expect_err("rejected");
        assert!(matches!(err, StoreError::InvalidField { field: "priority", .. }));

        assert!(store.is_empty());
        assert_eq!(kv.write_count(), 0);
    }

    #[test]
    fn toggle_only_touches_completed() {
        let kv = MemoryKeyValueStore::new();
        let mut store = TaskStore::load(&kv);
        let id = add_task(&mut store, &draft(), now(), today()).expect("add");
        let before = store.get(id).expect("task");

        let after = toggle_complete(&mut store, id).expect("toggle");
        assert!(after.completed);
        assert_eq!(Task { completed: false, ..after.clone() }, before);

        let back = toggle_complete(&mut store, id).expect("toggle");
        assert!(!back.completed);
    }

    #[test]
    fn edit_merges_and_clears_description() {
        let kv = MemoryKeyValueStore::new();
        let mut store = TaskStore::load(&kv);
        let mut d = draft();
        d.description = "chapters 1-3".to_string();
        let id = add_task(&mut store, &d, now(), today()).expect("add");

        let edited = edit_task(
            &mut store,
            id,
            &EditDraft {
                priority: Some("low".to_string()),
                description: Some(String::new()),
                ..EditDraft::default()
            },
            today(),
        )
        .expect("edit");
        assert_eq!(edited.priority, Priority::Low);
        assert_eq!(edited.description, None);
        assert_eq!(edited.title, "Flashcards");

        let err = edit_task(
            &mut store,
            id,
            &EditDraft {
                title: Some(String::new()),
                ..EditDraft::default()
            },
            today(),
        )
        .expect_err("empty title");
        assert!(matches!(err, StoreError::MissingField("title")));

        let err = edit_task(&mut store, TaskId(404), &EditDraft::default(), today()).expect_err("missing");
        assert!(matches!(err, StoreError::NotFound(TaskId(404))));
    }

    #[test]
    fn clear_completed_removes_only_done_tasks() {
        let kv = MemoryKeyValueStore::new();
        let mut store = TaskStore::load(&kv);
        let keep = add_task(&mut store, &draft(), now(), today()).expect("add");
        let done = add_task(&mut store, &draft(), now(), today()).expect("add");
        toggle_complete(&mut store, done).expect("toggle");

        assert_eq!(clear_completed(&mut store).expect("clear"), 1);
        let ids: Vec<TaskId> = store.snapshot().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![keep]);

        delete_task(&mut store, keep).expect("delete");
        assert!(store.is_empty());
        assert!(matches!(delete_task(&mut store, keep), Err(StoreError::NotFound(_))));
    }
}
