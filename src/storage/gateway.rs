//! Storage seam used by the supervisor and the pipeline.
//!
//! [`StoreGateway`] is what the rest of the crate talks to; [`Database`]
//! implements it over PostgreSQL and tests substitute in-memory fakes.

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::database::{Database, DatabaseError};
use crate::events::{Event, EventSink, SinkError};
use crate::pipeline::FormType;
use crate::scheduler::{DraftStatus, Task};

/// A person or agent attached to a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub is_agent: bool,
}

/// Field definitions and layout of a task's target form.
#[derive(Debug, Clone, PartialEq)]
pub struct FormMetadata {
    pub form_id: String,
    /// Never empty: a form without definitions gets one default field.
    pub form_types: Vec<FormType>,
    pub form_html: String,
}

impl FormMetadata {
    pub fn new(form_id: impl Into<String>, form_types: Vec<FormType>, form_html: impl Into<String>) -> Self {
        let form_id = form_id.into();
        let form_types = if form_types.is_empty() {
            vec![FormType::default_for(&form_id)]
        } else {
            form_types
        };
        Self {
            form_id,
            form_types,
            form_html: form_html.into(),
        }
    }
}

/// Splits a comma-separated participant list into trimmed, non-empty ids.
pub fn split_participant_ids(user_ids: &str) -> Vec<&str> {
    user_ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .collect()
}

/// Everything the poller, supervisor and pipeline need from storage.
#[async_trait]
pub trait StoreGateway: Send + Sync {
    /// Atomically leases one waiting task for `consumer`.
    async fn lease_one_task(&self, consumer: &str, limit: i64) -> Result<Option<Task>, DatabaseError>;

    /// Current status, or `None` if the task no longer exists.
    async fn get_status(&self, task_id: Uuid) -> Result<Option<DraftStatus>, DatabaseError>;

    async fn mark_completed(&self, task_id: Uuid) -> Result<(), DatabaseError>;

    async fn mark_failed(&self, task_id: Uuid) -> Result<(), DatabaseError>;

    /// Clears the consumer while leaving the status untouched.
    async fn release_lease(&self, task_id: Uuid) -> Result<(), DatabaseError>;

    async fn fetch_completed_outputs(&self, proc_inst_id: &str) -> Result<Vec<Value>, DatabaseError>;

    /// Resolves a comma-separated list; unknown ids are skipped.
    async fn fetch_participants(&self, user_ids: &str) -> Result<Vec<Participant>, DatabaseError>;

    async fn fetch_form_metadata(&self, tool: &str, tenant_id: &str) -> Result<FormMetadata, DatabaseError>;

    /// Writes `payload` to the draft, and to the output too when `final_result`.
    async fn save_result(&self, task_id: Uuid, payload: &Value, final_result: bool) -> Result<(), DatabaseError>;
}

/// Keeps the first leased row and hands the others back to their previous
/// status through `restore`. If any row cannot be handed back, the first is
/// handed back too and the error returned, so no lease is left stranded.
pub(crate) async fn keep_first_lease<F, Fut>(
    mut tasks: Vec<Task>,
    mut restore: F,
) -> Result<Option<Task>, DatabaseError>
where
    F: FnMut(Uuid, DraftStatus) -> Fut,
    Fut: Future<Output = Result<(), DatabaseError>>,
{
    if tasks.is_empty() {
        return Ok(None);
    }

    let extras = tasks.split_off(1);
    let mut failure = None;
    for extra in extras {
        if let Err(err) = restore(extra.id, extra.task_type).await {
            tracing::warn!(task_id = %extra.id, error = %err, "Could not hand back extra lease");
            failure.get_or_insert(err);
        }
    }

    let first = tasks.remove(0);
    match failure {
        None => Ok(Some(first)),
        Some(err) => {
            if let Err(release_err) = restore(first.id, first.task_type).await {
                tracing::error!(task_id = %first.id, error = %release_err, "Could not hand back lease");
            }
            Err(err)
        }
    }
}

#[async_trait]
impl StoreGateway for Database {
    async fn lease_one_task(&self, consumer: &str, limit: i64) -> Result<Option<Task>, DatabaseError> {
        let tasks = self.lease_tasks(consumer, limit).await?;
        keep_first_lease(tasks, |id, status| self.finish_task(id, status)).await
    }

    async fn get_status(&self, task_id: Uuid) -> Result<Option<DraftStatus>, DatabaseError> {
        self.fetch_status(task_id).await
    }

    async fn mark_completed(&self, task_id: Uuid) -> Result<(), DatabaseError> {
        self.finish_task(task_id, DraftStatus::Completed).await
    }

    async fn mark_failed(&self, task_id: Uuid) -> Result<(), DatabaseError> {
        self.finish_task(task_id, DraftStatus::Failed).await
    }

    async fn release_lease(&self, task_id: Uuid) -> Result<(), DatabaseError> {
        self.clear_consumer(task_id).await
    }

    async fn fetch_completed_outputs(&self, proc_inst_id: &str) -> Result<Vec<Value>, DatabaseError> {
        self.fetch_done_outputs(proc_inst_id).await
    }

    async fn fetch_participants(&self, user_ids: &str) -> Result<Vec<Participant>, DatabaseError> {
        let mut participants = Vec::new();
        for id in split_participant_ids(user_ids) {
            match self.fetch_participant(id).await? {
                Some(participant) => participants.push(participant),
                None => tracing::debug!(participant = id, "Participant not found"),
            }
        }
        Ok(participants)
    }

    async fn fetch_form_metadata(&self, tool: &str, tenant_id: &str) -> Result<FormMetadata, DatabaseError> {
        self.fetch_form_definition(tool, tenant_id).await
    }

    async fn save_result(&self, task_id: Uuid, payload: &Value, final_result: bool) -> Result<(), DatabaseError> {
        self.store_result(task_id, payload, final_result).await
    }
}

#[async_trait]
impl EventSink for Database {
    async fn record(&self, event: &Event) -> Result<(), SinkError> {
        self.insert_event(event)
            .await
            .map_err(|e| SinkError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn leased(status: DraftStatus) -> Task {
        let mut task = Task::new(Uuid::new_v4(), "topic");
        task.task_type = status;
        task.draft_status = DraftStatus::InProgress;
        task
    }

    #[tokio::test]
    async fn test_keep_first_lease_hands_back_extras() {
        let tasks = vec![leased(DraftStatus::Pending), leased(DraftStatus::FbRequested)];
        let (first_id, extra_id) = (tasks[0].id, tasks[1].id);
        let restored = Mutex::new(Vec::new());

        let kept = keep_first_lease(tasks, |id, status| {
            restored.lock().unwrap().push((id, status));
            async { Ok(()) }
        })
        .await
        .unwrap();

        assert_eq!(kept.map(|t| t.id), Some(first_id));
        assert_eq!(*restored.lock().unwrap(), vec![(extra_id, DraftStatus::FbRequested)]);
    }

    #[tokio::test]
    async fn test_keep_first_lease_releases_first_when_restore_fails() {
        let tasks = vec![leased(DraftStatus::Pending), leased(DraftStatus::Pending)];
        let (first_id, extra_id) = (tasks[0].id, tasks[1].id);
        let restored = Mutex::new(Vec::new());

        let result = keep_first_lease(tasks, |id, status| {
            restored.lock().unwrap().push((id, status));
            let outcome = if id == extra_id {
                Err(DatabaseError::ConnectionFailed("gone".to_string()))
            } else {
                Ok(())
            };
            async move { outcome }
        })
        .await;

        assert!(matches!(result, Err(DatabaseError::ConnectionFailed(_))));
        assert_eq!(
            *restored.lock().unwrap(),
            vec![(extra_id, DraftStatus::Pending), (first_id, DraftStatus::Pending)]
        );
    }

    #[tokio::test]
    async fn test_keep_first_lease_empty() {
        let kept = keep_first_lease(Vec::new(), |_, _| async { Ok(()) }).await.unwrap();
        assert!(kept.is_none());
    }

    #[test]
    fn test_split_participant_ids() {
        assert_eq!(
            split_participant_ids(" a@x.com, agent-7 ,,b@y.org "),
            vec!["a@x.com", "agent-7", "b@y.org"]
        );
        assert!(split_participant_ids("  ").is_empty());
    }

    #[test]
    fn test_form_metadata_substitutes_default_type() {
        let meta = FormMetadata::new("form-1", Vec::new(), "");
        assert_eq!(meta.form_types, vec![FormType::default_for("form-1")]);

        let types = vec![FormType::default_for("other")];
        let meta = FormMetadata::new("form-1", types.clone(), "<form/>");
        assert_eq!(meta.form_types, types);
        assert_eq!(meta.form_html, "<form/>");
    }

    #[test]
    fn test_participant_serialization_skips_missing_fields() {
        let participant = Participant {
            email: Some("a@x.com".to_string()),
            name: Some("Ann".to_string()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&participant).unwrap(),
            json!({"email": "a@x.com", "name": "Ann", "is_agent": false})
        );
    }
}
