//! Page-level calls against the grading API.
//!
//! The server owns all business logic (OCR, answer extraction, grading,
//! report generation, Excel export). Bodies are treated as opaque JSON
//! except where a client-side shape is genuinely needed.
//!
//! Slow calls that the UI should not block on are registered with the
//! [`BackgroundTaskTracker`] for exactly as long as they run.

use crate::error::{ClientError, Result};
use crate::session::User;
use crate::tasks::BackgroundTaskTracker;
use crate::transport::{ApiRequest, FilePart, HttpTransport, RequestBody};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Draft,
    Published,
    Closed,
}

impl AssignmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Closed => "closed",
        }
    }
}

/// Assignment summary as listed on the dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub title: String,
    pub teacher_id: i64,
    pub class_id: String,
    pub status: AssignmentStatus,
    #[serde(default)]
    pub answer_file_path: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    pub created_at: String,
}

/// Body for `POST /assignments/`. New assignments start as drafts.
#[derive(Debug, Clone, Serialize)]
pub struct NewAssignment {
    pub title: String,
    pub class_id: String,
    /// ISO-8601; `None` means no deadline.
    pub deadline: Option<String>,
}

/// Partial edit of an assignment. Unset fields are left out of the body.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssignmentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// `Some(None)` clears the deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_content: Option<String>,
}

impl AssignmentUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.deadline.is_none() && self.answer_content.is_none()
    }
}

/// Answer key text pulled out of an uploaded PDF, for the teacher to review.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedAnswer {
    pub answer_content: String,
}

#[derive(Serialize)]
struct AnswerBody<'a> {
    answer_content: &'a str,
}

pub struct GradingApi {
    transport: Arc<HttpTransport>,
    tasks: Arc<BackgroundTaskTracker>,
}

impl GradingApi {
    pub fn new(transport: Arc<HttpTransport>, tasks: Arc<BackgroundTaskTracker>) -> Self {
        Self { transport, tasks }
    }

    /// The account behind the current credential.
    pub async fn me(&self) -> Result<User> {
        self.transport.get_json("/auth/me").await
    }

    // ── Assignments ──────────────────────────────────────────

    pub async fn list_assignments(&self) -> Result<Vec<Assignment>> {
        self.transport.get_json("/assignments/").await
    }

    pub async fn create_assignment(&self, assignment: &NewAssignment) -> Result<Assignment> {
        if assignment.title.trim().is_empty() {
            return Err(ClientError::Validation("an assignment title is required".into()));
        }
        self.transport.post_json("/assignments/", assignment).await
    }

    /// Full assignment, including the saved answer key.
    pub async fn assignment(&self, id: i64) -> Result<serde_json::Value> {
        self.transport.get_json(&format!("/assignments/{id}")).await
    }

    /// Send only the fields that changed. An empty update never reaches the
    /// server.
    pub async fn update_assignment(
        &self,
        id: i64,
        update: &AssignmentUpdate,
    ) -> Result<serde_json::Value> {
        if update.is_empty() {
            return Err(ClientError::Validation("no changes to save".into()));
        }
        self.transport
            .put_json(&format!("/assignments/{id}"), update)
            .await
    }

    pub async fn delete_assignment(&self, id: i64) -> Result<()> {
        self.transport.delete(&format!("/assignments/{id}")).await
    }

    /// Upload the answer-key PDF with the teacher's note on which questions
    /// to keep. The server runs extraction and returns the text for review.
    pub async fn extract_answer(
        &self,
        id: i64,
        file_name: &str,
        pdf: Vec<u8>,
        teacher_msg: &str,
    ) -> Result<ExtractedAnswer> {
        if pdf.is_empty() {
            return Err(ClientError::Validation("an answer-key PDF is required".into()));
        }
        if teacher_msg.trim().is_empty() {
            return Err(ClientError::Validation(
                "describe which questions to extract".into(),
            ));
        }
        let body = RequestBody::Multipart {
            fields: vec![("teacher_msg".into(), teacher_msg.to_string())],
            files: vec![pdf_part("pdf_file", file_name, pdf)],
        };
        let request = ApiRequest::post(format!("/assignments/{id}/extract-answer")).body(body);
        self.transport.send(request).await?.json()
    }

    /// Save the reviewed answer key.
    pub async fn save_answer(&self, id: i64, answer_content: &str) -> Result<serde_json::Value> {
        if answer_content.trim().is_empty() {
            return Err(ClientError::Validation("answer content cannot be empty".into()));
        }
        self.transport
            .put_json(&format!("/assignments/{id}/answer"), &AnswerBody { answer_content })
            .await
    }

    pub async fn publish_assignment(&self, id: i64) -> Result<serde_json::Value> {
        self.transport
            .send(ApiRequest::post(format!("/assignments/{id}/publish")))
            .await?
            .json()
    }

    // ── Teacher views ────────────────────────────────────────

    /// Submission rate, grade distribution and per-question stats.
    pub async fn assignment_stats(&self, id: i64) -> Result<serde_json::Value> {
        self.transport
            .get_json(&format!("/teachers/assignments/{id}/stats"))
            .await
    }

    pub async fn submissions(&self, id: i64) -> Result<Vec<serde_json::Value>> {
        self.transport
            .get_json(&format!("/teachers/assignments/{id}/submissions"))
            .await
    }

    /// Release graded reports to students.
    pub async fn publish_reports(&self, id: i64) -> Result<serde_json::Value> {
        self.transport
            .send(ApiRequest::post(format!("/teachers/assignments/{id}/publish-reports")))
            .await?
            .json()
    }

    /// Class summary table as JSON, for in-page preview.
    pub async fn excel_preview(&self, id: i64) -> Result<serde_json::Value> {
        self.transport
            .get_json(&format!("/teachers/assignments/{id}/excel"))
            .await
    }

    /// Class summary workbook (xlsx bytes).
    pub async fn download_excel(&self, id: i64) -> Result<Vec<u8>> {
        let task = self.tasks.next_task_id("download-excel", id);
        let path = format!("/teachers/assignments/{id}/download-excel");
        self.tasks.track(task, self.transport.get_bytes(&path)).await
    }

    pub async fn generate_class_report(&self, id: i64) -> Result<serde_json::Value> {
        let task = self.tasks.next_task_id("generate-report", id);
        let request = ApiRequest::post(format!("/teachers/assignments/{id}/generate-class-report"));
        self.tasks
            .track(task, async { self.transport.send(request).await?.json() })
            .await
    }

    /// Previously generated class reports, newest first.
    pub async fn class_reports(&self, id: i64) -> Result<serde_json::Value> {
        self.transport
            .get_json(&format!("/teachers/assignments/{id}/class-reports"))
            .await
    }

    /// One class report. `None` picks the latest.
    pub async fn class_report(&self, id: i64, timestamp: Option<&str>) -> Result<serde_json::Value> {
        let mut request = ApiRequest::get(format!("/teachers/assignments/{id}/class-report"));
        if let Some(ts) = timestamp {
            request = request.query("timestamp", ts);
        }
        self.transport.send(request).await?.json()
    }

    /// A student's submitted homework PDF.
    pub async fn homework_pdf(&self, assignment_id: i64, submission_id: i64) -> Result<Vec<u8>> {
        let task = self.tasks.next_task_id("load-homework", submission_id);
        let path =
            format!("/teachers/assignments/{assignment_id}/submissions/{submission_id}/homework");
        self.tasks.track(task, self.transport.get_bytes(&path)).await
    }

    /// Graded report for one submission, as the teacher sees it.
    pub async fn submission_report(
        &self,
        assignment_id: i64,
        submission_id: i64,
    ) -> Result<serde_json::Value> {
        self.transport
            .get_json(&format!(
                "/teachers/assignments/{assignment_id}/submissions/{submission_id}/report"
            ))
            .await
    }

    // ── Student views ────────────────────────────────────────

    /// Upload a homework PDF. Goes out as multipart with no explicit
    /// content type, so the boundary is set by the transport.
    pub async fn submit_homework(
        &self,
        assignment_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<serde_json::Value> {
        let body = RequestBody::Multipart {
            fields: Vec::new(),
            files: vec![pdf_part("homework_file", file_name, bytes)],
        };
        let request =
            ApiRequest::post(format!("/students/assignments/{assignment_id}/submit")).body(body);
        self.transport.send(request).await?.json()
    }

    /// The caller's own submission. `None` when nothing has been handed in.
    pub async fn my_submission(&self, assignment_id: i64) -> Result<Option<serde_json::Value>> {
        let path = format!("/students/assignments/{assignment_id}/submission");
        match self.transport.get_json(&path).await {
            Ok(submission) => Ok(Some(submission)),
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn student_report(&self, assignment_id: i64) -> Result<serde_json::Value> {
        self.transport
            .get_json(&format!("/students/assignments/{assignment_id}/report"))
            .await
    }
}

fn pdf_part(field: &str, file_name: &str, bytes: Vec<u8>) -> FilePart {
    FilePart {
        field: field.into(),
        file_name: file_name.to_string(),
        mime: Some("application/pdf".into()),
        bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_parses_server_listing() {
        let list: Vec<Assignment> = serde_json::from_value(serde_json::json!([{
            "id": 4,
            "title": "Unit 3 quiz",
            "teacher_id": 1,
            "class_id": "101",
            "status": "published",
            "answer_file_path": null,
            "deadline": null,
            "created_at": "2024-03-01T08:00:00"
        }]))
        .unwrap();
        assert_eq!(list[0].status, AssignmentStatus::Published);
        assert!(list[0].deadline.is_none());
    }

    #[test]
    fn update_sends_only_set_fields() {
        let update = AssignmentUpdate {
            title: Some("Unit 3 quiz (revised)".into()),
            deadline: Some(None),
            ..Default::default()
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["title"], "Unit 3 quiz (revised)");
        assert!(value.get("deadline").is_some_and(|d| d.is_null()));
        assert!(value.get("answer_content").is_none());
        assert!(AssignmentUpdate::default().is_empty());
    }
}
