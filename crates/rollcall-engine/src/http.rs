//! HTTP/JSON backend implementing both the face and the records service.

use crate::records::{
    Ack, AttendanceRecord, ChatReply, MonthlyAnalytics, MonthlyCalendar, MonthlyReportRow, PersonUpdate,
};
use crate::remote::{
    check_detection, check_outcome, decode_body, FaceService, RecordsService, Registered, RemoteResult, ServiceError,
};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rollcall_core::{DetectionResult, PersonId, PersonSummary, RecognitionOutcome, RegistrationDraft, Snapshot};
use serde::de::DeserializeOwned;
use serde_json::json;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send `request` and normalize whatever comes back.
    ///
    /// `what` names the operation for the network-failure message
    /// (e.g. "detect face" → "Failed to detect face").
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &'static str,
    ) -> RemoteResult<T> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, operation = what, "request failed");
            ServiceError::network(format!("Failed to {what}"))
        })?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            tracing::warn!(error = %e, status, operation = what, "failed to read response body");
            ServiceError::network(format!("Failed to {what}"))
        })?;
        let result = decode_body(status, &body);
        if let Err(err) = &result {
            tracing::debug!(status, operation = what, kind = ?err.kind, error = %err, "service call failed");
        }
        result
    }

    pub async fn list_users(&self) -> RemoteResult<Vec<PersonSummary>> {
        self.send(self.client.get(self.url("/users")), "fetch users").await
    }

    /// Apply `update`; with `facial_data` set the service re-encodes the face.
    pub async fn update_user(&self, id: PersonId, update: &PersonUpdate) -> RemoteResult<Ack> {
        let request = self.client.put(self.url(&format!("/users/{id}"))).json(update);
        self.send(request, "update user").await
    }

    pub async fn delete_user(&self, id: PersonId) -> RemoteResult<Ack> {
        let request = self.client.delete(self.url(&format!("/users/{id}")));
        self.send(request, "delete user").await
    }

    pub async fn list_attendance(&self) -> RemoteResult<Vec<AttendanceRecord>> {
        self.send(self.client.get(self.url("/attendance")), "fetch attendance records")
            .await
    }

    /// Add an entry by hand; without a timestamp the service stamps it now.
    pub async fn add_attendance(
        &self,
        user_id: PersonId,
        timestamp: Option<NaiveDateTime>,
    ) -> RemoteResult<Ack> {
        let body = json!({
            "user_id": user_id,
            "timestamp": timestamp.map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
        });
        let request = self.client.post(self.url("/attendance")).json(&body);
        self.send(request, "add attendance").await
    }

    pub async fn update_attendance(
        &self,
        record_id: i64,
        user_id: Option<PersonId>,
        timestamp: Option<NaiveDateTime>,
    ) -> RemoteResult<Ack> {
        let body = json!({
            "user_id": user_id,
            "timestamp": timestamp.map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
        });
        let request = self
            .client
            .put(self.url(&format!("/attendance/{record_id}")))
            .json(&body);
        self.send(request, "update attendance").await
    }

    pub async fn delete_attendance(&self, record_id: i64) -> RemoteResult<Ack> {
        let request = self.client.delete(self.url(&format!("/attendance/{record_id}")));
        self.send(request, "delete attendance").await
    }

    pub async fn monthly_report(
        &self,
        month: u32,
        year: i32,
        user_id: Option<PersonId>,
    ) -> RemoteResult<Vec<MonthlyReportRow>> {
        let mut query = vec![("month", month.to_string()), ("year", year.to_string())];
        if let Some(id) = user_id {
            query.push(("user_id", id.to_string()));
        }
        let request = self
            .client
            .get(self.url("/attendance/report/monthly"))
            .query(&query);
        self.send(request, "fetch monthly report").await
    }

    pub async fn monthly_analytics(&self, month: u32, year: i32) -> RemoteResult<MonthlyAnalytics> {
        let request = self
            .client
            .get(self.url("/attendance/analytics/monthly"))
            .query(&[("month", month.to_string()), ("year", year.to_string())]);
        self.send(request, "fetch monthly analytics").await
    }

    /// Ask the attendance chatbot a free-form question.
    pub async fn ask(&self, query: &str) -> RemoteResult<ChatReply> {
        let request = self.client.post(self.url("/chatbot")).json(&json!({ "query": query }));
        self.send(request, "query chatbot").await
    }

    pub async fn monthly_calendar(
        &self,
        month: u32,
        year: i32,
        user_id: PersonId,
    ) -> RemoteResult<MonthlyCalendar> {
        let request = self
            .client
            .get(self.url("/attendance/calendar/monthly"))
            .query(&[
                ("month", month.to_string()),
                ("year", year.to_string()),
                ("user_id", user_id.to_string()),
            ]);
        self.send(request, "fetch monthly calendar").await
    }
}

#[async_trait]
impl FaceService for HttpBackend {
    async fn detect(&self, image: &Snapshot) -> RemoteResult<DetectionResult> {
        let body = json!({ "facial_data": image.to_data_url() });
        let request = self.client.post(self.url("/detect_face")).json(&body);
        let result = self.send(request, "detect face").await?;
        check_detection(result)
    }
}

#[async_trait]
impl RecordsService for HttpBackend {
    async fn recognize_and_mark(&self, image: &Snapshot) -> RemoteResult<RecognitionOutcome> {
        let body = json!({ "facial_data": image.to_data_url() });
        let request = self.client.post(self.url("/mark_attendance")).json(&body);
        let outcome = self.send(request, "mark attendance").await?;
        check_outcome(outcome)
    }

    async fn register(&self, draft: &RegistrationDraft, image: &Snapshot) -> RemoteResult<Registered> {
        let body = json!({
            "name": draft.name,
            "email": draft.email,
            "mobile_number": draft.mobile_number,
            "gender": draft.gender,
            "facial_data": image.to_data_url(),
        });
        let request = self.client.post(self.url("/register")).json(&body);
        self.send(request, "register user").await
    }
}
