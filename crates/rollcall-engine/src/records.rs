//! Wire types for the records service's plumbing endpoints.

use chrono::{NaiveDate, NaiveDateTime};
use rollcall_core::{PersonId, PersonSummary, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Generic `{"message": ...}` acknowledgement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Ack {
    pub message: String,
    #[serde(default)]
    pub record_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub user_id: PersonId,
    pub timestamp: NaiveDateTime,
}

/// Partial update of a person; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersonUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    /// Replacement reference image as a JPEG data URL; the service
    /// re-encodes the face from it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facial_data: Option<String>,
}

impl PersonUpdate {
    /// Re-enroll the face from `image`.
    pub fn with_face(mut self, image: &Snapshot) -> Self {
        self.facial_data = Some(image.to_data_url());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.mobile_number.is_none()
            && self.gender.is_none()
            && self.facial_data.is_none()
    }
}

/// Whether a person has an attendance record on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
}

impl Presence {
    pub fn label(&self) -> &'static str {
        match self {
            Presence::Present => "Present",
            Presence::Absent => "Absent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyPresence {
    pub person: PersonSummary,
    pub presence: Presence,
}

/// Mark every person present or absent on `day` from the attendance records.
///
/// Keeps the order of `people`.
pub fn presence_on(
    people: Vec<PersonSummary>,
    records: &[AttendanceRecord],
    day: NaiveDate,
) -> Vec<DailyPresence> {
    let seen: HashSet<PersonId> = records
        .iter()
        .filter(|r| r.timestamp.date() == day)
        .map(|r| r.user_id)
        .collect();
    people
        .into_iter()
        .map(|person| {
            let presence = if seen.contains(&person.id) {
                Presence::Present
            } else {
                Presence::Absent
            };
            DailyPresence { person, presence }
        })
        .collect()
}

/// Answer from the attendance chatbot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatReply {
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MonthlyReportRow {
    pub user_id: PersonId,
    pub user_name: String,
    pub email: String,
    pub mobile_number: String,
    pub gender: String,
    pub total_working_days: u32,
    pub total_days_present: u32,
    pub monthly_attendance_percentage: f64,
    pub daily_log: Vec<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MonthAverage {
    pub month: u32,
    pub year: i32,
    pub average_attendance: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Defaulter {
    pub name: String,
    pub attendance_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MonthlyAnalytics {
    pub average_attendance_last_6_months: Vec<MonthAverage>,
    pub full_attendance_users: Vec<String>,
    pub defaulters_list: Vec<Defaulter>,
}

/// Day of month → status label ("Present").
pub type MonthlyCalendar = BTreeMap<u32, String>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::decode_body;

    #[test]
    fn test_attendance_record_timestamps() {
        let body = br#"[{"id":1,"user_id":3,"timestamp":"2024-05-02T09:15:00"},
                        {"id":2,"user_id":3,"timestamp":"2024-05-03T09:15:00.250000"}]"#;
        let rows: Vec<AttendanceRecord> = decode_body(200, body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].timestamp.format("%d").to_string(), "03");
    }

    #[test]
    fn test_report_row() {
        let body = br#"[{"user_id":3,"user_name":"Asha","email":"a@x","mobile_number":"1","gender":"Female",
            "total_working_days":31,"total_days_present":2,"monthly_attendance_percentage":6.45,
            "daily_log":["2024-05-02T09:15:00"]}]"#;
        let rows: Vec<MonthlyReportRow> = decode_body(200, body).unwrap();
        assert_eq!(rows[0].total_working_days, 31);
        assert_eq!(rows[0].daily_log.len(), 1);
    }

    #[test]
    fn test_calendar_integer_keys() {
        let cal: MonthlyCalendar = decode_body(200, br#"{"2":"Present","17":"Present"}"#).unwrap();
        assert_eq!(cal.keys().copied().collect::<Vec<_>>(), vec![2, 17]);
    }

    #[test]
    fn test_analytics() {
        let body = br#"{"average_attendance_last_6_months":[{"month":5,"year":2024,"average_attendance":50.0}],
            "full_attendance_users":[],"defaulters_list":[{"name":"Ravi","attendance_percentage":9.09}]}"#;
        let a: MonthlyAnalytics = decode_body(200, body).unwrap();
        assert_eq!(a.defaulters_list[0].name, "Ravi");
    }

    #[test]
    fn test_person_update_skips_unset_fields() {
        let update = PersonUpdate { email: Some("new@example.com".into()), ..Default::default() };
        assert_eq!(serde_json::to_string(&update).unwrap(), r#"{"email":"new@example.com"}"#);
        assert!(PersonUpdate::default().is_empty());
    }

    #[test]
    fn test_face_only_update() {
        let snap = Snapshot { jpeg: vec![0xff, 0xd8], width: 2, height: 2, sequence: 1 };
        let update = PersonUpdate::default().with_face(&snap);
        assert!(!update.is_empty());
        let body = serde_json::to_value(&update).unwrap();
        assert_eq!(body.as_object().unwrap().len(), 1);
        assert!(body["facial_data"].as_str().unwrap().starts_with("data:image/jpeg;base64,"));
    }

    fn summary(id: PersonId, name: &str) -> PersonSummary {
        PersonSummary {
            id,
            name: name.into(),
            email: format!("{id}@example.com"),
            mobile_number: "5550100".into(),
            gender: "Female".into(),
        }
    }

    fn record(id: i64, user_id: PersonId, timestamp: &str) -> AttendanceRecord {
        AttendanceRecord {
            id,
            user_id,
            timestamp: NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S").unwrap(),
        }
    }

    #[test]
    fn test_presence_counts_only_that_day() {
        let people = vec![summary(3, "Asha"), summary(1, "Ravi"), summary(9, "Meera")];
        let records = vec![
            record(1, 3, "2024-05-02T09:15:00"),
            record(2, 3, "2024-05-02T17:40:00"),
            record(3, 1, "2024-05-01T23:59:59"),
            record(4, 42, "2024-05-02T10:00:00"),
        ];
        let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let board = presence_on(people, &records, day);

        let rows: Vec<_> = board.iter().map(|d| (d.person.id, d.presence.label())).collect();
        assert_eq!(rows, vec![(3, "Present"), (1, "Absent"), (9, "Absent")]);
    }

    #[test]
    fn test_chat_reply() {
        let reply: ChatReply =
            decode_body(200, br#"{"response":"Asha was present on 2 May."}"#).unwrap();
        assert_eq!(reply.response, "Asha was present on 2 May.");
        let err = decode_body::<ChatReply>(400, br#"{"error":"Query is required"}"#).unwrap_err();
        assert_eq!(err.error, "Query is required");
    }
}
