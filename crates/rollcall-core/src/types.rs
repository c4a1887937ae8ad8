use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bounding box for a detected face, in source-frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Map this box from one pixel space into another of a different size.
    pub fn scaled(&self, sx: f32, sy: f32) -> BoundingBox {
        BoundingBox {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
        }
    }

    /// Finite coordinates and a positive extent.
    pub fn is_drawable(&self) -> bool {
        [self.x, self.y, self.width, self.height].iter().all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }
}

/// Faces found by the face service in one submitted frame, in service order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub faces: Vec<BoundingBox>,
}

impl DetectionResult {
    pub fn face_present(&self) -> bool {
        !self.faces.is_empty()
    }
}

/// Identity of an enrolled person as returned by the records service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonSummary {
    pub id: PersonId,
    pub name: String,
    pub email: String,
    pub mobile_number: String,
    pub gender: String,
}

pub type PersonId = i64;

/// Per-attempt attendance status reported by the backend.
///
/// Only the first mark of a calendar day yields `Marked`; later sightings of
/// the same identity that day come back as `AlreadyMarked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Marked,
    AlreadyMarked,
    NotRecognized,
}

impl AttendanceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            AttendanceStatus::Marked => "Marked Present",
            AttendanceStatus::AlreadyMarked => "Already Marked",
            AttendanceStatus::NotRecognized => "Not Recognized",
        }
    }
}

/// Result of one combined recognize-and-mark call.
///
/// The backend resolves at most one identity per image, even when several
/// faces are visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionOutcome {
    #[serde(rename = "user", default, skip_serializing_if = "Option::is_none")]
    pub person: Option<PersonSummary>,
    pub status: AttendanceStatus,
}

impl RecognitionOutcome {
    pub fn not_recognized() -> Self {
        Self {
            person: None,
            status: AttendanceStatus::NotRecognized,
        }
    }
}

/// One still sampled from the live video source, JPEG encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub jpeg: Vec<u8>,
    /// Native resolution of the capture device that produced this still.
    pub width: u32,
    pub height: u32,
    pub sequence: u64,
}

impl Snapshot {
    /// Encode as the `data:` URL form the backend accepts in `facial_data`.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.jpeg)
        )
    }

    pub fn native_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("missing required fields: {}", .missing.join(", "))]
pub struct ValidationError {
    pub missing: Vec<&'static str>,
}

/// Identity fields collected by the registration screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationDraft {
    pub name: String,
    pub email: String,
    pub mobile_number: String,
    pub gender: String,
    pub captured_image: Option<Snapshot>,
}

impl RegistrationDraft {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        mobile_number: impl Into<String>,
        gender: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            mobile_number: mobile_number.into(),
            gender: gender.into(),
            captured_image: None,
        }
    }

    /// All four identity fields must be non-blank before capture may start.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let missing: Vec<&'static str> = [
            ("name", &self.name),
            ("email", &self.email),
            ("mobile number", &self.mobile_number),
            ("gender", &self.gender),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { missing })
        }
    }

    pub fn clear(&mut self) {
        *self = RegistrationDraft::default();
    }
}
