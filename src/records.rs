use crate::store::Record;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Password assumed for teacher and student records written before passwords
/// were required. Compatibility shim for old data files.
pub const DEFAULT_PASSWORD: &str = "password123";

pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn stamp_if_missing(slot: &mut Option<String>, now: DateTime<Utc>) {
    if slot.as_deref().map(str::trim).unwrap_or("").is_empty() {
        *slot = Some(timestamp(now));
    }
}

/// Branches accepted for new or edited students. Stored records keep whatever
/// string they were written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Cs,
    It,
    Ece,
    Eee,
    Me,
    Ce,
}

impl FromStr for Branch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "CS" => Ok(Branch::Cs),
            "IT" => Ok(Branch::It),
            "ECE" => Ok(Branch::Ece),
            "EEE" => Ok(Branch::Eee),
            "ME" => Ok(Branch::Me),
            "CE" => Ok(Branch::Ce),
            other => Err(format!(
                "unknown branch {:?}, expected one of CS, IT, ECE, EEE, ME, CE",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub roll_number: String,
    pub class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Inline attendance from before the ledger existed. Kept verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance: Option<Value>,
    pub profile_picture: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StudentRecord {
    pub fn effective_password(&self) -> &str {
        self.password.as_deref().unwrap_or(DEFAULT_PASSWORD)
    }
}

impl Record for StudentRecord {
    const COLLECTION: &'static str = "students";
    const ID_PREFIX: &'static str = "student_";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn attachment(&self) -> Option<&str> {
        self.profile_picture.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TeacherRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub department: String,
    pub subjects: Vec<String>,
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    pub profile_picture: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TeacherRecord {
    /// `username` when set, otherwise the lowercased name.
    pub fn login_name(&self) -> String {
        match self.username.as_deref().map(str::trim) {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => self.name.trim().to_lowercase(),
        }
    }

    pub fn effective_password(&self) -> &str {
        self.password.as_deref().unwrap_or(DEFAULT_PASSWORD)
    }
}

impl Record for TeacherRecord {
    const COLLECTION: &'static str = "teachers";
    const ID_PREFIX: &'static str = "teacher_";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn attachment(&self) -> Option<&str> {
        self.profile_picture.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub password: String,
}

impl Record for AdminRecord {
    const COLLECTION: &'static str = "admin";
    const ID_PREFIX: &'static str = "admin_";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NoticeRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for NoticeRecord {
    const COLLECTION: &'static str = "notices";
    const ID_PREFIX: &'static str = "notice_";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn on_create(&mut self, now: DateTime<Utc>) {
        stamp_if_missing(&mut self.created_at, now);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GalleryItem {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub image_url: Option<String>,
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for GalleryItem {
    const COLLECTION: &'static str = "gallery";
    const ID_PREFIX: &'static str = "gallery_";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn on_create(&mut self, now: DateTime<Utc>) {
        stamp_if_missing(&mut self.created_at, now);
    }
    fn attachment(&self) -> Option<&str> {
        self.image_url.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub code: Option<String>,
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for CourseRecord {
    const COLLECTION: &'static str = "courses";
    const ID_PREFIX: &'static str = "course_";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn on_create(&mut self, now: DateTime<Utc>) {
        stamp_if_missing(&mut self.created_at, now);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudyMaterialRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub file_url: Option<String>,
    pub class: String,
    pub subject: String,
    /// Display name of the uploader, not a reference.
    pub uploaded_by: Option<String>,
    pub upload_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for StudyMaterialRecord {
    const COLLECTION: &'static str = "study-materials";
    const ID_PREFIX: &'static str = "material_";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn on_create(&mut self, now: DateTime<Utc>) {
        stamp_if_missing(&mut self.upload_date, now);
    }
    fn attachment(&self) -> Option<&str> {
        self.file_url.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuickLink {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub url: String,
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for QuickLink {
    const COLLECTION: &'static str = "quick-links";
    const ID_PREFIX: &'static str = "link_";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn on_create(&mut self, now: DateTime<Utc>) {
        stamp_if_missing(&mut self.created_at, now);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomButton {
    #[serde(rename = "_id")]
    pub id: String,
    pub label: String,
    pub url: String,
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for CustomButton {
    const COLLECTION: &'static str = "custom-buttons";
    const ID_PREFIX: &'static str = "button_";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn on_create(&mut self, now: DateTime<Utc>) {
        stamp_if_missing(&mut self.created_at, now);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatbotFaq {
    #[serde(rename = "_id")]
    pub id: String,
    pub question: String,
    pub answer: String,
    pub keywords: Vec<String>,
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for ChatbotFaq {
    const COLLECTION: &'static str = "chatbot-faqs";
    const ID_PREFIX: &'static str = "faq_";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn on_create(&mut self, now: DateTime<Utc>) {
        stamp_if_missing(&mut self.created_at, now);
    }
}

/// Landing-page overview. Only index 0 of the collection is ever read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverviewRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

impl Record for OverviewRecord {
    const COLLECTION: &'static str = "overview";
    const ID_PREFIX: &'static str = "overview_";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub file_name: Option<String>,
    pub file_url: Option<String>,
    pub uploaded_by: Option<String>,
    pub upload_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for DocumentRecord {
    const COLLECTION: &'static str = "documents";
    const ID_PREFIX: &'static str = "doc_";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn on_create(&mut self, now: DateTime<Utc>) {
        stamp_if_missing(&mut self.upload_date, now);
    }
    fn attachment(&self) -> Option<&str> {
        self.file_url.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceMark {
    /// Calendar day, `YYYY-MM-DD`.
    pub date: String,
    pub subject: String,
    pub status: AttendanceStatus,
}

/// One per student; `records` only grows outside of resets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttendanceEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub student_id: String,
    pub roll_number: String,
    pub name: String,
    pub class: String,
    pub records: Vec<AttendanceMark>,
}

impl Record for AttendanceEntry {
    const COLLECTION: &'static str = "attendance";
    const ID_PREFIX: &'static str = "attendance_";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}
