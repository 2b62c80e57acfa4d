use crate::records::{AttendanceEntry, AttendanceMark, AttendanceStatus, StudentRecord};
use crate::store::{next_id, JsonStore, Mutation, Record, StoreError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectTally {
    pub total_classes: usize,
    pub present_classes: usize,
    pub attendance_percentage: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub student_id: String,
    pub roll_number: String,
    pub name: String,
    pub class: String,
    pub total_classes: usize,
    pub present_classes: usize,
    pub attendance_percentage: u32,
    pub by_subject: BTreeMap<String, SubjectTally>,
    pub records: Vec<AttendanceMark>,
}

/// `round(100 * present / total)`, 0 for an empty ledger.
pub fn attendance_percentage(present: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (100.0 * present as f64 / total as f64).round() as u32
}

/// Reduces a date or date-time to `YYYY-MM-DD`; the time of day is dropped.
pub fn normalize_date(raw: &str) -> Result<String, LedgerError> {
    let t = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        return Ok(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Ok(dt.date_naive().format("%Y-%m-%d").to_string());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(t, fmt) {
            return Ok(dt.date().format("%Y-%m-%d").to_string());
        }
    }
    Err(LedgerError::InvalidDate(raw.to_string()))
}

pub fn today() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

/// Exact student id, then roll number (case-insensitive), then either id
/// containing the other. The last step tolerates ids written in older formats.
fn locate(entries: &[AttendanceEntry], student_id: &str, roll_number: Option<&str>) -> Option<usize> {
    let sid = student_id.trim();
    if let Some(i) = entries.iter().position(|e| e.student_id == sid) {
        return Some(i);
    }
    if let Some(roll) = roll_number.map(str::trim).filter(|r| !r.is_empty()) {
        if let Some(i) = entries
            .iter()
            .position(|e| e.roll_number.trim().eq_ignore_ascii_case(roll))
        {
            return Some(i);
        }
    }
    if sid.is_empty() {
        return None;
    }
    entries.iter().position(|e| {
        let other = e.student_id.trim();
        !other.is_empty() && (other.contains(sid) || sid.contains(other))
    })
}

fn summarize(student_id: &str, entry: Option<&AttendanceEntry>) -> AttendanceSummary {
    let Some(entry) = entry else {
        return AttendanceSummary {
            student_id: student_id.to_string(),
            ..Default::default()
        };
    };
    let total = entry.records.len();
    let present = entry
        .records
        .iter()
        .filter(|r| r.status == AttendanceStatus::Present)
        .count();

    let mut by_subject: BTreeMap<String, SubjectTally> = BTreeMap::new();
    for r in &entry.records {
        let tally = by_subject.entry(r.subject.clone()).or_default();
        tally.total_classes += 1;
        if r.status == AttendanceStatus::Present {
            tally.present_classes += 1;
        }
    }
    for tally in by_subject.values_mut() {
        tally.attendance_percentage =
            attendance_percentage(tally.present_classes, tally.total_classes);
    }

    AttendanceSummary {
        student_id: entry.student_id.clone(),
        roll_number: entry.roll_number.clone(),
        name: entry.name.clone(),
        class: entry.class.clone(),
        total_classes: total,
        present_classes: present,
        attendance_percentage: attendance_percentage(present, total),
        by_subject,
        records: entry.records.clone(),
    }
}

pub struct Ledger<'a> {
    pub entries: &'a JsonStore<AttendanceEntry>,
    pub students: &'a JsonStore<StudentRecord>,
}

impl<'a> Ledger<'a> {
    fn roll_number_of(&self, student_id: &str) -> Option<String> {
        self.students
            .get_by_id(student_id)
            .map(|s| s.roll_number)
            .filter(|r| !r.trim().is_empty())
    }

    /// Appends one mark. Returns `false` when the student has no ledger entry
    /// and no student record to seed one from.
    pub fn record_attendance(
        &self,
        student_id: &str,
        subject: &str,
        present: bool,
        date: &str,
    ) -> Result<bool, LedgerError> {
        let n = self.record_many(subject, date, &[(student_id.to_string(), present)])?;
        Ok(n == 1)
    }

    /// One subject and day for several students in a single write. Returns how
    /// many marks were appended.
    pub fn record_many(
        &self,
        subject: &str,
        date: &str,
        marks: &[(String, bool)],
    ) -> Result<usize, LedgerError> {
        let day = normalize_date(date)?;
        let students = self.students.list();

        let appended = self.entries.transact(|entries| {
            let mut appended = 0usize;
            for (student_id, present) in marks {
                let student = students.iter().find(|s| &s.id == student_id);
                let roll = student.map(|s| s.roll_number.as_str());
                let idx = match locate(entries, student_id, roll) {
                    Some(i) => i,
                    None => {
                        let Some(s) = student else {
                            continue;
                        };
                        entries.push(AttendanceEntry {
                            id: next_id(AttendanceEntry::ID_PREFIX),
                            student_id: s.id.clone(),
                            roll_number: s.roll_number.clone(),
                            name: s.name.clone(),
                            class: s.class.clone(),
                            records: Vec::new(),
                        });
                        info!(student_id = %s.id, "attendance ledger entry created");
                        entries.len() - 1
                    }
                };
                entries[idx].records.push(AttendanceMark {
                    date: day.clone(),
                    subject: subject.trim().to_string(),
                    status: if *present {
                        AttendanceStatus::Present
                    } else {
                        AttendanceStatus::Absent
                    },
                });
                appended += 1;
            }
            if appended == 0 {
                Ok(Mutation::Unchanged(0))
            } else {
                Ok(Mutation::Changed(appended))
            }
        })?;
        Ok(appended)
    }

    pub fn student_attendance(&self, student_id: &str) -> AttendanceSummary {
        let roll = self.roll_number_of(student_id);
        let entries = self.entries.list();
        let entry = locate(&entries, student_id, roll.as_deref()).map(|i| &entries[i]);
        summarize(student_id, entry)
    }

    pub fn summaries(&self) -> Vec<AttendanceSummary> {
        self.entries
            .list()
            .iter()
            .map(|e| summarize(&e.student_id, Some(e)))
            .collect()
    }

    /// Clears one entry's records; the entry and its linkage stay.
    pub fn reset_one(&self, student_id: &str) -> Result<bool, LedgerError> {
        let roll = self.roll_number_of(student_id);
        let cleared = self.entries.transact(|entries| {
            match locate(entries, student_id, roll.as_deref()) {
                Some(i) => {
                    entries[i].records.clear();
                    Ok(Mutation::Changed(true))
                }
                None => Ok(Mutation::Unchanged(false)),
            }
        })?;
        Ok(cleared)
    }

    pub fn reset_all(&self) -> Result<bool, LedgerError> {
        self.entries.transact(|entries| {
            for e in entries.iter_mut() {
                e.records.clear();
            }
            Ok(Mutation::Changed(true))
        })?;
        info!("attendance ledger reset");
        Ok(true)
    }
}
