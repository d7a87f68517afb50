use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterStudent {
    pub id: String,
    pub roll_number: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
        }
    }

    /// Display form used by the csv boundary.
    pub fn display(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
        }
    }

    /// Unknown stored values fall back to present, the seed default.
    pub fn parse(s: &str) -> AttendanceStatus {
        match s {
            "absent" => AttendanceStatus::Absent,
            _ => AttendanceStatus::Present,
        }
    }

    pub fn parse_strict(s: &str) -> Option<AttendanceStatus> {
        match s {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            _ => None,
        }
    }

    pub fn toggled(&self) -> AttendanceStatus {
        match self {
            AttendanceStatus::Present => AttendanceStatus::Absent,
            AttendanceStatus::Absent => AttendanceStatus::Present,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub student_id: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceStats {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
}

/// One day's attendance for one section: a mapping from student id to a
/// status entry, kept in roster order. Seeded to present for every roster
/// student; persisted rows win over the default on load.
#[derive(Debug, Clone, Default)]
pub struct AttendanceBook {
    order: Vec<String>,
    entries: HashMap<String, AttendanceEntry>,
}

impl AttendanceBook {
    pub fn seed(roster: &[RosterStudent]) -> AttendanceBook {
        let mut book = AttendanceBook::default();
        for student in roster {
            book.order.push(student.id.clone());
            book.entries.insert(
                student.id.clone(),
                AttendanceEntry {
                    id: None,
                    student_id: student.id.clone(),
                    status: AttendanceStatus::Present,
                },
            );
        }
        book
    }

    /// Last-write-wins merge of a persisted row. Rows for students no longer
    /// on the roster are ignored so that a save always covers exactly the
    /// current roster.
    pub fn merge_persisted(&mut self, id: &str, student_id: &str, status: AttendanceStatus) {
        if let Some(entry) = self.entries.get_mut(student_id) {
            entry.id = Some(id.to_string());
            entry.status = status;
        }
    }

    /// Flips exactly one student's status; every other entry is untouched.
    pub fn toggle(&mut self, student_id: &str) -> Option<AttendanceStatus> {
        let entry = self.entries.get_mut(student_id)?;
        entry.status = entry.status.toggled();
        Some(entry.status)
    }

    pub fn status_of(&self, student_id: &str) -> Option<AttendanceStatus> {
        self.entries.get(student_id).map(|e| e.status)
    }

    pub fn statuses(&self) -> HashMap<String, AttendanceStatus> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.status))
            .collect()
    }

    pub fn entries(&self) -> Vec<&AttendanceEntry> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .collect()
    }

    pub fn stats(&self) -> AttendanceStats {
        let total = self.order.len();
        let present = self
            .entries()
            .iter()
            .filter(|e| e.status == AttendanceStatus::Present)
            .count();
        AttendanceStats {
            total,
            present,
            absent: total - present,
        }
    }
}

/// Day-sheet csv: one row per roster student, in roster order.
pub fn export_csv(roster: &[RosterStudent], book: &AttendanceBook) -> String {
    let mut out = String::from("S.No,Roll Number,Student Name,Attendance Status\n");
    for (i, student) in roster.iter().enumerate() {
        let status = book
            .status_of(&student.id)
            .unwrap_or(AttendanceStatus::Present);
        out.push_str(&format!(
            "{},{},{},{}\n",
            i + 1,
            student.roll_number,
            student.name,
            status.display()
        ));
    }
    out
}
