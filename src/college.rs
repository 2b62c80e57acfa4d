use crate::attendance::Ledger;
use crate::auth::{AuthGate, AuthSettings};
use crate::identity::Resolver;
use crate::records::{
    AdminRecord, AttendanceEntry, ChatbotFaq, CourseRecord, CustomButton, DocumentRecord,
    GalleryItem, NoticeRecord, OverviewRecord, QuickLink, StudentRecord, StudyMaterialRecord,
    TeacherRecord,
};
use crate::store::{JsonStore, Record};
use anyhow::Context;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Every collection of one data directory.
pub struct College {
    pub root: PathBuf,
    pub uploads: PathBuf,
    pub auth: AuthSettings,
    pub students: JsonStore<StudentRecord>,
    pub teachers: JsonStore<TeacherRecord>,
    pub admins: JsonStore<AdminRecord>,
    pub notices: JsonStore<NoticeRecord>,
    pub gallery: JsonStore<GalleryItem>,
    pub courses: JsonStore<CourseRecord>,
    pub study_materials: JsonStore<StudyMaterialRecord>,
    pub attendance: JsonStore<AttendanceEntry>,
    pub quick_links: JsonStore<QuickLink>,
    pub custom_buttons: JsonStore<CustomButton>,
    pub chatbot_faqs: JsonStore<ChatbotFaq>,
    pub overview: JsonStore<OverviewRecord>,
    pub documents: JsonStore<DocumentRecord>,
}

impl College {
    pub fn open(root: &Path, uploads: Option<PathBuf>, auth: AuthSettings) -> anyhow::Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("failed to create data directory {}", root.to_string_lossy()))?;
        let uploads = uploads.unwrap_or_else(|| root.join("uploads"));
        info!(root = %root.display(), uploads = %uploads.display(), "data directory opened");
        Ok(Self {
            root: root.to_path_buf(),
            uploads,
            auth,
            students: JsonStore::open(root),
            teachers: JsonStore::open(root),
            admins: JsonStore::open(root),
            notices: JsonStore::open(root),
            gallery: JsonStore::open(root),
            courses: JsonStore::open(root),
            study_materials: JsonStore::open(root),
            attendance: JsonStore::open(root),
            quick_links: JsonStore::open(root),
            custom_buttons: JsonStore::open(root),
            chatbot_faqs: JsonStore::open(root),
            overview: JsonStore::open(root),
            documents: JsonStore::open(root),
        })
    }

    /// Adds an `admin` record when the admin collection is empty.
    pub fn seed_admin(&self, password: &str) -> anyhow::Result<bool> {
        if !self.admins.list().is_empty() {
            return Ok(false);
        }
        let created = self
            .admins
            .add(AdminRecord {
                username: "admin".to_string(),
                password: password.to_string(),
                ..Default::default()
            })
            .context("failed to seed admin record")?;
        info!(admin_id = %created.id, "seeded admin record");
        Ok(true)
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver {
            admins: &self.admins,
            teachers: &self.teachers,
            students: &self.students,
        }
    }

    pub fn gate(&self) -> AuthGate<'_> {
        AuthGate {
            resolver: self.resolver(),
            settings: &self.auth,
        }
    }

    pub fn ledger(&self) -> Ledger<'_> {
        Ledger {
            entries: &self.attendance,
            students: &self.students,
        }
    }

    /// Maps a stored file reference to a path under the uploads root.
    /// References that would leave the root map to `None`.
    pub fn attachment_path(&self, reference: &str) -> Option<PathBuf> {
        let trimmed = reference.trim().trim_start_matches('/');
        let relative = trimmed.strip_prefix("uploads/").unwrap_or(trimmed);
        if relative.is_empty() {
            return None;
        }
        let mut out = self.uploads.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(out)
    }

    /// Best-effort removal of a deleted record's file.
    pub fn remove_attachment(&self, reference: &str) -> bool {
        let Some(path) = self.attachment_path(reference) else {
            warn!(reference, "attachment reference outside uploads root, not removed");
            return false;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "attachment removed");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), "failed to remove attachment: {e}");
                false
            }
        }
    }
}

/// Record types with a home collection on [`College`].
pub trait InCollege: Record {
    fn store_in(college: &College) -> &JsonStore<Self>;
}

macro_rules! in_college {
    ($($ty:ty => $field:ident),* $(,)?) => {
        $(
            impl InCollege for $ty {
                fn store_in(college: &College) -> &JsonStore<Self> {
                    &college.$field
                }
            }
        )*
    };
}

in_college! {
    StudentRecord => students,
    TeacherRecord => teachers,
    AdminRecord => admins,
    NoticeRecord => notices,
    GalleryItem => gallery,
    CourseRecord => courses,
    StudyMaterialRecord => study_materials,
    AttendanceEntry => attendance,
    QuickLink => quick_links,
    CustomButton => custom_buttons,
    ChatbotFaq => chatbot_faqs,
    OverviewRecord => overview,
    DocumentRecord => documents,
}
