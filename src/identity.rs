use crate::records::{AdminRecord, StudentRecord, TeacherRecord};
use crate::store::{JsonStore, Record, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use tracing::info;

/// Department given to teacher profiles created on a lookup miss.
pub const PROVISIONED_DEPARTMENT: &str = "General";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    /// Entity kind tag carried by an `_id` prefix.
    pub fn from_id(id: &str) -> Option<Role> {
        [Role::Admin, Role::Teacher, Role::Student]
            .into_iter()
            .find(|role| id.starts_with(role.id_prefix()) && id.len() > role.id_prefix().len())
    }

    pub fn id_prefix(self) -> &'static str {
        match self {
            Role::Student => StudentRecord::ID_PREFIX,
            Role::Teacher => TeacherRecord::ID_PREFIX,
            Role::Admin => AdminRecord::ID_PREFIX,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// A logged-in user, whichever collection it lives in.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    Admin(AdminRecord),
    Teacher(TeacherRecord),
    Student(StudentRecord),
}

impl Identity {
    pub fn role(&self) -> Role {
        match self {
            Identity::Admin(_) => Role::Admin,
            Identity::Teacher(_) => Role::Teacher,
            Identity::Student(_) => Role::Student,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Identity::Admin(a) => &a.id,
            Identity::Teacher(t) => &t.id,
            Identity::Student(s) => &s.id,
        }
    }

    /// Name the user logs in with.
    pub fn username(&self) -> String {
        match self {
            Identity::Admin(a) => a.username.clone(),
            Identity::Teacher(t) => t.login_name(),
            Identity::Student(s) => s.roll_number.clone(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Identity::Admin(a) => a.username.clone(),
            Identity::Teacher(t) => t.name.clone(),
            Identity::Student(s) => s.name.clone(),
        }
    }

    pub fn password(&self) -> &str {
        match self {
            Identity::Admin(a) => &a.password,
            Identity::Teacher(t) => t.effective_password(),
            Identity::Student(s) => s.effective_password(),
        }
    }

    /// Public projection, never includes the password.
    pub fn to_json(&self) -> serde_json::Value {
        let mut out = json!({
            "id": self.id(),
            "role": self.role(),
            "username": self.username(),
            "name": self.name(),
        });
        match self {
            Identity::Admin(_) => {}
            Identity::Teacher(t) => {
                out["department"] = json!(t.department);
                out["subjects"] = json!(t.subjects);
                out["designation"] = json!(t.designation);
            }
            Identity::Student(s) => {
                out["rollNumber"] = json!(s.roll_number);
                out["class"] = json!(s.class);
                out["branch"] = json!(s.branch);
            }
        }
        out
    }
}

/// What a teacher token knows about its owner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeacherLogin {
    pub name: String,
    pub department: Option<String>,
    pub username: Option<String>,
}

impl TeacherLogin {
    pub fn from_identity(identity: &Identity) -> Self {
        match identity {
            Identity::Teacher(t) => TeacherLogin {
                name: t.name.clone(),
                department: Some(t.department.clone()).filter(|d| !d.trim().is_empty()),
                username: Some(t.login_name()),
            },
            other => TeacherLogin {
                name: other.name(),
                department: None,
                username: Some(other.username()),
            },
        }
    }
}

fn same_text(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Either string contains the other, ignoring case. Empty strings never match.
fn loosely_contains(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

pub struct Resolver<'a> {
    pub admins: &'a JsonStore<AdminRecord>,
    pub teachers: &'a JsonStore<TeacherRecord>,
    pub students: &'a JsonStore<StudentRecord>,
}

impl<'a> Resolver<'a> {
    pub fn resolve_by_id(&self, id: &str) -> Option<Identity> {
        match Role::from_id(id)? {
            Role::Admin => self.admins.get_by_id(id).map(Identity::Admin),
            Role::Teacher => self.teachers.get_by_id(id).map(Identity::Teacher),
            Role::Student => self.students.get_by_id(id).map(Identity::Student),
        }
    }

    /// Case-insensitive; admin username, teacher username, teacher name, then
    /// student roll number. First hit wins.
    pub fn resolve_by_login_name(&self, name: &str) -> Option<Identity> {
        let wanted = name.trim();
        if wanted.is_empty() {
            return None;
        }

        if let Some(a) = self
            .admins
            .list()
            .into_iter()
            .find(|a| same_text(&a.username, wanted))
        {
            return Some(Identity::Admin(a));
        }

        let teachers = self.teachers.list();
        if let Some(t) = teachers.iter().find(|t| {
            t.username
                .as_deref()
                .map(|u| same_text(u, wanted))
                .unwrap_or(false)
        }) {
            return Some(Identity::Teacher(t.clone()));
        }
        if let Some(t) = teachers
            .iter()
            .find(|t| t.name.trim().to_lowercase() == wanted.to_lowercase())
        {
            return Some(Identity::Teacher(t.clone()));
        }

        self.students
            .list()
            .into_iter()
            .find(|s| same_text(&s.roll_number, wanted))
            .map(Identity::Student)
    }

    /// Pure lookup: (name, department), then name alone, then loose containment
    /// between the login name and the teacher's name.
    pub fn find_teacher_profile(&self, login: &TeacherLogin) -> Option<TeacherRecord> {
        let teachers = self.teachers.list();

        if let Some(dept) = login.department.as_deref() {
            if let Some(t) = teachers
                .iter()
                .find(|t| same_text(&t.name, &login.name) && same_text(&t.department, dept))
            {
                return Some(t.clone());
            }
        }

        if let Some(t) = teachers.iter().find(|t| same_text(&t.name, &login.name)) {
            return Some(t.clone());
        }

        let probe = login
            .username
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(&login.name);
        teachers
            .into_iter()
            .find(|t| loosely_contains(probe, &t.name))
    }

    /// Like [`Resolver::find_teacher_profile`], but a total miss creates a
    /// profile in department "General" with no subjects.
    pub fn resolve_or_create_teacher_profile(
        &self,
        login: &TeacherLogin,
    ) -> Result<TeacherRecord, StoreError> {
        if let Some(found) = self.find_teacher_profile(login) {
            return Ok(found);
        }
        let created = self.teachers.add(TeacherRecord {
            name: login.name.trim().to_string(),
            department: PROVISIONED_DEPARTMENT.to_string(),
            subjects: Vec::new(),
            username: login.username.clone().filter(|u| !u.trim().is_empty()),
            ..Default::default()
        })?;
        info!(teacher_id = %created.id, name = %created.name, "provisioned missing teacher profile");
        Ok(created)
    }

    /// Students are matched on roll number only and never created here.
    pub fn resolve_student_profile(&self, roll_number: &str) -> Option<StudentRecord> {
        self.students
            .list()
            .into_iter()
            .find(|s| s.roll_number == roll_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    struct Fixture {
        dir: PathBuf,
        admins: JsonStore<AdminRecord>,
        teachers: JsonStore<TeacherRecord>,
        students: JsonStore<StudentRecord>,
    }

    impl Fixture {
        fn new(prefix: &str) -> Self {
            let dir = temp_dir(prefix);
            Fixture {
                admins: JsonStore::open(&dir),
                teachers: JsonStore::open(&dir),
                students: JsonStore::open(&dir),
                dir,
            }
        }

        fn resolver(&self) -> Resolver<'_> {
            Resolver {
                admins: &self.admins,
                teachers: &self.teachers,
                students: &self.students,
            }
        }

        fn teacher(&self, name: &str, department: &str, username: Option<&str>) -> TeacherRecord {
            self.teachers
                .add(TeacherRecord {
                    name: name.to_string(),
                    department: department.to_string(),
                    username: username.map(|u| u.to_string()),
                    ..Default::default()
                })
                .expect("add teacher")
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    #[test]
    fn role_from_id_uses_prefix_tag() {
        assert_eq!(Role::from_id("admin_1"), Some(Role::Admin));
        assert_eq!(Role::from_id("teacher_17000"), Some(Role::Teacher));
        assert_eq!(Role::from_id("student_42"), Some(Role::Student));
        assert_eq!(Role::from_id("notice_42"), None);
        assert_eq!(Role::from_id("student_"), None);
        assert_eq!(Role::from_id(""), None);
    }

    #[test]
    fn resolve_by_id_routes_on_prefix() {
        let fx = Fixture::new("colleged-resolver-dispatch");
        let admin = fx
            .admins
            .add(AdminRecord {
                username: "root".into(),
                password: "pw".into(),
                ..Default::default()
            })
            .expect("add admin");
        let teacher = fx.teacher("Jane Doe", "CS", None);
        let student = fx
            .students
            .add(StudentRecord {
                name: "A".into(),
                roll_number: "R1".into(),
                ..Default::default()
            })
            .expect("add student");

        let r = fx.resolver();
        assert_eq!(r.resolve_by_id(&admin.id).map(|i| i.role()), Some(Role::Admin));
        assert_eq!(r.resolve_by_id(&teacher.id).map(|i| i.role()), Some(Role::Teacher));
        assert_eq!(r.resolve_by_id(&student.id).map(|i| i.role()), Some(Role::Student));

        // Right prefix, wrong collection member.
        let swapped = student.id.replacen("student_", "teacher_", 1);
        assert!(r.resolve_by_id(&swapped).is_none());
        assert!(r.resolve_by_id("course_1").is_none());
    }

    #[test]
    fn login_name_precedence_and_case() {
        let fx = Fixture::new("colleged-resolver-login");
        fx.admins
            .add(AdminRecord {
                username: "Shared".into(),
                password: "pw".into(),
                ..Default::default()
            })
            .expect("add admin");
        fx.teacher("Shared", "CS", None);
        let named = fx.teacher("Alan Turing", "CS", None);
        let user = fx.teacher("Grace Hopper", "CS", Some("ghopper"));
        fx.students
            .add(StudentRecord {
                name: "Stu".into(),
                roll_number: "CS101".into(),
                ..Default::default()
            })
            .expect("add student");

        let r = fx.resolver();
        assert_eq!(r.resolve_by_login_name("shared").map(|i| i.role()), Some(Role::Admin));
        assert_eq!(
            r.resolve_by_login_name("GHOPPER").map(|i| i.id().to_string()),
            Some(user.id)
        );
        assert_eq!(
            r.resolve_by_login_name("alan turing").map(|i| i.id().to_string()),
            Some(named.id)
        );
        let stu = r.resolve_by_login_name("cs101").expect("student by roll");
        assert_eq!(stu.role(), Role::Student);
        assert_eq!(stu.username(), "CS101");
        assert_eq!(stu.password(), crate::records::DEFAULT_PASSWORD);
        assert!(r.resolve_by_login_name("nobody").is_none());
        assert!(r.resolve_by_login_name("  ").is_none());
    }

    #[test]
    fn teacher_profile_falls_back_then_provisions() {
        let fx = Fixture::new("colleged-resolver-teacher");
        let jane = fx.teacher("Jane Doe", "CS", None);
        let r = fx.resolver();

        let exact = TeacherLogin {
            name: "Jane Doe".into(),
            department: Some("CS".into()),
            username: None,
        };
        assert_eq!(r.find_teacher_profile(&exact), Some(jane.clone()));

        let other_dept = TeacherLogin {
            department: Some("Math".into()),
            ..exact.clone()
        };
        assert_eq!(
            r.resolve_or_create_teacher_profile(&other_dept).expect("resolve"),
            jane
        );

        let fuzzy = TeacherLogin {
            name: "Dr. Jane Doe".into(),
            department: None,
            username: Some("jane".into()),
        };
        assert_eq!(r.find_teacher_profile(&fuzzy), Some(jane.clone()));

        let stranger = TeacherLogin {
            name: "Zed Quux".into(),
            department: Some("Physics".into()),
            username: Some("zquux".into()),
        };
        assert!(r.find_teacher_profile(&stranger).is_none());
        let created = r
            .resolve_or_create_teacher_profile(&stranger)
            .expect("provision");
        assert!(created.id.starts_with("teacher_"));
        assert_eq!(created.department, PROVISIONED_DEPARTMENT);
        assert!(created.subjects.is_empty());
        assert_eq!(fx.teachers.list().len(), 2);

        // Second call finds the provisioned record instead of adding another.
        let again = r
            .resolve_or_create_teacher_profile(&stranger)
            .expect("resolve again");
        assert_eq!(again.id, created.id);
        assert_eq!(fx.teachers.list().len(), 2);
    }

    #[test]
    fn student_profile_is_never_created() {
        let fx = Fixture::new("colleged-resolver-student");
        let r = fx.resolver();
        assert!(r.resolve_student_profile("R9").is_none());
        assert!(fx.students.list().is_empty());
    }
}
