use crate::college::College;
use crate::ipc::handlers::crud;
use crate::ipc::helpers::{
    get_object, get_optional_str, get_required_str, guard, require_college, respond, Access,
    HandlerErr, ADMIN, STAFF,
};
use crate::ipc::types::{AppState, Request};
use crate::records::TeacherRecord;
use crate::store::shallow_merge;
use serde_json::{json, Value};

fn login_name_taken(college: &College, login_name: &str, except_id: Option<&str>) -> bool {
    college.teachers.list().iter().any(|t| {
        Some(t.id.as_str()) != except_id && t.login_name().eq_ignore_ascii_case(login_name.trim())
    })
}

fn teachers_list(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    guard(college, params, Access::Roles(STAFF))?;
    let department = get_optional_str(params, "department");
    let items: Vec<TeacherRecord> = college
        .teachers
        .list()
        .into_iter()
        .filter(|t| {
            department
                .as_deref()
                .map(|d| t.department.trim().eq_ignore_ascii_case(d))
                .unwrap_or(true)
        })
        .collect();
    Ok(json!({ "items": crud::redacted(&items) }))
}

fn teachers_create(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    guard(college, params, Access::Roles(ADMIN))?;
    let record: TeacherRecord = crud::parse_new(params)?;
    if record.name.trim().is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let login = record.login_name();
    if login_name_taken(college, &login, None) {
        return Err(HandlerErr::new(
            "conflict",
            format!("login name {} already exists", login),
        ));
    }
    crud::create(college, record)
}

fn teachers_update(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    guard(college, params, Access::Roles(ADMIN))?;
    let id = get_required_str(params, "id")?;
    let patch = get_object(params, "patch")?;
    // A rename changes the login name of a teacher without a username.
    if let Some(current) = college.teachers.get_by_id(&id) {
        let login = shallow_merge(&current, patch)?.login_name();
        if login_name_taken(college, &login, Some(&id)) {
            return Err(HandlerErr::new(
                "conflict",
                format!("login name {} already exists", login),
            ));
        }
    }
    crud::update::<TeacherRecord>(college, params)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let action = req.method.strip_prefix("teachers.")?;
    let res = require_college(state).and_then(|college| match action {
        "list" => teachers_list(college, &req.params),
        "get" => guard(college, &req.params, Access::Roles(STAFF))
            .and_then(|_| crud::get::<TeacherRecord>(college, &req.params)),
        "create" => teachers_create(college, &req.params),
        "update" => teachers_update(college, &req.params),
        "delete" => guard(college, &req.params, Access::Roles(ADMIN))
            .and_then(|_| crud::delete::<TeacherRecord>(college, &req.params)),
        _ => Err(HandlerErr::new(
            "not_implemented",
            format!("unknown method: {}", req.method),
        )),
    });
    Some(respond(&req.id, res))
}
