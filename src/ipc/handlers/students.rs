use crate::college::College;
use crate::identity::Identity;
use crate::ipc::handlers::crud;
use crate::ipc::helpers::{
    get_object, get_optional_str, get_required_str, guard, require_college, require_identity,
    respond, Access, HandlerErr, ADMIN, STAFF,
};
use crate::ipc::types::{AppState, Request};
use crate::records::{Branch, StudentRecord};
use serde_json::{json, Value};

fn roll_number_taken(college: &College, roll_number: &str, except_id: Option<&str>) -> bool {
    college.students.list().iter().any(|s| {
        Some(s.id.as_str()) != except_id && s.roll_number.trim().eq_ignore_ascii_case(roll_number.trim())
    })
}

fn check_branch(branch: Option<&str>) -> Result<(), HandlerErr> {
    match branch {
        Some(b) => b.parse::<Branch>().map(|_| ()).map_err(HandlerErr::bad_params),
        None => Ok(()),
    }
}

fn students_list(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    guard(college, params, Access::Roles(STAFF))?;
    let class = get_optional_str(params, "class");
    let items: Vec<StudentRecord> = college
        .students
        .list()
        .into_iter()
        .filter(|s| {
            class
                .as_deref()
                .map(|c| s.class.trim().eq_ignore_ascii_case(c))
                .unwrap_or(true)
        })
        .collect();
    Ok(json!({ "items": crud::redacted(&items) }))
}

/// Staff can read any student; a student only themselves.
fn students_get(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    let identity = require_identity(college, params, Access::Authenticated)?;
    let id = get_required_str(params, "id")?;
    if let Identity::Student(me) = &identity {
        if me.id != id {
            return Err(HandlerErr::new("forbidden", "students may only read their own record"));
        }
    }
    crud::get::<StudentRecord>(college, params)
}

fn students_create(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    guard(college, params, Access::Roles(ADMIN))?;
    let record: StudentRecord = crud::parse_new(params)?;
    if record.name.trim().is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    if record.roll_number.trim().is_empty() {
        return Err(HandlerErr::bad_params("rollNumber must not be empty"));
    }
    check_branch(record.branch.as_deref())?;
    if roll_number_taken(college, &record.roll_number, None) {
        return Err(HandlerErr::new(
            "conflict",
            format!("roll number {} already exists", record.roll_number),
        ));
    }
    crud::create(college, record)
}

fn students_update(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    guard(college, params, Access::Roles(ADMIN))?;
    let id = get_required_str(params, "id")?;
    let patch = get_object(params, "patch")?;
    check_branch(patch.get("branch").and_then(|v| v.as_str()))?;
    if let Some(roll) = patch.get("rollNumber").and_then(|v| v.as_str()) {
        if roll_number_taken(college, roll, Some(&id)) {
            return Err(HandlerErr::new(
                "conflict",
                format!("roll number {} already exists", roll),
            ));
        }
    }
    crud::update::<StudentRecord>(college, params)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let action = req.method.strip_prefix("students.")?;
    let res = require_college(state).and_then(|college| match action {
        "list" => students_list(college, &req.params),
        "get" => students_get(college, &req.params),
        "create" => students_create(college, &req.params),
        "update" => students_update(college, &req.params),
        "delete" => guard(college, &req.params, Access::Roles(ADMIN))
            .and_then(|_| crud::delete::<StudentRecord>(college, &req.params)),
        _ => Err(HandlerErr::new(
            "not_implemented",
            format!("unknown method: {}", req.method),
        )),
    });
    Some(respond(&req.id, res))
}
