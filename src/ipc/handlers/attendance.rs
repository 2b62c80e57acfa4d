use crate::attendance::today;
use crate::college::College;
use crate::identity::Identity;
use crate::ipc::helpers::{
    get_optional_str, get_required_str, guard, require_college, require_identity, respond, Access,
    HandlerErr, ADMIN, STAFF,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

/// `present: bool`, or `status: "present" | "absent"`.
fn parse_present(v: &Value) -> Result<bool, HandlerErr> {
    if let Some(b) = v.get("present").and_then(|p| p.as_bool()) {
        return Ok(b);
    }
    match v.get("status").and_then(|s| s.as_str()).map(|s| s.trim().to_ascii_lowercase()) {
        Some(s) if s == "present" => Ok(true),
        Some(s) if s == "absent" => Ok(false),
        Some(other) => Err(HandlerErr::bad_params(format!(
            "status must be present or absent, got {}",
            other
        ))),
        None => Err(HandlerErr::bad_params("missing present")),
    }
}

fn attendance_record(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    guard(college, params, Access::Roles(STAFF))?;
    let student_id = get_required_str(params, "studentId")?;
    let subject = get_required_str(params, "subject")?;
    let present = parse_present(params)?;
    let date = get_optional_str(params, "date").unwrap_or_else(today);

    let recorded = college
        .ledger()
        .record_attendance(&student_id, &subject, present, &date)?;
    if !recorded {
        return Err(HandlerErr::not_found(format!("student {} not found", student_id)));
    }
    Ok(json!({ "recorded": true }))
}

fn attendance_record_bulk(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    guard(college, params, Access::Roles(STAFF))?;
    let subject = get_required_str(params, "subject")?;
    let date = get_optional_str(params, "date").unwrap_or_else(today);
    let Some(raw) = params.get("marks").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("marks must be an array"));
    };

    let mut marks: Vec<(String, bool)> = Vec::with_capacity(raw.len());
    for (i, m) in raw.iter().enumerate() {
        let student_id = get_required_str(m, "studentId")
            .map_err(|e| HandlerErr::bad_params(format!("marks[{}]: {}", i, e.message)))?;
        let present = parse_present(m)
            .map_err(|e| HandlerErr::bad_params(format!("marks[{}]: {}", i, e.message)))?;
        marks.push((student_id, present));
    }

    let recorded = college.ledger().record_many(&subject, &date, &marks)?;
    Ok(json!({
        "recorded": recorded,
        "skipped": marks.len() - recorded,
    }))
}

/// Students may only read their own summary.
fn attendance_student(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    let identity = require_identity(college, params, Access::Authenticated)?;
    let student_id = match (&identity, get_optional_str(params, "studentId")) {
        (Identity::Student(me), None) => me.id.clone(),
        (Identity::Student(me), Some(asked)) if asked == me.id => asked,
        (Identity::Student(_), Some(_)) => {
            return Err(HandlerErr::new(
                "forbidden",
                "students may only read their own attendance",
            ))
        }
        (_, Some(asked)) => asked,
        (_, None) => return Err(HandlerErr::bad_params("missing studentId")),
    };
    let summary = college.ledger().student_attendance(&student_id);
    Ok(json!({ "summary": summary }))
}

fn attendance_list(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    guard(college, params, Access::Roles(STAFF))?;
    Ok(json!({ "items": college.ledger().summaries() }))
}

fn attendance_reset(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    guard(college, params, Access::Roles(ADMIN))?;
    let student_id = get_required_str(params, "studentId")?;
    let reset = college.ledger().reset_one(&student_id)?;
    Ok(json!({ "reset": reset }))
}

fn attendance_reset_all(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    guard(college, params, Access::Roles(ADMIN))?;
    let reset = college.ledger().reset_all()?;
    Ok(json!({ "reset": reset }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let action = req.method.strip_prefix("attendance.")?;
    let res = require_college(state).and_then(|college| match action {
        "record" => attendance_record(college, &req.params),
        "recordBulk" => attendance_record_bulk(college, &req.params),
        "student" => attendance_student(college, &req.params),
        "list" => attendance_list(college, &req.params),
        "reset" => attendance_reset(college, &req.params),
        "resetAll" => attendance_reset_all(college, &req.params),
        _ => Err(HandlerErr::new(
            "not_implemented",
            format!("unknown method: {}", req.method),
        )),
    });
    Some(respond(&req.id, res))
}
