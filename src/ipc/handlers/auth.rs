use crate::auth::AuthError;
use crate::identity::{Identity, TeacherLogin};
use crate::ipc::handlers::crud::redacted;
use crate::ipc::helpers::{
    get_required_str, require_college, require_identity, respond, Access, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn auth_login(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let college = require_college(state)?;
    let username = get_required_str(params, "username")?;
    let password = params
        .get("password")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing password"))?;
    let outcome = college
        .gate()
        .login(&username, password)
        .map_err(|e| match e {
            AuthError::BadCredentials => HandlerErr::new("unauthorized", e.to_string()),
            other => other.into(),
        })?;
    Ok(json!({
        "token": outcome.token,
        "devToken": outcome.dev_token,
        "user": outcome.identity.to_json(),
    }))
}

fn auth_me(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let college = require_college(state)?;
    let identity = require_identity(college, params, Access::Authenticated)?;
    Ok(json!({ "user": identity.to_json() }))
}

/// Teachers get a profile even when none matches yet; students must already
/// have one.
fn auth_profile(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let college = require_college(state)?;
    let identity = require_identity(college, params, Access::Authenticated)?;
    let resolver = college.resolver();
    match &identity {
        Identity::Teacher(_) => {
            let profile =
                resolver.resolve_or_create_teacher_profile(&TeacherLogin::from_identity(&identity))?;
            Ok(json!({ "role": "teacher", "profile": redacted(&profile) }))
        }
        Identity::Student(s) => {
            let profile = resolver
                .resolve_student_profile(&s.roll_number)
                .ok_or_else(|| HandlerErr::not_found("student profile not found"))?;
            Ok(json!({ "role": "student", "profile": redacted(&profile) }))
        }
        Identity::Admin(_) => Ok(json!({ "role": "admin", "profile": identity.to_json() })),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let res = match req.method.as_str() {
        "auth.login" => auth_login(state, &req.params),
        "auth.me" => auth_me(state, &req.params),
        "auth.profile" => auth_profile(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, res))
}
