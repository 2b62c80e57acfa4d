use crate::college::{College, InCollege};
use crate::identity::Identity;
use crate::ipc::helpers::{get_object, get_required_str, guard, Access, HandlerErr};
use crate::store::{strip_nulls, Record};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy)]
pub struct Policy {
    pub read: Access,
    pub write: Access,
}

/// Record (or list of records) as sent to callers: stored passwords never leave.
pub fn redacted<T: Serialize + ?Sized>(item: &T) -> Value {
    let mut value = json!(item);
    match &mut value {
        Value::Array(items) => {
            for v in items {
                if let Some(fields) = v.as_object_mut() {
                    fields.remove("password");
                }
            }
        }
        Value::Object(fields) => {
            fields.remove("password");
        }
        _ => {}
    }
    value
}

pub fn list<T: InCollege>(college: &College) -> Value {
    json!({ "items": redacted(&T::store_in(college).list()) })
}

pub fn get<T: InCollege>(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let item = T::store_in(college)
        .get_by_id(&id)
        .ok_or_else(|| HandlerErr::not_found(format!("{} not found in {}", id, T::COLLECTION)))?;
    Ok(json!({ "item": redacted(&item) }))
}

/// `params.record` as a new record; missing fields take their defaults.
pub fn parse_new<T: Record>(params: &Value) -> Result<T, HandlerErr> {
    let raw = get_object(params, "record")?;
    serde_json::from_value(strip_nulls(raw))
        .map_err(|e| HandlerErr::bad_params(format!("invalid record: {}", e)))
}

pub fn create<T: InCollege>(college: &College, record: T) -> Result<Value, HandlerErr> {
    let created = T::store_in(college).add(record)?;
    Ok(json!({ "item": redacted(&created) }))
}

pub fn update<T: InCollege>(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let patch = get_object(params, "patch")?;
    let updated = T::store_in(college)
        .update(&id, patch)?
        .ok_or_else(|| HandlerErr::not_found(format!("{} not found in {}", id, T::COLLECTION)))?;
    Ok(json!({ "item": redacted(&updated) }))
}

/// Removing an absent id is not an error; `deleted` reports whether anything went.
pub fn delete<T: InCollege>(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let removed = T::store_in(college).remove(&id)?;
    let mut attachment_removed = false;
    if let Some(file) = removed.as_ref().and_then(|r| r.attachment()) {
        attachment_removed = college.remove_attachment(file);
    }
    Ok(json!({
        "deleted": removed.is_some(),
        "attachmentRemoved": attachment_removed,
    }))
}

/// Standard five actions under `policy`. `None` for any other action.
pub fn dispatch<T: InCollege>(
    college: &College,
    action: &str,
    params: &Value,
    policy: Policy,
) -> Option<Result<Value, HandlerErr>> {
    let res = match action {
        "list" => guard(college, params, policy.read).map(|_| list::<T>(college)),
        "get" => guard(college, params, policy.read).and_then(|_| get::<T>(college, params)),
        "create" => guard(college, params, policy.write)
            .and_then(|_| parse_new::<T>(params))
            .and_then(|record| create(college, record)),
        "update" => guard(college, params, policy.write).and_then(|_| update::<T>(college, params)),
        "delete" => guard(college, params, policy.write).and_then(|_| delete::<T>(college, params)),
        _ => return None,
    };
    Some(res)
}

/// Name recorded as uploader when the caller did not give one.
pub fn uploader_name(identity: &Identity, given: Option<String>) -> Option<String> {
    given
        .filter(|s| !s.trim().is_empty())
        .or_else(|| Some(identity.name()))
}
