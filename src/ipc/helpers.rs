use crate::attendance::LedgerError;
use crate::auth::{authorize, AuthError};
use crate::college::College;
use crate::identity::{Identity, Role};
use crate::ipc::error::{err, ok};
use crate::ipc::types::AppState;
use crate::store::StoreError;
use serde_json::Value;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidPatch { .. } => HandlerErr::bad_params(e.to_string()),
            StoreError::Persist { .. }
            | StoreError::Corrupt { .. }
            | StoreError::Serialize { .. } => {
                HandlerErr::new("persist_failed", e.to_string())
            }
        }
    }
}

impl From<AuthError> for HandlerErr {
    fn from(e: AuthError) -> Self {
        HandlerErr::new("unauthorized", e.to_string())
    }
}

impl From<LedgerError> for HandlerErr {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InvalidDate(_) => HandlerErr::bad_params(e.to_string()),
            LedgerError::Store(inner) => inner.into(),
        }
    }
}

pub fn respond(id: &str, res: Result<Value, HandlerErr>) -> Value {
    match res {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}

pub fn require_college(state: &AppState) -> Result<&College, HandlerErr> {
    state
        .college
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn get_object<'a>(params: &'a Value, key: &str) -> Result<&'a Value, HandlerErr> {
    params
        .get(key)
        .filter(|v| v.is_object())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an object", key)))
}

#[derive(Debug, Clone, Copy)]
pub enum Access {
    Public,
    Authenticated,
    Roles(&'static [Role]),
}

pub const ADMIN: &[Role] = &[Role::Admin];
pub const STAFF: &[Role] = &[Role::Admin, Role::Teacher];

/// Resolves `params.token` when `access` needs it. Public access never looks
/// at the token.
pub fn guard(college: &College, params: &Value, access: Access) -> Result<Option<Identity>, HandlerErr> {
    let roles = match access {
        Access::Public => return Ok(None),
        Access::Authenticated => None,
        Access::Roles(roles) => Some(roles),
    };
    let token = params.get("token").and_then(|v| v.as_str()).unwrap_or("");
    let identity = college.gate().authenticate(token)?;
    if let Some(roles) = roles {
        if !authorize(&identity, roles) {
            return Err(HandlerErr::new(
                "forbidden",
                format!("{} may not perform this action", identity.role().as_str()),
            ));
        }
    }
    Ok(Some(identity))
}

/// As [`guard`] for access levels that always yield an identity.
pub fn require_identity(college: &College, params: &Value, access: Access) -> Result<Identity, HandlerErr> {
    guard(college, params, access)?
        .ok_or_else(|| HandlerErr::new("unauthorized", "missing token"))
}
