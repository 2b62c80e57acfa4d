use crate::college::College;
use crate::identity::Identity;
use crate::ipc::handlers::crud::{self, Policy};
use crate::ipc::helpers::{
    get_object, get_optional_str, get_required_str, guard, require_college, require_identity,
    respond, Access, HandlerErr, ADMIN, STAFF,
};
use crate::ipc::types::{AppState, Request};
use crate::records::{
    timestamp, ChatbotFaq, CourseRecord, CustomButton, DocumentRecord, GalleryItem, NoticeRecord,
    OverviewRecord, QuickLink, StudyMaterialRecord,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::cmp::Reverse;
use std::collections::HashSet;

const COLLECTIONS: &[&str] = &[
    "notices",
    "gallery",
    "courses",
    "quickLinks",
    "customButtons",
    "chatbotFaqs",
    "studyMaterials",
    "documents",
    "overview",
];

const PUBLIC_STAFF: Policy = Policy {
    read: Access::Public,
    write: Access::Roles(STAFF),
};
const PUBLIC_ADMIN: Policy = Policy {
    read: Access::Public,
    write: Access::Roles(ADMIN),
};
const SIGNED_IN_STAFF: Policy = Policy {
    read: Access::Authenticated,
    write: Access::Roles(STAFF),
};

fn study_materials_list(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    let identity = require_identity(college, params, Access::Authenticated)?;
    let class = match &identity {
        Identity::Student(s) => Some(s.class.clone()),
        _ => get_optional_str(params, "class"),
    };
    let subject = get_optional_str(params, "subject");
    let items: Vec<StudyMaterialRecord> = college
        .study_materials
        .list()
        .into_iter()
        .filter(|m| {
            class
                .as_deref()
                .map(|c| m.class.trim().eq_ignore_ascii_case(c.trim()))
                .unwrap_or(true)
        })
        .filter(|m| {
            subject
                .as_deref()
                .map(|s| m.subject.trim().eq_ignore_ascii_case(s))
                .unwrap_or(true)
        })
        .collect();
    Ok(json!({ "items": items }))
}

fn study_materials_create(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    let identity = require_identity(college, params, Access::Roles(STAFF))?;
    let mut record: StudyMaterialRecord = crud::parse_new(params)?;
    if record.title.trim().is_empty() {
        return Err(HandlerErr::bad_params("title must not be empty"));
    }
    record.uploaded_by = crud::uploader_name(&identity, record.uploaded_by.take());
    crud::create(college, record)
}

fn documents_list(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    guard(college, params, Access::Authenticated)?;
    let mut items = college.documents.list();
    // Newest first; records without a date go last.
    items.sort_by_key(|d| Reverse(d.upload_date.clone().unwrap_or_default()));
    Ok(json!({ "items": items }))
}

fn documents_create(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    let identity = require_identity(college, params, Access::Roles(STAFF))?;
    let mut record: DocumentRecord = crud::parse_new(params)?;
    if record.file_url.is_none() && record.file_name.is_none() {
        return Err(HandlerErr::bad_params("fileUrl or fileName is required"));
    }
    if record.title.trim().is_empty() {
        record.title = record.file_name.clone().unwrap_or_default();
    }
    record.uploaded_by = crud::uploader_name(&identity, record.uploaded_by.take());
    crud::create(college, record)
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_lowercase())
        .collect()
}

/// FAQ sharing the most words with `question`; ties go to file order.
pub fn best_faq<'a>(faqs: &'a [ChatbotFaq], question: &str) -> Option<&'a ChatbotFaq> {
    let asked = words(question);
    let mut best: Option<(&ChatbotFaq, usize)> = None;
    for faq in faqs {
        let mut known = words(&faq.question);
        for k in &faq.keywords {
            known.extend(words(k));
        }
        let score = asked.intersection(&known).count();
        if score > 0 && best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((faq, score));
        }
    }
    best.map(|(faq, _)| faq)
}

fn chatbot_faqs_ask(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    let question = get_required_str(params, "question")?;
    let faqs = college.chatbot_faqs.list();
    Ok(json!({ "item": best_faq(&faqs, &question) }))
}

fn overview_get(college: &College) -> Value {
    json!({ "item": college.overview.first() })
}

fn overview_update(college: &College, params: &Value) -> Result<Value, HandlerErr> {
    guard(college, params, Access::Roles(ADMIN))?;
    let mut patch = get_object(params, "patch")?.clone();
    patch["updatedAt"] = json!(timestamp(Utc::now()));
    let item: OverviewRecord = college.overview.upsert_first(&patch)?;
    Ok(json!({ "item": item }))
}

fn route(
    college: &College,
    collection: &str,
    action: &str,
    params: &Value,
) -> Option<Result<Value, HandlerErr>> {
    match (collection, action) {
        ("studyMaterials", "list") => Some(study_materials_list(college, params)),
        ("studyMaterials", "create") => Some(study_materials_create(college, params)),
        ("documents", "list") => Some(documents_list(college, params)),
        ("documents", "create") => Some(documents_create(college, params)),
        ("chatbotFaqs", "ask") => Some(chatbot_faqs_ask(college, params)),
        ("overview", "get") => Some(Ok(overview_get(college))),
        ("overview", "update") => Some(overview_update(college, params)),
        ("overview", _) => None,
        ("notices", _) => crud::dispatch::<NoticeRecord>(college, action, params, PUBLIC_STAFF),
        ("gallery", _) => crud::dispatch::<GalleryItem>(college, action, params, PUBLIC_ADMIN),
        ("courses", _) => crud::dispatch::<CourseRecord>(college, action, params, PUBLIC_ADMIN),
        ("quickLinks", _) => crud::dispatch::<QuickLink>(college, action, params, PUBLIC_ADMIN),
        ("customButtons", _) => {
            crud::dispatch::<CustomButton>(college, action, params, PUBLIC_ADMIN)
        }
        ("chatbotFaqs", _) => crud::dispatch::<ChatbotFaq>(college, action, params, PUBLIC_ADMIN),
        ("studyMaterials", _) => {
            crud::dispatch::<StudyMaterialRecord>(college, action, params, SIGNED_IN_STAFF)
        }
        ("documents", _) => {
            crud::dispatch::<DocumentRecord>(college, action, params, SIGNED_IN_STAFF)
        }
        _ => None,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let (collection, action) = req.method.split_once('.')?;
    if !COLLECTIONS.contains(&collection) {
        return None;
    }
    let res = require_college(state).and_then(|college| {
        route(college, collection, action, &req.params).unwrap_or_else(|| {
            Err(HandlerErr::new(
                "not_implemented",
                format!("unknown method: {}", req.method),
            ))
        })
    });
    Some(respond(&req.id, res))
}
