//! Delivery targeting for event payloads.
//!
//! Decides whether an event addresses one specific user. Producers that want
//! guaranteed targeted delivery set `TargetUserId`; otherwise the requesting
//! user of an embedded `AdoptionRequest` is used. Anything else broadcasts.

use serde_json::Value;

/// Explicit target field.
pub const TARGET_USER_ID: &str = "TargetUserId";
/// Nested adoption request object.
pub const ADOPTION_REQUEST: &str = "AdoptionRequest";
/// User field inside the adoption request.
pub const USER_ID: &str = "UserId";

/// Resolve the target user ID from an event payload.
///
/// Precedence is fixed: `TargetUserId` first, then `AdoptionRequest.UserId`.
/// When `TargetUserId` is present but blank, no target is resolved and the
/// nested object is not consulted.
///
/// # Examples
///
/// ```
/// use pet_events::resolve_target_user_id;
/// use serde_json::json;
///
/// assert_eq!(resolve_target_user_id(Some(&json!({"TargetUserId": 42}))), Some("42".to_string()));
/// assert_eq!(resolve_target_user_id(Some(&json!({}))), None);
/// assert_eq!(resolve_target_user_id(None), None);
/// ```
pub fn resolve_target_user_id(data: Option<&Value>) -> Option<String> {
    let Some(Value::Object(data)) = data else {
        return None;
    };

    if let Some(explicit) = data.get(TARGET_USER_ID) {
        return non_blank(coerce_to_string(explicit));
    }

    match data.get(ADOPTION_REQUEST) {
        Some(Value::Object(request)) => request
            .get(USER_ID)
            .map(coerce_to_string)
            .and_then(non_blank),
        _ => None,
    }
}

/// Coerce a JSON value into its identifier text.
///
/// Integers render without a fractional part, strings pass through unchanged,
/// null renders empty, and everything else uses its JSON text.
fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(u)) => u.to_string(),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn non_blank(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
