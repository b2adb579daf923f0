//! Audit differ and recorder
//!
//! Turns before/after snapshots of a mutated entity into an ordered list of
//! field changes and a human-readable summary, with sensitive keys redacted.
//! Persisting the entry is fire-and-forget: the audit trail is best-effort
//! relative to the business transaction it describes and must never block
//! or fail it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::error;
use uuid::Uuid;

use crate::db::AuditRepository;
use crate::models::FieldChange;

/// Marker substituted for redacted values
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Default denylist of sensitive key fragments (case-insensitive substring)
const DEFAULT_DENYLIST: [&str; 4] = ["password", "token", "secret", "apikey"];

static CAMEL_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid regex"));

/// True when a snapshot counts as absent: missing, null, or `{}`
fn is_empty_snapshot(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

/// Format one JSON value for display in a change entry
///
/// `None` means null/absent. Booleans render as Yes/No; arrays and objects
/// keep a structural form (an empty array stays distinguishable as `[]`);
/// strings pass through; everything else is stringified.
fn format_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(true) => Some("Yes".to_string()),
        Value::Bool(false) => Some("No".to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
        other => Some(other.to_string()),
    }
}

/// Whether a creation entry should be emitted for this value
fn is_meaningful(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Extract ordered field-level changes between two snapshots
///
/// Empty/missing `before` classifies the operation as a creation, empty
/// `after` as a deletion, anything else as an update comparing the union of
/// keys (or the explicit allow-list) with deep equality for structured
/// values. Never fails: non-object snapshots degrade to a single "value"
/// comparison.
pub fn extract_changes(
    before: Option<&Value>,
    after: Option<&Value>,
    fields: Option<&[&str]>,
) -> Vec<FieldChange> {
    let before_empty = is_empty_snapshot(before);
    let after_empty = is_empty_snapshot(after);

    if before_empty && after_empty {
        return vec![];
    }

    if before_empty {
        return creation_changes(after.unwrap_or(&Value::Null), fields);
    }
    if after_empty {
        return deletion_changes(before.unwrap_or(&Value::Null), fields);
    }

    update_changes(
        before.unwrap_or(&Value::Null),
        after.unwrap_or(&Value::Null),
        fields,
    )
}

fn selected_keys<'a>(map: &'a serde_json::Map<String, Value>, fields: Option<&[&str]>) -> Vec<&'a str> {
    match fields {
        Some(allowed) => map
            .keys()
            .map(String::as_str)
            .filter(|key| allowed.contains(key))
            .collect(),
        None => map.keys().map(String::as_str).collect(),
    }
}

fn creation_changes(after: &Value, fields: Option<&[&str]>) -> Vec<FieldChange> {
    let Value::Object(map) = after else {
        // Malformed snapshot: record it as one plain value
        return vec![FieldChange {
            field: "value".to_string(),
            before: None,
            after: format_value(after),
        }];
    };

    selected_keys(map, fields)
        .into_iter()
        .filter(|key| map.get(*key).map(is_meaningful).unwrap_or(false))
        .map(|key| FieldChange {
            field: key.to_string(),
            before: None,
            after: map.get(key).and_then(format_value),
        })
        .collect()
}

fn deletion_changes(before: &Value, fields: Option<&[&str]>) -> Vec<FieldChange> {
    let Value::Object(map) = before else {
        return vec![FieldChange {
            field: "value".to_string(),
            before: format_value(before),
            after: None,
        }];
    };

    selected_keys(map, fields)
        .into_iter()
        .filter(|key| {
            map.get(*key)
                .map(|v| !matches!(v, Value::Null))
                .unwrap_or(false)
        })
        .map(|key| FieldChange {
            field: key.to_string(),
            before: map.get(key).and_then(format_value),
            after: None,
        })
        .collect()
}

fn update_changes(before: &Value, after: &Value, fields: Option<&[&str]>) -> Vec<FieldChange> {
    let (Value::Object(before_map), Value::Object(after_map)) = (before, after) else {
        // Wrong types: compare the snapshots as plain values
        if before == after {
            return vec![];
        }
        return vec![FieldChange {
            field: "value".to_string(),
            before: format_value(before),
            after: format_value(after),
        }];
    };

    let mut keys: Vec<&str> = match fields {
        Some(allowed) => allowed.to_vec(),
        None => {
            let mut keys: Vec<&str> = before_map.keys().map(String::as_str).collect();
            for key in after_map.keys() {
                if !before_map.contains_key(key) {
                    keys.push(key);
                }
            }
            keys
        }
    };
    keys.dedup();

    keys.into_iter()
        .filter_map(|key| {
            let old = before_map.get(key).unwrap_or(&Value::Null);
            let new = after_map.get(key).unwrap_or(&Value::Null);
            // serde_json equality is structural, which covers the deep
            // object/array comparison; primitives compare strictly.
            if old == new {
                return None;
            }
            Some(FieldChange {
                field: key.to_string(),
                before: format_value(old),
                after: format_value(new),
            })
        })
        .collect()
}

/// Convert a camelCase or snake_case field name to spaced, capitalized words
pub fn humanize_field(name: &str) -> String {
    let spaced = CAMEL_BOUNDARY.replace_all(name, "$1 $2").replace('_', " ");
    spaced
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Human-readable summary of a change list
pub fn describe_changes(changes: &[FieldChange]) -> String {
    match changes {
        [] => "No changes detected".to_string(),
        [change] => {
            let field = humanize_field(&change.field);
            match (&change.before, &change.after) {
                (None, Some(after)) => format!("Set {} to \"{}\"", field, after),
                (Some(_), None) => format!("Cleared {}", field),
                (Some(before), Some(after)) => {
                    format!("Changed {} from \"{}\" to \"{}\"", field, before, after)
                }
                (None, None) => format!("Changed {}", field),
            }
        }
        many => {
            let names: Vec<String> = many.iter().map(|c| humanize_field(&c.field)).collect();
            format!("{} fields changed: {}", many.len(), names.join(", "))
        }
    }
}

/// Redacts sensitive keys from snapshots before they are persisted
#[derive(Debug, Clone)]
pub struct Sanitizer {
    denylist: Vec<String>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            denylist: DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Sanitizer {
    pub fn with_denylist(denylist: Vec<String>) -> Self {
        Self {
            denylist: denylist.into_iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    fn is_sensitive(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.denylist.iter().any(|entry| key.contains(entry))
    }

    /// Replace sensitive values with the redaction marker, at every depth
    pub fn sanitize(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, val)| {
                        if self.is_sensitive(key) {
                            (key.clone(), Value::String(REDACTION_MARKER.to_string()))
                        } else {
                            (key.clone(), self.sanitize(val))
                        }
                    })
                    .collect(),
            ),
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| self.sanitize(item)).collect())
            }
            other => other.clone(),
        }
    }
}

/// Context for one recorded action
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub organization_id: Uuid,
    pub user_id: Option<Uuid>,
    pub user_name: Option<String>,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub metadata: Option<Value>,
}

/// Best-effort audit trail recorder
///
/// Owns a pool clone so persistence can be spawned off the request path.
#[derive(Debug, Clone)]
pub struct AuditRecorder {
    pool: SqlitePool,
    sanitizer: Sanitizer,
}

impl AuditRecorder {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            sanitizer: Sanitizer::default(),
        }
    }

    /// Record a mutating action without blocking the caller
    ///
    /// The diff is computed synchronously (cheap, never fails); the insert
    /// runs in a detached task and failures are logged and swallowed.
    pub fn record(&self, event: AuditEvent) {
        let before = event.before.as_ref().map(|v| self.sanitizer.sanitize(v));
        let after = event.after.as_ref().map(|v| self.sanitizer.sanitize(v));
        let changes = extract_changes(before.as_ref(), after.as_ref(), None);
        let details = describe_changes(&changes);

        let pool = self.pool.clone();
        tokio::spawn(async move {
            let repo = AuditRepository::new(&pool);
            let result = repo
                .insert(
                    event.organization_id,
                    event.user_id,
                    event.user_name.as_deref(),
                    &event.action,
                    &event.resource,
                    event.resource_id.as_deref(),
                    Some(details.as_str()),
                    &changes,
                    before.as_ref(),
                    after.as_ref(),
                    event.metadata.as_ref(),
                )
                .await;

            if let Err(err) = result {
                error!(
                    action = %event.action,
                    resource = %event.resource,
                    error = %err,
                    "Failed to persist audit log entry"
                );
            }
        });
    }
}
