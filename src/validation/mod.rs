//! Input validation module
//!
//! Two layers live here. Request-shape checks (usernames, passwords, field
//! names, uploads) reject malformed input before it reaches the engine. The
//! value checks run a template's field definitions against a submitted value
//! map: missing required values are errors, type mismatches are warnings.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::engine::files::FILE_PREFIX;
use crate::models::FormField;

pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} is too long (max {max} characters)")]
    TooLong { field: String, max: usize },

    #[error("{field} is too short (min {min} characters)")]
    TooShort { field: String, min: usize },

    #[error("Username may only contain letters, digits and @.+-_")]
    InvalidUsername,

    #[error("Field name must start with a letter and contain only letters, digits and underscores")]
    InvalidFieldName,

    #[error("Invalid file type: {mime_type}")]
    InvalidFileType { mime_type: String },

    #[error("File too large (max {max_mb} MB)")]
    FileTooLarge { max_mb: usize },
}

// =============================================================================
// Request Checks
// =============================================================================

/// Employee usernames follow the usual login-name alphabet.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "Username".to_string(),
        });
    }
    if username.chars().count() > 150 {
        return Err(ValidationError::TooLong {
            field: "Username".to_string(),
            max: 150,
        });
    }

    let is_valid = username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
    if !is_valid {
        return Err(ValidationError::InvalidUsername);
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::Required {
            field: "Password".to_string(),
        });
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort {
            field: "Password".to_string(),
            min: MIN_PASSWORD_LENGTH,
        });
    }
    Ok(())
}

/// Field names are machine identifiers: `full_name`, `start_date`.
pub fn validate_field_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "Field name".to_string(),
        });
    }
    if name.len() > 100 {
        return Err(ValidationError::TooLong {
            field: "Field name".to_string(),
            max: 100,
        });
    }

    let mut chars = name.chars();
    let starts_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    if !starts_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::InvalidFieldName);
    }

    Ok(())
}

/// Flatten `validator` derive output into readable messages.
pub fn describe_errors(errors: &validator::ValidationErrors) -> Vec<String> {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let codes: Vec<String> = errs.iter().map(|e| e.code.to_string()).collect();
            format!("{} is invalid ({})", field, codes.join(", "))
        })
        .collect();

    if messages.is_empty() {
        messages.push(errors.to_string());
    }
    messages.sort();
    messages
}

/// Validate uploaded file
pub fn validate_file_upload(
    mime_type: &str,
    file_size: usize,
    max_size_bytes: usize,
) -> Result<(), ValidationError> {
    if file_size > max_size_bytes {
        return Err(ValidationError::FileTooLarge {
            max_mb: max_size_bytes / (1024 * 1024),
        });
    }

    // Personnel documents and ID photos; no HTML/XML so stored files can't carry XSS
    let allowed_types = [
        "application/pdf",
        "application/msword",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "application/vnd.ms-excel",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "application/vnd.oasis.opendocument.text",
        "application/rtf",
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "text/plain",
        "text/csv",
    ];

    if !allowed_types.contains(&mime_type) {
        return Err(ValidationError::InvalidFileType {
            mime_type: mime_type.to_string(),
        });
    }

    Ok(())
}

/// Dangerous file extensions that could be executed if misconfigured
const DANGEROUS_EXTENSIONS: &[&str] = &[
    // Server-side scripting
    ".php", ".phtml", ".php3", ".php4", ".php5", ".php7", ".phps", ".asp", ".aspx", ".jsp",
    ".jspx", ".cgi", ".pl", ".py", ".pyc", ".pyo", ".rb", ".erb",
    // Executables
    ".exe", ".bat", ".cmd", ".com", ".msi", ".dll", ".sh", ".bash", ".zsh", ".ksh",
    // Scripts
    ".js", ".jsx", ".ts", ".tsx", ".mjs",
    // Server config files
    ".htaccess", ".htpasswd",
    // Java
    ".jar", ".war", ".ear", ".class",
];

/// Reject executable extensions, including hidden double extensions such as
/// `payslip.php.pdf`.
pub fn validate_filename_extensions(filename: &str) -> Result<(), ValidationError> {
    let lower = filename.to_lowercase();

    for ext in DANGEROUS_EXTENSIONS {
        let double_ext_pattern = format!("{}.", ext);
        if lower.ends_with(ext) || lower.contains(&double_ext_pattern) {
            return Err(ValidationError::InvalidFileType {
                mime_type: format!("filename contains dangerous extension: {}", ext),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Field Values
// =============================================================================

/// A submitted value map with field ids resolved to integers.
///
/// `values` holds text keyed by field id, `files` holds file locators for
/// `file` fields. Keys that are not field ids are dropped here; ids that do
/// not belong to the template are dropped later when writes are resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldInput {
    pub values: BTreeMap<i64, String>,
    pub files: BTreeMap<i64, String>,
}

impl FieldInput {
    pub fn from_raw(values: &HashMap<String, JsonValue>, files: &HashMap<String, String>) -> Self {
        let mut input = FieldInput::default();

        for (key, raw) in values {
            let Some(id) = parse_field_key(key) else {
                tracing::debug!("Dropping value for unparseable field key {:?}", key);
                continue;
            };
            if let Some(text) = coerce_value(raw) {
                input.values.insert(id, text);
            }
        }

        for (key, locator) in files {
            match parse_field_key(key) {
                Some(id) if is_file_locator(locator) => {
                    input.files.insert(id, locator.clone());
                }
                Some(_) if locator.trim().is_empty() => {}
                Some(id) => tracing::warn!("Dropping bad file locator for field {}: {:?}", id, locator),
                None => tracing::debug!("Dropping file for unparseable field key {:?}", key),
            }
        }

        input
    }

    fn has_text(&self, field_id: i64) -> bool {
        self.values
            .get(&field_id)
            .is_some_and(|v| !v.trim().is_empty())
    }

    fn has_file(&self, field_id: i64) -> bool {
        self.files.contains_key(&field_id)
    }
}

/// Only locators handed out by file storage: under its prefix, one plain
/// file name, nothing that climbs out of the upload directory.
pub fn is_file_locator(locator: &str) -> bool {
    let Some(name) = locator
        .strip_prefix(FILE_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
    else {
        return false;
    };
    !name.is_empty() && !name.contains(['/', '\\']) && name != ".." && name != "."
}

/// Accept `"12"` and the form-post spelling `"field_12"`.
fn parse_field_key(key: &str) -> Option<i64> {
    let key = key.trim();
    key.strip_prefix("field_").unwrap_or(key).parse().ok()
}

/// Values are stored as text whatever the field's declared type.
pub fn coerce_value(raw: &JsonValue) -> Option<String> {
    match raw {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Array(items) => Some(
            items
                .iter()
                .filter_map(coerce_value)
                .collect::<Vec<_>>()
                .join(","),
        ),
        JsonValue::Object(_) => Some(raw.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueMode {
    /// Every required field must be supplied.
    Create,
    /// Only supplied fields are checked; absent ones keep their stored value.
    Update,
}

/// Check `input` against the template's fields.
///
/// Returns advisory warnings on success, or every required-field error at
/// once on failure.
pub fn validate_values(
    fields: &[FormField],
    input: &FieldInput,
    mode: ValueMode,
) -> Result<Vec<String>, Vec<String>> {
    let errors: Vec<String> = fields
        .iter()
        .filter(|f| f.is_required)
        .filter(|f| {
            let supplied = input.values.contains_key(&f.id) || input.has_file(f.id);
            let missing = if f.field_type.stores_file() {
                !input.has_file(f.id)
            } else {
                !input.has_text(f.id)
            };
            match mode {
                ValueMode::Create => missing,
                ValueMode::Update => supplied && missing,
            }
        })
        .map(|f| format!("{} is required", f.label))
        .collect();

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(advisory_warnings(fields, input))
}

/// Type mismatches for supplied values. These never block a write.
pub fn advisory_warnings(fields: &[FormField], input: &FieldInput) -> Vec<String> {
    fields
        .iter()
        .filter_map(|f| {
            let value = input.values.get(&f.id)?;
            f.field_type
                .check(value, f.options.as_ref())
                .err()
                .map(|problem| format!("{} {}", f.label, problem))
        })
        .collect()
}
