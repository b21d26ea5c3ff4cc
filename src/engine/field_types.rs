//! Field type catalog
//!
//! Every field kind a template may declare, with the properties the rest of
//! the engine asks about: whether it carries a choice list, whether its value
//! is a file locator, and how a submitted string is expected to look.
//!
//! Storage is textual for every kind. [`FieldType::check`] is advisory only;
//! nothing in the write path rejects a value because of it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "field_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Email,
    Date,
    Password,
    Textarea,
    Select,
    Checkbox,
    Radio,
    File,
}

impl FieldType {
    pub const ALL: [FieldType; 10] = [
        FieldType::Text,
        FieldType::Number,
        FieldType::Email,
        FieldType::Date,
        FieldType::Password,
        FieldType::Textarea,
        FieldType::Select,
        FieldType::Checkbox,
        FieldType::Radio,
        FieldType::File,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Email => "email",
            FieldType::Date => "date",
            FieldType::Password => "password",
            FieldType::Textarea => "textarea",
            FieldType::Select => "select",
            FieldType::Checkbox => "checkbox",
            FieldType::Radio => "radio",
            FieldType::File => "file",
        }
    }

    /// Human label shown by form builders.
    pub fn label(&self) -> &'static str {
        match self {
            FieldType::Text => "Text",
            FieldType::Number => "Number",
            FieldType::Email => "Email",
            FieldType::Date => "Date",
            FieldType::Password => "Password",
            FieldType::Textarea => "Text Area",
            FieldType::Select => "Select",
            FieldType::Checkbox => "Checkbox",
            FieldType::Radio => "Radio",
            FieldType::File => "File Upload",
        }
    }

    /// Kinds whose `options` hold a choice list.
    pub fn has_options(&self) -> bool {
        matches!(self, FieldType::Select | FieldType::Checkbox | FieldType::Radio)
    }

    /// Kinds whose value is a file locator rather than text.
    pub fn stores_file(&self) -> bool {
        matches!(self, FieldType::File)
    }

    /// Check a submitted string against the kind's expected shape.
    ///
    /// `options` is the field's declared choice list, if any. Returns a short
    /// description of the mismatch.
    pub fn check(&self, raw: &str, options: Option<&JsonValue>) -> Result<(), String> {
        let value = raw.trim();
        if value.is_empty() {
            return Ok(());
        }

        match self {
            FieldType::Number => value
                .parse::<f64>()
                .map(|_| ())
                .map_err(|_| "must be a number".to_string()),
            FieldType::Email => {
                if validator::validate_email(value) {
                    Ok(())
                } else {
                    Err("must be a valid email address".to_string())
                }
            }
            FieldType::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(|_| ())
                .map_err(|_| "must be a date in YYYY-MM-DD format".to_string()),
            FieldType::Checkbox => {
                let choices = option_values(options);
                if choices.is_empty() {
                    match value.to_ascii_lowercase().as_str() {
                        "true" | "false" | "on" | "off" | "1" | "0" => Ok(()),
                        _ => Err("must be true or false".to_string()),
                    }
                } else if value.split(',').all(|v| choices.iter().any(|c| c == v.trim())) {
                    Ok(())
                } else {
                    Err("must be one of the listed options".to_string())
                }
            }
            FieldType::Select | FieldType::Radio => {
                let choices = option_values(options);
                if choices.is_empty() || choices.iter().any(|c| c == value) {
                    Ok(())
                } else {
                    Err("must be one of the listed options".to_string())
                }
            }
            FieldType::Text
            | FieldType::Password
            | FieldType::Textarea
            | FieldType::File => Ok(()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flatten a stored choice list into comparable values.
///
/// Accepts `["a", "b"]`, `[{"value": "a", "label": "A"}]` or
/// `{"choices": [...]}`.
fn option_values(options: Option<&JsonValue>) -> Vec<String> {
    let list = match options {
        Some(JsonValue::Array(items)) => items,
        Some(JsonValue::Object(map)) => match map.get("choices") {
            Some(JsonValue::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    list.iter()
        .filter_map(|item| match item {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Object(obj) => obj.get("value").map(|v| match v {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            }),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}
