// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Declarative input schemas
//!
//! A tool describes its parameters with a [`Schema`] tree. One interpreter
//! validates incoming JSON against it (filling in defaults on the way) and
//! another renders it as JSON Schema for the catalog and the stream.
//!
//! Validation collects every issue instead of stopping at the first one, so a
//! caller sees all problems with a request at once.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A single validation problem, addressed by a dot-joined path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
    pub code: String,
}

impl ValidationIssue {
    fn new(path: &str, code: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
            code: code.to_string(),
        }
    }
}

/// A named member of an object schema.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
    pub required: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
}

impl Field {
    pub fn required(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            required: true,
            default: None,
            description: None,
        }
    }

    pub fn optional(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            required: false,
            ..Self::required(name, schema)
        }
    }

    /// Value substituted when the field is absent. Implies optional.
    pub fn with_default(mut self, value: Value) -> Self {
        self.required = false;
        self.default = Some(value);
        self
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }
}

#[derive(Debug, Clone)]
pub enum Schema {
    String {
        min_length: Option<usize>,
        max_length: Option<usize>,
    },
    Number {
        minimum: Option<f64>,
        maximum: Option<f64>,
        integer: bool,
    },
    Boolean,
    Enum {
        values: Vec<String>,
    },
    Array {
        items: Box<Schema>,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
    Object {
        fields: Vec<Field>,
    },
    /// Object with arbitrary keys whose values share one schema.
    Map {
        values: Box<Schema>,
    },
    Union {
        variants: Vec<Schema>,
    },
    Any,
}

impl Schema {
    pub fn string() -> Self {
        Self::String {
            min_length: None,
            max_length: None,
        }
    }

    pub fn number() -> Self {
        Self::Number {
            minimum: None,
            maximum: None,
            integer: false,
        }
    }

    pub fn integer() -> Self {
        Self::Number {
            minimum: None,
            maximum: None,
            integer: true,
        }
    }

    pub fn boolean() -> Self {
        Self::Boolean
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn array(items: Schema) -> Self {
        Self::Array {
            items: Box::new(items),
            min_items: None,
            max_items: None,
        }
    }

    pub fn object(fields: Vec<Field>) -> Self {
        Self::Object { fields }
    }

    pub fn map(values: Schema) -> Self {
        Self::Map {
            values: Box::new(values),
        }
    }

    pub fn union(variants: Vec<Schema>) -> Self {
        Self::Union { variants }
    }

    /// Lower bound: length for strings, value for numbers, size for arrays.
    /// No effect on other kinds.
    pub fn min(mut self, bound: f64) -> Self {
        match &mut self {
            Self::String { min_length, .. } => *min_length = Some(bound as usize),
            Self::Number { minimum, .. } => *minimum = Some(bound),
            Self::Array { min_items, .. } => *min_items = Some(bound as usize),
            _ => {}
        }
        self
    }

    /// Upper bound, mirror of [`Schema::min`].
    pub fn max(mut self, bound: f64) -> Self {
        match &mut self {
            Self::String { max_length, .. } => *max_length = Some(bound as usize),
            Self::Number { maximum, .. } => *maximum = Some(bound),
            Self::Array { max_items, .. } => *max_items = Some(bound as usize),
            _ => {}
        }
        self
    }

    /// Validate `value`, returning a copy with defaults applied.
    ///
    /// Unknown object keys are dropped from the output.
    pub fn validate(&self, value: &Value) -> Result<Value, Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        let out = self.check(value, "", &mut issues);
        if issues.is_empty() {
            Ok(out)
        } else {
            Err(issues)
        }
    }

    fn check(&self, value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) -> Value {
        match self {
            Self::Any => value.clone(),
            Self::String {
                min_length,
                max_length,
            } => {
                let Some(s) = value.as_str() else {
                    issues.push(type_issue(path, "string", value));
                    return Value::Null;
                };
                let len = s.chars().count();
                if let Some(min) = min_length {
                    if len < *min {
                        issues.push(ValidationIssue::new(
                            path,
                            "too_small",
                            format!("String must contain at least {min} character(s)"),
                        ));
                    }
                }
                if let Some(max) = max_length {
                    if len > *max {
                        issues.push(ValidationIssue::new(
                            path,
                            "too_big",
                            format!("String must contain at most {max} character(s)"),
                        ));
                    }
                }
                value.clone()
            }
            Self::Number {
                minimum,
                maximum,
                integer,
            } => {
                let Some(n) = value.as_f64() else {
                    issues.push(type_issue(path, "number", value));
                    return Value::Null;
                };
                if *integer && n.fract() != 0.0 {
                    issues.push(ValidationIssue::new(
                        path,
                        "invalid_type",
                        "Expected integer, received float",
                    ));
                }
                if let Some(min) = minimum {
                    if n < *min {
                        issues.push(ValidationIssue::new(
                            path,
                            "too_small",
                            format!("Number must be greater than or equal to {min}"),
                        ));
                    }
                }
                if let Some(max) = maximum {
                    if n > *max {
                        issues.push(ValidationIssue::new(
                            path,
                            "too_big",
                            format!("Number must be less than or equal to {max}"),
                        ));
                    }
                }
                // Integral floats such as `10000.0` are handed on as integers.
                if *integer && value.is_f64() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    return Value::from(n as i64);
                }
                value.clone()
            }
            Self::Boolean => {
                if !value.is_boolean() {
                    issues.push(type_issue(path, "boolean", value));
                }
                value.clone()
            }
            Self::Enum { values } => {
                let Some(s) = value.as_str() else {
                    issues.push(type_issue(path, "string", value));
                    return Value::Null;
                };
                if !values.iter().any(|v| v == s) {
                    let expected = values
                        .iter()
                        .map(|v| format!("'{v}'"))
                        .collect::<Vec<_>>()
                        .join(" | ");
                    issues.push(ValidationIssue::new(
                        path,
                        "invalid_enum_value",
                        format!("Invalid enum value. Expected {expected}, received '{s}'"),
                    ));
                }
                value.clone()
            }
            Self::Array {
                items,
                min_items,
                max_items,
            } => {
                let Some(elements) = value.as_array() else {
                    issues.push(type_issue(path, "array", value));
                    return Value::Null;
                };
                if let Some(min) = min_items {
                    if elements.len() < *min {
                        issues.push(ValidationIssue::new(
                            path,
                            "too_small",
                            format!("Array must contain at least {min} element(s)"),
                        ));
                    }
                }
                if let Some(max) = max_items {
                    if elements.len() > *max {
                        issues.push(ValidationIssue::new(
                            path,
                            "too_big",
                            format!("Array must contain at most {max} element(s)"),
                        ));
                    }
                }
                Value::Array(
                    elements
                        .iter()
                        .enumerate()
                        .map(|(i, item)| items.check(item, &join(path, &i.to_string()), issues))
                        .collect(),
                )
            }
            Self::Object { fields } => {
                let Some(input) = value.as_object() else {
                    issues.push(type_issue(path, "object", value));
                    return Value::Null;
                };
                let mut out = Map::new();
                for field in fields {
                    let field_path = join(path, &field.name);
                    match input.get(&field.name) {
                        Some(v) if !v.is_null() => {
                            let checked = field.schema.check(v, &field_path, issues);
                            out.insert(field.name.clone(), checked);
                        }
                        _ => {
                            if let Some(default) = &field.default {
                                out.insert(field.name.clone(), default.clone());
                            } else if field.required {
                                issues.push(ValidationIssue::new(
                                    &field_path,
                                    "required",
                                    "Required",
                                ));
                            }
                        }
                    }
                }
                Value::Object(out)
            }
            Self::Map { values } => {
                let Some(input) = value.as_object() else {
                    issues.push(type_issue(path, "object", value));
                    return Value::Null;
                };
                Value::Object(
                    input
                        .iter()
                        .map(|(k, v)| (k.clone(), values.check(v, &join(path, k), issues)))
                        .collect(),
                )
            }
            Self::Union { variants } => {
                for variant in variants {
                    let mut scratch = Vec::new();
                    let out = variant.check(value, path, &mut scratch);
                    if scratch.is_empty() {
                        return out;
                    }
                }
                issues.push(ValidationIssue::new(path, "invalid_union", "Invalid input"));
                Value::Null
            }
        }
    }

    /// Render as a JSON Schema document.
    pub fn to_json_schema(&self) -> Value {
        match self {
            Self::Any => json!({}),
            Self::String {
                min_length,
                max_length,
            } => {
                let mut obj = json!({ "type": "string" });
                insert_opt(&mut obj, "minLength", min_length.map(Value::from));
                insert_opt(&mut obj, "maxLength", max_length.map(Value::from));
                obj
            }
            Self::Number {
                minimum,
                maximum,
                integer,
            } => {
                let kind = if *integer { "integer" } else { "number" };
                let mut obj = json!({ "type": kind });
                insert_opt(&mut obj, "minimum", minimum.map(number_value));
                insert_opt(&mut obj, "maximum", maximum.map(number_value));
                obj
            }
            Self::Boolean => json!({ "type": "boolean" }),
            Self::Enum { values } => json!({ "type": "string", "enum": values }),
            Self::Array {
                items,
                min_items,
                max_items,
            } => {
                let mut obj = json!({ "type": "array", "items": items.to_json_schema() });
                insert_opt(&mut obj, "minItems", min_items.map(Value::from));
                insert_opt(&mut obj, "maxItems", max_items.map(Value::from));
                obj
            }
            Self::Object { fields } => {
                let mut properties = Map::new();
                let mut required = Vec::new();
                for field in fields {
                    let mut prop = field.schema.to_json_schema();
                    insert_opt(&mut prop, "default", field.default.clone());
                    insert_opt(
                        &mut prop,
                        "description",
                        field.description.clone().map(Value::from),
                    );
                    properties.insert(field.name.clone(), prop);
                    if field.required {
                        required.push(Value::from(field.name.clone()));
                    }
                }
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                })
            }
            Self::Map { values } => json!({
                "type": "object",
                "additionalProperties": values.to_json_schema(),
            }),
            Self::Union { variants } => json!({
                "anyOf": variants.iter().map(Schema::to_json_schema).collect::<Vec<_>>(),
            }),
        }
    }
}

fn join(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}.{child}")
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_issue(path: &str, expected: &str, value: &Value) -> ValidationIssue {
    ValidationIssue::new(
        path,
        "invalid_type",
        format!("Expected {expected}, received {}", type_name(value)),
    )
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

fn insert_opt(target: &mut Value, key: &str, value: Option<Value>) {
    if let (Some(obj), Some(v)) = (target.as_object_mut(), value) {
        obj.insert(key.to_string(), v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command_schema() -> Schema {
        Schema::object(vec![
            Field::required("command", Schema::string().min(1.0)),
            Field::optional("args", Schema::array(Schema::string())).with_default(json!([])),
            Field::optional("timeout", Schema::integer().min(1000.0).max(30000.0))
                .with_default(json!(10000)),
            Field::optional("env", Schema::map(Schema::string())),
        ])
    }

    #[test]
    fn test_defaults_are_applied() {
        let out = command_schema()
            .validate(&json!({ "command": "ls" }))
            .unwrap();
        assert_eq!(out, json!({ "command": "ls", "args": [], "timeout": 10000 }));
    }

    #[test]
    fn test_missing_required_field() {
        let issues = command_schema().validate(&json!({})).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "command");
        assert_eq!(issues[0].code, "required");
    }

    #[test]
    fn test_collects_every_issue_with_nested_paths() {
        let issues = command_schema()
            .validate(&json!({
                "command": "",
                "args": ["-l", 3],
                "timeout": 50,
                "env": { "HOME": false }
            }))
            .unwrap_err();

        let paths: Vec<_> = issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["command", "args.1", "timeout", "env.HOME"]);
        assert_eq!(issues[0].code, "too_small");
        assert_eq!(issues[1].code, "invalid_type");
        assert_eq!(issues[2].code, "too_small");
    }

    #[test]
    fn test_enum_and_integer_checks() {
        let schema = Schema::object(vec![
            Field::required("op", Schema::enumeration(["read", "write"])),
            Field::required("n", Schema::integer()),
        ]);
        let issues = schema
            .validate(&json!({ "op": "delete", "n": 1.5 }))
            .unwrap_err();
        assert_eq!(issues[0].code, "invalid_enum_value");
        assert!(issues[0].message.contains("'read' | 'write'"));
        assert_eq!(issues[1].code, "invalid_type");
    }

    #[test]
    fn test_integral_float_becomes_integer() {
        let out = command_schema()
            .validate(&json!({ "command": "echo", "timeout": 10000.0 }))
            .unwrap();
        assert!(out["timeout"].is_i64());
        assert_eq!(out["timeout"].as_u64(), Some(10000));

        let plain = Schema::number().validate(&json!(2.0)).unwrap();
        assert!(plain.is_f64());
    }

    #[test]
    fn test_unknown_keys_are_dropped() {
        let schema = Schema::object(vec![Field::required("text", Schema::string())]);
        let out = schema
            .validate(&json!({ "text": "hi", "extra": 1 }))
            .unwrap();
        assert_eq!(out, json!({ "text": "hi" }));
    }

    #[test]
    fn test_union_picks_first_matching_variant() {
        let schema = Schema::union(vec![Schema::integer(), Schema::string()]);
        assert_eq!(schema.validate(&json!("x")).unwrap(), json!("x"));
        let issues = schema.validate(&json!(true)).unwrap_err();
        assert_eq!(issues[0].code, "invalid_union");
    }

    #[test]
    fn test_root_type_mismatch() {
        let issues = command_schema().validate(&json!("nope")).unwrap_err();
        assert_eq!(issues[0].path, "");
        assert_eq!(issues[0].message, "Expected object, received string");
    }

    #[test]
    fn test_json_schema_rendering() {
        let rendered = command_schema().to_json_schema();
        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["required"], json!(["command"]));
        assert_eq!(rendered["properties"]["command"]["minLength"], 1);
        assert_eq!(rendered["properties"]["timeout"]["type"], "integer");
        assert_eq!(rendered["properties"]["timeout"]["maximum"], 30000);
        assert_eq!(rendered["properties"]["args"]["default"], json!([]));
        assert_eq!(
            rendered["properties"]["env"]["additionalProperties"]["type"],
            "string"
        );
    }
}
