//! Typed parameter schemas and argument validation.
//!
//! A [`ToolDefinition`] describes a tool to the remote model and is the
//! contract the registry validates raw arguments against before any handler
//! runs. Validation produces [`ToolArgs`], a map holding only declared
//! parameters, coerced to their declared types, with defaults filled in.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::registry::{ToolError, ToolResult};

/// Primitive parameter types understood by the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// UTF-8 text. Numbers and booleans are coerced to their textual form.
    String,
    /// Signed 64-bit integer. Integral floats and numeric strings are accepted.
    Integer,
    /// 64-bit float. Numeric strings are accepted.
    Number,
    /// Boolean. The strings `"true"` and `"false"` are accepted.
    Boolean,
}

impl ParamType {
    /// Returns the JSON-schema type name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    /// Coerces a loosely typed value into this type.
    ///
    /// Returns `None` when no lossless coercion exists.
    #[must_use]
    pub fn coerce(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Self::String, Value::String(_))
            | (Self::Boolean, Value::Bool(_))
            | (Self::Number, Value::Number(_)) => Some(value.clone()),
            (Self::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (Self::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (Self::Integer, Value::Number(n)) => integral(n).map(Value::from),
            (Self::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (Self::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Value::from),
            (Self::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integral(number: &serde_json::Number) -> Option<i64> {
    if let Some(v) = number.as_i64() {
        return Some(v);
    }
    let v = number.as_f64()?;
    let in_range = v >= i64::MIN as f64 && v <= i64::MAX as f64;
    (v.fract() == 0.0 && in_range).then_some(v as i64)
}

/// Policy applied to argument keys the schema does not declare.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnknownArgumentPolicy {
    /// Drop undeclared keys silently.
    #[default]
    Ignore,
    /// Fail validation when an undeclared key is present.
    Reject,
}

/// One declared parameter of a tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    name: String,
    kind: ParamType,
    required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl ParameterSpec {
    /// Declares a required parameter.
    #[must_use]
    pub fn required(name: impl Into<String>, kind: ParamType) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
            description: None,
        }
    }

    /// Declares an optional parameter with no default.
    #[must_use]
    pub fn optional(name: impl Into<String>, kind: ParamType) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    /// Declares an optional parameter that falls back to `default`.
    #[must_use]
    pub fn with_default(name: impl Into<String>, kind: ParamType, default: impl Into<Value>) -> Self {
        Self {
            default: Some(default.into()),
            ..Self::optional(name, kind)
        }
    }

    /// Attaches a description advertised to the model.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared type.
    #[must_use]
    pub const fn kind(&self) -> ParamType {
        self.kind
    }

    /// Returns `true` when callers must supply the parameter.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Returns the default value, if any.
    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Name, description, and parameter schema of a tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    name: String,
    description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    parameters: Vec<ParameterSpec>,
}

impl ToolDefinition {
    /// Creates a definition without parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidMetadata`] if the name is empty or contains
    /// characters other than ASCII alphanumerics, `_` and `-`, or if the
    /// description is blank.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> ToolResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ToolError::invalid_metadata("tool name cannot be empty"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ToolError::invalid_metadata(format!(
                "tool name `{name}` may only contain ASCII letters, digits, `_` or `-`"
            )));
        }

        let description = description.into();
        if description.trim().is_empty() {
            return Err(ToolError::invalid_metadata(format!(
                "tool `{name}` requires a description"
            )));
        }

        Ok(Self {
            name,
            description,
            parameters: Vec::new(),
        })
    }

    /// Appends a parameter to the schema.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidMetadata`] when the parameter name is empty
    /// or already declared, or when its default does not match its type.
    pub fn with_parameter(mut self, mut parameter: ParameterSpec) -> ToolResult<Self> {
        if parameter.name.trim().is_empty() {
            return Err(ToolError::invalid_metadata(format!(
                "tool `{}` declares a parameter with an empty name",
                self.name
            )));
        }
        if self.parameters.iter().any(|p| p.name == parameter.name) {
            return Err(ToolError::invalid_metadata(format!(
                "tool `{}` declares parameter `{}` twice",
                self.name, parameter.name
            )));
        }
        if let Some(default) = &parameter.default {
            let coerced = parameter.kind.coerce(default).ok_or_else(|| {
                ToolError::invalid_metadata(format!(
                    "default for `{}.{}` is not a valid {}",
                    self.name, parameter.name, parameter.kind
                ))
            })?;
            parameter.default = Some(coerced);
        }

        self.parameters.push(parameter);
        Ok(self)
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the declared parameters in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    /// Renders the parameter schema as a JSON-schema object, the format
    /// function-calling model APIs expect.
    #[must_use]
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for parameter in &self.parameters {
            let mut property = Map::new();
            property.insert("type".into(), Value::from(parameter.kind.as_str()));
            if let Some(description) = &parameter.description {
                property.insert("description".into(), Value::from(description.clone()));
            }
            if let Some(default) = &parameter.default {
                property.insert("default".into(), default.clone());
            }
            properties.insert(parameter.name.clone(), Value::Object(property));

            if parameter.required {
                required.push(Value::from(parameter.name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Validates raw arguments against the schema.
    ///
    /// JSON `null` is treated the same as an absent key.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] when a required parameter is
    /// missing, a value cannot be coerced to its declared type, or an
    /// undeclared key is present under [`UnknownArgumentPolicy::Reject`].
    pub fn validate(
        &self,
        raw: &Map<String, Value>,
        policy: UnknownArgumentPolicy,
    ) -> ToolResult<ToolArgs> {
        if policy == UnknownArgumentPolicy::Reject {
            let declared: HashSet<&str> = self.parameters.iter().map(|p| p.name.as_str()).collect();
            if let Some(extra) = raw.keys().find(|key| !declared.contains(key.as_str())) {
                return Err(self.invalid(format!("unexpected argument `{extra}`")));
            }
        }

        let mut values = Map::new();
        for parameter in &self.parameters {
            match raw.get(&parameter.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    let coerced = parameter.kind.coerce(value).ok_or_else(|| {
                        self.invalid(format!(
                            "parameter `{}` expects {}, got {}",
                            parameter.name,
                            parameter.kind,
                            describe_value(value)
                        ))
                    })?;
                    values.insert(parameter.name.clone(), coerced);
                }
                None => {
                    if let Some(default) = &parameter.default {
                        values.insert(parameter.name.clone(), default.clone());
                    } else if parameter.required {
                        return Err(self.invalid(format!(
                            "missing required parameter `{}`",
                            parameter.name
                        )));
                    }
                }
            }
        }

        Ok(ToolArgs {
            tool: self.name.clone(),
            values,
        })
    }

    fn invalid(&self, reason: String) -> ToolError {
        ToolError::InvalidArguments {
            tool: self.name.clone(),
            reason,
        }
    }
}

fn describe_value(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Arguments that passed schema validation.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolArgs {
    tool: String,
    values: Map<String, Value>,
}

impl ToolArgs {
    /// Returns the raw validated value for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns a string parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] if the parameter is absent or
    /// not a string.
    pub fn str(&self, name: &str) -> ToolResult<&str> {
        self.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| self.absent(name, ParamType::String))
    }

    /// Returns an integer parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] if the parameter is absent or
    /// not an integer.
    pub fn i64(&self, name: &str) -> ToolResult<i64> {
        self.get(name)
            .and_then(Value::as_i64)
            .ok_or_else(|| self.absent(name, ParamType::Integer))
    }

    /// Returns a numeric parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] if the parameter is absent or
    /// not numeric.
    pub fn f64(&self, name: &str) -> ToolResult<f64> {
        self.get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| self.absent(name, ParamType::Number))
    }

    /// Returns a boolean parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] if the parameter is absent or
    /// not a boolean.
    pub fn bool(&self, name: &str) -> ToolResult<bool> {
        self.get(name)
            .and_then(Value::as_bool)
            .ok_or_else(|| self.absent(name, ParamType::Boolean))
    }

    /// Returns the number of validated values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when no values were supplied or defaulted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consumes the arguments, returning the underlying map.
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.values
    }

    fn absent(&self, name: &str, kind: ParamType) -> ToolError {
        ToolError::InvalidArguments {
            tool: self.tool.clone(),
            reason: format!("no {kind} argument named `{name}`"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary_definition() -> ToolDefinition {
        ToolDefinition::new("create_summary", "Summarize text")
            .unwrap()
            .with_parameter(ParameterSpec::required("text", ParamType::String))
            .unwrap()
            .with_parameter(ParameterSpec::with_default(
                "max_sentences",
                ParamType::Integer,
                3,
            ))
            .unwrap()
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn fills_defaults() {
        let validated = summary_definition()
            .validate(&args(json!({"text": "a. b."})), UnknownArgumentPolicy::Ignore)
            .unwrap();
        assert_eq!(validated.str("text").unwrap(), "a. b.");
        assert_eq!(validated.i64("max_sentences").unwrap(), 3);
    }

    #[test]
    fn stores_declared_defaults_coerced() {
        let definition = ToolDefinition::new("top", "Top results")
            .unwrap()
            .with_parameter(ParameterSpec::with_default("n", ParamType::Integer, "3"))
            .unwrap();
        assert_eq!(definition.parameters()[0].default_value(), Some(&json!(3)));

        let validated = definition
            .validate(&Map::new(), UnknownArgumentPolicy::Ignore)
            .unwrap();
        assert_eq!(validated.i64("n").unwrap(), 3);
    }

    #[test]
    fn rejects_default_of_wrong_type() {
        let err = ToolDefinition::new("top", "Top results")
            .unwrap()
            .with_parameter(ParameterSpec::with_default("n", ParamType::Integer, "many"))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidMetadata { .. }));
    }

    #[test]
    fn coerces_loose_values() {
        let validated = summary_definition()
            .validate(
                &args(json!({"text": 42, "max_sentences": "2"})),
                UnknownArgumentPolicy::Ignore,
            )
            .unwrap();
        assert_eq!(validated.str("text").unwrap(), "42");
        assert_eq!(validated.i64("max_sentences").unwrap(), 2);

        let validated = summary_definition()
            .validate(
                &args(json!({"text": "x", "max_sentences": 4.0})),
                UnknownArgumentPolicy::Ignore,
            )
            .unwrap();
        assert_eq!(validated.i64("max_sentences").unwrap(), 4);
    }

    #[test]
    fn missing_required_parameter_fails() {
        let err = summary_definition()
            .validate(&Map::new(), UnknownArgumentPolicy::Ignore)
            .expect_err("text is required");
        assert!(
            matches!(err, ToolError::InvalidArguments { ref reason, .. } if reason.contains("`text`"))
        );
    }

    #[test]
    fn null_counts_as_missing() {
        let validated = summary_definition()
            .validate(
                &args(json!({"text": "x", "max_sentences": null})),
                UnknownArgumentPolicy::Ignore,
            )
            .unwrap();
        assert_eq!(validated.i64("max_sentences").unwrap(), 3);
    }

    #[test]
    fn uncoercible_type_fails() {
        let err = summary_definition()
            .validate(
                &args(json!({"text": "x", "max_sentences": "many"})),
                UnknownArgumentPolicy::Ignore,
            )
            .expect_err("string is not an integer");
        assert!(err.to_string().contains("expects integer"));

        let err = summary_definition()
            .validate(
                &args(json!({"text": ["a"]})),
                UnknownArgumentPolicy::Ignore,
            )
            .expect_err("array is not a string");
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn unknown_keys_follow_policy() {
        let raw = args(json!({"text": "x", "verbose": true}));

        let validated = summary_definition()
            .validate(&raw, UnknownArgumentPolicy::Ignore)
            .unwrap();
        assert!(validated.get("verbose").is_none());

        let err = summary_definition()
            .validate(&raw, UnknownArgumentPolicy::Reject)
            .expect_err("reject policy");
        assert!(err.to_string().contains("unexpected argument `verbose`"));
    }

    #[test]
    fn schema_lists_required_and_defaults() {
        let schema = summary_definition().json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["text"]));
        assert_eq!(schema["properties"]["max_sentences"]["type"], "integer");
        assert_eq!(schema["properties"]["max_sentences"]["default"], 3);
    }

    #[test]
    fn definition_rejects_bad_metadata() {
        assert!(ToolDefinition::new("", "x").is_err());
        assert!(ToolDefinition::new("has space", "x").is_err());
        assert!(ToolDefinition::new("calc", " ").is_err());

        let err = ToolDefinition::new("calc", "Calculator")
            .unwrap()
            .with_parameter(ParameterSpec::with_default("n", ParamType::Integer, "ten"))
            .expect_err("default must match type");
        assert!(matches!(err, ToolError::InvalidMetadata { .. }));

        let err = ToolDefinition::new("calc", "Calculator")
            .unwrap()
            .with_parameter(ParameterSpec::required("n", ParamType::Integer))
            .unwrap()
            .with_parameter(ParameterSpec::optional("n", ParamType::Number))
            .expect_err("duplicate parameter");
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn boolean_strings_coerce() {
        assert_eq!(
            ParamType::Boolean.coerce(&json!("TRUE")),
            Some(Value::Bool(true))
        );
        assert_eq!(ParamType::Boolean.coerce(&json!("yes")), None);
        assert_eq!(ParamType::Number.coerce(&json!("2.5")), Some(json!(2.5)));
        assert_eq!(ParamType::Integer.coerce(&json!(2.5)), None);
    }
}
