use regex::Regex;
use serde_json::{Map, Value, json};

use crate::error::{FieldViolation, SchemaViolation};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    pub fn wire_name(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.as_i64().is_some() || value.as_u64().is_some(),
            FieldType::Number => value.as_f64().is_some(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
        }
    }
}

/// Declared type plus the constraint subset tools may put on one argument.
#[derive(Clone, Debug)]
pub struct FieldSpec {
    field_type: FieldType,
    description: Option<String>,
    required: bool,
    minimum: Option<f64>,
    maximum: Option<f64>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<Regex>,
    allowed: Option<Vec<Value>>,
}

impl FieldSpec {
    fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            description: None,
            required: false,
            minimum: None,
            maximum: None,
            min_length: None,
            max_length: None,
            pattern: None,
            allowed: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn integer() -> Self {
        Self::new(FieldType::Integer)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn object() -> Self {
        Self::new(FieldType::Object)
    }

    pub fn array() -> Self {
        Self::new(FieldType::Array)
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn minimum(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    pub fn maximum(mut self, maximum: f64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    pub fn min_length(mut self, min_length: usize) -> Self {
        self.min_length = Some(min_length);
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn one_of(mut self, allowed: Vec<Value>) -> Self {
        self.allowed = Some(allowed);
        self
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    fn check(&self, field: &str, value: &Value, violations: &mut Vec<FieldViolation>) {
        if !self.field_type.matches(value) {
            violations.push(FieldViolation {
                field: field.to_string(),
                message: format!("must be of type {}", self.field_type.wire_name()),
            });
            // remaining constraints assume the declared type
            return;
        }

        if let Some(number) = value.as_f64() {
            if let Some(minimum) = self.minimum {
                if number < minimum {
                    violations.push(FieldViolation {
                        field: field.to_string(),
                        message: format!("must be >= {minimum}"),
                    });
                }
            }
            if let Some(maximum) = self.maximum {
                if number > maximum {
                    violations.push(FieldViolation {
                        field: field.to_string(),
                        message: format!("must be <= {maximum}"),
                    });
                }
            }
        }

        if let Some(text) = value.as_str() {
            let length = text.chars().count();
            if let Some(min_length) = self.min_length {
                if length < min_length {
                    violations.push(FieldViolation {
                        field: field.to_string(),
                        message: format!("must have at least {min_length} characters"),
                    });
                }
            }
            if let Some(max_length) = self.max_length {
                if length > max_length {
                    violations.push(FieldViolation {
                        field: field.to_string(),
                        message: format!("must have at most {max_length} characters"),
                    });
                }
            }
            if let Some(pattern) = &self.pattern {
                if !pattern.is_match(text) {
                    violations.push(FieldViolation {
                        field: field.to_string(),
                        message: format!("must match pattern {}", pattern.as_str()),
                    });
                }
            }
        }

        if let Some(allowed) = &self.allowed {
            if !allowed.contains(value) {
                let rendered = allowed
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                violations.push(FieldViolation {
                    field: field.to_string(),
                    message: format!("must be one of {rendered}"),
                });
            }
        }
    }

    fn to_json_value(&self) -> Value {
        let mut spec = Map::new();
        spec.insert(
            "type".to_string(),
            Value::String(self.field_type.wire_name().to_string()),
        );
        if let Some(description) = &self.description {
            spec.insert(
                "description".to_string(),
                Value::String(description.clone()),
            );
        }
        if let Some(minimum) = self.minimum {
            spec.insert("minimum".to_string(), json!(minimum));
        }
        if let Some(maximum) = self.maximum {
            spec.insert("maximum".to_string(), json!(maximum));
        }
        if let Some(min_length) = self.min_length {
            spec.insert("minLength".to_string(), json!(min_length));
        }
        if let Some(max_length) = self.max_length {
            spec.insert("maxLength".to_string(), json!(max_length));
        }
        if let Some(pattern) = &self.pattern {
            spec.insert(
                "pattern".to_string(),
                Value::String(pattern.as_str().to_string()),
            );
        }
        if let Some(allowed) = &self.allowed {
            spec.insert("enum".to_string(), Value::Array(allowed.clone()));
        }
        Value::Object(spec)
    }
}

/// Argument schema for one tool: named fields in declaration order.
///
/// Unknown fields are rejected unless [`InputSchema::permit_unknown_fields`]
/// is set, and validation reports every failing field in one pass.
#[derive(Clone, Debug, Default)]
pub struct InputSchema {
    fields: Vec<(String, FieldSpec)>,
    allow_unknown: bool,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.push((name.into(), spec));
        self
    }

    pub fn permit_unknown_fields(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn validate(&self, tool: &str, args: &Value) -> Result<(), SchemaViolation> {
        let Some(args_obj) = args.as_object() else {
            return Err(SchemaViolation {
                tool: tool.to_string(),
                violations: vec![FieldViolation {
                    field: "arguments".to_string(),
                    message: "must be a JSON object".to_string(),
                }],
            });
        };

        let mut violations = Vec::new();

        for (name, spec) in &self.fields {
            match args_obj.get(name) {
                Some(value) => spec.check(name, value, &mut violations),
                None => {
                    if spec.required {
                        violations.push(FieldViolation {
                            field: name.clone(),
                            message: "required field is missing".to_string(),
                        });
                    }
                }
            }
        }

        if !self.allow_unknown {
            for key in args_obj.keys() {
                if !self.fields.iter().any(|(name, _)| name == key) {
                    violations.push(FieldViolation {
                        field: key.clone(),
                        message: "unknown field".to_string(),
                    });
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaViolation {
                tool: tool.to_string(),
                violations,
            })
        }
    }

    /// Renders the equivalent JSON-schema object handed to the model.
    pub fn to_json_value(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (name, spec) in &self.fields {
            properties.insert(name.clone(), spec.to_json_value());
            if spec.required {
                required.push(Value::String(name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": self.allow_unknown,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn quote_schema() -> InputSchema {
        InputSchema::new()
            .field(
                "age",
                FieldSpec::integer().required().minimum(16.0).maximum(100.0),
            )
            .field(
                "vehicle",
                FieldSpec::string()
                    .required()
                    .min_length(2)
                    .max_length(32)
                    .pattern(Regex::new(r"^[a-z0-9 ]+$").expect("valid pattern")),
            )
            .field(
                "coverage",
                FieldSpec::string().one_of(vec![json!("basic"), json!("full")]),
            )
    }

    #[test]
    fn accepts_arguments_that_satisfy_every_constraint() {
        let args = json!({"age": 30, "vehicle": "sedan", "coverage": "full"});
        assert!(quote_schema().validate("quote", &args).is_ok());
    }

    #[test]
    fn rejects_non_object_arguments() {
        let err = quote_schema()
            .validate("quote", &json!("nope"))
            .expect_err("should fail");

        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].field, "arguments");
    }

    #[test]
    fn reports_missing_required_field() {
        let err = quote_schema()
            .validate("quote", &json!({"age": 30}))
            .expect_err("should fail");

        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].field, "vehicle");
        assert!(err.violations[0].message.contains("required"));
    }

    #[test]
    fn reports_type_mismatch_per_field() {
        let err = quote_schema()
            .validate("quote", &json!({"age": "old", "vehicle": 7}))
            .expect_err("should fail");

        let fields: Vec<&str> = err.violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["age", "vehicle"]);
        assert!(err.violations[0].message.contains("integer"));
        assert!(err.violations[1].message.contains("string"));
    }

    #[test]
    fn collects_every_violation_in_declaration_order() {
        let err = quote_schema()
            .validate("quote", &json!({"age": 121, "coverage": "gold"}))
            .expect_err("should fail");

        let fields: Vec<&str> = err.violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["age", "vehicle", "coverage"]);
        assert!(err.to_string().contains("age"));
        assert!(err.to_string().contains("vehicle"));
        assert!(err.to_string().contains("coverage"));
    }

    #[test]
    fn enforces_numeric_range() {
        let low = quote_schema()
            .validate("quote", &json!({"age": 12, "vehicle": "sedan"}))
            .expect_err("should fail");
        assert!(low.violations[0].message.contains(">= 16"));

        let high = quote_schema()
            .validate("quote", &json!({"age": 130, "vehicle": "sedan"}))
            .expect_err("should fail");
        assert!(high.violations[0].message.contains("<= 100"));
    }

    #[test]
    fn enforces_string_length_and_pattern() {
        let short = quote_schema()
            .validate("quote", &json!({"age": 30, "vehicle": "x"}))
            .expect_err("should fail");
        assert!(short.violations[0].message.contains("at least 2"));

        let bad_pattern = quote_schema()
            .validate("quote", &json!({"age": 30, "vehicle": "SEDAN!"}))
            .expect_err("should fail");
        assert!(bad_pattern.violations[0].message.contains("pattern"));
    }

    #[test]
    fn enforces_enum_membership() {
        let err = quote_schema()
            .validate(
                "quote",
                &json!({"age": 30, "vehicle": "sedan", "coverage": "gold"}),
            )
            .expect_err("should fail");

        assert_eq!(err.violations[0].field, "coverage");
        assert!(err.violations[0].message.contains("basic"));
    }

    #[test]
    fn rejects_unknown_fields_unless_permitted() {
        let err = quote_schema()
            .validate(
                "quote",
                &json!({"age": 30, "vehicle": "sedan", "extra": true}),
            )
            .expect_err("should fail");
        assert!(err.violations.iter().any(|v| v.field == "extra"));

        let relaxed = InputSchema::new()
            .field("age", FieldSpec::integer())
            .permit_unknown_fields();
        assert!(relaxed.validate("quote", &json!({"extra": true})).is_ok());
    }

    #[test]
    fn renders_json_schema_wire_shape() {
        let value = quote_schema().to_json_value();

        assert_eq!(value["type"], "object");
        assert_eq!(value["properties"]["age"]["type"], "integer");
        assert_eq!(value["properties"]["age"]["minimum"], 16.0);
        assert_eq!(value["properties"]["vehicle"]["minLength"], 2);
        assert_eq!(value["properties"]["vehicle"]["pattern"], "^[a-z0-9 ]+$");
        assert_eq!(value["properties"]["coverage"]["enum"][0], "basic");
        assert_eq!(value["required"], json!(["age", "vehicle"]));
        assert_eq!(value["additionalProperties"], false);
    }
}
