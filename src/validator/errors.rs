use crate::spec::ParameterLocation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable validation error codes reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MethodAndPathNotFound,
    RequiredBodyMissed,
    RequiredBodyParseError,
    RequiredBodyParameterMissed,
    RequiredBodyParameterInvalidValue,
    RequiredPathParameterMissed,
    RequiredPathParameterInvalidValue,
    RequiredQueryParameterMissed,
    RequiredQueryParameterInvalidValue,
    RequiredCookieParameterMissed,
    RequiredCookieParameterInvalidValue,
    RequiredHeaderMissed,
    RequiredHeaderInvalidValue,
    RequiredSecurityRequirementsFailed,
    UnknownParameterFound,
    UnknownValidationError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MethodAndPathNotFound => "method_and_path_not_found",
            ErrorCode::RequiredBodyMissed => "required_body_missed",
            ErrorCode::RequiredBodyParseError => "required_body_parse_error",
            ErrorCode::RequiredBodyParameterMissed => "required_body_parameter_missed",
            ErrorCode::RequiredBodyParameterInvalidValue => "required_body_parameter_invalid_value",
            ErrorCode::RequiredPathParameterMissed => "required_path_parameter_missed",
            ErrorCode::RequiredPathParameterInvalidValue => "required_path_parameter_invalid_value",
            ErrorCode::RequiredQueryParameterMissed => "required_query_parameter_missed",
            ErrorCode::RequiredQueryParameterInvalidValue => "required_query_parameter_invalid_value",
            ErrorCode::RequiredCookieParameterMissed => "required_cookie_parameter_missed",
            ErrorCode::RequiredCookieParameterInvalidValue => "required_cookie_parameter_invalid_value",
            ErrorCode::RequiredHeaderMissed => "required_header_missed",
            ErrorCode::RequiredHeaderInvalidValue => "required_header_invalid_value",
            ErrorCode::RequiredSecurityRequirementsFailed => "required_security_requirements_failed",
            ErrorCode::UnknownParameterFound => "unknown_parameter_found",
            ErrorCode::UnknownValidationError => "unknown_validation_error",
        }
    }

    /// `required_<in>_parameter_missed` for a parameter location.
    pub fn missed(location: ParameterLocation) -> Self {
        match location {
            ParameterLocation::Path => ErrorCode::RequiredPathParameterMissed,
            ParameterLocation::Query => ErrorCode::RequiredQueryParameterMissed,
            ParameterLocation::Header => ErrorCode::RequiredHeaderMissed,
            ParameterLocation::Cookie => ErrorCode::RequiredCookieParameterMissed,
        }
    }

    /// `required_<in>_parameter_invalid_value` for a parameter location.
    pub fn invalid(location: ParameterLocation) -> Self {
        match location {
            ParameterLocation::Path => ErrorCode::RequiredPathParameterInvalidValue,
            ParameterLocation::Query => ErrorCode::RequiredQueryParameterInvalidValue,
            ParameterLocation::Header => ErrorCode::RequiredHeaderInvalidValue,
            ParameterLocation::Cookie => ErrorCode::RequiredCookieParameterInvalidValue,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-field detail attached to a validation error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDetail {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_type: Option<String>,
    /// Regex source for `pattern`, or `>=x.xxxx` / `<=x.xxxx` for bounds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<String>,
}

impl FieldDetail {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn expected_type(mut self, t: Option<impl Into<String>>) -> Self {
        self.expected_type = t.map(Into::into);
        self
    }

    pub fn pattern(mut self, p: Option<String>) -> Self {
        self.pattern = p;
        self
    }

    pub fn current_value(mut self, v: Option<String>) -> Self {
        self.current_value = v;
        self
    }
}

/// One entry of the `errors[]` report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: ErrorCode,
    pub message: String,
    pub schema_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_fields_details: Vec<FieldDetail>,
}

impl ValidationError {
    pub fn new(code: ErrorCode, message: impl Into<String>, schema_id: i64) -> Self {
        Self {
            code,
            message: message.into(),
            schema_id,
            schema_version: None,
            related_fields: Vec::new(),
            related_fields_details: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        if !version.is_empty() {
            self.schema_version = Some(version.to_string());
        }
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !field.is_empty() && !self.related_fields.contains(&field) {
            self.related_fields.push(field);
        }
        self
    }

    pub fn with_detail(mut self, detail: FieldDetail) -> Self {
        self.related_fields_details.push(detail);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialized_shape_omits_empty_parts() {
        let e = ValidationError::new(ErrorCode::RequiredQueryParameterMissed, "missing", 3)
            .with_field("status");
        assert_eq!(
            serde_json::to_value(&e).unwrap(),
            json!({
                "code": "required_query_parameter_missed",
                "message": "missing",
                "schema_id": 3,
                "related_fields": ["status"]
            })
        );

        let e = ValidationError::new(ErrorCode::RequiredQueryParameterInvalidValue, "bad", 3)
            .with_version("v7")
            .with_detail(
                FieldDetail::new("ids")
                    .expected_type(Some("integer"))
                    .current_value(Some("notAnInt".to_string())),
            );
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["schema_version"], "v7");
        assert_eq!(
            v["related_fields_details"],
            json!([{"name": "ids", "expected_type": "integer", "current_value": "notAnInt"}])
        );
    }

    #[test]
    fn test_codes_match_wire_names() {
        for code in [
            ErrorCode::MethodAndPathNotFound,
            ErrorCode::RequiredHeaderInvalidValue,
            ErrorCode::UnknownValidationError,
        ] {
            assert_eq!(serde_json::to_value(code).unwrap(), json!(code.as_str()));
        }
        assert_eq!(
            ErrorCode::missed(ParameterLocation::Header),
            ErrorCode::RequiredHeaderMissed
        );
    }
}
