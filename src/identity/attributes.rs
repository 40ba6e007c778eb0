//! Standard and custom user attributes

use crate::error::{AppError, Result};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use validator::Validate;

/// Length bounds enforced for the custom `name` attribute
pub const NAME_ATTRIBUTE_BOUNDS: RangeInclusive<u32> = 3..=35;

const MAX_STRING_ATTRIBUTE_LEN: u32 = 2048;

/// The only accepted declaration of the `email` standard attribute
pub const REQUIRED_EMAIL: StandardAttribute = StandardAttribute {
    required: true,
    mutable: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardAttribute {
    pub required: bool,
    pub mutable: bool,
}

impl Default for StandardAttribute {
    fn default() -> Self {
        Self {
            required: false,
            mutable: true,
        }
    }
}

/// Standard attributes the directory stores for every user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StandardAttributes {
    pub email: Option<StandardAttribute>,
    pub phone_number: Option<StandardAttribute>,
    pub preferred_username: Option<StandardAttribute>,
    pub fullname: Option<StandardAttribute>,
    pub given_name: Option<StandardAttribute>,
    pub family_name: Option<StandardAttribute>,
}

impl StandardAttributes {
    fn entries(&self) -> Vec<(&'static str, StandardAttribute)> {
        [
            ("email", self.email),
            ("phone_number", self.phone_number),
            ("preferred_username", self.preferred_username),
            ("name", self.fullname),
            ("given_name", self.given_name),
            ("family_name", self.family_name),
        ]
        .into_iter()
        .filter_map(|(name, attr)| attr.map(|a| (name, a)))
        .collect()
    }
}

/// Bounds of a custom string attribute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Validate)]
pub struct StringAttribute {
    pub min_len: Option<u32>,
    #[validate(range(max = 2048))]
    pub max_len: Option<u32>,
    pub mutable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomAttribute {
    String(StringAttribute),
    Number {
        min: Option<i64>,
        max: Option<i64>,
        mutable: bool,
    },
    Boolean {
        mutable: bool,
    },
    DateTime {
        mutable: bool,
    },
}

impl CustomAttribute {
    fn data_type(&self) -> &'static str {
        match self {
            CustomAttribute::String(_) => "String",
            CustomAttribute::Number { .. } => "Number",
            CustomAttribute::Boolean { .. } => "Boolean",
            CustomAttribute::DateTime { .. } => "DateTime",
        }
    }

    fn mutable(&self) -> bool {
        match self {
            CustomAttribute::String(s) => s.mutable,
            CustomAttribute::Number { mutable, .. }
            | CustomAttribute::Boolean { mutable }
            | CustomAttribute::DateTime { mutable } => *mutable,
        }
    }

    fn check(&self, name: &str) -> Result<()> {
        let field = format!("custom_attributes.{}", name);
        if name == "name" {
            match self {
                CustomAttribute::String(s) if s.mutable => {
                    return Err(AppError::invalid(&field, "must be immutable"));
                }
                CustomAttribute::String(_) => {}
                other => {
                    return Err(AppError::invalid(
                        &field,
                        format!("must be a String attribute, got {}", other.data_type()),
                    ));
                }
            }
        }
        match self {
            CustomAttribute::String(s) => {
                s.validate().map_err(|e| AppError::invalid(&field, e))?;
                if let (Some(min), Some(max)) = (s.min_len, s.max_len) {
                    if min > max {
                        return Err(AppError::invalid(
                            &field,
                            format!("min_len ({}) cannot exceed max_len ({})", min, max),
                        ));
                    }
                }
                if name == "name" {
                    let min = s.min_len.unwrap_or(0);
                    let max = s.max_len.unwrap_or(MAX_STRING_ATTRIBUTE_LEN);
                    if !NAME_ATTRIBUTE_BOUNDS.contains(&min) || !NAME_ATTRIBUTE_BOUNDS.contains(&max)
                    {
                        return Err(AppError::invalid(
                            &field,
                            format!(
                                "bounds [{}, {}] must lie within [{}, {}]",
                                min,
                                max,
                                NAME_ATTRIBUTE_BOUNDS.start(),
                                NAME_ATTRIBUTE_BOUNDS.end()
                            ),
                        ));
                    }
                }
            }
            CustomAttribute::Number {
                min: Some(min),
                max: Some(max),
                ..
            } if min > max => {
                return Err(AppError::invalid(
                    &field,
                    format!("min ({}) cannot exceed max ({})", min, max),
                ));
            }
            _ => {}
        }
        Ok(())
    }

    fn render(&self, name: &str) -> Value {
        let mut schema = Map::new();
        schema.insert("Name".to_string(), json!(name));
        schema.insert("AttributeDataType".to_string(), json!(self.data_type()));
        match self {
            CustomAttribute::String(s) if s.min_len.is_some() || s.max_len.is_some() => {
                let mut constraints = Map::new();
                if let Some(min) = s.min_len {
                    constraints.insert("MinLength".to_string(), json!(min.to_string()));
                }
                if let Some(max) = s.max_len {
                    constraints.insert("MaxLength".to_string(), json!(max.to_string()));
                }
                schema.insert(
                    "StringAttributeConstraints".to_string(),
                    Value::Object(constraints),
                );
            }
            CustomAttribute::Number { min, max, .. } if min.is_some() || max.is_some() => {
                let mut constraints = Map::new();
                if let Some(min) = min {
                    constraints.insert("MinValue".to_string(), json!(min.to_string()));
                }
                if let Some(max) = max {
                    constraints.insert("MaxValue".to_string(), json!(max.to_string()));
                }
                schema.insert(
                    "NumberAttributeConstraints".to_string(),
                    Value::Object(constraints),
                );
            }
            _ => {}
        }
        schema.insert("Mutable".to_string(), json!(self.mutable()));
        Value::Object(schema)
    }
}

/// Validate and render the directory's attribute schema
pub(crate) fn render_schema(
    standard: &StandardAttributes,
    custom: &BTreeMap<String, CustomAttribute>,
) -> Result<Vec<Value>> {
    let mut schema: Vec<Value> = standard
        .entries()
        .into_iter()
        .map(|(name, attr)| json!({ "Name": name, "Mutable": attr.mutable, "Required": attr.required }))
        .collect();

    for (name, attr) in custom {
        if name.is_empty() || name.chars().count() > 20 {
            return Err(AppError::invalid(
                "custom_attributes",
                format!("attribute name '{}' must be 1 to 20 characters", name),
            ));
        }
        attr.check(name)?;
        schema.push(attr.render(name));
    }
    Ok(schema)
}
