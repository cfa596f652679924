//! Alias-table column mapper

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};

use super::capabilities::FieldMapper;
use super::types::{FieldMapping, FieldRule, FieldTransform, ImportType, MappedFields, RawRow};
use crate::utils::error::{ImportError, Result};

static NON_ALNUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("Invalid header normalisation regex"));

static NUMERIC_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s,$€£¥]").expect("Invalid numeric cleanup regex"));

/// A target field, the header aliases that detect it and its default transform
struct TargetField {
    name: &'static str,
    required: bool,
    aliases: &'static [&'static str],
    transform: Option<FieldTransform>,
}

const MENU_FIELDS: &[TargetField] = &[
    TargetField {
        name: "name",
        required: true,
        aliases: &["name", "item_name", "item", "product", "product_name", "title", "dish"],
        transform: Some(FieldTransform::Trim),
    },
    TargetField {
        name: "price",
        required: true,
        aliases: &["price", "cost", "amount", "unit_price", "item_price"],
        transform: Some(FieldTransform::Number),
    },
    TargetField {
        name: "description",
        required: false,
        aliases: &["description", "desc", "details"],
        transform: Some(FieldTransform::Trim),
    },
    TargetField {
        name: "category",
        required: false,
        aliases: &["category", "category_name", "section", "group"],
        transform: Some(FieldTransform::Trim),
    },
    TargetField {
        name: "external_id",
        required: false,
        aliases: &["external_id", "sku", "id", "item_id", "code", "product_code"],
        transform: Some(FieldTransform::Trim),
    },
    TargetField {
        name: "is_available",
        required: false,
        aliases: &["available", "is_available", "active", "in_stock"],
        transform: Some(FieldTransform::Boolean),
    },
];

const CATEGORY_FIELDS: &[TargetField] = &[
    TargetField {
        name: "name",
        required: true,
        aliases: &["name", "category", "category_name", "title"],
        transform: Some(FieldTransform::Trim),
    },
    TargetField {
        name: "description",
        required: false,
        aliases: &["description", "desc", "details"],
        transform: Some(FieldTransform::Trim),
    },
    TargetField {
        name: "external_id",
        required: false,
        aliases: &["external_id", "id", "code", "category_id"],
        transform: Some(FieldTransform::Trim),
    },
    TargetField {
        name: "sort_order",
        required: false,
        aliases: &["sort_order", "position", "order", "rank"],
        transform: Some(FieldTransform::Number),
    },
    TargetField {
        name: "parent",
        required: false,
        aliases: &["parent", "parent_category", "parent_name"],
        transform: Some(FieldTransform::Trim),
    },
];

fn target_fields(import_type: ImportType) -> &'static [TargetField] {
    match import_type {
        ImportType::Menu => MENU_FIELDS,
        ImportType::Category => CATEGORY_FIELDS,
    }
}

/// Required target fields of an import type
pub fn required_fields(import_type: ImportType) -> impl Iterator<Item = &'static str> {
    target_fields(import_type)
        .iter()
        .filter(|field| field.required)
        .map(|field| field.name)
}

/// "Item Name " -> "item_name"
pub fn normalize_header(header: &str) -> String {
    NON_ALNUM
        .replace_all(&header.trim().to_lowercase(), "_")
        .trim_matches('_')
        .to_string()
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

/// Field mapper driven by per-import-type alias tables
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnFieldMapper;

impl ColumnFieldMapper {
    pub fn new() -> Self {
        Self
    }

    fn transform(column: &str, value: &Value, transform: FieldTransform) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match transform {
            FieldTransform::Trim => Ok(match value {
                Value::String(text) => Value::String(text.trim().to_string()),
                other => other.clone(),
            }),
            FieldTransform::Lowercase => Ok(match value {
                Value::String(text) => Value::String(text.to_lowercase()),
                other => other.clone(),
            }),
            FieldTransform::Uppercase => Ok(match value {
                Value::String(text) => Value::String(text.to_uppercase()),
                other => other.clone(),
            }),
            FieldTransform::Number => match value {
                Value::Number(_) => Ok(value.clone()),
                Value::String(text) if text.trim().is_empty() => Ok(Value::Null),
                Value::String(text) => NUMERIC_NOISE
                    .replace_all(text, "")
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| {
                        ImportError::mapping(format!(
                            "column '{}': '{}' is not a number",
                            column, text
                        ))
                    }),
                other => Err(ImportError::mapping(format!(
                    "column '{}': {} is not a number",
                    column, other
                ))),
            },
            FieldTransform::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|n| n != 0.0))),
                Value::String(text) => match text.trim().to_lowercase().as_str() {
                    "" => Ok(Value::Null),
                    "true" | "yes" | "y" | "1" | "available" => Ok(Value::Bool(true)),
                    "false" | "no" | "n" | "0" | "unavailable" => Ok(Value::Bool(false)),
                    _ => Err(ImportError::mapping(format!(
                        "column '{}': '{}' is not a boolean",
                        column, text
                    ))),
                },
                other => Err(ImportError::mapping(format!(
                    "column '{}': {} is not a boolean",
                    column, other
                ))),
            },
        }
    }
}

impl FieldMapper for ColumnFieldMapper {
    fn detect_mappings(
        &self,
        headers: &[String],
        sample: &[RawRow],
        import_type: ImportType,
    ) -> FieldMapping {
        let mut mapping = FieldMapping::new();

        for header in headers {
            // A column that is blank across the whole sample carries no signal
            if !sample.is_empty()
                && sample
                    .iter()
                    .all(|row| row.get(header).is_none_or(is_blank))
            {
                continue;
            }

            let normalized = normalize_header(header);
            let detected = target_fields(import_type).iter().find(|field| {
                field.aliases.contains(&normalized.as_str()) && !mapping.targets(field.name)
            });

            if let Some(field) = detected {
                mapping.rules.insert(
                    header.clone(),
                    FieldRule {
                        target: field.name.to_string(),
                        transform: field.transform,
                    },
                );
            }
        }

        mapping
    }

    fn apply_mappings(&self, row: &RawRow, mapping: &FieldMapping) -> Result<MappedFields> {
        let mut mapped = MappedFields::new();
        for (source, rule) in &mapping.rules {
            let Some(value) = row.get(source) else {
                continue;
            };
            let value = match rule.transform {
                Some(transform) => Self::transform(source, value, transform)?,
                None => value.clone(),
            };
            mapped.insert(rule.target.clone(), value);
        }
        Ok(mapped)
    }

    fn confidence(&self, mapping: &FieldMapping, import_type: ImportType) -> u8 {
        let fields = target_fields(import_type);
        let weight = |field: &TargetField| if field.required { 2 } else { 1 };

        let total: u32 = fields.iter().map(weight).sum();
        let detected: u32 = fields
            .iter()
            .filter(|field| mapping.targets(field.name))
            .map(weight)
            .sum();

        (detected * 100 / total.max(1)) as u8
    }
}
