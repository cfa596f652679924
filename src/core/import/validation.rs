//! Rule-based row validation

use serde_json::Value;

use super::capabilities::{RowValidation, ValidationEngine};
use super::mapping::required_fields;
use super::types::{FieldMapping, ImportType, MappedFields};

const MAX_NAME_LENGTH: usize = 255;
const SUSPICIOUS_PRICE: f64 = 10_000.0;

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(_) => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Required-field and per-import-type typed checks
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleValidationEngine;

impl RuleValidationEngine {
    pub fn new() -> Self {
        Self
    }

    fn check_name(row: &MappedFields, errors: &mut Vec<String>) {
        if let Some(Value::String(name)) = row.get("name") {
            if name.chars().count() > MAX_NAME_LENGTH {
                errors.push(format!(
                    "name must be at most {} characters",
                    MAX_NAME_LENGTH
                ));
            }
        }
    }

    fn check_menu(row: &MappedFields, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
        if let Some(price) = row.get("price").filter(|v| !v.is_null()) {
            match as_number(price) {
                None => errors.push(format!("price must be a number, got {}", price)),
                Some(p) if p < 0.0 => errors.push("price cannot be negative".to_string()),
                Some(p) if p == 0.0 => warnings.push("price is zero".to_string()),
                Some(p) if p > SUSPICIOUS_PRICE => {
                    warnings.push(format!("price {} looks unusually high", p))
                }
                Some(_) => {}
            }
        }
        if is_blank(row.get("category")) {
            warnings.push("item has no category".to_string());
        }
    }

    fn check_category(row: &MappedFields, errors: &mut Vec<String>) {
        if let Some(order) = row.get("sort_order").filter(|v| !v.is_null()) {
            match as_number(order) {
                Some(n) if n.fract() == 0.0 => {}
                _ => errors.push(format!("sort_order must be a whole number, got {}", order)),
            }
        }
    }
}

impl ValidationEngine for RuleValidationEngine {
    fn validate_row(
        &self,
        row: &MappedFields,
        _row_number: usize,
        mapping: &FieldMapping,
        import_type: ImportType,
    ) -> RowValidation {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for field in required_fields(import_type) {
            if !mapping.targets(field) {
                errors.push(format!("no column is mapped to required field {}", field));
            } else if is_blank(row.get(field)) {
                errors.push(format!("{} is required", field));
            }
        }

        Self::check_name(row, &mut errors);
        match import_type {
            ImportType::Menu => Self::check_menu(row, &mut errors, &mut warnings),
            ImportType::Category => Self::check_category(row, &mut errors),
        }

        RowValidation::from_findings(errors, warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> MappedFields {
        value.as_object().cloned().unwrap()
    }

    fn menu_mapping() -> FieldMapping {
        FieldMapping::new()
            .map("Name", "name")
            .map("Price", "price")
            .map("Category", "category")
    }

    #[test]
    fn test_valid_menu_row() {
        let engine = RuleValidationEngine::new();
        let result = engine.validate_row(
            &fields(json!({"name": "Burger", "price": 9.5, "category": "Mains"})),
            0,
            &menu_mapping(),
            ImportType::Menu,
        );
        assert!(result.valid);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_missing_required_and_bad_price() {
        let engine = RuleValidationEngine::new();
        let result = engine.validate_row(
            &fields(json!({"name": "  ", "price": -1})),
            3,
            &menu_mapping(),
            ImportType::Menu,
        );
        assert!(!result.valid);
        assert!(result.errors.contains(&"name is required".to_string()));
        assert!(result.errors.contains(&"price cannot be negative".to_string()));
        assert!(result.warnings.contains(&"item has no category".to_string()));
    }

    #[test]
    fn test_unmapped_required_field() {
        let engine = RuleValidationEngine::new();
        let result = engine.validate_row(
            &fields(json!({"name": "Burger"})),
            0,
            &FieldMapping::new().map("Name", "name"),
            ImportType::Menu,
        );
        assert_eq!(
            result.errors,
            vec!["no column is mapped to required field price".to_string()]
        );
    }

    #[test]
    fn test_suspicious_values_warn_only() {
        let engine = RuleValidationEngine::new();
        let result = engine.validate_row(
            &fields(json!({"name": "Caviar", "price": 25000, "category": "Luxury"})),
            0,
            &menu_mapping(),
            ImportType::Menu,
        );
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_category_sort_order() {
        let engine = RuleValidationEngine::new();
        let mapping = FieldMapping::new().map("Name", "name").map("Pos", "sort_order");
        let bad = engine.validate_row(
            &fields(json!({"name": "Drinks", "sort_order": 1.5})),
            0,
            &mapping,
            ImportType::Category,
        );
        assert!(!bad.valid);

        let good = engine.validate_row(
            &fields(json!({"name": "Drinks", "sort_order": 2})),
            0,
            &mapping,
            ImportType::Category,
        );
        assert!(good.valid);
    }
}
