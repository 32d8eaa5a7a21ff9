//! Upgrades legacy single-flag field configurations to the dual
//! daily/monthly-visibility, aggregation-aware schema.
//!
//! Legacy catalogs predate the daily/monthly split: one `is_visible` flag
//! and no aggregation method. Migration is total over a batch (one
//! malformed field yields a warning and a report entry, never an abort)
//! and idempotent, so it can run on every catalog load.

use crate::aggregation::{is_valid_aggregation_method, recommended_aggregation};
use crate::schema::{AggregationMethod, FieldCategory, FieldDefinition, FieldSource, FieldValueType};
use log::warn;
use serde::{Deserialize, Serialize};

/// A field configuration as it may exist in stored tenant data: legacy
/// (only `is_visible`), current (all flags present), or anywhere between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub category: FieldCategory,
    #[serde(default, alias = "type")]
    pub value_type: FieldValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_visible_in_daily_view: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_visible_in_monthly_view: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_method: Option<AggregationMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_source: Option<FieldSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_editable: Option<bool>,
    #[serde(default)]
    pub is_calculated: bool,
    #[serde(default)]
    pub order: u32,
}

/// What happened to one field during a migration run. Transient: rendered
/// into the report, never persisted.
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub legacy_key: String,
    pub migrated: Option<FieldDefinition>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MigrationOutcome {
    pub migrated_fields: Vec<FieldDefinition>,
    pub warnings: Vec<String>,
    pub records: Vec<MigrationRecord>,
}

/// True iff the field still carries only the legacy visibility flag.
pub fn needs_migration(config: &FieldConfig) -> bool {
    config.is_visible.is_some()
        && (config.is_visible_in_daily_view.is_none()
            || config.is_visible_in_monthly_view.is_none()
            || config.aggregation_method.is_none())
}

/// Whether a legacy-visible field belongs in the monthly view: bookkeeping
/// and text fields do not, numeric ones do.
pub fn should_show_in_monthly(config: &FieldConfig) -> bool {
    config.category != FieldCategory::Basic && config.value_type != FieldValueType::Text
}

/// Applies the legacy rules to a single field: daily visibility inherits the
/// old flag, monthly visibility additionally requires a numeric field, and
/// the aggregation method comes from the recommendation table.
pub fn migrate_single_field(config: &FieldConfig) -> FieldDefinition {
    let visible = config.is_visible.unwrap_or(true);
    FieldDefinition {
        key: config.key.clone(),
        label: config.label.clone(),
        category: config.category,
        value_type: config.value_type,
        unit: config.unit.clone(),
        is_visible_in_daily_view: visible,
        is_visible_in_monthly_view: visible && should_show_in_monthly(config),
        is_editable: config.is_editable.unwrap_or(!config.is_calculated),
        is_calculated: config.is_calculated,
        aggregation_method: recommended_aggregation(config.value_type, config.category),
        field_source: config.field_source.unwrap_or(FieldSource::Linked),
        order: config.order,
        is_visible: Some(visible),
    }
}

/// Normalizes one field, legacy or current: legacy fields go through
/// `migrate_single_field`; current fields keep their flags, with any gaps
/// filled by the same rules.
fn normalize_field(config: &FieldConfig) -> (FieldDefinition, Vec<String>) {
    let mut field = if needs_migration(config) {
        migrate_single_field(config)
    } else {
        let visible = config.is_visible.unwrap_or(true);
        FieldDefinition {
            key: config.key.clone(),
            label: config.label.clone(),
            category: config.category,
            value_type: config.value_type,
            unit: config.unit.clone(),
            is_visible_in_daily_view: config.is_visible_in_daily_view.unwrap_or(visible),
            is_visible_in_monthly_view: config
                .is_visible_in_monthly_view
                .unwrap_or_else(|| visible && should_show_in_monthly(config)),
            is_editable: config.is_editable.unwrap_or(!config.is_calculated),
            is_calculated: config.is_calculated,
            aggregation_method: config
                .aggregation_method
                .unwrap_or_else(|| recommended_aggregation(config.value_type, config.category)),
            field_source: config.field_source.unwrap_or(FieldSource::Linked),
            order: config.order,
            is_visible: config.is_visible,
        }
    };

    let mut warnings = Vec::new();
    if !is_valid_aggregation_method(&field) {
        warnings.push(format!(
            "field '{}': {:?} is not a valid rollup for {:?}; using recommendation instead",
            field.key, field.aggregation_method, field.value_type
        ));
        field.aggregation_method = recommended_aggregation(field.value_type, field.category);
    }
    if field.is_calculated && field.is_editable {
        warnings.push(format!(
            "field '{}': calculated fields are never editable; clearing the flag",
            field.key
        ));
        field.is_editable = false;
    }

    (field, warnings)
}

/// Keeps the legacy `is_visible` flag readable for code paths that predate
/// the split.
pub fn ensure_backward_compatibility(field: &mut FieldDefinition) {
    field.is_visible = Some(field.is_visible_in_daily_view);
}

/// Migrates a raw catalog. Each element is decoded independently, so a
/// malformed legacy field produces a warning and a report entry while the
/// rest of the batch migrates normally.
pub fn migrate_field_configurations(raw_fields: &[serde_json::Value]) -> MigrationOutcome {
    let mut outcome = MigrationOutcome::default();

    for (index, value) in raw_fields.iter().enumerate() {
        let legacy_key = value
            .get("key")
            .and_then(|k| k.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", index));

        match serde_json::from_value::<FieldConfig>(value.clone()) {
            Ok(config) => {
                let (field, warnings) = normalize_field(&config);
                for w in &warnings {
                    warn!("{}", w);
                }
                outcome.warnings.extend(warnings.clone());
                outcome.records.push(MigrationRecord {
                    legacy_key,
                    migrated: Some(field.clone()),
                    warnings,
                });
                outcome.migrated_fields.push(field);
            }
            Err(e) => {
                let message = format!("field '{}' could not be decoded: {}", legacy_key, e);
                warn!("{}", message);
                outcome.warnings.push(message.clone());
                outcome.records.push(MigrationRecord {
                    legacy_key,
                    migrated: None,
                    warnings: vec![message],
                });
            }
        }
    }

    outcome
}

/// Batch entry point: migrates a mixed catalog and syncs the legacy flag.
/// Idempotent: running the output through again changes nothing.
pub fn migrate_and_ensure_compatibility(raw_fields: &[serde_json::Value]) -> MigrationOutcome {
    let mut outcome = migrate_field_configurations(raw_fields);
    for field in &mut outcome.migrated_fields {
        ensure_backward_compatibility(field);
    }
    for record in &mut outcome.records {
        if let Some(field) = &mut record.migrated {
            ensure_backward_compatibility(field);
        }
    }
    outcome
}

/// Human-readable migration report, one line per field plus indented
/// warnings. Deterministic for a given input.
pub fn render_report(records: &[MigrationRecord]) -> String {
    let mut report = String::new();
    for record in records {
        match &record.migrated {
            Some(field) => {
                report.push_str(&format!(
                    "{}: daily={}, monthly={}, aggregation={:?}\n",
                    record.legacy_key,
                    field.is_visible_in_daily_view,
                    field.is_visible_in_monthly_view,
                    field.aggregation_method
                ));
            }
            None => {
                report.push_str(&format!("{}: skipped\n", record.legacy_key));
            }
        }
        for warning in &record.warnings {
            report.push_str(&format!("  warning: {}\n", warning));
        }
    }
    report
}
