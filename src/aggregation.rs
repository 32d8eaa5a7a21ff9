use crate::record::{DailyRecord, MonthlySummary};
use crate::schema::{AggregationMethod, FieldCategory, FieldDefinition, FieldSource, FieldValueType};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Rolls a field's daily values up into one monthly number.
///
/// Values that are absent, empty, or non-numeric are dropped from the
/// reduction, not zero-padded: a month with five valid entries averages over
/// five, no matter how many days the month has. Zero valid values yield
/// `None`.
pub fn aggregate<'a, I>(records: I, field: &FieldDefinition) -> Option<f64>
where
    I: IntoIterator<Item = &'a DailyRecord>,
{
    if field.aggregation_method == AggregationMethod::None {
        return None;
    }

    let values: Vec<f64> = records
        .into_iter()
        .filter_map(|r| r.number(&field.key))
        .collect();

    if values.is_empty() {
        return None;
    }

    let total: f64 = values.iter().sum();
    Some(match field.aggregation_method {
        AggregationMethod::Average => total / values.len() as f64,
        _ => total,
    })
}

/// Builds the monthly summary for every aggregatable field: linked fields
/// whose method is not `None`, iterated by `order` so warnings and debug
/// output are deterministic.
pub fn aggregate_all(
    daily: &BTreeMap<NaiveDate, DailyRecord>,
    fields: &[FieldDefinition],
) -> MonthlySummary {
    let mut ordered: Vec<&FieldDefinition> = fields
        .iter()
        .filter(|f| {
            f.field_source == FieldSource::Linked
                && f.aggregation_method != AggregationMethod::None
        })
        .collect();
    ordered.sort_by_key(|f| f.order);

    let mut summary = MonthlySummary::new();
    for field in ordered {
        summary.insert(field.key.clone(), aggregate(daily.values(), field));
    }
    summary
}

/// Whether the field's aggregation method is meaningful for its value type.
/// Summing text is nonsense; summing percentages double-counts a rate.
/// Used by the schema editor and the migration utility to flag
/// misconfiguration as a warning, never a hard failure.
pub fn is_valid_aggregation_method(field: &FieldDefinition) -> bool {
    match (field.value_type, field.aggregation_method) {
        (FieldValueType::Text, AggregationMethod::Sum)
        | (FieldValueType::Text, AggregationMethod::Average) => false,
        (FieldValueType::Percentage, AggregationMethod::Sum) => false,
        _ => true,
    }
}

/// The default aggregation method for a value type/category pairing. Shared
/// by the migration utility and the catalog builder.
pub fn recommended_aggregation(
    value_type: FieldValueType,
    category: FieldCategory,
) -> AggregationMethod {
    if value_type == FieldValueType::Text || category == FieldCategory::Basic {
        AggregationMethod::None
    } else if value_type == FieldValueType::Percentage || category == FieldCategory::UnitPrice {
        AggregationMethod::Average
    } else {
        AggregationMethod::Sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;
    use crate::schema::standard_restaurant_fields;

    fn records_with(key: &str, values: &[FieldValue]) -> Vec<DailyRecord> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let date = NaiveDate::from_ymd_opt(2024, 1, (i + 1) as u32).unwrap();
                let mut r = DailyRecord::new(date);
                r.values.insert(key.to_string(), v.clone());
                r
            })
            .collect()
    }

    fn find(fields: &[FieldDefinition], key: &str) -> FieldDefinition {
        fields.iter().find(|f| f.key == key).unwrap().clone()
    }

    #[test]
    fn test_sum_over_valid_values() {
        let fields = standard_restaurant_fields();
        let revenue = find(&fields, "revenue");
        let records = records_with(
            "revenue",
            &[
                FieldValue::Number(100000.0),
                FieldValue::Number(120000.0),
                FieldValue::Number(110000.0),
                FieldValue::Number(130000.0),
                FieldValue::Number(150000.0),
            ],
        );
        assert_eq!(aggregate(records.iter(), &revenue), Some(610000.0));
    }

    #[test]
    fn test_average_ignores_missing_days() {
        let fields = standard_restaurant_fields();
        let unit_price = find(&fields, "customer_unit_price");
        let records = records_with(
            "customer_unit_price",
            &[
                FieldValue::Number(2000.0),
                FieldValue::Number(2200.0),
                FieldValue::Number(2100.0),
                FieldValue::Number(2300.0),
                FieldValue::Number(2500.0),
                FieldValue::Empty,
                FieldValue::Text("".to_string()),
            ],
        );
        assert_eq!(aggregate(records.iter(), &unit_price), Some(2220.0));
    }

    #[test]
    fn test_all_invalid_yields_none() {
        let fields = standard_restaurant_fields();
        let revenue = find(&fields, "revenue");
        let records = records_with(
            "revenue",
            &[FieldValue::Empty, FieldValue::Text("n/a".to_string())],
        );
        assert_eq!(aggregate(records.iter(), &revenue), None);

        let empty: Vec<DailyRecord> = Vec::new();
        assert_eq!(aggregate(empty.iter(), &revenue), None);
    }

    #[test]
    fn test_none_method_yields_none() {
        let fields = standard_restaurant_fields();
        let memo = find(&fields, "memo");
        let records = records_with("memo", &[FieldValue::Text("busy day".to_string())]);
        assert_eq!(aggregate(records.iter(), &memo), None);
    }

    #[test]
    fn test_numeric_text_is_coerced() {
        let fields = standard_restaurant_fields();
        let revenue = find(&fields, "revenue");
        let records = records_with(
            "revenue",
            &[
                FieldValue::Text("1000".to_string()),
                FieldValue::Number(500.0),
            ],
        );
        assert_eq!(aggregate(records.iter(), &revenue), Some(1500.0));
    }

    #[test]
    fn test_aggregate_all_covers_linked_aggregatable_fields_only() {
        let fields = standard_restaurant_fields();
        let mut daily = BTreeMap::new();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut r = DailyRecord::new(date);
        r.set("revenue", 100000.0);
        r.set("memo", "note");
        daily.insert(date, r);

        let summary = aggregate_all(&daily, &fields);
        assert_eq!(summary.get("revenue"), Some(&Some(100000.0)));
        // memo is daily-only with no rollup
        assert!(!summary.contains_key("memo"));
        // fields with no data are present but null
        assert_eq!(summary.get("cost"), Some(&None));
    }

    #[test]
    fn test_text_sum_is_invalid() {
        let fields = standard_restaurant_fields();
        let mut memo = find(&fields, "memo");
        memo.aggregation_method = AggregationMethod::Sum;
        assert!(!is_valid_aggregation_method(&memo));
        memo.aggregation_method = AggregationMethod::Average;
        assert!(!is_valid_aggregation_method(&memo));
        memo.aggregation_method = AggregationMethod::None;
        assert!(is_valid_aggregation_method(&memo));
    }

    #[test]
    fn test_percentage_sum_is_invalid() {
        let fields = standard_restaurant_fields();
        let mut rate = find(&fields, "labor_cost_rate");
        rate.aggregation_method = AggregationMethod::Sum;
        assert!(!is_valid_aggregation_method(&rate));
        rate.aggregation_method = AggregationMethod::Average;
        assert!(is_valid_aggregation_method(&rate));
    }

    #[test]
    fn test_recommended_aggregation_table() {
        use AggregationMethod::*;
        use FieldCategory::*;
        use FieldValueType::*;

        assert_eq!(recommended_aggregation(Text, Sales), None);
        assert_eq!(recommended_aggregation(Currency, Basic), None);
        assert_eq!(recommended_aggregation(Percentage, Labor), Average);
        assert_eq!(recommended_aggregation(Currency, UnitPrice), Average);
        assert_eq!(recommended_aggregation(Currency, Sales), Sum);
        assert_eq!(recommended_aggregation(Number, Labor), Sum);
        assert_eq!(recommended_aggregation(Count, Customer), Sum);
    }
}
