use log::warn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldValueType {
    #[schemars(description = "Free text such as memos or staff names. Never aggregated.")]
    Text,

    #[schemars(description = "Plain numeric value (hours, counts of things without a unit).")]
    #[default]
    Number,

    #[schemars(description = "Monetary amount in the tenant's currency, stored as a plain number.")]
    Currency,

    #[schemars(
        description = "Rate pre-multiplied by 100 (a stored value of 28.5 means 28.5%). Summing these is meaningless; monthly rollup averages them."
    )]
    Percentage,

    #[schemars(description = "Integer tally such as customers or groups.")]
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    #[schemars(description = "Non-metric bookkeeping fields (memos, flags). Excluded from the monthly view.")]
    Basic,
    Sales,
    Cost,
    Profit,
    Customer,
    #[schemars(description = "Per-customer or per-group prices. Monthly rollup averages these rather than summing.")]
    UnitPrice,
    Labor,
    Productivity,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    #[schemars(description = "Monthly value is the plain total of valid daily values.")]
    Sum,

    #[schemars(
        description = "Monthly value is the arithmetic mean of valid daily values only; days without data do not drag the average down."
    )]
    Average,

    #[schemars(description = "Field is never rolled up into a monthly value.")]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    #[schemars(description = "Exists only in daily sheets; never visible monthly and never aggregated.")]
    DailyOnly,

    #[schemars(description = "Entered directly at month granularity; has no daily values.")]
    MonthlyOnly,

    #[schemars(description = "Daily values roll up into the monthly view via the aggregation method.")]
    #[default]
    Linked,
}

/// The page a field list is being filtered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPage {
    Daily,
    Monthly,
}

/// Schema entry describing one metric of a business type.
///
/// Per-tenant catalogs are plain JSON arrays of these, so adding a metric is
/// a configuration change, not a code change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldDefinition {
    #[schemars(description = "Unique key within a business type, used in records and formulas.")]
    pub key: String,

    #[schemars(description = "Display label, also matched against CSV headers on import.")]
    pub label: String,

    pub category: FieldCategory,

    pub value_type: FieldValueType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    pub is_visible_in_daily_view: bool,

    pub is_visible_in_monthly_view: bool,

    #[schemars(description = "Calculated fields are never editable; the evaluator owns their values.")]
    pub is_editable: bool,

    pub is_calculated: bool,

    pub aggregation_method: AggregationMethod,

    pub field_source: FieldSource,

    #[schemars(description = "Display/iteration order within the business type.")]
    pub order: u32,

    /// Legacy single visibility flag. Kept in sync with
    /// `is_visible_in_daily_view` by the migration utility for readers that
    /// predate the daily/monthly split.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_visible: Option<bool>,
}

impl FieldDefinition {
    /// Non-fatal configuration checks. Violations degrade behavior (the
    /// field shows no aggregate, or stays read-only) instead of failing.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.is_calculated && self.is_editable {
            warnings.push(format!(
                "field '{}' is calculated but marked editable; edits would be overwritten",
                self.key
            ));
        }
        if !crate::aggregation::is_valid_aggregation_method(self) {
            warnings.push(format!(
                "field '{}' pairs {:?} with {:?}, which is not a meaningful rollup",
                self.key, self.aggregation_method, self.value_type
            ));
        }
        if self.field_source == FieldSource::DailyOnly && self.is_visible_in_monthly_view {
            warnings.push(format!(
                "field '{}' is daily-only but flagged visible in the monthly view",
                self.key
            ));
        }
        warnings
    }
}

/// Filters a field list for one page, preserving order. Daily-only fields
/// never appear monthly and monthly-only fields never appear daily,
/// regardless of their visibility flags.
pub fn visible_fields<'a>(fields: &'a [FieldDefinition], page: ViewPage) -> Vec<&'a FieldDefinition> {
    fields
        .iter()
        .filter(|f| match page {
            ViewPage::Daily => {
                f.field_source != FieldSource::MonthlyOnly && f.is_visible_in_daily_view
            }
            ViewPage::Monthly => {
                f.field_source != FieldSource::DailyOnly && f.is_visible_in_monthly_view
            }
        })
        .collect()
}

/// Field catalogs per business type. A read-only lookup: an unknown business
/// type yields an empty list, which callers render as "no schema configured",
/// never as a fault.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldSchemaRegistry {
    schemas: HashMap<String, Vec<FieldDefinition>>,
}

impl FieldSchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a business type's catalog, sorted by `order`. Configuration
    /// problems are logged and kept, not rejected.
    pub fn insert(&mut self, business_type_id: impl Into<String>, mut fields: Vec<FieldDefinition>) {
        let business_type_id = business_type_id.into();
        fields.sort_by_key(|f| f.order);
        for field in &fields {
            for warning in field.validate() {
                warn!("schema '{}': {}", business_type_id, warning);
            }
        }
        self.schemas.insert(business_type_id, fields);
    }

    pub fn fields(&self, business_type_id: &str) -> &[FieldDefinition] {
        match self.schemas.get(business_type_id) {
            Some(fields) => fields,
            None => {
                warn!("no field schema configured for business type '{}'", business_type_id);
                &[]
            }
        }
    }

    pub fn business_types(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        let schemas: HashMap<String, Vec<FieldDefinition>> = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for (business_type_id, fields) in schemas {
            registry.insert(business_type_id, fields);
        }
        Ok(registry)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Vec<FieldDefinition>)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}

fn field(
    key: &str,
    label: &str,
    category: FieldCategory,
    value_type: FieldValueType,
    order: u32,
) -> FieldDefinition {
    FieldDefinition {
        key: key.to_string(),
        label: label.to_string(),
        category,
        value_type,
        unit: None,
        is_visible_in_daily_view: true,
        is_visible_in_monthly_view: true,
        is_editable: true,
        is_calculated: false,
        aggregation_method: crate::aggregation::recommended_aggregation(value_type, category),
        field_source: FieldSource::Linked,
        order,
        is_visible: None,
    }
}

fn calculated(
    key: &str,
    label: &str,
    category: FieldCategory,
    value_type: FieldValueType,
    method: AggregationMethod,
    order: u32,
) -> FieldDefinition {
    let mut f = field(key, label, category, value_type, order);
    f.is_calculated = true;
    f.is_editable = false;
    f.aggregation_method = method;
    f
}

/// The built-in restaurant catalog: the field set the chain's stores start
/// from before any per-tenant customization.
pub fn standard_restaurant_fields() -> Vec<FieldDefinition> {
    use AggregationMethod::{Average, Sum};
    use FieldCategory::{Basic, Cost, Customer, Labor, Productivity, Profit, Sales, UnitPrice};
    use FieldValueType::{Count, Currency, Number, Percentage, Text};

    vec![
        field("store_net_sales", "店舗純売上", Sales, Currency, 1),
        field("edw_net_sales", "EDW純売上", Sales, Currency, 2),
        field("ohb_net_sales", "OHB純売上", Sales, Currency, 3),
        calculated("total_sales", "総売上", Sales, Currency, Sum, 4),
        field("revenue", "売上", Sales, Currency, 5),
        field("cost", "原価", Cost, Currency, 6),
        calculated("profit", "利益", Profit, Currency, Sum, 7),
        field("total_customers", "総客数", Customer, Count, 8),
        field("total_groups", "総組数", Customer, Count, 9),
        calculated("customer_unit_price", "客単価", UnitPrice, Currency, Average, 10),
        calculated("group_unit_price", "組単価", UnitPrice, Currency, Average, 11),
        field("labor_cost_amount", "人件費", Labor, Currency, 12),
        calculated("labor_cost_rate", "人件費率", Labor, Percentage, Average, 13),
        field("employee_hours", "社員時間", Labor, Number, 14),
        field("as_hours", "AS時間", Labor, Number, 15),
        field("ohb_total_hours", "OHB総時間", Labor, Number, 16),
        calculated("sales_per_labor_hour", "人時売上", Productivity, Currency, Average, 17),
        calculated("edw_productivity", "EDW生産性", Productivity, Number, Average, 18),
        calculated("ohb_productivity", "OHB生産性", Productivity, Number, Average, 19),
        {
            let mut memo = field("memo", "備考", Basic, Text, 20);
            memo.aggregation_method = AggregationMethod::None;
            memo.field_source = FieldSource::DailyOnly;
            memo.is_visible_in_monthly_view = false;
            memo
        },
    ]
}
