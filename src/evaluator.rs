use crate::record::DailyRecord;
use crate::schema::FieldDefinition;
use log::warn;
use std::collections::BTreeSet;

/// One calculated field: a pure function of the other fields in the same
/// record. Inputs are read leniently (anything non-numeric is `0.0`) and a
/// division by a non-positive denominator yields `0.0`, never NaN/infinity.
pub struct Formula {
    pub key: &'static str,
    pub compute: fn(&DailyRecord) -> f64,
}

/// The dispatch table, in dependency order: totals first, then profit, then
/// unit prices and rates, then productivity. Rates and productivity read
/// totals, so a single in-order pass reaches a fixed point.
pub const FORMULAS: &[Formula] = &[
    Formula {
        key: "total_sales",
        compute: total_sales,
    },
    Formula {
        key: "profit",
        compute: profit,
    },
    Formula {
        key: "customer_unit_price",
        compute: customer_unit_price,
    },
    Formula {
        key: "group_unit_price",
        compute: group_unit_price,
    },
    Formula {
        key: "labor_cost_rate",
        compute: labor_cost_rate,
    },
    Formula {
        key: "sales_per_labor_hour",
        compute: sales_per_labor_hour,
    },
    Formula {
        key: "edw_productivity",
        compute: edw_productivity,
    },
    Formula {
        key: "ohb_productivity",
        compute: ohb_productivity,
    },
];

// Rounding differs per field family and is part of the contract: currency
// and unit prices round to integers, productivity to one decimal, the labor
// cost rate to two. No general rule is inferred.
fn round0(x: f64) -> f64 {
    x.round()
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn total_sales(r: &DailyRecord) -> f64 {
    r.input("store_net_sales") + r.input("edw_net_sales") + r.input("ohb_net_sales")
}

fn profit(r: &DailyRecord) -> f64 {
    r.input("revenue") - r.input("cost")
}

fn customer_unit_price(r: &DailyRecord) -> f64 {
    let customers = r.input("total_customers");
    if customers <= 0.0 {
        return 0.0;
    }
    round0(r.input("total_sales") / customers)
}

fn group_unit_price(r: &DailyRecord) -> f64 {
    let groups = r.input("total_groups");
    if groups <= 0.0 {
        return 0.0;
    }
    round0(r.input("total_sales") / groups)
}

fn labor_cost_rate(r: &DailyRecord) -> f64 {
    let sales = r.input("total_sales");
    if sales <= 0.0 {
        return 0.0;
    }
    round2(r.input("labor_cost_amount") / sales * 100.0)
}

fn sales_per_labor_hour(r: &DailyRecord) -> f64 {
    let hours = r.input("employee_hours") + r.input("as_hours");
    if hours <= 0.0 {
        return 0.0;
    }
    round0(r.input("total_sales") / hours)
}

fn edw_productivity(r: &DailyRecord) -> f64 {
    let hours = r.input("employee_hours") + r.input("as_hours");
    if hours <= 0.0 {
        return 0.0;
    }
    round1(r.input("edw_net_sales") / hours)
}

fn ohb_productivity(r: &DailyRecord) -> f64 {
    let hours = r.input("ohb_total_hours");
    if hours <= 0.0 {
        return 0.0;
    }
    round1(r.input("ohb_net_sales") / hours)
}

/// Overwrites every calculated field of the schema with its formula result.
/// Formulas run in table order, each seeing the results already written, so
/// one pass is a fixed point: `evaluate(evaluate(r)) == evaluate(r)`.
///
/// A calculated field with no registered formula is left untouched and
/// logged; a missing formula degrades that one field, nothing else.
pub fn evaluate(fields: &[FieldDefinition], record: &DailyRecord) -> DailyRecord {
    let calculated: BTreeSet<&str> = fields
        .iter()
        .filter(|f| f.is_calculated)
        .map(|f| f.key.as_str())
        .collect();

    let mut result = record.clone();
    for formula in FORMULAS {
        if calculated.contains(formula.key) {
            let value = (formula.compute)(&result);
            result.set(formula.key, value);
        }
    }

    let known: BTreeSet<&str> = FORMULAS.iter().map(|f| f.key).collect();
    for key in calculated.difference(&known) {
        warn!("calculated field '{}' has no registered formula", key);
    }

    result
}
