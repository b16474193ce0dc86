use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{FieldKind::*, FieldSpec, StaticSchema, TableSchema};

static DISPATCH_UNIT_SCADA_FIELDS: [FieldSpec; 3] = [
    FieldSpec::required("settlementdate", Timestamp),
    FieldSpec::required("duid", Text),
    FieldSpec::required("scadavalue", Decimal),
];

static DISPATCH_PRICE_FIELDS: [FieldSpec; 8] = [
    FieldSpec::required("settlementdate", Timestamp),
    FieldSpec::required("runno", Integer),
    FieldSpec::required("regionid", Text),
    FieldSpec::optional("dispatchinterval", Integer),
    FieldSpec::required("intervention", Integer),
    FieldSpec::required("rrp", Decimal),
    FieldSpec::optional("eep", Decimal),
    FieldSpec::optional("rop", Decimal),
];

static DISPATCH_REGIONSUM_FIELDS: [FieldSpec; 11] = [
    FieldSpec::required("settlementdate", Timestamp),
    FieldSpec::required("runno", Integer),
    FieldSpec::required("regionid", Text),
    FieldSpec::required("intervention", Integer),
    FieldSpec::optional("totaldemand", Decimal),
    FieldSpec::optional("availablegeneration", Decimal),
    FieldSpec::optional("demandforecast", Decimal),
    FieldSpec::optional("dispatchablegeneration", Decimal),
    FieldSpec::optional("dispatchableload", Decimal),
    FieldSpec::optional("netinterchange", Decimal),
    FieldSpec::optional("totalintermittentgeneration", Decimal),
];

static TRADING_PRICE_FIELDS: [FieldSpec; 6] = [
    FieldSpec::required("settlementdate", Timestamp),
    FieldSpec::required("runno", Integer),
    FieldSpec::required("regionid", Text),
    FieldSpec::optional("periodid", Integer),
    FieldSpec::required("rrp", Decimal),
    FieldSpec::optional("invalidflag", Text),
];

static ROOFTOP_ACTUAL_FIELDS: [FieldSpec; 5] = [
    FieldSpec::required("interval_datetime", Timestamp),
    FieldSpec::required("regionid", Text),
    FieldSpec::required("power", Decimal),
    FieldSpec::optional("qi", Decimal),
    FieldSpec::required("type", Text),
];

static DISPATCH_INTERCONNECTORRES_FIELDS: [FieldSpec; 8] = [
    FieldSpec::required("settlementdate", Timestamp),
    FieldSpec::required("runno", Integer),
    FieldSpec::required("interconnectorid", Text),
    FieldSpec::optional("dispatchinterval", Integer),
    FieldSpec::required("intervention", Integer),
    FieldSpec::optional("meteredmwflow", Decimal),
    FieldSpec::optional("mwflow", Decimal),
    FieldSpec::optional("mwlosses", Decimal),
];

/// The NEMWEB tables the pipeline stores
pub fn builtin_schemas() -> Vec<Arc<dyn TableSchema>> {
    vec![
        Arc::new(StaticSchema {
            key: "dispatch_unit_scada",
            target: "dispatch_unit_scada",
            fields: &DISPATCH_UNIT_SCADA_FIELDS,
            conflict_key: &["settlementdate", "duid"],
            update_fields: &["scadavalue"],
        }),
        Arc::new(StaticSchema {
            key: "dispatch_price",
            target: "dispatch_price",
            fields: &DISPATCH_PRICE_FIELDS,
            conflict_key: &["settlementdate", "regionid", "intervention"],
            update_fields: &["runno", "rrp", "eep", "rop"],
        }),
        Arc::new(StaticSchema {
            key: "dispatch_regionsum",
            target: "dispatch_regionsum",
            fields: &DISPATCH_REGIONSUM_FIELDS,
            conflict_key: &["settlementdate", "regionid", "intervention"],
            update_fields: &[
                "runno",
                "totaldemand",
                "availablegeneration",
                "demandforecast",
                "dispatchablegeneration",
                "dispatchableload",
                "netinterchange",
                "totalintermittentgeneration",
            ],
        }),
        Arc::new(StaticSchema {
            key: "trading_price",
            target: "trading_price",
            fields: &TRADING_PRICE_FIELDS,
            conflict_key: &["settlementdate", "regionid"],
            update_fields: &["runno", "rrp", "invalidflag"],
        }),
        Arc::new(StaticSchema {
            key: "rooftop_actual",
            target: "rooftop_actual",
            fields: &ROOFTOP_ACTUAL_FIELDS,
            conflict_key: &["interval_datetime", "regionid", "type"],
            update_fields: &["power", "qi"],
        }),
        Arc::new(StaticSchema {
            key: "dispatch_interconnectorres",
            target: "dispatch_interconnectorres",
            fields: &DISPATCH_INTERCONNECTORRES_FIELDS,
            conflict_key: &["settlementdate", "interconnectorid", "intervention"],
            update_fields: &["runno", "meteredmwflow", "mwflow", "mwlosses"],
        }),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchUnitScada {
    pub settlementdate: NaiveDateTime,
    pub duid: String,
    pub scadavalue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchPrice {
    pub settlementdate: NaiveDateTime,
    pub runno: i64,
    pub regionid: String,
    pub dispatchinterval: Option<i64>,
    pub intervention: i64,
    pub rrp: f64,
    pub eep: Option<f64>,
    pub rop: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRegionSum {
    pub settlementdate: NaiveDateTime,
    pub runno: i64,
    pub regionid: String,
    pub intervention: i64,
    pub totaldemand: Option<f64>,
    pub availablegeneration: Option<f64>,
    pub demandforecast: Option<f64>,
    pub dispatchablegeneration: Option<f64>,
    pub dispatchableload: Option<f64>,
    pub netinterchange: Option<f64>,
    pub totalintermittentgeneration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingPrice {
    pub settlementdate: NaiveDateTime,
    pub runno: i64,
    pub regionid: String,
    pub periodid: Option<i64>,
    pub rrp: f64,
    pub invalidflag: Option<String>,
}

/// Rooftop PV estimate; `type` is `MEASUREMENT` or `SATELLITE`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RooftopActual {
    pub interval_datetime: NaiveDateTime,
    pub regionid: String,
    pub power: f64,
    pub qi: Option<f64>,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchInterconnectorRes {
    pub settlementdate: NaiveDateTime,
    pub runno: i64,
    pub interconnectorid: String,
    pub dispatchinterval: Option<i64>,
    pub intervention: i64,
    pub meteredmwflow: Option<f64>,
    pub mwflow: Option<f64>,
    pub mwlosses: Option<f64>,
}
