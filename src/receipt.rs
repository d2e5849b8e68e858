//! Receipt data model: the recovered record and its typed views.
//!
//! The model's answer is kept as raw JSON ([`ExtractedRecord`]) because the
//! exporters must reproduce it faithfully, key order included. Presentation
//! works on typed views ([`LineItem`], [`ReceiptSummary`]) in which every
//! string-or-number money field has already been normalised to a
//! [`Decimal`]. Fields that are present but unparseable become `None` and
//! are reported as [`FieldIssue`]s rather than silently zeroed.

use crate::error::ReceiptError;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One JSON object as returned by the model.
pub type Record = Map<String, Value>;

/// Key written by intake onto every record.
pub const FILENAME_KEY: &str = "filename";

// ── Raw record ───────────────────────────────────────────────────────────

/// The recovered JSON value: one object, or an array of objects.
///
/// Serialised untagged, so the wire form is exactly the JSON the model
/// produced (plus `filename`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractedRecord {
    /// Line-item shape: one object per purchased item.
    Many(Vec<Record>),
    /// A single object (summary shape, or a one-item answer).
    Single(Record),
}

impl ExtractedRecord {
    /// Accept a recovered value if it has a record shape.
    ///
    /// # Errors
    /// [`ReceiptError::Parse`] carrying `raw_text` when the value is a
    /// scalar, or an array containing anything but objects.
    pub fn from_value(value: Value, raw_text: &str) -> Result<Self, ReceiptError> {
        let not_a_record = |detail: String| ReceiptError::Parse {
            raw_text: raw_text.to_string(),
            detail,
        };

        match value {
            Value::Object(map) => Ok(Self::Single(map)),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(map) => Ok(map),
                    other => Err(not_a_record(format!(
                        "array element {i} is {}, expected an object",
                        json_kind(&other)
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Many),
            other => Err(not_a_record(format!(
                "model returned {}, expected an object or an array",
                json_kind(&other)
            ))),
        }
    }

    /// Set `filename` on every element of an array, or once on an object.
    pub fn attach_filename(&mut self, filename: &str) {
        match self {
            Self::Single(map) => {
                map.insert(FILENAME_KEY.to_string(), Value::String(filename.to_string()));
            }
            Self::Many(items) => {
                for map in items {
                    map.insert(FILENAME_KEY.to_string(), Value::String(filename.to_string()));
                }
            }
        }
    }

    /// One or more rows: a bare object is viewed as a one-element slice.
    pub fn rows(&self) -> &[Record] {
        match self {
            Self::Single(map) => std::slice::from_ref(map),
            Self::Many(items) => items,
        }
    }

    pub fn first(&self) -> Option<&Record> {
        self.rows().first()
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    /// Whether the record follows the legacy summary shape.
    pub fn is_summary(&self) -> bool {
        self.first().is_some_and(is_summary_record)
    }

    /// First non-empty text value for `key` across the rows.
    pub fn header_text(&self, key: &str) -> Option<String> {
        self.rows().iter().find_map(|r| text_value(r.get(key)))
    }
}

/// A record in the summary shape carries a nested `items` array or a
/// `merchant_name`.
pub fn is_summary_record(record: &Record) -> bool {
    matches!(record.get("items"), Some(Value::Array(_))) || record.contains_key("merchant_name")
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Money ────────────────────────────────────────────────────────────────

/// Text shown for a missing or unparseable amount.
pub const AMOUNT_SENTINEL: &str = "0.00";

/// A present value that is not an amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountError {
    pub raw: String,
}

impl fmt::Display for AmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a number", self.raw)
    }
}

impl std::error::Error for AmountError {}

/// Normalise a string-or-number field into a decimal.
///
/// Strings are stripped of everything except digits, `.` and `-` first, so
/// `"1,234.56 AZN"` reads as `1234.56`. Null and empty strings are absent
/// (`Ok(None)`), not errors.
pub fn parse_amount(value: &Value) -> Result<Option<Decimal>, AmountError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => decimal_from_str(&n.to_string())
            .map(Some)
            .ok_or_else(|| AmountError { raw: n.to_string() }),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            decimal_from_str(&cleaned)
                .map(Some)
                .ok_or_else(|| AmountError { raw: s.clone() })
        }
        other => Err(AmountError {
            raw: other.to_string(),
        }),
    }
}

fn decimal_from_str(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

/// Two-decimal display, rounding half away from zero.
pub fn format_decimal(d: Decimal) -> String {
    let rounded = d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.2}", rounded)
}

/// A display-ready amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedAmount {
    /// Two-decimal text, or [`AMOUNT_SENTINEL`].
    pub text: String,
    /// Set when a value was present but could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
}

/// Format a possibly-missing string-or-number amount.
///
/// Missing, null and empty values render as `0.00`. Unparseable values also
/// render as `0.00`, with the failure reported in
/// [`FormattedAmount::issue`]; nothing ever renders as NaN.
pub fn format_amount(value: Option<&Value>) -> FormattedAmount {
    match value.map(parse_amount) {
        None | Some(Ok(None)) => FormattedAmount {
            text: AMOUNT_SENTINEL.to_string(),
            issue: None,
        },
        Some(Ok(Some(d))) => FormattedAmount {
            text: format_decimal(d),
            issue: None,
        },
        Some(Err(e)) => FormattedAmount {
            text: AMOUNT_SENTINEL.to_string(),
            issue: Some(e.to_string()),
        },
    }
}

// ── Typed views ──────────────────────────────────────────────────────────

/// A money field that was present but unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub raw: String,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: '{}' is not a number", self.field, self.raw)
    }
}

/// Reads typed fields out of a record, collecting issues as it goes.
struct FieldReader<'a> {
    record: &'a Record,
    issues: Vec<FieldIssue>,
}

impl<'a> FieldReader<'a> {
    fn new(record: &'a Record) -> Self {
        Self {
            record,
            issues: Vec::new(),
        }
    }

    fn text(&self, key: &str) -> Option<String> {
        text_value(self.record.get(key))
    }

    fn amount(&mut self, key: &str) -> Option<Decimal> {
        amount_in(self.record, key, key, &mut self.issues)
    }
}

fn amount_in(record: &Record, key: &str, label: &str, issues: &mut Vec<FieldIssue>) -> Option<Decimal> {
    match record.get(key).map(parse_amount) {
        None => None,
        Some(Ok(d)) => d,
        Some(Err(e)) => {
            issues.push(FieldIssue {
                field: label.to_string(),
                raw: e.raw,
            });
            None
        }
    }
}

/// Text form of a scalar; empty strings and non-scalars are absent.
pub(crate) fn text_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// One flattened line-item record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LineItem {
    pub filename: Option<String>,
    // Store identity
    pub store_name: Option<String>,
    pub store_address: Option<String>,
    pub store_code: Option<String>,
    pub taxpayer_name: Option<String>,
    pub tax_id: Option<String>,
    pub receipt_number: Option<String>,
    pub cashier_name: Option<String>,
    // Timestamps
    pub date: Option<String>,
    pub time: Option<String>,
    // Item
    pub item_name: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub line_total: Option<Decimal>,
    // Totals
    pub subtotal: Option<Decimal>,
    pub vat_18_percent: Option<Decimal>,
    pub total_tax: Option<Decimal>,
    // Payment breakdown
    pub cashless_payment: Option<Decimal>,
    pub cash_payment: Option<Decimal>,
    pub bonus_payment: Option<Decimal>,
    pub advance_payment: Option<Decimal>,
    pub credit_payment: Option<Decimal>,
    // Device and fiscal data
    pub queue_number: Option<String>,
    pub cash_register_model: Option<String>,
    pub cash_register_serial: Option<String>,
    pub fiscal_id: Option<String>,
    pub fiscal_registration: Option<String>,
    // Refunds
    pub refund_amount: Option<Decimal>,
    pub refund_date: Option<String>,
    pub refund_time: Option<String>,
}

impl LineItem {
    /// Read a line item, returning any unreadable money fields alongside it.
    pub fn from_record(record: &Record) -> (Self, Vec<FieldIssue>) {
        let mut r = FieldReader::new(record);
        let item = LineItem {
            filename: r.text(FILENAME_KEY),
            store_name: r.text("store_name"),
            store_address: r.text("store_address"),
            store_code: r.text("store_code"),
            taxpayer_name: r.text("taxpayer_name"),
            tax_id: r.text("tax_id"),
            receipt_number: r.text("receipt_number"),
            cashier_name: r.text("cashier_name"),
            date: r.text("date"),
            time: r.text("time"),
            item_name: r.text("item_name"),
            quantity: r.amount("quantity"),
            unit_price: r.amount("unit_price"),
            line_total: r.amount("line_total"),
            subtotal: r.amount("subtotal"),
            vat_18_percent: r.amount("vat_18_percent"),
            total_tax: r.amount("total_tax"),
            cashless_payment: r.amount("cashless_payment"),
            cash_payment: r.amount("cash_payment"),
            bonus_payment: r.amount("bonus_payment"),
            advance_payment: r.amount("advance_payment"),
            credit_payment: r.amount("credit_payment"),
            queue_number: r.text("queue_number"),
            cash_register_model: r.text("cash_register_model"),
            cash_register_serial: r.text("cash_register_serial"),
            fiscal_id: r.text("fiscal_id"),
            fiscal_registration: r.text("fiscal_registration"),
            refund_amount: r.amount("refund_amount"),
            refund_date: r.text("refund_date"),
            refund_time: r.text("refund_time"),
        };
        (item, r.issues)
    }

    /// `quantity × unit_price` when it differs from `line_total` by more
    /// than one cent. Reported, never corrected.
    ///
    /// Amounts too large for a [`Decimal`] product cannot be compared and
    /// yield `None`.
    pub fn line_total_mismatch(&self) -> Option<Decimal> {
        let (q, u, total) = (self.quantity?, self.unit_price?, self.line_total?);
        let expected = q.checked_mul(u)?;
        let diff = expected.checked_sub(total)?.abs();
        (diff > Decimal::new(1, 2)).then_some(expected)
    }
}

/// One item of the summary shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryItem {
    pub name: Option<String>,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
}

/// The legacy single-object receipt.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReceiptSummary {
    pub filename: Option<String>,
    pub merchant_name: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub items: Vec<SummaryItem>,
    pub subtotal: Option<Decimal>,
    pub tax: Option<Decimal>,
    pub total: Option<Decimal>,
    pub payment_method: Option<String>,
    pub address: Option<String>,
}

impl ReceiptSummary {
    /// Read a summary, returning any unreadable money fields alongside it.
    pub fn from_record(record: &Record) -> (Self, Vec<FieldIssue>) {
        let mut r = FieldReader::new(record);
        let mut items = Vec::new();

        if let Some(Value::Array(raw_items)) = record.get("items") {
            for (i, raw) in raw_items.iter().enumerate() {
                let Value::Object(obj) = raw else {
                    continue;
                };
                items.push(SummaryItem {
                    name: text_value(obj.get("name")),
                    quantity: amount_in(obj, "quantity", &format!("items[{i}].quantity"), &mut r.issues),
                    price: amount_in(obj, "price", &format!("items[{i}].price"), &mut r.issues),
                });
            }
        }

        let summary = ReceiptSummary {
            filename: r.text(FILENAME_KEY),
            merchant_name: r.text("merchant_name"),
            date: r.text("date"),
            time: r.text("time"),
            items,
            subtotal: r.amount("subtotal"),
            tax: r.amount("tax"),
            total: r.amount("total"),
            payment_method: r.text("payment_method"),
            address: r.text("address"),
        };
        (summary, r.issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn filename_attached_to_every_array_element() {
        let v = json!([{"item_name": "Milk"}, {"item_name": "Bread"}]);
        let mut rec = ExtractedRecord::from_value(v, "raw").unwrap();
        rec.attach_filename("till.jpg");
        assert_eq!(rec.len(), 2);
        for row in rec.rows() {
            assert_eq!(row["filename"], "till.jpg");
        }
    }

    #[test]
    fn filename_attached_once_to_object() {
        let mut rec = ExtractedRecord::from_value(json!({"total": 5}), "raw").unwrap();
        rec.attach_filename("till.jpg");
        let ExtractedRecord::Single(map) = &rec else {
            panic!("expected a single object");
        };
        assert_eq!(map["filename"], "till.jpg");
        assert_eq!(rec.rows().len(), 1);
    }

    #[test]
    fn scalars_are_not_records() {
        let err = ExtractedRecord::from_value(json!(42), "42").unwrap_err();
        assert_eq!(err.raw_text(), Some("42"));
        let err = ExtractedRecord::from_value(json!([{"a": 1}, "b"]), "raw").unwrap_err();
        assert!(err.to_string().contains("array element 1"));
    }

    #[test]
    fn untagged_serialisation_is_the_raw_json() {
        let v = json!([{"item_name": "Tea", "quantity": 2}]);
        let rec = ExtractedRecord::from_value(v.clone(), "").unwrap();
        assert_eq!(serde_json::to_value(&rec).unwrap(), v);
        let back: ExtractedRecord = serde_json::from_value(json!({"total": 1})).unwrap();
        assert!(matches!(back, ExtractedRecord::Single(_)));
    }

    #[test]
    fn key_order_is_preserved() {
        let raw = r#"{"zeta": 1, "alpha": 2, "mid": 3}"#;
        let v: Value = serde_json::from_str(raw).unwrap();
        let rec = ExtractedRecord::from_value(v, raw).unwrap();
        let keys: Vec<&String> = rec.first().unwrap().keys().collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn currency_strips_symbols_and_separators() {
        let f = format_amount(Some(&json!("1,234.56 AZN")));
        assert_eq!(f.text, "1234.56");
        assert!(f.issue.is_none());
    }

    #[test]
    fn currency_missing_is_sentinel_without_issue() {
        let f = format_amount(None);
        assert_eq!(f.text, "0.00");
        assert!(f.issue.is_none());
        assert_eq!(format_amount(Some(&Value::Null)).text, "0.00");
        assert_eq!(format_amount(Some(&json!(""))).text, "0.00");
    }

    #[test]
    fn currency_unparseable_is_sentinel_with_issue() {
        let f = format_amount(Some(&json!("N/A")));
        assert_eq!(f.text, "0.00");
        assert_eq!(f.issue.as_deref(), Some("'N/A' is not a number"));
        let f = format_amount(Some(&json!(true)));
        assert_eq!(f.text, "0.00");
        assert!(f.issue.is_some());
    }

    #[test]
    fn currency_numbers_and_rounding() {
        assert_eq!(format_amount(Some(&json!(5))).text, "5.00");
        assert_eq!(format_amount(Some(&json!(2.345))).text, "2.35");
        assert_eq!(format_amount(Some(&json!("-3.1"))).text, "-3.10");
        assert_eq!(format_amount(Some(&json!(1.5e3))).text, "1500.00");
    }

    #[test]
    fn line_item_normalises_money_and_reports_issues() {
        let r = record(json!({
            "store_name": "Bravo",
            "receipt_number": 1187,
            "item_name": "Cheese",
            "quantity": "0.450",
            "unit_price": "12.90 AZN",
            "line_total": 5.81,
            "vat_18_percent": "n/a",
            "store_code": ""
        }));
        let (item, issues) = LineItem::from_record(&r);
        assert_eq!(item.receipt_number.as_deref(), Some("1187"));
        assert_eq!(item.quantity, Some(Decimal::from_str("0.450").unwrap()));
        assert_eq!(item.unit_price, Some(Decimal::from_str("12.90").unwrap()));
        assert_eq!(item.vat_18_percent, None);
        assert_eq!(item.store_code, None);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "vat_18_percent");
        assert!(item.line_total_mismatch().is_none());
    }

    #[test]
    fn line_total_mismatch_is_reported() {
        let r = record(json!({"quantity": 2, "unit_price": 3, "line_total": 7}));
        let (item, _) = LineItem::from_record(&r);
        assert_eq!(item.line_total_mismatch(), Some(Decimal::from(6)));
    }

    #[test]
    fn oversized_amounts_are_not_compared() {
        let r = record(json!({
            "quantity": "99999999999999999999",
            "unit_price": "99999999999999999999",
            "line_total": 1
        }));
        let (item, issues) = LineItem::from_record(&r);
        assert!(issues.is_empty());
        assert!(item.quantity.is_some());
        assert_eq!(item.line_total_mismatch(), None);
    }

    #[test]
    fn summary_reads_nested_items() {
        let r = record(json!({
            "merchant_name": "Corner Shop",
            "items": [
                {"name": "Apples", "quantity": 3, "price": "$1.20"},
                {"name": "Soap", "quantity": 1, "price": "free"}
            ],
            "total": "4.60"
        }));
        assert!(is_summary_record(&r));
        let (s, issues) = ReceiptSummary::from_record(&r);
        assert_eq!(s.items.len(), 2);
        assert_eq!(s.items[0].price, Some(Decimal::from_str("1.20").unwrap()));
        assert_eq!(s.total, Some(Decimal::from_str("4.60").unwrap()));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "items[1].price");
    }

    #[test]
    fn header_text_skips_empty_rows() {
        let rec = ExtractedRecord::from_value(
            json!([{"receipt_number": ""}, {"receipt_number": "A-17"}]),
            "",
        )
        .unwrap();
        assert_eq!(rec.header_text("receipt_number").as_deref(), Some("A-17"));
        assert!(!rec.is_summary());
    }
}
