//! Receipt presentation: a typed, display-ready view of an extracted record.
//!
//! [`render`] is a pure function of the record. The resulting
//! [`ReceiptView`] serialises to JSON for the HTTP service and implements
//! [`Display`](std::fmt::Display) as a plain-text layout for the terminal.
//!
//! The record shape is detected from the data, not from the config: an
//! object with a nested `items` array (or a `merchant_name`) is rendered as
//! a summary, everything else as line items whose header fields are read
//! from the first row.

use crate::config::ReceiptSchema;
use crate::receipt::{
    format_decimal, ExtractedRecord, LineItem, ReceiptSummary, AMOUNT_SENTINEL,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Currency label used by [`render`].
pub const DEFAULT_CURRENCY: &str = "AZN";

/// Shown for missing text fields.
pub const NOT_AVAILABLE: &str = "N/A";

/// A labelled value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub label: String,
    pub value: String,
}

impl Field {
    fn text(label: &str, value: Option<&String>) -> Self {
        Self {
            label: label.to_string(),
            value: value.cloned().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        }
    }

    fn amount(label: &str, value: Option<Decimal>) -> Self {
        Self {
            label: label.to_string(),
            value: money(value),
        }
    }
}

/// A titled group of fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub title: String,
    pub fields: Vec<Field>,
}

impl Section {
    fn new(title: &str, fields: Vec<Field>) -> Self {
        Self {
            title: title.to_string(),
            fields,
        }
    }
}

/// One row of the items table. Amounts are two-decimal text without the
/// currency label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemRow {
    pub name: String,
    pub quantity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<String>,
    pub line_total: String,
}

/// Display-ready receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptView {
    /// Shape detected from the record.
    pub schema: ReceiptSchema,
    pub currency: String,
    /// Store Information, Receipt Details.
    pub header: Vec<Section>,
    pub items: Vec<ItemRow>,
    /// Payment Summary amounts, without the currency label.
    pub payment: Vec<Field>,
    /// System Information.
    pub system: Section,
    /// Unreadable amounts and arithmetic mismatches, in reading order.
    pub warnings: Vec<String>,
}

/// Render with the default currency label.
pub fn render(record: &ExtractedRecord) -> ReceiptView {
    render_with_currency(record, DEFAULT_CURRENCY)
}

/// Render, labelling amounts with `currency` in the text layout.
pub fn render_with_currency(record: &ExtractedRecord, currency: &str) -> ReceiptView {
    if record.is_summary() {
        render_summary(record, currency)
    } else {
        render_line_items(record, currency)
    }
}

fn money(value: Option<Decimal>) -> String {
    value
        .map(format_decimal)
        .unwrap_or_else(|| AMOUNT_SENTINEL.to_string())
}

/// Amounts that belong to one item rather than to the receipt header.
const ITEM_AMOUNTS: [&str; 3] = ["quantity", "unit_price", "line_total"];

fn render_line_items(record: &ExtractedRecord, currency: &str) -> ReceiptView {
    let mut warnings = Vec::new();
    let mut items = Vec::with_capacity(record.len());
    let mut first: Option<LineItem> = None;

    for (i, row) in record.rows().iter().enumerate() {
        let (item, issues) = LineItem::from_record(row);

        // Header fields repeat on every row; report them once.
        for issue in issues {
            if ITEM_AMOUNTS.contains(&issue.field.as_str()) {
                warnings.push(format!("item {}: {}", i + 1, issue));
            } else if i == 0 {
                warnings.push(issue.to_string());
            }
        }
        if let Some(expected) = item.line_total_mismatch() {
            warnings.push(format!(
                "item {}: line_total {} does not match quantity × unit_price = {}",
                i + 1,
                money(item.line_total),
                format_decimal(expected)
            ));
        }

        items.push(ItemRow {
            name: item
                .item_name
                .clone()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            quantity: money(item.quantity),
            unit_price: Some(money(item.unit_price)),
            line_total: money(item.line_total),
        });

        if first.is_none() {
            first = Some(item);
        }
    }

    let h = first.unwrap_or_default();

    let header = vec![
        Section::new(
            "Store Information",
            vec![
                Field::text("Store Name", h.store_name.as_ref()),
                Field::text("Store Address", h.store_address.as_ref()),
                Field::text("Store Code", h.store_code.as_ref()),
                Field::text("Taxpayer Name", h.taxpayer_name.as_ref()),
                Field::text("Tax ID (VÖEN)", h.tax_id.as_ref()),
            ],
        ),
        Section::new(
            "Receipt Details",
            vec![
                Field::text("Receipt Number", h.receipt_number.as_ref()),
                Field::text("Date", h.date.as_ref()),
                Field::text("Time", h.time.as_ref()),
                Field::text("Cashier", h.cashier_name.as_ref()),
                Field::text("Queue Number", h.queue_number.as_ref()),
            ],
        ),
    ];

    let mut payment = vec![
        Field::amount("Subtotal", h.subtotal),
        Field::amount("VAT 18%", h.vat_18_percent),
        Field::amount("Total Tax", h.total_tax),
        Field::amount("Cashless", h.cashless_payment),
        Field::amount("Cash", h.cash_payment),
    ];
    if h.bonus_payment.is_some_and(|b| b > Decimal::ZERO) {
        payment.push(Field::amount("Bonus", h.bonus_payment));
    }
    if h.refund_amount.is_some_and(|r| !r.is_zero()) {
        payment.push(Field::amount("Refund", h.refund_amount));
    }

    let system = Section::new(
        "System Information",
        vec![
            Field::text("Register Model", h.cash_register_model.as_ref()),
            Field::text("Register Serial", h.cash_register_serial.as_ref()),
            Field::text("Fiscal ID", h.fiscal_id.as_ref()),
            Field::text("Fiscal Registration", h.fiscal_registration.as_ref()),
            Field::text("Source File", h.filename.as_ref()),
        ],
    );

    ReceiptView {
        schema: ReceiptSchema::LineItems,
        currency: currency.to_string(),
        header,
        items,
        payment,
        system,
        warnings,
    }
}

fn render_summary(record: &ExtractedRecord, currency: &str) -> ReceiptView {
    let (s, issues) = record
        .first()
        .map(ReceiptSummary::from_record)
        .unwrap_or_default();

    let items = s
        .items
        .iter()
        .map(|it| ItemRow {
            name: it.name.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            quantity: money(it.quantity),
            unit_price: None,
            line_total: money(it.price),
        })
        .collect();

    ReceiptView {
        schema: ReceiptSchema::Summary,
        currency: currency.to_string(),
        header: vec![
            Section::new(
                "Store Information",
                vec![
                    Field::text("Merchant", s.merchant_name.as_ref()),
                    Field::text("Address", s.address.as_ref()),
                ],
            ),
            Section::new(
                "Receipt Details",
                vec![
                    Field::text("Date", s.date.as_ref()),
                    Field::text("Time", s.time.as_ref()),
                    Field::text("Payment Method", s.payment_method.as_ref()),
                ],
            ),
        ],
        items,
        payment: vec![
            Field::amount("Subtotal", s.subtotal),
            Field::amount("Tax", s.tax),
            Field::amount("Total", s.total),
        ],
        system: Section::new(
            "System Information",
            vec![Field::text("Source File", s.filename.as_ref())],
        ),
        warnings: issues.iter().map(ToString::to_string).collect(),
    }
}

// ── Text layout ──────────────────────────────────────────────────────────

fn heading(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "{title}")?;
    writeln!(f, "{}", "-".repeat(title.chars().count()))
}

fn fields(f: &mut fmt::Formatter<'_>, fields: &[Field], suffix: &str) -> fmt::Result {
    let width = fields
        .iter()
        .map(|fl| fl.label.chars().count() + 1)
        .max()
        .unwrap_or(0);
    for fl in fields {
        let label = format!("{}:", fl.label);
        writeln!(f, "  {label:<width$}  {}{suffix}", fl.value)?;
    }
    Ok(())
}

impl fmt::Display for ReceiptView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = "Receipt Data Extracted";
        writeln!(f, "{title}")?;
        writeln!(f, "{}", "=".repeat(title.chars().count()))?;

        for section in &self.header {
            heading(f, &section.title)?;
            fields(f, &section.fields, "")?;
        }

        heading(f, &format!("Items ({})", self.items.len()))?;
        if !self.items.is_empty() {
            let cur = &self.currency;
            let name_w = self
                .items
                .iter()
                .map(|r| r.name.chars().count())
                .max()
                .unwrap_or(0)
                .max("Item Name".len());
            let money_w = self
                .items
                .iter()
                .flat_map(|r| [r.unit_price.as_deref().unwrap_or(""), r.line_total.as_str()])
                .map(|s| s.len() + cur.len() + 1)
                .max()
                .unwrap_or(0)
                .max("Unit Price".len());
            let qty_w = self
                .items
                .iter()
                .map(|r| r.quantity.len())
                .max()
                .unwrap_or(0)
                .max("Qty".len());

            writeln!(
                f,
                "  {:<name_w$}  {:>qty_w$}  {:>money_w$}  {:>money_w$}",
                "Item Name", "Qty", "Unit Price", "Total"
            )?;
            for row in &self.items {
                let unit = row
                    .unit_price
                    .as_ref()
                    .map(|u| format!("{u} {cur}"))
                    .unwrap_or_else(|| "-".to_string());
                let total = format!("{} {cur}", row.line_total);
                writeln!(
                    f,
                    "  {:<name_w$}  {:>qty_w$}  {:>money_w$}  {:>money_w$}",
                    row.name, row.quantity, unit, total
                )?;
            }
        }

        heading(f, "Payment Summary")?;
        fields(f, &self.payment, &format!(" {}", self.currency))?;

        heading(f, &self.system.title)?;
        fields(f, &self.system.fields, "")?;

        if !self.warnings.is_empty() {
            heading(f, "Warnings")?;
            for w in &self.warnings {
                writeln!(f, "  - {w}")?;
            }
        }
        Ok(())
    }
}
