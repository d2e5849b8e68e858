//! Extraction prompts sent alongside the receipt image.
//!
//! The model's output is untyped text, so the prompt is the only lever that
//! pushes it toward parseable JSON. Each prompt spells out every field name
//! and format so the recovered record matches the shape the renderer and
//! exporters expect. [`crate::pipeline::recover`] handles the cases where
//! the model wraps its answer in prose or fences anyway.
//!
//! Callers can override the default via
//! [`crate::config::ExtractionConfig::system_prompt`].

use crate::config::ReceiptSchema;

/// Prompt for [`ReceiptSchema::LineItems`]: one flat record per purchased item.
pub const LINE_ITEMS_PROMPT: &str = r#"You are a receipt OCR system. Extract every purchased item from this receipt image and return a JSON ARRAY with one object per item.

Every object must contain ALL of the following fields. Header-level fields are repeated unchanged on every item object. Use an empty string for text fields that are not printed on the receipt and 0 for amounts that are not printed.

STORE IDENTITY
- store_name: name of the store
- store_address: full store address
- store_code: store / object code
- taxpayer_name: registered taxpayer name
- tax_id: taxpayer identification number (VÖEN)
- receipt_number: receipt / sale number
- cashier_name: cashier name

TIMESTAMPS
- date: purchase date, format DD.MM.YYYY
- time: purchase time, format HH:MM:SS

ITEM
- item_name: product or service name
- quantity: purchased quantity (number)
- unit_price: price of one unit (number)
- line_total: total for this line (number)

TOTALS
- subtotal: receipt total before tax breakdown (number)
- vat_18_percent: VAT 18% amount (number)
- total_tax: total tax amount (number)

PAYMENT BREAKDOWN
- cashless_payment: amount paid by card (number)
- cash_payment: amount paid in cash (number)
- bonus_payment: amount paid with bonus points (number)
- advance_payment: amount paid from an advance (number)
- credit_payment: amount paid on credit (number)

DEVICE AND FISCAL DATA
- queue_number: receipt number within the shift
- cash_register_model: cash register model name
- cash_register_serial: cash register serial number
- fiscal_id: fiscal identifier printed on the receipt
- fiscal_registration: fiscal registration number

REFUNDS (only when the receipt is a refund)
- refund_amount: refunded amount (number)
- refund_date: refund date, format DD.MM.YYYY
- refund_time: refund time, format HH:MM:SS

NORMALISATION RULES
1. Strip tax-code prefixes printed before item names (for example "ƏDV:", "*", "18%" or a leading tax letter) so item_name holds only the product name.
2. Correct obviously mis-scaled quantities: a weight printed as "1500" next to a unit price per kilogram is 1.5, not 1500.
3. If the stated unit price is implausible for the line, recompute it as line_total ÷ quantity.
4. Every object must satisfy line_total = quantity × unit_price (rounded to 2 decimals).
5. Amounts are plain numbers with "." as the decimal separator: no currency symbols, no thousands separators.

Return ONLY valid JSON, no other text."#;

/// Prompt for [`ReceiptSchema::Summary`]: one object per receipt.
pub const SUMMARY_PROMPT: &str = r#"You are a receipt OCR system. Extract all relevant information from this receipt image and return it as a structured JSON object with the following fields:
- merchant_name: The name of the store/merchant
- date: The date of purchase (format: YYYY-MM-DD)
- time: The time of purchase (format: HH:MM)
- items: An array of items, each with name, quantity, and price
- subtotal: The subtotal amount
- tax: The tax amount
- total: The total amount
- payment_method: The payment method used (if available)
- address: The store address (if available)

Return ONLY valid JSON, no other text."#;

/// The built-in prompt for a schema.
pub fn prompt_for(schema: ReceiptSchema) -> &'static str {
    match schema {
        ReceiptSchema::LineItems => LINE_ITEMS_PROMPT,
        ReceiptSchema::Summary => SUMMARY_PROMPT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_items_prompt_names_every_field() {
        for field in [
            "store_name",
            "store_address",
            "store_code",
            "taxpayer_name",
            "tax_id",
            "receipt_number",
            "cashier_name",
            "item_name",
            "quantity",
            "unit_price",
            "line_total",
            "vat_18_percent",
            "total_tax",
            "cashless_payment",
            "cash_payment",
            "bonus_payment",
            "advance_payment",
            "credit_payment",
            "queue_number",
            "cash_register_model",
            "cash_register_serial",
            "fiscal_id",
            "fiscal_registration",
            "refund_amount",
        ] {
            assert!(LINE_ITEMS_PROMPT.contains(field), "missing field {field}");
        }
    }

    #[test]
    fn prompts_demand_bare_json() {
        for schema in [ReceiptSchema::LineItems, ReceiptSchema::Summary] {
            assert!(prompt_for(schema).ends_with("Return ONLY valid JSON, no other text."));
        }
    }

    #[test]
    fn line_items_prompt_states_identity() {
        assert!(LINE_ITEMS_PROMPT.contains("line_total = quantity × unit_price"));
        assert!(LINE_ITEMS_PROMPT.contains("line_total ÷ quantity"));
    }

    #[test]
    fn summary_prompt_is_legacy_shape() {
        assert!(SUMMARY_PROMPT.contains("merchant_name"));
        assert!(SUMMARY_PROMPT.contains("YYYY-MM-DD"));
    }
}
