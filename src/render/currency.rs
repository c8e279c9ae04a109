//! en-US style currency display for minor-unit amounts.

use num_format::{Locale, ToFormattedString};

/// Display prefix for `currency` the way en-US formatting shows it; unknown codes get `"CODE "`.
pub fn currency_symbol(currency: &str) -> String {
    let symbol = match currency {
        "USD" => "$",
        "EUR" => "€",
        "GBP" => "£",
        "JPY" => "¥",
        "INR" => "₹",
        "KRW" => "₩",
        "ILS" => "₪",
        "VND" => "₫",
        "PHP" => "₱",
        "CNY" => "CN¥",
        "CAD" => "CA$",
        "AUD" => "A$",
        "NZD" => "NZ$",
        "HKD" => "HK$",
        "MXN" => "MX$",
        "BRL" => "R$",
        "TWD" => "NT$",
        other => return format!("{} ", other),
    };
    symbol.to_string()
}

/// Formats `amount` minor units (hundredths) of `currency`: `1099, "USD"` → `$10.99`,
/// `123456789, "EUR"` → `€1,234,567.89`, `-250, "GBP"` → `-£2.50`.
pub fn format_currency(amount: i64, currency: &str) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    let whole = abs / 100;
    let cents = abs % 100;
    format!(
        "{}{}{}.{:02}",
        sign,
        currency_symbol(currency),
        whole.to_formatted_string(&Locale::en),
        cents
    )
}
