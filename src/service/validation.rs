//! Input validation for draft fields, products and feature groups.

use crate::error::AppError;
use crate::model::{
    CurrencySettings, Draft, DraftChanges, DraftFields, DraftUpdate, FeatureGroupInput, PaymentKind, PaymentType, PriceInput,
    ProductInput,
};
use regex::Regex;
use std::collections::HashSet;

const CURRENCY_PATTERN: &str = r"^[A-Z]{3}$";
const URL_PATTERN: &str = r"^https?://[^\s/$.?#][^\s]*$";

fn is_match(pattern: &str, value: &str) -> Result<bool, AppError> {
    let re = Regex::new(pattern).map_err(|e| AppError::Validation(format!("invalid pattern {}: {}", pattern, e)))?;
    Ok(re.is_match(value))
}

pub struct DraftValidator;

impl DraftValidator {
    /// Scalars of a draft after merging: names, currency settings, payment types.
    pub fn validate_fields(fields: &DraftFields) -> Result<(), AppError> {
        if fields.name.trim().is_empty() {
            return Err(AppError::Validation("name must not be empty".into()));
        }
        validate_currency_settings(&fields.currency_settings)?;
        validate_payment_types(&fields.payment_types)?;
        Ok(())
    }

    pub fn validate_product(product: &ProductInput, payment_types: &[PaymentType]) -> Result<(), AppError> {
        if product.name.trim().is_empty() {
            return Err(AppError::Validation("product name must not be empty".into()));
        }
        validate_url("buttonLink", product.button_link.as_deref())?;

        let known: HashSet<&str> = payment_types.iter().map(|p| p.name.as_str()).collect();
        let mut triples: HashSet<(&str, &str)> = HashSet::with_capacity(product.prices.len());
        for price in &product.prices {
            validate_price(price, &known)?;
            if !triples.insert((price.payment_type_name.as_str(), price.currency.as_str())) {
                return Err(AppError::Conflict(format!(
                    "product '{}' has more than one {} price for payment type '{}'",
                    product.name, price.currency, price.payment_type_name
                )));
            }
        }
        Ok(())
    }

    /// Merge `update` into `current` and validate the result. Stores call this while holding
    /// the table lock so the merge never sees a stale draft.
    pub fn changes_for(current: &Draft, update: &DraftUpdate) -> Result<DraftChanges, AppError> {
        let fields = DraftFields::merged(current.fields(), update);
        Self::validate_fields(&fields)?;
        if let Some(groups) = &update.feature_groups {
            for group in groups {
                Self::validate_feature_group(group)?;
            }
        }
        match &update.products {
            Some(products) => {
                for product in products {
                    Self::validate_product(product, &fields.payment_types)?;
                }
            }
            None => check_existing_prices(current, &fields)?,
        }
        Ok(DraftChanges {
            fields,
            products: update.products.clone(),
            feature_groups: update.feature_groups.clone(),
        })
    }

    pub fn validate_feature_group(group: &FeatureGroupInput) -> Result<(), AppError> {
        if group.name.trim().is_empty() {
            return Err(AppError::Validation("feature group name must not be empty".into()));
        }
        validate_url("imageUrl", group.image_url.as_deref())?;
        for feature in &group.features {
            if feature.name.trim().is_empty() {
                return Err(AppError::Validation("feature name must not be empty".into()));
            }
            validate_url("imageUrl", feature.image_url.as_deref())?;
            validate_url("availableFeatureIconUrl", feature.available_feature_icon_url.as_deref())?;
            validate_url("unavailableFeatureIconUrl", feature.unavailable_feature_icon_url.as_deref())?;
        }
        Ok(())
    }
}

/// Kept prices must still point at a payment type of the merged draft.
fn check_existing_prices(current: &Draft, fields: &DraftFields) -> Result<(), AppError> {
    let known: HashSet<&str> = fields.payment_types.iter().map(|p| p.name.as_str()).collect();
    for product in &current.products {
        if let Some(price) = product
            .prices
            .iter()
            .find(|p| !known.contains(p.payment_type_name.as_str()))
        {
            return Err(AppError::Validation(format!(
                "product '{}' has a price for payment type '{}' which the draft no longer defines",
                product.name, price.payment_type_name
            )));
        }
    }
    Ok(())
}

pub fn validate_currency_code(field: &str, code: &str) -> Result<(), AppError> {
    if is_match(CURRENCY_PATTERN, code)? {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "{} must be a three-letter upper-case currency code, got '{}'",
            field, code
        )))
    }
}

fn validate_currency_settings(settings: &CurrencySettings) -> Result<(), AppError> {
    validate_currency_code("currencySettings.baseCurrency", &settings.base_currency)?;
    for code in &settings.available_currencies {
        validate_currency_code("currencySettings.availableCurrencies", code)?;
    }
    if !settings.available_currencies.contains(&settings.base_currency) {
        return Err(AppError::Validation(format!(
            "base currency {} must be one of the available currencies",
            settings.base_currency
        )));
    }
    Ok(())
}

fn validate_payment_types(payment_types: &[PaymentType]) -> Result<(), AppError> {
    let mut names = HashSet::with_capacity(payment_types.len());
    for pt in payment_types {
        if pt.name.trim().is_empty() {
            return Err(AppError::Validation("payment type name must not be empty".into()));
        }
        if !names.insert(pt.name.as_str()) {
            return Err(AppError::Validation(format!("duplicate payment type '{}'", pt.name)));
        }
        if pt.usage_based_config.is_some() && pt.kind != PaymentKind::UsageBased {
            return Err(AppError::Validation(format!(
                "payment type '{}' has usageBasedConfig but is not usage-based",
                pt.name
            )));
        }
        if let Some(cfg) = &pt.usage_based_config {
            if let (Some(min), Some(max)) = (cfg.min, cfg.max) {
                if min > max {
                    return Err(AppError::Validation(format!(
                        "payment type '{}': min must not exceed max",
                        pt.name
                    )));
                }
            }
            if matches!(cfg.step, Some(step) if step <= 0.0) {
                return Err(AppError::Validation(format!("payment type '{}': step must be positive", pt.name)));
            }
        }
    }
    Ok(())
}

fn validate_price(price: &PriceInput, payment_types: &HashSet<&str>) -> Result<(), AppError> {
    if price.unit_amount < 0 {
        return Err(AppError::Validation("unitAmount must not be negative".into()));
    }
    validate_currency_code("currency", &price.currency)?;
    if !payment_types.contains(price.payment_type_name.as_str()) {
        return Err(AppError::Validation(format!(
            "unknown payment type '{}'",
            price.payment_type_name
        )));
    }
    validate_url("checkoutUrl", price.checkout_url.as_deref())?;
    if let Some(tiers) = &price.usage_tiers {
        if tiers.iter().any(|t| t.unit_amount < 0 || t.up_to < 0) {
            return Err(AppError::Validation("usage tiers must not be negative".into()));
        }
        if tiers.windows(2).any(|w| w[0].up_to >= w[1].up_to) {
            return Err(AppError::Validation("usage tiers must be in ascending upTo order".into()));
        }
    }
    Ok(())
}

fn validate_url(field: &str, url: Option<&str>) -> Result<(), AppError> {
    match url {
        Some(u) if !u.is_empty() && !is_match(URL_PATTERN, u)? => Err(AppError::Validation(format!(
            "{} must be an http(s) URL",
            field
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{default_payment_types, NewTable};
    use serde_json::json;

    fn product(value: serde_json::Value) -> ProductInput {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn default_fields_are_valid() {
        assert!(DraftValidator::validate_fields(&DraftFields::from_new(&NewTable::default())).is_ok());
    }

    #[test]
    fn rejects_bad_currency_settings() {
        let mut fields = DraftFields::from_new(&NewTable::default());
        fields.currency_settings.base_currency = "usd".into();
        assert!(DraftValidator::validate_fields(&fields).is_err());

        let mut fields = DraftFields::from_new(&NewTable::default());
        fields.currency_settings.base_currency = "EUR".into();
        assert!(matches!(DraftValidator::validate_fields(&fields), Err(AppError::Validation(_))));
    }

    #[test]
    fn rejects_duplicate_payment_types() {
        let mut fields = DraftFields::from_new(&NewTable::default());
        fields.payment_types.extend(default_payment_types());
        assert!(DraftValidator::validate_fields(&fields).is_err());
    }

    #[test]
    fn duplicate_price_triple_is_a_conflict() {
        let p = product(json!({
            "name": "Pro",
            "prices": [
                {"paymentTypeName": "Month", "unitAmount": 1000, "currency": "USD"},
                {"paymentTypeName": "Month", "unitAmount": 1200, "currency": "USD"}
            ]
        }));
        assert!(matches!(
            DraftValidator::validate_product(&p, &default_payment_types()),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn same_payment_type_in_two_currencies_is_fine() {
        let p = product(json!({
            "name": "Pro",
            "buttonLink": "https://example.com/buy",
            "prices": [
                {"paymentTypeName": "Month", "unitAmount": 1000, "currency": "USD"},
                {"paymentTypeName": "Month", "unitAmount": 900, "currency": "EUR"}
            ]
        }));
        assert!(DraftValidator::validate_product(&p, &default_payment_types()).is_ok());
    }

    #[test]
    fn price_must_reference_known_payment_type() {
        let p = product(json!({
            "name": "Pro",
            "prices": [{"paymentTypeName": "Year", "unitAmount": 1000, "currency": "USD"}]
        }));
        assert!(matches!(
            DraftValidator::validate_product(&p, &default_payment_types()),
            Err(AppError::Validation(msg)) if msg.contains("Year")
        ));
    }

    #[test]
    fn rejects_negative_amount_and_bad_urls() {
        let negative = product(json!({
            "name": "Pro",
            "prices": [{"paymentTypeName": "Month", "unitAmount": -1, "currency": "USD"}]
        }));
        assert!(DraftValidator::validate_product(&negative, &default_payment_types()).is_err());

        let bad_link = product(json!({"name": "Pro", "buttonLink": "javascript:alert(1)"}));
        assert!(DraftValidator::validate_product(&bad_link, &default_payment_types()).is_err());
    }
}
