//! Price table, draft and the editor inputs that mutate a draft.

use crate::model::feature::{FeatureGroup, FeatureGroupInput};
use crate::model::product::{Product, ProductInput};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Selector → properties map. Values may nest one level deeper for at-rules such as `@media`.
pub type CssRules = serde_json::Map<String, serde_json::Value>;

pub const DEFAULT_TABLE_NAME: &str = "Untitled pricing table";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencySettings {
    pub base_currency: String,
    pub available_currencies: Vec<String>,
}

impl Default for CurrencySettings {
    fn default() -> Self {
        CurrencySettings {
            base_currency: "USD".into(),
            available_currencies: vec!["USD".into()],
        }
    }
}

impl CurrencySettings {
    pub fn merged(&self, patch: &CurrencySettingsPatch) -> CurrencySettings {
        CurrencySettings {
            base_currency: patch.base_currency.clone().unwrap_or_else(|| self.base_currency.clone()),
            available_currencies: patch
                .available_currencies
                .clone()
                .unwrap_or_else(|| self.available_currencies.clone()),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencySettingsPatch {
    pub base_currency: Option<String>,
    pub available_currencies: Option<Vec<String>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentKind {
    Cycle,
    OneTime,
    UsageBased,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageBasedConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

/// A named billing cadence referenced by prices through `payment_type_name`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentType {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PaymentKind,
    pub unit_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_based_config: Option<UsageBasedConfig>,
}

pub fn default_payment_types() -> Vec<PaymentType> {
    vec![PaymentType {
        name: "Month".into(),
        kind: PaymentKind::Cycle,
        unit_name: "/month".into(),
        usage_based_config: None,
    }]
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTable {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub template_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The mutable configuration of a table. Products and feature groups are kept in stored order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub id: Uuid,
    pub table_id: Uuid,
    pub name: String,
    pub stripe_public_key: Option<String>,
    pub paddle_public_key: Option<String>,
    pub currency_settings: CurrencySettings,
    pub payment_types: Vec<PaymentType>,
    /// Version of the template the table is bound to.
    pub template_version: String,
    pub html_template: Option<String>,
    pub custom_css: CssRules,
    pub products: Vec<Product>,
    pub feature_groups: Vec<FeatureGroup>,
    pub updated_at: DateTime<Utc>,
}

impl Draft {
    pub fn fields(&self) -> DraftFields {
        DraftFields {
            name: self.name.clone(),
            stripe_public_key: self.stripe_public_key.clone(),
            paddle_public_key: self.paddle_public_key.clone(),
            currency_settings: self.currency_settings.clone(),
            payment_types: self.payment_types.clone(),
            html_template: self.html_template.clone(),
            custom_css: self.custom_css.clone(),
        }
    }

    pub fn feature_ids(&self) -> Vec<Uuid> {
        self.feature_groups
            .iter()
            .flat_map(|g| g.features.iter().map(|f| f.id))
            .collect()
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    pub id: Uuid,
    pub name: String,
    pub is_published: bool,
    pub latest_version: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

/// Scalar columns of a draft row. Always written as a whole after merging.
#[derive(Clone, Debug, PartialEq)]
pub struct DraftFields {
    pub name: String,
    pub stripe_public_key: Option<String>,
    pub paddle_public_key: Option<String>,
    pub currency_settings: CurrencySettings,
    pub payment_types: Vec<PaymentType>,
    pub html_template: Option<String>,
    pub custom_css: CssRules,
}

impl DraftFields {
    pub fn from_new(input: &NewTable) -> DraftFields {
        DraftFields {
            name: input.name.clone().unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            stripe_public_key: input.stripe_public_key.clone(),
            paddle_public_key: input.paddle_public_key.clone(),
            currency_settings: input
                .currency_settings
                .as_ref()
                .map(|p| CurrencySettings::default().merged(p))
                .unwrap_or_default(),
            payment_types: input.payment_types.clone().unwrap_or_else(default_payment_types),
            html_template: None,
            custom_css: CssRules::new(),
        }
    }

    /// Field-by-field merge of an update into the current values.
    pub fn merged(current: DraftFields, update: &DraftUpdate) -> DraftFields {
        DraftFields {
            name: update.name.clone().unwrap_or(current.name),
            stripe_public_key: match &update.stripe_public_key {
                Some(v) => v.clone(),
                None => current.stripe_public_key,
            },
            paddle_public_key: match &update.paddle_public_key {
                Some(v) => v.clone(),
                None => current.paddle_public_key,
            },
            currency_settings: match &update.currency_settings {
                Some(patch) => current.currency_settings.merged(patch),
                None => current.currency_settings,
            },
            payment_types: update.payment_types.clone().unwrap_or(current.payment_types),
            html_template: match &update.html_template {
                Some(v) => v.clone(),
                None => current.html_template,
            },
            custom_css: update.custom_css.clone().unwrap_or(current.custom_css),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTable {
    pub name: Option<String>,
    pub stripe_public_key: Option<String>,
    pub paddle_public_key: Option<String>,
    pub currency_settings: Option<CurrencySettingsPatch>,
    pub payment_types: Option<Vec<PaymentType>>,
}

/// Partial draft update. Absent fields are kept; `null` clears nullable fields.
/// `products` and `featureGroups`, when present, replace the stored arrays by id.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftUpdate {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub stripe_public_key: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub paddle_public_key: Option<Option<String>>,
    pub currency_settings: Option<CurrencySettingsPatch>,
    pub payment_types: Option<Vec<PaymentType>>,
    #[serde(default, deserialize_with = "double_option")]
    pub html_template: Option<Option<String>>,
    pub custom_css: Option<CssRules>,
    pub products: Option<Vec<ProductInput>>,
    pub feature_groups: Option<Vec<FeatureGroupInput>>,
}

/// What a store applies in one transaction: merged scalars plus the arrays to reconcile.
#[derive(Clone, Debug)]
pub struct DraftChanges {
    pub fields: DraftFields,
    pub products: Option<Vec<ProductInput>>,
    pub feature_groups: Option<Vec<FeatureGroupInput>>,
}

fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_distinguishes_absent_from_null() {
        let absent: DraftUpdate = serde_json::from_str(r#"{"name":"Plans"}"#).unwrap();
        assert_eq!(absent.stripe_public_key, None);
        let cleared: DraftUpdate = serde_json::from_str(r#"{"stripePublicKey":null}"#).unwrap();
        assert_eq!(cleared.stripe_public_key, Some(None));
        let set: DraftUpdate = serde_json::from_str(r#"{"stripePublicKey":"pk_test"}"#).unwrap();
        assert_eq!(set.stripe_public_key, Some(Some("pk_test".into())));
    }

    #[test]
    fn merge_keeps_untouched_fields_and_merges_currency_settings() {
        let current = DraftFields {
            stripe_public_key: Some("pk_live".into()),
            ..DraftFields::from_new(&NewTable::default())
        };
        let update: DraftUpdate = serde_json::from_str(
            r#"{"name":"Team plans","currencySettings":{"availableCurrencies":["USD","EUR"]}}"#,
        )
        .unwrap();
        let merged = DraftFields::merged(current, &update);
        assert_eq!(merged.name, "Team plans");
        assert_eq!(merged.stripe_public_key.as_deref(), Some("pk_live"));
        assert_eq!(merged.currency_settings.base_currency, "USD");
        assert_eq!(merged.currency_settings.available_currencies, vec!["USD", "EUR"]);
        assert_eq!(merged.payment_types, default_payment_types());
    }

    #[test]
    fn payment_kind_uses_kebab_case() {
        let pt: PaymentType =
            serde_json::from_str(r#"{"name":"Once","type":"one-time","unitName":""}"#).unwrap();
        assert_eq!(pt.kind, PaymentKind::OneTime);
        let json = serde_json::to_value(&pt).unwrap();
        assert_eq!(json["type"], "one-time");
        assert!(json.get("usageBasedConfig").is_none());
    }
}
