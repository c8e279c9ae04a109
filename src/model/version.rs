//! Published versions: immutable copies of a draft taken at publish time.

use crate::model::draft::{CssRules, CurrencySettings, Draft, PaymentType};
use crate::model::feature::FeatureGroup;
use crate::model::product::Product;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything a public render needs, frozen at publish time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedData {
    pub name: String,
    pub currency_settings: CurrencySettings,
    pub payment_types: Vec<PaymentType>,
    pub template_version: String,
    pub html_template: Option<String>,
    pub custom_css: CssRules,
    pub products: Vec<Product>,
    pub feature_groups: Vec<FeatureGroup>,
}

impl From<&Draft> for PublishedData {
    fn from(draft: &Draft) -> Self {
        PublishedData {
            name: draft.name.clone(),
            currency_settings: draft.currency_settings.clone(),
            payment_types: draft.payment_types.clone(),
            template_version: draft.template_version.clone(),
            html_template: draft.html_template.clone(),
            custom_css: draft.custom_css.clone(),
            products: draft.products.clone(),
            feature_groups: draft.feature_groups.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedVersion {
    pub id: Uuid,
    pub table_id: Uuid,
    /// 1 for the first publish of a table, incremented on every publish.
    pub version: i32,
    pub published_at: DateTime<Utc>,
    pub data: PublishedData,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub version: i32,
    pub published_at: DateTime<Utc>,
}
