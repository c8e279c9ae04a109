//! Products and prices.

use crate::service::reconcile::Identified;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTier {
    pub up_to: i64,
    pub unit_amount: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    pub id: Uuid,
    pub payment_type_name: String,
    /// Minor currency units (cents for USD).
    pub unit_amount: i64,
    pub currency: String,
    /// Overrides the product's button link for this price.
    pub checkout_url: Option<String>,
    pub usage_tiers: Option<Vec<UsageTier>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub is_highlighted: bool,
    pub highlight_text: Option<String>,
    pub button_text: Option<String>,
    pub button_link: Option<String>,
    pub stripe_product_id: Option<String>,
    pub paddle_product_id: Option<String>,
    /// Features (of the same draft) this product includes.
    pub feature_ids: Vec<Uuid>,
    pub prices: Vec<Price>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceInput {
    pub id: Option<Uuid>,
    pub payment_type_name: String,
    pub unit_amount: i64,
    pub currency: String,
    #[serde(default)]
    pub checkout_url: Option<String>,
    #[serde(default)]
    pub usage_tiers: Option<Vec<UsageTier>>,
}

impl PriceInput {
    pub fn to_price(&self, id: Uuid) -> Price {
        Price {
            id,
            payment_type_name: self.payment_type_name.clone(),
            unit_amount: self.unit_amount,
            currency: self.currency.clone(),
            checkout_url: self.checkout_url.clone(),
            usage_tiers: self.usage_tiers.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_highlighted: bool,
    #[serde(default)]
    pub highlight_text: Option<String>,
    #[serde(default)]
    pub button_text: Option<String>,
    #[serde(default)]
    pub button_link: Option<String>,
    #[serde(default)]
    pub stripe_product_id: Option<String>,
    #[serde(default)]
    pub paddle_product_id: Option<String>,
    #[serde(default)]
    pub feature_ids: Vec<Uuid>,
    #[serde(default)]
    pub prices: Vec<PriceInput>,
}

impl ProductInput {
    /// Product with the input's fields under `id`; prices are filled in by the caller.
    pub fn to_product(&self, id: Uuid, prices: Vec<Price>) -> Product {
        Product {
            id,
            name: self.name.clone(),
            description: self.description.clone(),
            is_highlighted: self.is_highlighted,
            highlight_text: self.highlight_text.clone(),
            button_text: self.button_text.clone(),
            button_link: self.button_link.clone(),
            stripe_product_id: self.stripe_product_id.clone(),
            paddle_product_id: self.paddle_product_id.clone(),
            feature_ids: self.feature_ids.clone(),
            prices,
        }
    }
}

impl Identified for ProductInput {
    fn id(&self) -> Option<Uuid> {
        self.id
    }
}

impl Identified for PriceInput {
    fn id(&self) -> Option<Uuid> {
        self.id
    }
}
