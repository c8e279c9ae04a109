//! Data handed to templates. Field names are camelCase, matching the template placeholders.

use crate::model::{CurrencySettings, Feature, FeatureGroup, PaymentType, Price, Product, PublishedData};
use crate::render::currency::format_currency;
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

pub const PRICE_NOT_AVAILABLE: &str = "Price not available";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderContext<'a> {
    pub price_table: TableContext<'a>,
    pub products: Vec<ProductContext<'a>>,
    pub feature_groups: Vec<FeatureGroupContext<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableContext<'a> {
    pub name: &'a str,
    pub currency_settings: &'a CurrencySettings,
    pub payment_types: &'a [PaymentType],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceContext<'a> {
    pub id: Uuid,
    pub payment_type_name: &'a str,
    pub unit_amount: i64,
    pub currency: &'a str,
    pub formatted_price: String,
    pub billing_cycle: &'a str,
    pub checkout_url: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlag<'a> {
    pub id: Uuid,
    pub name: &'a str,
    pub description: &'a str,
    pub available: bool,
    pub icon_url: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductContext<'a> {
    pub id: Uuid,
    pub name: &'a str,
    pub description: &'a str,
    pub is_highlighted: bool,
    pub highlight_text: Option<&'a str>,
    pub button_text: Option<&'a str>,
    /// Primary price checkout URL, falling back to the product button link.
    pub button_href: Option<&'a str>,
    pub formatted_price: String,
    pub billing_cycle: &'a str,
    pub primary_price: Option<PriceContext<'a>>,
    pub prices: Vec<PriceContext<'a>>,
    pub features: Vec<FeatureFlag<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureGroupContext<'a> {
    pub id: Uuid,
    pub name: &'a str,
    pub description: &'a str,
    pub image_url: Option<&'a str>,
    pub features: Vec<&'a Feature>,
}

impl<'a> RenderContext<'a> {
    pub fn build(data: &'a PublishedData) -> Self {
        let all_features: Vec<&Feature> = data.feature_groups.iter().flat_map(|g| g.features.iter()).collect();
        RenderContext {
            price_table: TableContext {
                name: &data.name,
                currency_settings: &data.currency_settings,
                payment_types: &data.payment_types,
            },
            products: data
                .products
                .iter()
                .map(|p| product_context(p, data, &all_features))
                .collect(),
            feature_groups: data.feature_groups.iter().map(group_context).collect(),
        }
    }
}

fn billing_cycle<'a>(payment_types: &'a [PaymentType], name: &str) -> &'a str {
    payment_types
        .iter()
        .find(|pt| pt.name == name)
        .map(|pt| pt.unit_name.as_str())
        .unwrap_or("")
}

fn price_context<'a>(price: &'a Price, payment_types: &'a [PaymentType]) -> PriceContext<'a> {
    PriceContext {
        id: price.id,
        payment_type_name: &price.payment_type_name,
        unit_amount: price.unit_amount,
        currency: &price.currency,
        formatted_price: format_currency(price.unit_amount, &price.currency),
        billing_cycle: billing_cycle(payment_types, &price.payment_type_name),
        checkout_url: price.checkout_url.as_deref(),
    }
}

/// First price in the base currency, else the first price.
pub fn primary_price<'a>(product: &'a Product, base_currency: &str) -> Option<&'a Price> {
    product
        .prices
        .iter()
        .find(|p| p.currency == base_currency)
        .or_else(|| product.prices.first())
}

fn product_context<'a>(product: &'a Product, data: &'a PublishedData, features: &[&'a Feature]) -> ProductContext<'a> {
    let primary = primary_price(product, &data.currency_settings.base_currency)
        .map(|p| price_context(p, &data.payment_types));
    let included: HashSet<Uuid> = product.feature_ids.iter().copied().collect();
    ProductContext {
        id: product.id,
        name: &product.name,
        description: &product.description,
        is_highlighted: product.is_highlighted,
        highlight_text: product.highlight_text.as_deref(),
        button_text: product.button_text.as_deref(),
        button_href: primary
            .as_ref()
            .and_then(|p| p.checkout_url)
            .or(product.button_link.as_deref()),
        formatted_price: primary
            .as_ref()
            .map(|p| p.formatted_price.clone())
            .unwrap_or_else(|| PRICE_NOT_AVAILABLE.to_string()),
        billing_cycle: primary.as_ref().map(|p| p.billing_cycle).unwrap_or(""),
        primary_price: primary,
        prices: product
            .prices
            .iter()
            .map(|p| price_context(p, &data.payment_types))
            .collect(),
        features: features
            .iter()
            .map(|f| {
                let available = included.contains(&f.id);
                FeatureFlag {
                    id: f.id,
                    name: &f.name,
                    description: &f.description,
                    available,
                    icon_url: if available {
                        f.available_feature_icon_url.as_deref()
                    } else {
                        f.unavailable_feature_icon_url.as_deref()
                    },
                }
            })
            .collect(),
    }
}

fn group_context(group: &FeatureGroup) -> FeatureGroupContext<'_> {
    FeatureGroupContext {
        id: group.id,
        name: &group.name,
        description: &group.description,
        image_url: group.image_url.as_deref(),
        features: group.features.iter().collect(),
    }
}
