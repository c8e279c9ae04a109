//! Feature groups and the feature rows shown in the product comparison.

use crate::service::reconcile::Identified;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    pub available_feature_icon_url: Option<String>,
    pub unavailable_feature_icon_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureGroup {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    pub features: Vec<Feature>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureInput {
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub available_feature_icon_url: Option<String>,
    #[serde(default)]
    pub unavailable_feature_icon_url: Option<String>,
}

impl FeatureInput {
    pub fn to_feature(&self, id: Uuid) -> Feature {
        Feature {
            id,
            name: self.name.clone(),
            description: self.description.clone(),
            image_url: self.image_url.clone(),
            available_feature_icon_url: self.available_feature_icon_url.clone(),
            unavailable_feature_icon_url: self.unavailable_feature_icon_url.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureGroupInput {
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub features: Vec<FeatureInput>,
}

impl FeatureGroupInput {
    pub fn to_group(&self, id: Uuid, features: Vec<Feature>) -> FeatureGroup {
        FeatureGroup {
            id,
            name: self.name.clone(),
            description: self.description.clone(),
            image_url: self.image_url.clone(),
            features,
        }
    }
}

impl Identified for FeatureGroupInput {
    fn id(&self) -> Option<Uuid> {
        self.id
    }
}

impl Identified for FeatureInput {
    fn id(&self) -> Option<Uuid> {
        self.id
    }
}
