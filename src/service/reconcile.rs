//! Replace-by-diff planning for nested arrays (products, prices, feature groups, features).
//!
//! The inbound array is the new truth: an item with an id updates the persisted row with that id,
//! an item without one is inserted, and persisted ids the array no longer mentions are deleted.
//! Plans are pure; stores execute them inside their own transaction.

use crate::error::AppError;
use crate::model::ProductInput;
use std::collections::HashSet;
use uuid::Uuid;

/// Inbound rows that may carry the id of an existing row.
pub trait Identified {
    fn id(&self) -> Option<Uuid>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Update,
    Insert,
}

/// One inbound item resolved to the row id it will be stored under.
#[derive(Debug)]
pub struct Step<'a, T> {
    pub id: Uuid,
    pub position: i32,
    pub action: Action,
    pub item: &'a T,
}

#[derive(Debug)]
pub struct Plan<'a, T> {
    /// In inbound order; `position` is the index in the inbound array.
    pub steps: Vec<Step<'a, T>>,
    /// Persisted ids absent from the inbound array, in persisted order.
    pub delete: Vec<Uuid>,
}

impl<'a, T> Plan<'a, T> {
    pub fn updated(&self) -> usize {
        self.steps.iter().filter(|s| s.action == Action::Update).count()
    }

    pub fn inserted(&self) -> usize {
        self.steps.iter().filter(|s| s.action == Action::Insert).count()
    }

    /// Ids every row will have once the plan is applied.
    pub fn final_ids(&self) -> Vec<Uuid> {
        self.steps.iter().map(|s| s.id).collect()
    }
}

/// Diff `inbound` against the ids currently owned by the parent.
///
/// Fails with `NotFound` when an inbound id is not owned by the parent and with `Validation`
/// when the same id appears twice. New rows get fresh v4 ids.
pub fn plan<'a, T: Identified>(kind: &str, persisted: &[Uuid], inbound: &'a [T]) -> Result<Plan<'a, T>, AppError> {
    let owned: HashSet<Uuid> = persisted.iter().copied().collect();
    let mut seen: HashSet<Uuid> = HashSet::with_capacity(inbound.len());
    let mut steps = Vec::with_capacity(inbound.len());

    for (idx, item) in inbound.iter().enumerate() {
        let position = idx as i32;
        match item.id() {
            Some(id) => {
                if !owned.contains(&id) {
                    return Err(AppError::NotFound(format!("{} {}", kind, id)));
                }
                if !seen.insert(id) {
                    return Err(AppError::Validation(format!("{} {} appears more than once", kind, id)));
                }
                steps.push(Step {
                    id,
                    position,
                    action: Action::Update,
                    item,
                });
            }
            None => steps.push(Step {
                id: Uuid::new_v4(),
                position,
                action: Action::Insert,
                item,
            }),
        }
    }

    let delete = persisted.iter().copied().filter(|id| !seen.contains(id)).collect();
    Ok(Plan { steps, delete })
}

/// Every product feature reference must point at a feature the draft will own.
pub fn check_feature_refs(products: &[ProductInput], feature_ids: &HashSet<Uuid>) -> Result<(), AppError> {
    for product in products {
        check_product_feature_refs(product, feature_ids)?;
    }
    Ok(())
}

pub fn check_product_feature_refs(product: &ProductInput, feature_ids: &HashSet<Uuid>) -> Result<(), AppError> {
    match product.feature_ids.iter().find(|id| !feature_ids.contains(id)) {
        Some(missing) => Err(AppError::NotFound(format!("feature {}", missing))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Row(Option<Uuid>);

    impl Identified for Row {
        fn id(&self) -> Option<Uuid> {
            self.0
        }
    }

    #[test]
    fn splits_updates_inserts_and_deletes() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let inbound = vec![Row(None), Row(Some(c)), Row(Some(a)), Row(None)];

        let plan = plan("product", &[a, b, c], &inbound).unwrap();

        assert_eq!(plan.updated(), 2);
        assert_eq!(plan.inserted(), 2);
        assert_eq!(plan.delete, vec![b]);
        let positions: Vec<i32> = plan.steps.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
        assert_eq!(plan.steps[1].id, c);
        assert_eq!(plan.steps[2].id, a);
        assert_ne!(plan.steps[0].id, plan.steps[3].id);
    }

    #[test]
    fn empty_inbound_deletes_everything() {
        let ids = [Uuid::new_v4(), Uuid::new_v4()];
        let plan = plan::<Row>("price", &ids, &[]).unwrap();
        assert!(plan.steps.is_empty());
        assert_eq!(plan.delete, ids.to_vec());
    }

    #[test]
    fn foreign_id_is_not_found() {
        let owned = Uuid::new_v4();
        let foreign = Uuid::new_v4();
        let err = plan("price", &[owned], &[Row(Some(foreign))]).unwrap_err();
        assert!(matches!(err, AppError::NotFound(msg) if msg.contains(&foreign.to_string())));
    }

    #[test]
    fn repeated_id_is_rejected() {
        let id = Uuid::new_v4();
        let err = plan("product", &[id], &[Row(Some(id)), Row(Some(id))]).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn feature_refs_must_be_known() {
        let known = Uuid::new_v4();
        let product: ProductInput = serde_json::from_value(serde_json::json!({
            "name": "Pro",
            "featureIds": [known, Uuid::new_v4()]
        }))
        .unwrap();
        let ids: HashSet<Uuid> = [known].into_iter().collect();
        assert!(matches!(check_feature_refs(&[product], &ids), Err(AppError::NotFound(_))));
    }
}
