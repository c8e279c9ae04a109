//! Editor, publish and template operations on top of a `PricingStore`.

mod editor;
mod publish;
pub mod reconcile;
mod templates;
mod validation;

pub use editor::DraftEditor;
pub use publish::Publisher;
pub use templates::{TemplateService, TemplateUpgrade};
pub use validation::{validate_currency_code, DraftValidator};
