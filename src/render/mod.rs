//! Turns a published snapshot plus its template into an embeddable HTML fragment.

pub mod builtin;
pub mod context;
pub mod css;
pub mod currency;
pub mod engine;

pub use builtin::builtin_templates;
pub use context::{primary_price, RenderContext, PRICE_NOT_AVAILABLE};
pub use currency::format_currency;
pub use engine::{RenderEngine, RenderedTable};
