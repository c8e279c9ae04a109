//! Domain types shared by the stores, the editor service and the renderer.

pub mod draft;
pub mod feature;
pub mod product;
pub mod template;
pub mod version;

pub use draft::*;
pub use feature::*;
pub use product::*;
pub use template::*;
pub use version::*;
