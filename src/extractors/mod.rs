pub mod body;
pub mod owner;
pub mod params;

pub use body::JsonBody;
pub use owner::{OwnerId, OWNER_ID_HEADER};
pub use params::{PathParam, QueryParams};
