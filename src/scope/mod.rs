pub mod checker;
pub mod types;

pub use checker::authorizes;
pub use types::{deserialize_scopes, serialize_scopes, Resources, Scope};
