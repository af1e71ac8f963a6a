use super::types::{Resources, Scope};

/// Whether any one of `scopes` grants access to `requested`.
///
/// Each scope is checked on its own; the list is an OR, never an AND.
pub fn authorizes(scopes: &[Scope], requested: &Resources) -> bool {
    scopes.iter().any(|scope| scope.satisfies(requested))
}
