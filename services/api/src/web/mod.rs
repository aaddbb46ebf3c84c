pub mod auth;
pub mod billing;
pub mod conversions;
pub mod docs;
pub mod middleware;
pub mod read;
pub mod stacks;
pub mod state;

// Re-export the pieces the binary needs to build the router.
pub use docs::ApiDoc;
pub use middleware::{optional_auth, require_auth};
