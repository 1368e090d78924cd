// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Storefront reads that anonymous visitors need: service info, health,
// feature flags and product search.

pub mod features;
pub mod home;
pub mod search;

pub use features::{feature_get, features_get};
pub use home::{health, root};
pub use search::search;
