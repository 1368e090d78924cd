// handlers/admin/mod.rs - Admin back-office handlers
//
// Every route here sits behind the admin gate middleware; handlers receive
// the resolved `AdminSession`. Feature-flag routes use the demo-aware gate.

pub mod categories;
pub mod customers;
pub mod events;
pub mod features;
pub mod orders;
pub mod products;
pub mod subcategories;
pub mod utils;
