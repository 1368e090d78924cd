// handlers/mod.rs - 3-Tier Handler Architecture
//
// Public (no identity) → Protected (signed-in customer) → Admin (admin gate)
//
pub mod public;    // Tier 1: No authentication required (/, /health, /api/features, /api/search)
pub mod protected; // Tier 2: Customer identity required (cart, checkout, notifications)
pub mod admin;     // Tier 3: Admin gate required (/api/admin/*)
