// handlers/protected/mod.rs - Customer handlers (signed-in identity required)
//
// Every handler takes an `Identity` extractor, which answers 401 for
// anonymous and demo callers.

pub mod analytics;
pub mod cart;
pub mod notifications;
pub mod orders;
