pub mod admin_gate;
pub mod checkout;
pub mod features;

pub use admin_gate::{AdminSignal, GateDecision};
pub use checkout::{Checkout, CheckoutError, CheckoutRequest};
pub use features::{FeatureFlag, FeatureService, FlagCache, FlagMap};
