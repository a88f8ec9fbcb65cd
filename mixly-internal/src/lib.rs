pub mod affiliate; // shopping links for suggested ingredients
pub mod config_parser; // Mixly config file
pub mod endpoints; // API endpoints
pub mod error; // error handling
pub mod gateway_util; // utilities for gateway
pub mod observability; // utilities for observability (logs, metrics, etc.)
pub mod suggestion; // cocktail suggestion providers
mod testing;
pub mod usage; // usage records, entitlement checks and premium upgrades
