//! SeaORM entities for the `clients` and `expiry_notifications` tables.

pub mod client;
pub mod notification;
