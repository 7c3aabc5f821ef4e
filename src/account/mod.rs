//! Accounts
//!
//! The user-facing handle over a key pair: address, balances, unspent
//! notes, and the shield/transfer/unshield builders. Accounts never own
//! chain state; they read through the indexer that owns the forest.

pub mod account;
pub mod address;

pub use account::{Account, AccountError};
pub use address::{AddressError, ZkAddress, ADDRESS_HRP, ADDRESS_VERSION};
