//! Weighted reward selection for gacha packets.
//!
//! `ledger` turns a draw-set's percent strings into exact integer weights
//! and certifies the total; `selector` draws from a certified table with an
//! injected `RandomSource`; `report` is advisory tooling. `store` and
//! `purchase` are the caller side: catalogue, wallets, history, delivery.

pub mod config;
pub mod error;
pub mod fixed_point;
pub mod ledger;
pub mod purchase;
pub mod report;
pub mod rng;
pub mod selector;
pub mod store;
pub mod types;
