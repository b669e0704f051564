//! Payment lifecycle and ledger engine for a coaching marketplace.
//!
//! The engine holds a client's funds before a session is delivered
//! (authorization), finalizes the hold after delivery (capture), splits the
//! proceeds between platform and coach, computes policy-driven refunds,
//! keeps an append-only billing ledger, pays coaches out to verified bank
//! accounts, and reconciles local state against the gateway's asynchronous
//! webhooks.
//!
//! HTTP surfaces, authentication and the rest of the marketplace live
//! elsewhere; they drive this crate through [`service::ServiceContext`].

pub mod config;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod repository;
pub mod service;
