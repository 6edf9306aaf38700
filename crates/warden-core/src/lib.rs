//! warden-core — local credential vault for the Warden key-custody CLI
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - Expected failures (wrong password, missing record, remote rejection) are
//!   typed variants of [`VaultError`], never panics or generic catch-alls.
//!
//! # Module layout
//! - `envelope` — password-based AES-256-GCM envelope encryption
//! - `kdf`      — Argon2id password stretching + HKDF per-node subkeys
//! - `identity` — X25519 identity keypairs + root signing-key generation
//! - `sealing`  — public-key sealed messages for guardian key distribution
//! - `models`   — guardian / user / token / key records
//! - `store`    — file-per-record vault storage with integrity checksums
//! - `auth`     — token-then-challenge-response login orchestration
//! - `remote`   — guardian network service interface + HTTP client
//! - `paths`    — vault root directory resolution
//! - `error`    — unified error taxonomy

pub mod auth;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod kdf;
pub mod models;
pub mod paths;
pub mod remote;
pub mod sealing;
pub mod store;

pub use error::{Result, VaultError};
