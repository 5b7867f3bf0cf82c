//! Storefront Session Service
//!
//! Cart and pricing state for the storefront, backed by the external
//! commerce API. The backend remains the sole source of truth: every
//! mutation is followed by an authoritative reload instead of write
//! serialization.
//!
//! ## Features
//! - Cart loading with payload normalization and per-item stock snapshots
//! - Quantity reconciliation against freshly observed stock
//! - Optimistic cart mutations with rollback on failure
//! - Discount campaign resolution
//! - Authenticated gateway fronting the backend REST API

use thiserror::Error;

pub mod backend;
pub mod config;
pub mod domain;
pub mod gateway;
pub mod session;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status} for {endpoint}")]
    BackendStatus { status: u16, endpoint: String },

    #[error("unrecognized payload shape: {0}")]
    Mapping(String),

    #[error("cart item not found")]
    ItemNotFound,

    #[error("invalid quantity")]
    InvalidQuantity,

    #[error("not authenticated")]
    Unauthorized,

    #[error("insufficient role")]
    Forbidden,
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
