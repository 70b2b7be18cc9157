//! Database repositories for the data access layer.

// Import record repository and store seam
pub mod import;
//
// Write-retry helpers for transient transaction conflicts
pub mod retry;
