//! Centralized constants for the default endpoint and UA.

/// Identifies the client to the backend.
pub(crate) const USER_AGENT: &str = concat!("cinefetch/", env!("CARGO_PKG_VERSION"));

/// Backend API root used when no base URL is configured (the dev server of the web app).
pub(crate) const DEFAULT_BASE_URL: &str = "http://localhost:5000/api/";
