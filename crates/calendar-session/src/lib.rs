//! Session credentials and provider token lifecycle
//!
//! Takes a user from "unauthenticated" to "holds a valid session credential"
//! and keeps the underlying provider token valid across data requests. The
//! orchestrator is the only caller into the codec, the token store and the
//! provider adapter; all three are injected at construction.
//!
//! Token freshness is derived on every request from the stored expiry:
//! 1. FRESH: expiry strictly in the future, stored triple used as-is
//! 2. EXPIRED: expiry reached, refresh once and persist the merged triple
//! 3. REVOKED: refresh rejected, surfaced as `RefreshFailed`, store untouched

pub mod codec;
pub mod error;
pub mod orchestrator;
pub mod window;

pub use codec::SessionCodec;
pub use error::{Error, ErrorKind, Result};
pub use orchestrator::AuthOrchestrator;
pub use window::local_day_window;
