//! Two-tier query result cache.
//!
//! Results are memoized first in a [`SessionCache`] owned by one session and,
//! once that session ends cleanly, in a per-namespace [`SharedCache`] visible
//! to every session of the factory.
//!
//! # Staleness
//!
//! Every cached entry carries a sequence drawn from one [`LogicalClock`].
//! A committed write raises its namespace's [`Watermark`] to a fresh tick;
//! entries below the watermark are never served and never merged back in.
//! Reads return [`CacheRead<T>`], which says which tier answered.
//!
//! # Example
//!
//! ```ignore
//! let session = factory.open_session();
//! let stmt = session.statement("Employee", "getEmpById")?;
//! let read = session.select(&stmt, Params::new().with("id", 1), RowBounds::unbounded())?;
//! if read.was_cache_hit() {
//!     tracing::debug!(tier = ?read.tier(), "served from cache");
//! }
//! session.close()?;
//! ```

pub mod entry;
pub mod registry;
pub mod session_cache;
pub mod shared_cache;
pub mod traits;
pub mod watermark;

pub use entry::{CacheEntry, CacheRead, CacheTier};
pub use registry::SharedCacheRegistry;
pub use session_cache::SessionCache;
pub use shared_cache::{MergeOutcome, SharedCache};
pub use traits::{CacheStats, PromotionSink, QueryExecutor};
pub use watermark::{LogicalClock, Watermark};
