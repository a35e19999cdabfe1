//! MAPCACHE Storage - Sessions and the Two Cache Tiers
//!
//! Sessions route reads through a per-session cache and a per-namespace
//! shared cache before falling back to a [`QueryExecutor`]. The Employee
//! mapper and in-memory table sit on top as the reference domain.

pub mod cache;
pub mod mapper;
pub mod memory_table;
pub mod session;

pub use cache::{
    CacheEntry, CacheRead, CacheStats, CacheTier, LogicalClock, MergeOutcome, PromotionSink,
    QueryExecutor, SessionCache, SharedCache, SharedCacheRegistry, Watermark,
};
pub use mapper::{employee_namespace_settings, statements, EmployeeMapper, SessionEmployeeMapper};
pub use memory_table::InMemoryEmployeeTable;
pub use session::{PromotionEvent, Session, SessionFactory, SessionState, SessionStats};
