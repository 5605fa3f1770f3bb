pub mod cache;
pub mod policy;
#[cfg(feature = "redis-cache")]
pub mod redis_cache;
pub mod store;
pub mod window;

pub use cache::{MemoryWindowCache, WindowCache};
pub use policy::WindowPolicy;
#[cfg(feature = "redis-cache")]
pub use redis_cache::RedisWindowCache;
pub use store::WindowStore;
pub use window::ParameterWindow;
