mod memory;
mod redis;

pub use self::redis::RedisStore;
pub use memory::MemoryStore;
