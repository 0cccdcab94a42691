pub mod media;
pub mod pool;
