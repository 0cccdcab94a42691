use redis::{Client, aio::MultiplexedConnection};
use tracing::info;

/// One multiplexed connection shared by every caller; clones are cheap handles to it.
#[derive(Clone)]
pub struct RedisService {
    conn: MultiplexedConnection,
}

impl RedisService {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = Client::open(connection_string)?;
        let mut conn = client.get_multiplexed_async_connection().await?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        info!("✅ Connected to Redis");
        Ok(Self { conn })
    }

    pub fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}
