use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client as RedisClient, RedisError, RedisResult, Script};
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio::time::{Instant, timeout};

use super::{BackingStore, Increment, PayloadStream, StoreError, StoreResult};

/// 扫描时每页的建议数量
const SCAN_PAGE_SIZE: usize = 100;

/// 连接失败后的这段时间内不再重连，直接报告不可用
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// 读取当前值，达到上限则拒绝；否则自增，
/// 第一次计数或计数器缺少过期时间时设置过期
const INCR_BOUNDED_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current >= tonumber(ARGV[1]) then
  return {0, current}
end
local count = redis.call('INCR', KEYS[1])
if count == 1 or redis.call('TTL', KEYS[1]) == -1 then
  redis.call('EXPIRE', KEYS[1], ARGV[2])
end
return {1, count}
"#;

#[derive(Debug, Clone, Copy)]
pub struct RedisTimeouts {
    pub connect: Duration,
    pub command: Duration,
}

impl Default for RedisTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            command: Duration::from_secs(3),
        }
    }
}

/// Redis 实现
///
/// 连接按需建立，断开后下一次调用会重新连接；
/// 所有命令都有超时，超时视为存储不可用。
/// 同一时间只有一个调用在建立连接，失败后在退避期内其余调用立即失败。
pub struct RedisStore {
    client: RedisClient,
    connection: RwLock<Option<ConnectionManager>>,
    dial: AsyncMutex<()>,
    last_failure: Mutex<Option<Instant>>,
    timeouts: RedisTimeouts,
    incr_script: Script,
}

impl RedisStore {
    /// 只解析地址，不建立连接
    pub fn open(url: &str, timeouts: RedisTimeouts) -> StoreResult<Self> {
        let client = RedisClient::open(url).map_err(|e| StoreError::Command(e.to_string()))?;
        Ok(Self {
            client,
            connection: RwLock::new(None),
            dial: AsyncMutex::new(()),
            last_failure: Mutex::new(None),
            timeouts,
            incr_script: Script::new(INCR_BOUNDED_SCRIPT),
        })
    }

    /// 解析地址并立即建立连接
    pub async fn connect(url: &str, timeouts: RedisTimeouts) -> StoreResult<Self> {
        let store = Self::open(url, timeouts)?;
        store.connection().await?;
        Ok(store)
    }

    async fn connection(&self) -> StoreResult<ConnectionManager> {
        if let Some(conn) = self.connection.read().await.as_ref() {
            return Ok(conn.clone());
        }
        self.check_backoff()?;

        let _dial = self.dial.lock().await;
        // 等锁期间别的调用可能已经连上或已经失败
        if let Some(conn) = self.connection.read().await.as_ref() {
            return Ok(conn.clone());
        }
        self.check_backoff()?;

        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(0)
            .set_connection_timeout(self.timeouts.connect)
            .set_response_timeout(self.timeouts.command);
        let dialled = match timeout(
            self.timeouts.connect,
            ConnectionManager::new_with_config(self.client.clone(), config),
        )
        .await
        {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(classify(e)),
            Err(_) => Err(StoreError::Unavailable("connect timed out".into())),
        };

        match dialled {
            Ok(conn) => {
                *self.last_failure.lock().unwrap_or_else(|e| e.into_inner()) = None;
                *self.connection.write().await = Some(conn.clone());
                tracing::info!("Redis connection established");
                Ok(conn)
            }
            Err(e) => {
                *self.last_failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
                tracing::warn!(error = %e, "Redis connection failed");
                Err(e)
            }
        }
    }

    fn check_backoff(&self) -> StoreResult<()> {
        let last_failure = *self.last_failure.lock().unwrap_or_else(|e| e.into_inner());
        match last_failure {
            Some(at) if at.elapsed() < RECONNECT_BACKOFF => Err(StoreError::Unavailable(
                "reconnect backoff after failed connect".into(),
            )),
            _ => Ok(()),
        }
    }

    async fn run<T, F, Fut>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.connection().await?;
        match timeout(self.timeouts.command, op(conn)).await {
            Ok(result) => result.map_err(classify),
            Err(_) => Err(StoreError::Unavailable("command timed out".into())),
        }
    }
}

fn classify(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
    {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Command(e.to_string())
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl BackingStore for RedisStore {
    async fn ping(&self) -> bool {
        self.run(|mut conn| async move {
            let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(pong)
        })
        .await
        .is_ok()
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.run(|mut conn| async move { conn.get(key).await }).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.run(|mut conn| async move { conn.set_ex(key, value, ttl_secs(ttl)).await })
            .await
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.run(|mut conn| async move { conn.del(keys).await }).await
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.run(|mut conn| async move {
            let mut keys = Vec::new();
            let mut cursor: u64 = 0;
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(SCAN_PAGE_SIZE)
                    .query_async(&mut conn)
                    .await?;
                keys.extend(batch);
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            // 同一个键可能在扫描过程中被返回多次
            keys.sort();
            keys.dedup();
            Ok(keys)
        })
        .await
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.run(|mut conn| async move { conn.incr(key, 1).await })
            .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.run(|mut conn| async move { conn.expire(key, ttl_secs(ttl) as i64).await })
            .await
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let secs: i64 = self
            .run(|mut conn| async move { conn.ttl(key).await })
            .await?;
        // -2 表示键不存在，-1 表示没有过期时间
        Ok((secs >= 0).then(|| Duration::from_secs(secs as u64)))
    }

    async fn incr_bounded(&self, key: &str, limit: i64, ttl: Duration) -> StoreResult<Increment> {
        let script = &self.incr_script;
        let (accepted, count): (i64, i64) = self
            .run(|mut conn| async move {
                script
                    .key(key)
                    .arg(limit)
                    .arg(ttl_secs(ttl))
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;

        Ok(if accepted == 1 {
            Increment::Counted(count)
        } else {
            Increment::Saturated(count)
        })
    }

    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<u64> {
        self.run(|mut conn| async move { conn.publish(channel, payload).await })
            .await
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<PayloadStream> {
        // 订阅需要独占的连接
        let mut pubsub = timeout(self.timeouts.connect, self.client.get_async_pubsub())
            .await
            .map_err(|_| StoreError::Unavailable("pubsub connect timed out".into()))?
            .map_err(classify)?;

        timeout(self.timeouts.command, pubsub.subscribe(channel))
            .await
            .map_err(|_| StoreError::Unavailable("subscribe timed out".into()))?
            .map_err(classify)?;

        let channel = channel.to_string();
        let stream = pubsub.into_on_message().filter_map(move |msg| {
            let payload = msg.get_payload::<String>();
            let channel = channel.clone();
            async move {
                match payload {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        tracing::warn!(channel = %channel, error = %e, "Dropping non-text pubsub payload");
                        None
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }

    async fn close(&self) {
        if self.connection.write().await.take().is_some() {
            tracing::info!("Redis connection closed");
        }
    }
}
