//! 有界的后台任务池
//!
//! 写请求触发的缓存失效、事件发布以及预取刷新都在这里以分离任务执行，
//! 不阻塞请求路径。任务失败只记录日志并计数，从不重试。

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;

pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone)]
pub struct BackgroundTasks {
    inner: Arc<Inner>,
}

struct Inner {
    permits: Arc<Semaphore>,
    size: u32,
    failures: AtomicU64,
    dropped: AtomicU64,
}

impl BackgroundTasks {
    pub fn new(size: usize) -> Self {
        let size = size.clamp(1, Semaphore::MAX_PERMITS.min(u32::MAX as usize)) as u32;
        Self {
            inner: Arc::new(Inner {
                permits: Arc::new(Semaphore::new(size as usize)),
                size,
                failures: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// 立即返回；池已满或已关闭时丢弃任务并返回 false
    pub fn spawn<F>(&self, label: &'static str, task: F) -> bool
    where
        F: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let permit = match self.inner.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(e) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(task = label, reason = %e, "Background task dropped");
                return false;
            }
        };

        let inner = self.inner.clone();
        tokio::spawn(async move {
            if let Err(e) = task.await {
                inner.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(task = label, error = %e, "Background task failed");
            }
            drop(permit);
        });
        true
    }

    pub fn failures(&self) -> u64 {
        self.inner.failures.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> usize {
        self.inner.size as usize - self.inner.permits.available_permits()
    }

    /// 等待在途任务完成后关闭任务池，超过宽限期返回 false
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let drained = matches!(
            tokio::time::timeout(grace, self.inner.permits.acquire_many(self.inner.size)).await,
            Ok(Ok(_))
        );
        self.inner.permits.close();
        if !drained {
            tracing::warn!(in_flight = self.in_flight(), "Background tasks still running at shutdown");
        }
        drained
    }
}
