// ==========================================
// 表格导入框架 - 有界并发执行器
// ==========================================
// 职责: 以信号量为准入闸门并发执行导入单元
// 规则:
// - 同时执行的单元数不超过上限
// - 任一单元失败后不再准入新单元，已启动单元执行完毕
// - 返回第一个观察到的错误，并交还全部单元（含未准入的）
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error};

/// 执行结果
pub struct PoolOutcome<U> {
    /// 已执行的单元（含失败单元）
    pub finished: Vec<U>,
    /// 失败后未被准入的单元
    pub not_admitted: Vec<U>,
    pub first_error: Option<ImportError>,
}

impl<U> PoolOutcome<U> {
    /// 交还全部单元
    pub fn into_units(self) -> (Vec<U>, Option<ImportError>) {
        let mut units = self.finished;
        units.extend(self.not_admitted);
        (units, self.first_error)
    }
}

pub struct WorkerPool {
    limit: usize,
    semaphore: Arc<Semaphore>,
    cancelled: Arc<AtomicBool>,
}

impl WorkerPool {
    /// 上限为 0 时按 1 处理
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn collect<U>(
        joined: Result<(U, ImportResult<()>), JoinError>,
        finished: &mut Vec<U>,
        first_error: &mut Option<ImportError>,
    ) {
        match joined {
            Ok((unit, Ok(()))) => finished.push(unit),
            Ok((unit, Err(e))) => {
                finished.push(unit);
                if first_error.is_none() {
                    *first_error = Some(e);
                }
            }
            Err(join_err) => {
                error!(error = %join_err, "导入任务异常退出");
                if first_error.is_none() {
                    *first_error = Some(ImportError::InternalError(join_err.to_string()));
                }
            }
        }
    }

    /// 并发执行
    ///
    /// # 参数
    /// - units: 待执行单元（按顺序准入）
    /// - work: 单元 → future，future 需交还单元及其结果
    pub async fn run<U, F, Fut>(&self, units: Vec<U>, work: F) -> PoolOutcome<U>
    where
        U: Send + 'static,
        F: Fn(U) -> Fut,
        Fut: Future<Output = (U, ImportResult<()>)> + Send + 'static,
    {
        let mut join_set = JoinSet::new();
        let mut finished = Vec::with_capacity(units.len());
        let mut not_admitted = Vec::new();
        let mut first_error = None;
        let mut pending = units.into_iter();

        while let Some(unit) = pending.next() {
            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    not_admitted.push(unit);
                    not_admitted.extend(pending.by_ref());
                    break;
                }
            };

            // 顺带回收已完成的任务，尽早发现失败
            while let Some(joined) = join_set.try_join_next() {
                Self::collect(joined, &mut finished, &mut first_error);
            }

            if self.is_cancelled() {
                debug!(remaining = pending.len() + 1, "已有单元失败，停止准入");
                not_admitted.push(unit);
                not_admitted.extend(pending.by_ref());
                break;
            }

            let fut = work(unit);
            let cancelled = Arc::clone(&self.cancelled);
            join_set.spawn(async move {
                let _permit = permit;
                let (unit, result) = fut.await;
                if result.is_err() {
                    cancelled.store(true, Ordering::Release);
                }
                (unit, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            Self::collect(joined, &mut finished, &mut first_error);
        }

        PoolOutcome {
            finished,
            not_admitted,
            first_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrency_never_exceeds_limit() {
        let pool = WorkerPool::new(4);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outcome = pool
            .run((0..40).collect::<Vec<usize>>(), |n| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    (n, Ok(()))
                }
            })
            .await;

        assert!(outcome.first_error.is_none());
        assert_eq!(outcome.finished.len(), 40);
        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_failure_stops_admission_and_returns_units() {
        let pool = WorkerPool::new(2);
        let outcome = pool
            .run((0..50).collect::<Vec<usize>>(), |n| async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                if n == 3 {
                    (n, Err(ImportError::Validation("boom".into())))
                } else {
                    (n, Ok(()))
                }
            })
            .await;

        assert!(pool.is_cancelled());
        assert!(matches!(outcome.first_error, Some(ImportError::Validation(_))));
        assert!(!outcome.not_admitted.is_empty());
        let (units, _) = outcome.into_units();
        assert_eq!(units.len(), 50);
    }
}
