// ==========================================
// 表格导入框架 - 进度汇报
// ==========================================
// 职责: 统计导入单元总数/完成/成功/失败/跳过，并通过 tracing 汇报
// 约束: 计数器可被多个 worker 并发提交
// ==========================================

use serde::Serialize;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressState {
    pub total: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ProgressState {
    pub fn is_finished(&self) -> bool {
        self.total > 0 && self.completed >= self.total
    }

    /// 完成百分比
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed as f64 * 100.0 / self.total as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Success,
    Failed,
    Skipped,
}

pub struct ProgressReporter {
    label: &'static str,
    enabled: bool,
    /// 每完成多少个单元输出一次进度日志
    report_every: usize,
    state: Mutex<(ProgressState, Option<Instant>)>,
}

impl ProgressReporter {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            enabled: true,
            report_every: 100,
            state: Mutex::new((ProgressState::default(), None)),
        }
    }

    /// 关闭进度日志（计数照常）
    pub fn silent(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn report_every(mut self, every: usize) -> Self {
        self.report_every = every.max(1);
        self
    }

    /// 开始一轮统计
    pub fn start(&self, total: usize) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *guard = (
            ProgressState {
                total,
                ..ProgressState::default()
            },
            Some(Instant::now()),
        );
        if self.enabled {
            info!(label = self.label, total, "导入开始");
        }
    }

    /// 提交一个单元的结果
    pub fn commit(&self, status: ProgressStatus) {
        let (state, started) = {
            let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let state = &mut guard.0;
            state.completed += 1;
            match status {
                ProgressStatus::Success => state.succeeded += 1,
                ProgressStatus::Failed => state.failed += 1,
                ProgressStatus::Skipped => state.skipped += 1,
            }
            (*state, guard.1)
        };

        if !self.enabled {
            return;
        }
        if state.completed % self.report_every == 0 || state.completed == state.total {
            let elapsed_ms = started.map(|s| s.elapsed().as_millis() as u64).unwrap_or(0);
            debug!(
                label = self.label,
                completed = state.completed,
                total = state.total,
                succeeded = state.succeeded,
                failed = state.failed,
                skipped = state.skipped,
                elapsed_ms,
                "导入进度 {:.1}%",
                state.percent()
            );
        }
    }

    pub fn snapshot(&self) -> ProgressState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).0
    }

    /// 输出汇总
    pub fn finish(&self) -> ProgressState {
        let (state, started) = {
            let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
            (guard.0, guard.1)
        };
        if self.enabled {
            let elapsed_ms = started.map(|s| s.elapsed().as_millis() as u64).unwrap_or(0);
            info!(
                label = self.label,
                total = state.total,
                succeeded = state.succeeded,
                failed = state.failed,
                skipped = state.skipped,
                elapsed_ms,
                "导入结束"
            );
        }
        state
    }
}

/// 一次导入运行的汇总
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub run_id: String,
    /// 导入单元数（行或树节点）
    pub units: usize,
    pub progress: ProgressState,
    pub check_failures: usize,
    pub import_failures: usize,
}
