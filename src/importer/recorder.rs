// ==========================================
// 表格导入框架 - 失败记录（错误汇）
// ==========================================
// 职责: 收集检查/导入阶段的失败明细（按 1 起行号）
// 输出: 可选落盘 check_failed.csv / import_failed.csv / unexpected.jsonl
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    Check,
    Import,
}

/// 一条失败明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub run_id: String,
    pub kind: FailureKind,
    /// 涉及的行号（1 起）
    pub lines: Vec<usize>,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl FailureRecord {
    /// 与行号拼接的提示，如 "第3行数据错误: ..."
    pub fn describe(&self) -> String {
        let lines = self
            .lines
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!("第{}行数据错误: {}", lines, self.message)
    }
}

// ==========================================
// UnexpectedRecorder
// ==========================================
pub struct UnexpectedRecorder {
    run_id: String,
    output_dir: Option<PathBuf>,
    records: Mutex<Vec<FailureRecord>>,
}

impl UnexpectedRecorder {
    /// # 参数
    /// - run_id: 本次导入的批次标识
    /// - output_dir: 落盘目录（None 时只保存在内存）
    pub fn new(run_id: impl Into<String>, output_dir: Option<PathBuf>) -> Self {
        Self {
            run_id: run_id.into(),
            output_dir,
            records: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, kind: FailureKind, lines: Vec<usize>, message: String) {
        let record = FailureRecord {
            run_id: self.run_id.clone(),
            kind,
            lines,
            message,
            recorded_at: Utc::now(),
        };
        warn!(run_id = %self.run_id, kind = ?record.kind, lines = ?record.lines, "{}", record.message);
        // 计数容器，锁中毒时沿用已有数据
        let mut guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        guard.push(record);
    }

    /// 记录检查阶段失败（单行）
    pub fn record_check_failure(&self, line: usize, message: impl Into<String>) {
        self.push(FailureKind::Check, vec![line], message.into());
    }

    /// 记录导入阶段失败（一个导入单元，可能涉及多行）
    pub fn record_import_failure(&self, lines: Vec<usize>, message: impl Into<String>) {
        self.push(FailureKind::Import, lines, message.into());
    }

    pub fn records(&self) -> Vec<FailureRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn records_of(&self, kind: FailureKind) -> Vec<FailureRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.kind == kind)
            .collect()
    }

    pub fn check_failures(&self) -> Vec<FailureRecord> {
        self.records_of(FailureKind::Check)
    }

    pub fn import_failures(&self) -> Vec<FailureRecord> {
        self.records_of(FailureKind::Import)
    }

    /// 某行的全部失败
    pub fn failures_for_line(&self, line: usize) -> Vec<FailureRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.lines.contains(&line))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.records
            .lock()
            .map(|g| g.is_empty())
            .unwrap_or(false)
    }

    /// 落盘（未配置目录时为空操作）
    pub fn flush(&self) -> ImportResult<()> {
        let Some(dir) = &self.output_dir else {
            return Ok(());
        };
        let records = self.records();
        if records.is_empty() {
            return Ok(());
        }

        std::fs::create_dir_all(dir).map_err(|e| ImportError::FileWriteError(e.to_string()))?;
        Self::write_csv(&dir.join("check_failed.csv"), &self.check_failures())?;
        Self::write_csv(&dir.join("import_failed.csv"), &self.import_failures())?;
        Self::write_jsonl(&dir.join("unexpected.jsonl"), &records)?;

        info!(dir = %dir.display(), count = records.len(), "失败明细已落盘");
        Ok(())
    }

    fn write_csv(path: &Path, records: &[FailureRecord]) -> ImportResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut writer =
            csv::Writer::from_path(path).map_err(|e| ImportError::FileWriteError(e.to_string()))?;
        writer.write_record(["run_id", "lines", "message", "recorded_at"])?;
        for r in records {
            let lines = r
                .lines
                .iter()
                .map(|l| l.to_string())
                .collect::<Vec<_>>()
                .join(",");
            writer.write_record([
                r.run_id.as_str(),
                lines.as_str(),
                r.message.as_str(),
                r.recorded_at.to_rfc3339().as_str(),
            ])?;
        }
        writer
            .flush()
            .map_err(|e| ImportError::FileWriteError(e.to_string()))?;
        Ok(())
    }

    fn write_jsonl(path: &Path, records: &[FailureRecord]) -> ImportResult<()> {
        let file = File::create(path).map_err(|e| ImportError::FileWriteError(e.to_string()))?;
        let mut out = BufWriter::new(file);
        for r in records {
            let line = serde_json::to_string(r)
                .map_err(|e| ImportError::FileWriteError(e.to_string()))?;
            writeln!(out, "{}", line).map_err(|e| ImportError::FileWriteError(e.to_string()))?;
        }
        out.flush()
            .map_err(|e| ImportError::FileWriteError(e.to_string()))?;
        Ok(())
    }
}
