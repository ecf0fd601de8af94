// ==========================================
// 表格导入框架 - 性能统计
// ==========================================
// 职责: SQLite trace/profile 计数 + 流水线阶段耗时日志
// 开关: SHEET_IMPORT_PERF_SQL / SHEET_IMPORT_SLOW_SQL_MS
// 约束: SQL 计数为进程级累计；同一时刻只有一个 PerfGuard 存活时差值才准确，
//       存在重叠时日志中 exclusive=false，计数包含其他运行的语句
// ==========================================

use rusqlite::Connection;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

static PERF_SQL_ENABLED: AtomicBool = AtomicBool::new(false);
static SLOW_SQL_THRESHOLD_MS: AtomicU64 = AtomicU64::new(0);
static SQL_COUNT: AtomicU64 = AtomicU64::new(0);
static SLOW_SQL_COUNT: AtomicU64 = AtomicU64::new(0);
static ACTIVE_GUARDS: AtomicU64 = AtomicU64::new(0);
static GUARD_STARTS: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static PERF_DEPTH: Cell<u32> = const { Cell::new(0) };
}

fn is_true(v: &str) -> bool {
    matches!(
        v.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

fn truncate_sql(sql: &str, max_chars: usize) -> String {
    let s = sql.trim().replace('\n', " ");
    if s.chars().count() <= max_chars {
        return s;
    }
    let head: String = s.chars().take(max_chars).collect();
    format!("{}…", head)
}

/// 安装 SQLite 语句 trace/profile（用于 SQL 计数 + 慢查询日志）
///
/// 开关：
/// - Debug 默认开启；Release 默认关闭
/// - `SHEET_IMPORT_PERF_SQL=1` 强制开启
/// - `SHEET_IMPORT_SLOW_SQL_MS=50` 配置慢 SQL 阈值（毫秒）
pub fn install_sqlite_tracing(conn: &mut Connection) {
    let enabled = match std::env::var("SHEET_IMPORT_PERF_SQL") {
        Ok(v) => is_true(&v),
        Err(_) => cfg!(debug_assertions),
    };

    PERF_SQL_ENABLED.store(enabled, Ordering::Relaxed);

    if !enabled {
        conn.trace(None);
        conn.profile(None);
        return;
    }

    let slow_ms = std::env::var("SHEET_IMPORT_SLOW_SQL_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(if cfg!(debug_assertions) { 50 } else { 200 });
    SLOW_SQL_THRESHOLD_MS.store(slow_ms, Ordering::Relaxed);

    conn.trace(Some(sql_trace_callback));
    conn.profile(Some(sql_profile_callback));
}

fn sql_trace_callback(_sql: &str) {
    if !PERF_SQL_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    SQL_COUNT.fetch_add(1, Ordering::Relaxed);
}

fn sql_profile_callback(sql: &str, duration: Duration) {
    if !PERF_SQL_ENABLED.load(Ordering::Relaxed) {
        return;
    }

    let ms = duration.as_millis() as u64;
    let threshold = SLOW_SQL_THRESHOLD_MS.load(Ordering::Relaxed);
    if threshold > 0 && ms >= threshold {
        tracing::warn!(
            target: "slow_sql",
            duration_ms = ms,
            sql = %truncate_sql(sql, 420),
            "slow sql"
        );
        SLOW_SQL_COUNT.fetch_add(1, Ordering::Relaxed);
    }
}

/// 性能统计 Guard：记录 elapsed_ms + SQL 语句数 + 慢 SQL 数 + 处理单元数
///
/// 导入单元可能分散在多个 worker 线程上执行，SQL 计数为进程级累计差值；
/// 与其他 Guard 生命周期重叠时差值不再独占（见 `is_exclusive`）。
///
/// ```ignore
/// let mut perf = sheet_import::perf::PerfGuard::new("flat_import");
/// perf.set_units(rows.len());
/// ```
pub struct PerfGuard {
    op: &'static str,
    start: Instant,
    sql_start: u64,
    slow_sql_start: u64,
    start_seq: u64,
    overlapped_at_start: bool,
    units: Option<usize>,
}

impl PerfGuard {
    pub fn new(op: &'static str) -> Self {
        PERF_DEPTH.with(|d| d.set(d.get().saturating_add(1)));
        let overlapped_at_start = ACTIVE_GUARDS.fetch_add(1, Ordering::SeqCst) > 0;
        let start_seq = GUARD_STARTS.fetch_add(1, Ordering::SeqCst) + 1;
        Self {
            op,
            start: Instant::now(),
            sql_start: SQL_COUNT.load(Ordering::Relaxed),
            slow_sql_start: SLOW_SQL_COUNT.load(Ordering::Relaxed),
            start_seq,
            overlapped_at_start,
            units: None,
        }
    }

    /// 存活期间没有其他 Guard 存在（SQL 计数差值只属于本次运行）
    pub fn is_exclusive(&self) -> bool {
        !self.overlapped_at_start && GUARD_STARTS.load(Ordering::SeqCst) == self.start_seq
    }

    /// 记录本次处理的单元数（行/节点）
    pub fn set_units(&mut self, units: usize) {
        self.units = Some(units);
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        let sql_count = SQL_COUNT
            .load(Ordering::Relaxed)
            .saturating_sub(self.sql_start);
        let slow_sql_count = SLOW_SQL_COUNT
            .load(Ordering::Relaxed)
            .saturating_sub(self.slow_sql_start);
        let depth = PERF_DEPTH.with(|d| d.get());
        let exclusive = self.is_exclusive();

        tracing::info!(
            target: "perf",
            op = self.op,
            elapsed_ms,
            sql_count,
            slow_sql_count,
            units = self.units.unwrap_or(0),
            depth,
            exclusive,
            "done"
        );

        ACTIVE_GUARDS.fetch_sub(1, Ordering::SeqCst);
        PERF_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}
