// ==========================================
// 表格导入框架 - 单元格矩阵预处理
// ==========================================
// 职责: 跳过表头 → 数据结束截断 → 行过滤 → 补齐列数 → 单元格格式化
// 约束: 只补齐不截断；输出行保留原始矩阵下标
// ==========================================

use crate::domain::row::{CellMatrix, SourceRow};
use std::sync::Arc;

/// 行判定（数据结束 / 行过滤）
pub type RowPredicate = Arc<dyn Fn(&[String]) -> bool + Send + Sync>;

/// 单元格格式化
pub type CellFormatter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// 超出该码点的字符视为不可见控制字符
const MAX_KEPT_CODE_POINT: u32 = 0x10_0000;

/// 默认单元格格式化: 先丢弃码点 ≥ U+100000 的字符，再去除首尾空白
pub fn format_cell(cell: &str) -> String {
    let kept: String = cell
        .chars()
        .filter(|c| (*c as u32) < MAX_KEPT_CODE_POINT)
        .collect();
    kept.trim().to_string()
}

/// 默认数据结束判定: 空行或首个单元格为空
pub fn default_end_of_data(row: &[String]) -> bool {
    row.first().map_or(true, |c| c.is_empty())
}

// ==========================================
// Preprocessor
// ==========================================
#[derive(Clone)]
pub struct Preprocessor {
    start_row: usize,
    end_of_data: Option<RowPredicate>,
    row_filter: Option<RowPredicate>,
    formatter: CellFormatter,
    min_column_count: usize,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            start_row: 1,
            end_of_data: Some(Arc::new(default_end_of_data)),
            row_filter: None,
            formatter: Arc::new(format_cell),
            min_column_count: 0,
        }
    }
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_row(mut self, start_row: usize) -> Self {
        self.start_row = start_row;
        self
    }

    /// None 表示不做结束判定
    pub fn end_of_data(mut self, predicate: Option<RowPredicate>) -> Self {
        self.end_of_data = predicate;
        self
    }

    /// 返回 true 的行被丢弃
    pub fn row_filter(mut self, predicate: Option<RowPredicate>) -> Self {
        self.row_filter = predicate;
        self
    }

    pub fn formatter(mut self, formatter: CellFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn min_column_count(mut self, count: usize) -> Self {
        self.min_column_count = count;
        self
    }

    /// 执行预处理
    ///
    /// # 返回
    /// - 保留的行（携带原始矩阵下标），start_row 超出时为空
    pub fn run(&self, matrix: CellMatrix) -> Vec<SourceRow> {
        let mut rows = Vec::new();

        for (index, raw) in matrix.into_iter().enumerate().skip(self.start_row) {
            // 结束判定作用于原始行
            if let Some(end) = &self.end_of_data {
                if end(&raw) {
                    break;
                }
            }
            if let Some(filter) = &self.row_filter {
                if filter(&raw) {
                    continue;
                }
            }

            let mut cells = raw;
            if cells.len() < self.min_column_count {
                cells.resize(self.min_column_count, String::new());
            }
            for cell in cells.iter_mut() {
                *cell = (self.formatter)(cell.as_str());
            }

            rows.push(SourceRow { index, cells });
        }

        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[&[&str]]) -> CellMatrix {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_format_cell_trims_and_drops_high_code_points() {
        assert_eq!(format_cell("  abc \t"), "abc");
        assert_eq!(format_cell("a\u{100000}b\u{10FFFF}"), "ab");
        assert_eq!(format_cell("中文😀"), "中文😀");
        assert_eq!(format_cell("abc \u{100000}"), "abc");
        assert_eq!(format_cell("\u{10FFFF} abc"), "abc");
    }

    #[test]
    fn test_skip_header_pad_and_stop_at_end() {
        let m = matrix(&[
            &["name", "age", "city"],
            &[" tom ", "20"],
            &["amy", "30", "sh", "extra"],
            &["", "x"],
            &["late", "1"],
        ]);
        let rows = Preprocessor::new().min_column_count(3).run(m);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].index, 1);
        assert_eq!(rows[0].cells, vec!["tom", "20", ""]);
        // 只补齐不截断
        assert_eq!(rows[1].cells.len(), 4);
        assert_eq!(rows[1].line(), 3);
    }

    #[test]
    fn test_filter_keeps_original_indices() {
        let m = matrix(&[&["h"], &["a"], &["#skip"], &["b"]]);
        let filter: RowPredicate = Arc::new(|r: &[String]| r[0].starts_with('#'));
        let rows = Preprocessor::new().row_filter(Some(filter)).run(m);
        let idx: Vec<usize> = rows.iter().map(|r| r.index).collect();
        assert_eq!(idx, vec![1, 3]);
    }

    #[test]
    fn test_start_row_beyond_matrix_is_empty() {
        let m = matrix(&[&["a"], &["b"]]);
        assert!(Preprocessor::new().start_row(5).run(m).is_empty());
    }

    #[test]
    fn test_no_end_predicate_keeps_blank_rows() {
        let m = matrix(&[&["h"], &[""], &["b"]]);
        let rows = Preprocessor::new().end_of_data(None).run(m);
        assert_eq!(rows.len(), 2);
    }
}
