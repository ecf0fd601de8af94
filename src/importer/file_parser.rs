// ==========================================
// 表格导入框架 - 文件解析器实现
// ==========================================
// 职责: 表格文件 → 单元格矩阵；列值回写
// 支持: Excel (.xlsx/.xls) 读取 / CSV (.csv) 读写
// ==========================================

use crate::domain::row::CellMatrix;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::import_traits::{ColumnWrites, TabularSource, TabularWriter};
use calamine::{open_workbook_auto, Reader};
use csv::{ReaderBuilder, WriterBuilder};
use std::fs::File;
use std::path::Path;
use tracing::debug;

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

fn ensure_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

// ==========================================
// CSV 实现
// ==========================================
pub struct CsvSheet;

impl CsvSheet {
    fn read_matrix(path: &Path) -> ImportResult<CellMatrix> {
        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false) // 表头由 start_row 跳过
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        let mut matrix = Vec::new();
        for result in reader.records() {
            let record = result?;
            matrix.push(record.iter().map(str::to_string).collect());
        }
        Ok(matrix)
    }
}

impl TabularSource for CsvSheet {
    fn read(&self, path: &Path) -> ImportResult<CellMatrix> {
        ensure_exists(path)?;
        let ext = extension_of(path);
        if ext != "csv" {
            return Err(ImportError::UnsupportedFormat(ext));
        }
        let matrix = Self::read_matrix(path)?;
        debug!(path = %path.display(), rows = matrix.len(), "CSV 读取完成");
        Ok(matrix)
    }
}

impl TabularWriter for CsvSheet {
    fn write_columns(&self, path: &Path, writes: &ColumnWrites) -> ImportResult<()> {
        let ext = extension_of(path);
        if ext != "csv" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let mut matrix = if path.exists() {
            Self::read_matrix(path)?
        } else {
            Vec::new()
        };

        for (column, values) in writes {
            for (row, value) in values {
                if matrix.len() <= *row {
                    matrix.resize_with(row + 1, Vec::new);
                }
                let cells = &mut matrix[*row];
                if cells.len() <= *column {
                    cells.resize(column + 1, String::new());
                }
                cells[*column] = value.clone();
            }
        }

        let mut writer = WriterBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| ImportError::FileWriteError(e.to_string()))?;
        for cells in &matrix {
            writer
                .write_record(cells)
                .map_err(|e| ImportError::FileWriteError(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| ImportError::FileWriteError(e.to_string()))?;

        debug!(path = %path.display(), columns = writes.len(), "CSV 列回写完成");
        Ok(())
    }
}

// ==========================================
// Excel 实现（只读）
// ==========================================
pub struct ExcelSheet;

impl TabularSource for ExcelSheet {
    fn read(&self, path: &Path) -> ImportResult<CellMatrix> {
        ensure_exists(path)?;
        let ext = extension_of(path);
        if ext != "xlsx" && ext != "xls" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let mut workbook =
            open_workbook_auto(path).map_err(|e| ImportError::ExcelParseError(e.to_string()))?;

        // 读取第一个 sheet
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))?;
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| ImportError::ExcelParseError(e.to_string()))?;

        // 使用区域不一定从 A1 开始，补齐前导行列使下标与表格一致
        let (row_offset, col_offset) = range
            .start()
            .map(|(r, c)| (r as usize, c as usize))
            .unwrap_or((0, 0));

        let mut matrix: CellMatrix = vec![Vec::new(); row_offset];
        for data_row in range.rows() {
            let mut cells = vec![String::new(); col_offset];
            cells.extend(data_row.iter().map(|cell| cell.to_string()));
            matrix.push(cells);
        }

        debug!(path = %path.display(), sheet = %sheet_name, rows = matrix.len(), "Excel 读取完成");
        Ok(matrix)
    }
}

// ==========================================
// 通用表格（根据扩展名自动选择）
// ==========================================
pub struct UniversalSheet;

impl TabularSource for UniversalSheet {
    fn read(&self, path: &Path) -> ImportResult<CellMatrix> {
        match extension_of(path).as_str() {
            "csv" => CsvSheet.read(path),
            "xlsx" | "xls" => ExcelSheet.read(path),
            other => Err(ImportError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl TabularWriter for UniversalSheet {
    fn write_columns(&self, path: &Path, writes: &ColumnWrites) -> ImportResult<()> {
        match extension_of(path).as_str() {
            "csv" => CsvSheet.write_columns(path, writes),
            other => Err(ImportError::UnsupportedFormat(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_csv_read_keeps_header_and_raw_cells() {
        let mut temp_file = Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(temp_file, "名称,数量").unwrap();
        writeln!(temp_file, " 苹果 ,3").unwrap();
        writeln!(temp_file, "香蕉").unwrap();

        let matrix = UniversalSheet.read(temp_file.path()).unwrap();
        assert_eq!(matrix.len(), 3);
        assert_eq!(matrix[1], vec![" 苹果 ".to_string(), "3".to_string()]);
        assert_eq!(matrix[2].len(), 1);
    }

    #[test]
    fn test_unsupported_and_missing_file() {
        let result = UniversalSheet.read(Path::new("data.txt"));
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(_))));

        let result = CsvSheet.read(Path::new("/nonexistent/data.csv"));
        assert!(matches!(result, Err(ImportError::FileNotFound(_))));
    }

    #[test]
    fn test_csv_write_columns_grows_matrix() {
        let mut temp_file = Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(temp_file, "名称,编号").unwrap();
        writeln!(temp_file, "苹果,").unwrap();
        temp_file.flush().unwrap();

        let mut writes: ColumnWrites = BTreeMap::new();
        writes.insert(1, vec![(1, "1".to_string()), (2, "2".to_string())]);
        writes.insert(3, vec![(1, "x".to_string())]);
        UniversalSheet.write_columns(temp_file.path(), &writes).unwrap();

        let matrix = CsvSheet.read(temp_file.path()).unwrap();
        assert_eq!(matrix[1], vec!["苹果", "1", "", "x"]);
        assert_eq!(matrix[2], vec!["", "2"]);
    }

    #[test]
    fn test_excel_write_is_unsupported() {
        let writes: ColumnWrites = BTreeMap::new();
        let result = UniversalSheet.write_columns(Path::new("out.xlsx"), &writes);
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(_))));
    }
}
