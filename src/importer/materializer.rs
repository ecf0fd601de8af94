// ==========================================
// 表格导入框架 - 记录物化
// ==========================================
// 职责: 按列映射把预处理后的单元格写入类型化记录
// 模式:
// - 宽松: 无法解析的数值保持缺省值（由格式校验兜底）
// - 严格: 类型不符即结构错误，且可只校验不物化
// ==========================================

use crate::domain::mapping::ColumnMapping;
use crate::domain::record::Record;
use crate::domain::types::FieldValue;
use crate::importer::error::{ImportError, ImportResult};
use std::marker::PhantomData;
use std::sync::Arc;

pub struct Materializer<R> {
    mapping: Arc<ColumnMapping>,
    strict: bool,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> Materializer<R> {
    /// 创建物化器
    ///
    /// # 返回
    /// - Err(Structural): 映射字段数与记录字段数不一致
    pub fn new(mapping: Arc<ColumnMapping>, strict: bool) -> ImportResult<Self> {
        let declared = R::fields().len();
        if mapping.len() != declared {
            return Err(ImportError::Structural(format!(
                "实体 {} 声明 {} 个字段，列映射给出 {} 个",
                R::ENTITY,
                declared,
                mapping.len()
            )));
        }
        Ok(Self {
            mapping,
            strict,
            _record: PhantomData,
        })
    }

    pub fn mapping(&self) -> &Arc<ColumnMapping> {
        &self.mapping
    }

    fn cell<'a>(&self, cells: &'a [String], column: usize, line: usize) -> ImportResult<&'a str> {
        cells
            .get(column)
            .map(String::as_str)
            .ok_or_else(|| ImportError::RowStructural {
                line,
                message: format!("第{}列超出行宽 {}", column + 1, cells.len()),
            })
    }

    /// 只校验形状与类型，不物化
    pub fn check_shape(&self, cells: &[String], line: usize) -> ImportResult<()> {
        for field in self.mapping.fields() {
            let cell = self.cell(cells, field.column, line)?;
            FieldValue::parse_cell(cell, field.kind).map_err(|message| {
                ImportError::RowStructural {
                    line,
                    message: format!("字段 {}: {}", field.name, message),
                }
            })?;
        }
        Ok(())
    }

    /// 物化一行
    ///
    /// # 参数
    /// - cells: 已补齐、已格式化的单元格
    /// - line: 行号（1 起），用于错误信息
    pub fn materialize(&self, cells: &[String], line: usize) -> ImportResult<R> {
        if self.strict {
            self.check_shape(cells, line)?;
        }

        let mut record = R::default();
        for field in self.mapping.fields() {
            let cell = self.cell(cells, field.column, line)?;
            let value = match FieldValue::parse_cell(cell, field.kind) {
                Ok(v) => v,
                Err(_) => FieldValue::Null,
            };
            record
                .set(field.ordinal, value)
                .map_err(|e| ImportError::RowStructural {
                    line,
                    message: e.to_string(),
                })?;
        }
        Ok(record)
    }
}
