// ==========================================
// 表格导入框架 - 中间件
// ==========================================
// 职责: 流水线横切能力（批量写入、SQL 脚本、回写源表格）
// 约束: 中间件只消费行/节点导入结果，不改变导入顺序
// ==========================================

pub mod batch_writer;
pub mod sheet_rewriter;
pub mod sql_script;

pub use batch_writer::BatchWriter;
pub use sheet_rewriter::SheetRewriter;
pub use sql_script::SqlScriptWriter;

use crate::domain::row::ImportEffect;
use crate::repository::sql_builder::{insert_statement, update_statement};

/// 把行导入留下的意图渲染为字面量语句（先插入后更新）
///
/// 更新意图的更新列或条件为空时忽略
pub fn effect_statements(effect: &ImportEffect) -> Vec<String> {
    let mut statements = Vec::new();
    if let Some(insert) = &effect.insert {
        statements.push(insert_statement(&insert.entity, &insert.row));
    }
    if let Some(update) = &effect.update {
        if !update.updates.is_empty() && !update.wheres.is_empty() {
            statements.push(update_statement(&update.entity, &update.updates, &update.wheres));
        }
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::StoredRow;
    use crate::domain::row::{InsertIntent, UpdateIntent};

    #[test]
    fn test_effect_statements() {
        let effect = ImportEffect {
            insert: Some(InsertIntent::new("person", StoredRow::new().with("name", "a"))),
            update: Some(UpdateIntent {
                entity: "person".to_string(),
                updates: StoredRow::new().with("age", 3i64),
                wheres: StoredRow::new(),
            }),
        };
        let statements = effect_statements(&effect);
        assert_eq!(statements, vec!["INSERT INTO \"person\" (\"name\") VALUES ('a');"]);
        assert!(effect_statements(&ImportEffect::default()).is_empty());
    }
}
