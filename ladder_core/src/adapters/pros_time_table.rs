//! ProsTime 类别表加载（JSON）。

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::warn;

use crate::allocator::ProsTimeCategoryTable;

impl ProsTimeCategoryTable {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read ProsTime table from: {}", path.display()))?;
        let table: ProsTimeCategoryTable = serde_json::from_str(&content).with_context(|| {
            format!("Failed to parse ProsTime table JSON from: {}", path.display())
        })?;
        Ok(table)
    }

    /// 文件缺失 / 为空 / 无法解析时回退为空表（每个类别按 5 槽、类别 1..5 处理）
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            warn!("ProsTime table not found, using default slots: {}", path.display());
            return Self::default();
        }
        match Self::load_from_file(path) {
            Ok(table) if table.is_empty() => {
                warn!("ProsTime table is empty, using default slots: {}", path.display());
                table
            }
            Ok(table) => table,
            Err(err) => {
                warn!("{err:#}; using default slots");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_file(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("ladder-core-prostime-{}", Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn loads_definitions_by_operation_category() {
        let path = temp_file("pros_time.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            r#"{"definitions":[{"operationCategoryId":3,"count":2,"categoryIds":[7,8]}]}"#,
        )
        .unwrap();

        let table = ProsTimeCategoryTable::load_or_default(&path);
        let def = table.definition_for(3);
        assert_eq!(def.count, 2);
        assert_eq!(def.slot_category(1), 8);
        assert_eq!(table.definition_for(4).count, 5);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn invalid_or_missing_file_falls_back() {
        let path = temp_file("broken.json");
        assert!(ProsTimeCategoryTable::load_or_default(&path).is_empty());

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json").unwrap();
        assert!(ProsTimeCategoryTable::load_from_file(&path).is_err());
        assert!(ProsTimeCategoryTable::load_or_default(&path).is_empty());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
