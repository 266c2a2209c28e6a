//! CSV 导出：每行 = 指令头 + 固定数量的操作数列。
//!
//! 写入 `<file>.tmp` 后 rename；空集合不落盘。

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use log::debug;

use crate::domain::device::DeviceComment;
use crate::domain::ladder::InstructionRow;
use crate::error::ExportError;

pub const COMBINED_FILE_NAME: &str = "ladder_all.csv";
pub const COMMENTS_FILE_NAME: &str = "comments.csv";

#[derive(Clone, Copy, Debug)]
pub struct CsvExporter {
    operand_columns: usize,
}

impl CsvExporter {
    pub fn new(operand_columns: usize) -> Self {
        Self { operand_columns }
    }

    /// 返回 `false` 表示 rows 为空、未写文件
    pub fn export(&self, rows: &[InstructionRow], destination: &Path) -> Result<bool, ExportError> {
        if rows.is_empty() {
            return Ok(false);
        }

        let mut text = String::new();
        for row in rows {
            push_record(&mut text, row.columns(self.operand_columns).iter().map(String::as_str));
        }
        write_text_atomic(destination, &text)?;
        debug!("exported {} rows -> {}", rows.len(), destination.display());
        Ok(true)
    }

    pub fn export_comments(
        &self,
        comments: &[DeviceComment],
        destination: &Path,
    ) -> Result<bool, ExportError> {
        if comments.is_empty() {
            return Ok(false);
        }

        let mut text = String::new();
        for entry in comments {
            let device = entry.device.to_string();
            push_record(&mut text, [device.as_str(), entry.comment.as_str()]);
        }
        write_text_atomic(destination, &text)?;
        debug!("exported {} comments -> {}", comments.len(), destination.display());
        Ok(true)
    }
}

fn push_record<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape_field(field));
    }
    out.push_str("\r\n");
}

fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn write_text_atomic(path: &Path, text: &str) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let tmp_path = tmp_path_for(path);
    std::fs::write(&tmp_path, text).map_err(io_error(&tmp_path))?;
    if path.exists() {
        std::fs::remove_file(path).map_err(io_error(path))?;
    }
    std::fs::rename(&tmp_path, path).map_err(io_error(path))?;
    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError {
    let path = path.display().to_string();
    move |source| ExportError::Io { path, source }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
