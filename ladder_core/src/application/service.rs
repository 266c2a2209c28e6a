use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{info, warn};
use uuid::Uuid;

use crate::adapters::csv_export::{CsvExporter, COMBINED_FILE_NAME, COMMENTS_FILE_NAME};
use crate::allocator::{allocate_all, AllocationSummary, ProsTimeCategoryTable};
use crate::application::cancel::CancellationToken;
use crate::builder::{
    build_all, build_cylinder, build_operation, build_process, build_process_detail, BuildContext,
    BuildSink, DeviceIndex,
};
use crate::domain::device::DeviceComment;
use crate::domain::graph::FlowIndex;
use crate::domain::ladder::InstructionRow;
use crate::domain::model::{ConfigRecord, ConfigSnapshot, MnemonicType, PlcId, RecordIndex};
use crate::domain::roles::role_table;
use crate::error::{ErrorAggregator, GenerateError, ValidationReportRow};
use crate::ports::{AllocationRepository, IoChooser};
use crate::resolver::IoAddressResolver;
use crate::settings::{DeviceOffsets, GeneratorSettings};

/// 一次生成运行的结果（未导出）
#[derive(Clone, Debug)]
pub struct GenerationOutput {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub plc_id: PlcId,
    pub allocation: AllocationSummary,
    pub process_rows: Vec<InstructionRow>,
    pub process_detail_rows: Vec<InstructionRow>,
    pub operation_rows: Vec<InstructionRow>,
    pub cylinder_rows: Vec<InstructionRow>,
    pub comments: Vec<DeviceComment>,
    pub errors: ErrorAggregator,
}

impl GenerationOutput {
    pub fn rows_for(&self, mnemonic_type: MnemonicType) -> &[InstructionRow] {
        match mnemonic_type {
            MnemonicType::Process => &self.process_rows,
            MnemonicType::ProcessDetail => &self.process_detail_rows,
            MnemonicType::Operation => &self.operation_rows,
            MnemonicType::Cylinder => &self.cylinder_rows,
        }
    }

    /// Process → ProcessDetail → Operation → Cylinder 顺序拼接
    pub fn combined(&self) -> Vec<InstructionRow> {
        MnemonicType::ALL
            .into_iter()
            .flat_map(|m| self.rows_for(m).iter().cloned())
            .collect()
    }

    pub fn is_exportable(&self) -> bool {
        !self.errors.has_critical()
    }

    pub fn report(&self) -> Vec<ValidationReportRow> {
        self.errors.report()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub written: Vec<PathBuf>,
    /// 存在 critical 错误，未写任何文件
    pub blocked: bool,
}

/// 分配 → 生成 → 导出 的用例编排
#[derive(Debug)]
pub struct LadderService<R: AllocationRepository> {
    repository: R,
    settings: GeneratorSettings,
    pros_time_table: ProsTimeCategoryTable,
}

impl<R: AllocationRepository> LadderService<R> {
    pub fn new(repository: R, settings: GeneratorSettings) -> Self {
        Self {
            repository,
            settings,
            pros_time_table: ProsTimeCategoryTable::default(),
        }
    }

    pub fn with_pros_time_table(mut self, table: ProsTimeCategoryTable) -> Self {
        self.pros_time_table = table;
        self
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn into_repository(self) -> R {
        self.repository
    }

    /// 执行分配与指令生成；配置问题记入 `GenerationOutput::errors`，
    /// 仅仓储失败与取消作为 `Err` 返回。
    pub fn generate(
        &mut self,
        snapshot: &ConfigSnapshot,
        offsets: &DeviceOffsets,
        chooser: &mut dyn IoChooser,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutput, GenerateError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let plc_id = snapshot.plc_id;
        info!("generation started: run={run_id} plc={plc_id}");

        let records = RecordIndex::new(snapshot);
        let mut errors = ErrorAggregator::new();

        let allocation = allocate_all(
            &mut self.repository,
            snapshot,
            &records,
            &self.settings,
            offsets,
            &self.pros_time_table,
            &mut errors,
            cancel,
        )?;
        let devices = DeviceIndex::load(&self.repository, plc_id)?;
        let flow = FlowIndex::build(snapshot, &records, &mut errors);

        let processes = snapshot.ordered_processes();
        let details = snapshot.ordered_details();
        let operations = snapshot.ordered_operations();
        let cylinders = snapshot.ordered_cylinders();

        let io_points = snapshot.io_for_plc();
        let lengths = snapshot.lengths_for_plc();
        let ctx = BuildContext {
            snapshot,
            records: &records,
            flow: &flow,
            devices: &devices,
            resolver: IoAddressResolver::new(&io_points, &lengths),
            settings: &self.settings,
        };

        let (process_rows, process_detail_rows, operation_rows, cylinder_rows) = {
            let mut sink = BuildSink {
                errors: &mut errors,
                chooser: &mut *chooser,
            };
            (
                build_all(&ctx, &mut sink, &processes, cancel, build_process)?,
                build_all(&ctx, &mut sink, &details, cancel, build_process_detail)?,
                build_all(&ctx, &mut sink, &operations, cancel, build_operation)?,
                build_all(&ctx, &mut sink, &cylinders, cancel, build_cylinder)?,
            )
        };

        let mut comments = Vec::new();
        collect_comments(&processes, &devices, &mut comments);
        collect_comments(&details, &devices, &mut comments);
        collect_comments(&operations, &devices, &mut comments);
        collect_comments(&cylinders, &devices, &mut comments);

        info!(
            "run {run_id}: process={} detail={} operation={} cylinder={} errors={} critical={}",
            process_rows.len(),
            process_detail_rows.len(),
            operation_rows.len(),
            cylinder_rows.len(),
            errors.len(),
            errors.critical_count()
        );

        Ok(GenerationOutput {
            run_id,
            started_at,
            plc_id,
            allocation,
            process_rows,
            process_detail_rows,
            operation_rows,
            cylinder_rows,
            comments,
            errors,
        })
    }

    /// 存在任何 critical 错误时不写任何文件
    pub fn export(
        &self,
        output: &GenerationOutput,
        dir: &Path,
    ) -> Result<ExportReport, GenerateError> {
        if !output.is_exportable() {
            warn!(
                "export blocked: run={} critical={}",
                output.run_id,
                output.errors.critical_count()
            );
            return Ok(ExportReport {
                written: Vec::new(),
                blocked: true,
            });
        }

        let exporter = CsvExporter::new(self.settings.operand_columns);
        let mut written = Vec::new();
        for m in MnemonicType::ALL {
            let path = dir.join(format!("{}.csv", m.file_stem()));
            if exporter.export(output.rows_for(m), &path)? {
                written.push(path);
            }
        }

        let combined_path = dir.join(COMBINED_FILE_NAME);
        if exporter.export(&output.combined(), &combined_path)? {
            written.push(combined_path);
        }

        let comments_path = dir.join(COMMENTS_FILE_NAME);
        if exporter.export_comments(&output.comments, &comments_path)? {
            written.push(comments_path);
        }

        info!("export finished: run={} files={}", output.run_id, written.len());
        Ok(ExportReport {
            written,
            blocked: false,
        })
    }

    pub fn run(
        &mut self,
        snapshot: &ConfigSnapshot,
        offsets: &DeviceOffsets,
        chooser: &mut dyn IoChooser,
        cancel: &CancellationToken,
        dir: &Path,
    ) -> Result<(GenerationOutput, ExportReport), GenerateError> {
        let output = self.generate(snapshot, offsets, chooser, cancel)?;
        let report = self.export(&output, dir)?;
        Ok((output, report))
    }
}

/// 每个已分配位 → "记录名 角色标签"
fn collect_comments<T: ConfigRecord>(
    records: &[&T],
    devices: &DeviceIndex,
    out: &mut Vec<DeviceComment>,
) {
    for record in records {
        let Some(block) = devices.block(T::MNEMONIC, record.id()) else {
            continue;
        };
        let labels = role_table(T::MNEMONIC)
            .iter()
            .enumerate()
            .take(block.out_coil_count as usize);
        for (ordinal, label) in labels {
            if label.is_empty() {
                continue;
            }
            out.push(DeviceComment {
                device: block.device(ordinal as u32),
                comment: format!("{} {}", record.name(), label),
            });
        }
    }
}
