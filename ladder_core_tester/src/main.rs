use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ladder_core::{
    CancelChooser, CancellationToken, ConfigSnapshot, DeviceOffsets, GenerationOutput,
    GeneratorSettings, JsonFileRepository, LadderService, MnemonicType, ProsTimeCategoryTable,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_SNAPSHOT: &str = "snapshot.json";
const REPORT_FILE_NAME: &str = "validation_report.json";

/// 用法：
/// ladder_core_tester [snapshot.json] [out_dir] [settings.json] [offsets.json] [pros_time.json]
///
/// 多重匹配的 IO 标签一律按取消处理（记 CancelledSelection，阻止导出）。
fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();
    let snapshot_path = Path::new(args.get(1).map(String::as_str).unwrap_or(DEFAULT_SNAPSHOT));
    if !snapshot_path.exists() {
        anyhow::bail!("snapshot not found: {}", snapshot_path.display());
    }
    let out_dir = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| snapshot_path.with_file_name("ladder_out"));
    let settings = match args.get(3) {
        Some(path) => GeneratorSettings::load_from_file(Path::new(path))?,
        None => GeneratorSettings::default(),
    };
    let offsets = match args.get(4) {
        Some(path) => DeviceOffsets::load_from_file(Path::new(path))?,
        None => DeviceOffsets::default(),
    };
    let pros_time_table = match args.get(5) {
        Some(path) => ProsTimeCategoryTable::load_or_default(Path::new(path)),
        None => ProsTimeCategoryTable::default(),
    };

    let text = fs::read_to_string(snapshot_path)
        .with_context(|| format!("failed to read {}", snapshot_path.display()))?;
    let snapshot: ConfigSnapshot = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse snapshot {}", snapshot_path.display()))?;

    let repository = JsonFileRepository::open_in(&out_dir)
        .with_context(|| format!("failed to open allocation store in {}", out_dir.display()))?;
    let mut service =
        LadderService::new(repository, settings).with_pros_time_table(pros_time_table);

    let (output, report) = service.run(
        &snapshot,
        &offsets,
        &mut CancelChooser,
        &CancellationToken::new(),
        &out_dir,
    )?;

    print_summary(&output);
    write_report(&out_dir.join(REPORT_FILE_NAME), &output)?;

    if report.blocked {
        println!(
            "[fail] export blocked: {} critical error(s), see {}",
            output.errors.critical_count(),
            REPORT_FILE_NAME
        );
    } else {
        for path in &report.written {
            println!("[ok] wrote {}", path.display());
        }
    }

    Ok(())
}

fn print_summary(output: &GenerationOutput) {
    println!(
        "run {} plc={} at {}",
        output.run_id,
        output.plc_id,
        output.started_at.to_rfc3339()
    );
    for m in MnemonicType::ALL {
        println!("  {:<14} rows={}", m.display_name(), output.rows_for(m).len());
    }
    println!("  comments       {}", output.comments.len());

    for row in output.report() {
        println!(
            "  [{:?}] {} {} {}: {} ({:?})",
            row.severity,
            row.mnemonic_type.display_name(),
            row.record_id,
            row.record_name,
            row.message,
            row.kind
        );
    }
}

fn write_report(path: &Path, output: &GenerationOutput) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&output.report())?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
