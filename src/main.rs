//! Chips Boot 命令行入口
//!
//! 读取模块清单，离线计算启动计划与依赖诊断报告，不执行任何模块代码。
//!
//! # 命令概览
//!
//! - `version` - 显示版本信息
//! - `check-config` - 验证配置文件
//! - `plan` - 计算启动顺序
//! - `report` - 输出依赖诊断报告
//!
//! # 使用示例
//!
//! ```bash
//! # 计算 Install 阶段的启动顺序
//! chips-boot plan --manifest modules.yaml --stage install
//!
//! # 使用配置文件中的模块清单、全局覆盖与默认阶段
//! chips-boot -c boot.yaml plan --json
//!
//! # 查看依赖诊断报告
//! chips-boot report --manifest modules.yaml
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use chips_boot::module::ManifestParser;
use chips_boot::{BootConfig, BootPlanner, CoreError, Logger, LoggerConfig, ModuleRegistry, Stage};

/// Chips Boot - 模块组合与启动编排引擎
#[derive(Parser)]
#[command(name = "chips-boot")]
#[command(version, about = "模块组合与启动编排引擎", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "boot.yaml", global = true)]
    config: PathBuf,

    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 开发模式（输出文件与行号）
    #[arg(long, global = true)]
    dev: bool,

    /// 子命令
    #[command(subcommand)]
    command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
enum Commands {
    /// 查看版本信息
    Version,

    /// 验证配置文件
    ///
    /// 检查配置文件是否有效，并显示解析后的配置内容。
    CheckConfig {
        /// 配置文件路径（不指定则使用全局 -c 选项）
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// 计算启动顺序
    ///
    /// 失败时输出错误与依赖诊断报告。
    Plan {
        /// 模块清单（YAML 或 JSON），默认取配置文件中的 manifests
        #[arg(short, long)]
        manifest: Option<PathBuf>,

        /// 启动阶段，默认取配置文件中的值
        #[arg(short, long)]
        stage: Option<Stage>,

        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },

    /// 输出依赖诊断报告
    Report {
        /// 模块清单（YAML 或 JSON），默认取配置文件中的 manifests
        #[arg(short, long)]
        manifest: Option<PathBuf>,

        /// 启动阶段，默认取配置文件中的值
        #[arg(short, long)]
        stage: Option<Stage>,

        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
}

/// 加载配置文件，不存在时使用默认配置
async fn load_config(cli: &Cli) -> Result<BootConfig, Box<dyn std::error::Error>> {
    let mut config = if cli.config.exists() {
        BootConfig::from_file(&cli.config).await?
    } else {
        BootConfig::default()
    };

    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.dev {
        config.dev_mode = true;
    }
    Ok(config)
}

/// 命令行指定的清单优先，否则使用配置文件中的清单
fn manifest_paths(config: &BootConfig, manifest: Option<&PathBuf>) -> Result<Vec<PathBuf>, CoreError> {
    let paths = match manifest {
        Some(path) => vec![path.clone()],
        None => config.manifest_paths(),
    };
    if paths.is_empty() {
        return Err(CoreError::InvalidConfigValue {
            key: "manifests".to_string(),
            reason: "未指定 --manifest，配置文件中也没有模块清单".to_string(),
        });
    }
    Ok(paths)
}

async fn load_registry(manifests: &[PathBuf]) -> Result<ModuleRegistry, Box<dyn std::error::Error>> {
    let manifest = ManifestParser::parse_files(manifests).await?;
    debug!(files = manifests.len(), modules = manifest.modules.len(), "模块清单已加载");
    Ok(manifest.into_registry()?)
}

/// 计算启动顺序
async fn run_plan(
    config: &BootConfig,
    manifests: &[PathBuf],
    stage: Stage,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = load_registry(manifests).await?;
    let overrides = config.global_overrides();

    match BootPlanner::plan(&registry, stage, &overrides) {
        Ok(plan) => {
            info!(modules = plan.sequence.len(), %stage, "启动计划已生成");
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                println!("启动阶段: {}", plan.stage);
                println!("────────────────────────────────────────");
                for (index, id) in plan.sequence.iter().enumerate() {
                    println!("  {:>3}. {}", index + 1, id);
                }
                if !plan.filtered_out.is_empty() {
                    println!();
                    println!("  阶段过滤: {}", join(&plan.filtered_out));
                }
                if !plan.disabled.is_empty() {
                    println!("  已禁用:   {}", join(&plan.disabled));
                }
                println!("────────────────────────────────────────");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ [{}] {}", e.error_code(), e);
            match e.report() {
                Some(report) => eprintln!("{}", report),
                None => {
                    if let Ok(report) = BootPlanner::report(&registry, stage, &overrides) {
                        eprintln!("{}", report);
                    }
                }
            }
            Err(Box::new(e))
        }
    }
}

/// 输出依赖诊断报告
async fn run_report(
    config: &BootConfig,
    manifests: &[PathBuf],
    stage: Stage,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = load_registry(manifests).await?;
    let report = BootPlanner::report(&registry, stage, &config.global_overrides())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }
    Ok(())
}

/// 检查配置文件
async fn check_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("检查配置文件: {}", path.display());
    println!();

    if !path.exists() {
        println!("⚠️  警告: 配置文件不存在，将使用默认配置");
        println!();
        print_config(&BootConfig::default());
        return Ok(());
    }

    match BootConfig::from_file(path).await {
        Ok(config) => {
            println!("✅ 配置文件有效！");
            println!();
            print_config(&config);
            Ok(())
        }
        Err(e) => {
            println!("❌ 配置文件无效: {}", e);
            Err(Box::new(e))
        }
    }
}

fn print_config(config: &BootConfig) {
    println!("配置内容:");
    println!("────────────────────────────────────────");
    println!("  [启动配置]");
    println!("    启动阶段:       {}", config.boot.stage);
    println!("    耗时记录阈值:   {} ms", config.boot.log_threshold_ms);
    println!("    终止策略:       {:?}", config.boot.terminate_policy);
    println!();
    println!("  [日志配置]");
    println!("    日志级别:       {}", config.logging.level);
    println!("    文件输出:       {}", if config.logging.file_output { "是" } else { "否" });
    println!("    JSON 格式:      {}", if config.logging.json_format { "是" } else { "否" });
    println!();
    println!("  [全局覆盖]");
    for entry in &config.overrides {
        println!("    {} {}", if entry.enabled { "+" } else { "-" }, entry.module);
    }
    if !config.manifests.is_empty() {
        println!();
        println!("  [模块清单]");
        for manifest in &config.manifests {
            println!("    {}", manifest.display());
        }
    }
    println!("────────────────────────────────────────");
}

/// 打印版本信息
fn print_version() {
    println!();
    println!("Chips Boot - 模块组合与启动编排引擎");
    println!("═══════════════════════════════════════");
    println!("  版本:             {}", chips_boot::VERSION);
    println!();
    println!("构建信息:");
    println!("  目标平台:         {}", std::env::consts::ARCH);
    println!("  操作系统:         {}", std::env::consts::OS);
    println!("═══════════════════════════════════════");
    println!();
}

fn join(ids: &[chips_boot::ModuleId]) -> String {
    ids.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(", ")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Version => {
            print_version();
        }

        Commands::CheckConfig { config } => {
            let config_path = config.clone().unwrap_or_else(|| cli.config.clone());
            check_config(&config_path).await?;
        }

        Commands::Plan { manifest, stage, json } | Commands::Report { manifest, stage, json } => {
            let config = load_config(&cli).await?;
            let logger_config = LoggerConfig {
                show_file_line: config.dev_mode,
                ..LoggerConfig::from_log_config(&config.logging)
            };
            let _guard = Logger::try_init(logger_config);
            debug!(config = ?config.config_path, "配置已加载");

            let manifests = manifest_paths(&config, manifest.as_ref())?;
            let stage = stage.unwrap_or(config.boot.stage);
            if matches!(cli.command, Commands::Plan { .. }) {
                run_plan(&config, &manifests, stage, *json).await?;
            } else {
                run_report(&config, &manifests, stage, *json).await?;
            }
        }
    }

    Ok(())
}
