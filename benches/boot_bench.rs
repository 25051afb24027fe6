//! 启动管线性能基准测试
//!
//! 使用 Criterion 框架进行性能测试，包括：
//! - 完整启动计划（过滤、解析、建图、排序）
//! - 依赖诊断报告生成
//! - 不同规模下的拓扑排序

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use chips_boot::module::{
    CapabilityDescriptor, DependencyReport, ModuleDescriptor, ModuleId, ModuleRegistry, Requirement,
};
use chips_boot::{BootPlanner, GlobalOverrides, Stage};

// ============================================================================
// 测试辅助
// ============================================================================

/// 构建一个分层的注册表：每个模块依赖前一层的模块，每第 5 个实现一个能力接口
fn layered_registry(size: usize) -> ModuleRegistry {
    let mut registry = ModuleRegistry::with_default_anchor();
    registry
        .register_capability(CapabilityDescriptor::new("bench.plugin").require(Requirement::module("m0")))
        .unwrap();

    for i in 0..size {
        let mut descriptor = ModuleDescriptor::declared(format!("m{i}"));
        if i > 0 {
            descriptor = descriptor.require(Requirement::module(format!("m{}", i / 2)));
        }
        if i % 5 == 4 {
            descriptor = descriptor.implements("bench.plugin");
        }
        if i % 7 == 0 {
            descriptor = descriptor.core();
        }
        if i % 11 == 3 {
            descriptor = descriptor.disable_self();
        }
        registry.register(descriptor).unwrap();
    }
    registry
}

// ============================================================================
// 启动计划基准测试
// ============================================================================

fn plan_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("boot_plan");

    for size in [10usize, 100, 1000] {
        // 被禁用的模块会让依赖它的模块断裂，这里只启用不被依赖的那部分
        let registry = layered_registry(size);
        let overrides: GlobalOverrides = (0..size)
            .filter(|i| i % 11 == 3)
            .map(|i| (ModuleId::from(format!("m{i}")), true))
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &registry, |b, registry| {
            b.iter(|| BootPlanner::plan(black_box(registry), Stage::Run, &overrides).unwrap())
        });
    }

    group.finish();
}

// ============================================================================
// 依赖诊断报告基准测试
// ============================================================================

fn report_benchmark(c: &mut Criterion) {
    let registry = layered_registry(200);
    let overrides = GlobalOverrides::new();

    c.bench_function("dependency_report_200", |b| {
        b.iter(|| {
            let report: DependencyReport =
                BootPlanner::report(black_box(&registry), Stage::Run, &overrides).unwrap();
            black_box(report.to_string())
        })
    });
}

// ============================================================================
// 拓扑排序基准测试
// ============================================================================

fn sort_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("topological_sort");

    for size in [100usize, 1000] {
        let registry = layered_registry(size);
        let overrides: GlobalOverrides = (0..size)
            .filter(|i| i % 11 == 3)
            .map(|i| (ModuleId::from(format!("m{i}")), true))
            .collect();
        let graph = BootPlanner::plan(&registry, Stage::Run, &overrides).unwrap().graph;

        group.bench_with_input(BenchmarkId::from_parameter(size), &graph, |b, graph| {
            b.iter(|| black_box(graph).topological_sort().unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, plan_benchmark, report_benchmark, sort_benchmark);
criterion_main!(benches);
