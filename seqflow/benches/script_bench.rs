//! Benchmarks for batch script rendering.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use seqflow::core::{JobHandle, ResourceProfile};
use seqflow::scheduler::dependency_expression;
use seqflow::script::{render_text, CommandScript, ScriptProfile, ShellCommand};

fn call_profile(dependencies: usize) -> ScriptProfile {
    let command = CommandScript::new()
        .run(
            ShellCommand::new("gatk")
                .args(["Mutect2", "-R", "/ref/GRCh38.fa", "-I", "/data/P1-T.bam"])
                .args(["-I", "/data/P1-N.bam", "-O", "/out/P1/P1.unfiltered.vcf.gz"]),
        )
        .run(ShellCommand::new("touch").arg("/out/P1/P1.call.COMPLETE"));

    let resources = ResourceProfile {
        modules: vec!["gatk/4.4.0".to_string(), "samtools/1.17".to_string()],
        ..ResourceProfile::default()
    };

    ScriptProfile::new("P1_call", "/out/P1/logs", command)
        .with_resources(&resources)
        .with_dependencies(handles(dependencies))
}

fn handles(n: usize) -> Vec<JobHandle> {
    (0..n)
        .map(|i| if i % 5 == 0 { JobHandle::empty() } else { JobHandle::new((1000 + i).to_string()) })
        .collect()
}

fn render_benchmark(c: &mut Criterion) {
    let single = call_profile(2);
    c.bench_function("render_text/stage", |b| b.iter(|| render_text(black_box(&single))));

    let cohort = call_profile(500);
    c.bench_function("render_text/aggregation_500", |b| {
        b.iter(|| render_text(black_box(&cohort)));
    });
}

fn dependency_benchmark(c: &mut Criterion) {
    let cohort = handles(2000);
    c.bench_function("dependency_expression/2000", |b| {
        b.iter(|| dependency_expression(black_box(&cohort), true));
    });
}

criterion_group!(benches, render_benchmark, dependency_benchmark);
criterion_main!(benches);
