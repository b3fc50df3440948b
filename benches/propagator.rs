//! Benchmarks for Flow Lenia propagator.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use flow_lenia_engine::{
    compute::{BackendKind, EmbeddedPropagator, Propagator},
    schema::{
        EmbeddingConfig, FlowParams, KernelSpec, Mixing, Pattern, RingSpec, Seed, SimulationConfig,
    },
};

fn kernel(channel: usize) -> KernelSpec {
    KernelSpec {
        radius: 1.0,
        rings: vec![RingSpec {
            amplitude: 1.0,
            distance: 0.5,
            width: 0.15,
        }],
        weight: 1.0,
        mu: 0.15,
        sigma: 0.015,
        source_channel: channel,
        target_channel: channel,
    }
}

fn seed() -> Seed {
    Seed {
        pattern: Pattern::GaussianBlob {
            center: vec![0.5, 0.5],
            radius: 0.1,
            amplitude: 1.0,
            channel: 0,
        },
    }
}

fn seeded(config: SimulationConfig, backend: BackendKind) -> Propagator {
    let mut propagator = Propagator::with_backend(config, backend).unwrap();
    propagator.seed(&seed()).unwrap();
    propagator
}

fn bench_propagator_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagator_step");

    for size in [64, 128, 256, 512] {
        let config = SimulationConfig {
            width: size,
            height: size,
            depth: 1,
            channels: 1,
            dt: 0.2,
            kernel_radius: 13.0,
            kernels: vec![kernel(0)],
            flow: FlowParams::default(),
        };

        for (name, backend) in [
            ("sequential", BackendKind::Sequential),
            ("parallel", BackendKind::Parallel { threads: None }),
        ] {
            let mut propagator = seeded(config.clone(), backend);
            group.bench_with_input(
                BenchmarkId::new(name, format!("{}x{}", size, size)),
                &size,
                |b, _| {
                    b.iter(|| propagator.step());
                },
            );
        }
    }

    group.finish();
}

fn bench_multichannel(c: &mut Criterion) {
    let mut group = c.benchmark_group("multichannel");

    for channels in [1, 2, 4] {
        let config = SimulationConfig {
            width: 128,
            height: 128,
            depth: 1,
            channels,
            dt: 0.2,
            kernel_radius: 13.0,
            kernels: (0..channels).map(kernel).collect(),
            flow: FlowParams::default(),
        };

        let mut propagator = seeded(config, BackendKind::Parallel { threads: None });

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_channels", channels)),
            &channels,
            |b, _| {
                b.iter(|| propagator.step());
            },
        );
    }

    group.finish();
}

fn bench_3d(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagator_3d");
    group.sample_size(10);

    for size in [32, 64] {
        let config = SimulationConfig {
            width: size,
            height: size,
            depth: size,
            channels: 1,
            dt: 0.2,
            kernel_radius: 8.0,
            kernels: vec![kernel(0)],
            flow: FlowParams::default(),
        };

        let mut propagator = seeded(config, BackendKind::Parallel { threads: None });

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}^3", size)),
            &size,
            |b, _| {
                b.iter(|| propagator.step());
            },
        );
    }

    group.finish();
}

fn bench_embedded(c: &mut Criterion) {
    let mut group = c.benchmark_group("embedded_step");

    let config = SimulationConfig {
        width: 128,
        height: 128,
        depth: 1,
        channels: 1,
        dt: 0.2,
        kernel_radius: 13.0,
        kernels: vec![kernel(0)],
        flow: FlowParams::default(),
    };

    for (name, mixing) in [
        ("softmax", Mixing::Softmax { temperature: 1.0 }),
        ("linear", Mixing::Linear),
        ("dominant", Mixing::Dominant),
    ] {
        let embedding = EmbeddingConfig {
            enabled: true,
            mixing,
        };
        let mut propagator = EmbeddedPropagator::new(config.clone(), embedding).unwrap();
        propagator.seed(&seed()).unwrap();

        group.bench_function(name, |b| {
            b.iter(|| propagator.step());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_propagator_step,
    bench_multichannel,
    bench_3d,
    bench_embedded
);
criterion_main!(benches);
