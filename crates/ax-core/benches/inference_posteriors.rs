//! Posterior-update throughput for the discrete inference engines.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ax_config::{InferenceKind, InferenceSettings};
use ax_core::inference::{Engine, InferenceContext, Observation};
use ax_core::model::{Dimensions, DiscreteModel};
use ax_math::DetRng;

fn model(states: usize) -> DiscreteModel {
    let dims = Dimensions::new(states, states, 4).unwrap();
    let mut rng = DetRng::from_seed(1234);
    DiscreteModel::dirichlet_init(dims, 5, 2.0, &mut rng).unwrap()
}

fn bench_vmp(c: &mut Criterion) {
    let mut group = c.benchmark_group("vmp_posterior");
    for states in [8usize, 32, 128] {
        let model = model(states);
        let mut engine = Engine::from_settings(&InferenceSettings::default(), 7);
        group.bench_function(format!("states_{states}"), |b| {
            b.iter(|| {
                let out = engine
                    .infer(
                        black_box(&model),
                        &Observation::Index(states / 2),
                        None,
                        InferenceContext::default(),
                    )
                    .unwrap();
                black_box(out.belief)
            })
        });
    }
    group.finish();
}

fn bench_particle_filter(c: &mut Criterion) {
    let mut settings = InferenceSettings::default();
    settings.algorithm = InferenceKind::ParticleFilter;
    settings.num_particles = 512;
    let model = model(32);
    let mut engine = Engine::from_settings(&settings, 7);
    c.bench_function("particle_filter_512", |b| {
        b.iter(|| {
            let out = engine
                .infer(
                    black_box(&model),
                    &Observation::Index(3),
                    None,
                    InferenceContext::default(),
                )
                .unwrap();
            black_box(out.belief)
        })
    });
}

criterion_group!(benches, bench_vmp, bench_particle_filter);
criterion_main!(benches);
