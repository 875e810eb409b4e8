use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rayos_gaze::config::{AgentConfig, CalibrationConfig};
use rayos_gaze::resolver::resolve;
use rayos_gaze::{
    CalibrationEngine, CandidateObject, Direction, DwellTracker, IntentFusionAgent, ObjectId,
    Position,
};

fn scene(n: u32) -> Vec<CandidateObject> {
    (0..n)
        .map(|i| {
            let t = i as f64 / n as f64 * std::f64::consts::TAU;
            let position = Position::new(0.8 * t.cos(), 0.8 * t.sin(), 0.0);
            CandidateObject::new(i, position, format!("/obj[{i}]"))
        })
        .collect()
}

fn benchmark_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");

    for count in [5u32, 20, 100].iter() {
        let objects = scene(*count);
        let mut config = AgentConfig::default();
        config.max_objects = *count as usize;
        config.seed = Some(3);
        let mut agent = IntentFusionAgent::new(&config);
        let mut dwell = DwellTracker::default();

        for step in 0..50 {
            let t = step as f64 * 0.033;
            let id = ObjectId(step % count);
            agent.record_gaze(id, t);
            dwell.update(id, t);
        }

        group.bench_with_input(BenchmarkId::new("candidates", count), count, |b, _| {
            b.iter(|| black_box(agent.select(Direction::UpRight, 1.65, &objects, &dwell)));
        });
    }
    group.finish();
}

fn benchmark_sample_path(c: &mut Criterion) {
    let objects = scene(20);
    let mut engine = CalibrationEngine::new(&CalibrationConfig {
        degree: 2,
        ..CalibrationConfig::default()
    });
    for i in 0..9 {
        let raw = 0.1 + i as f64 * 0.1;
        let _ = engine.add_sample(raw, raw, 0.9 * raw + 0.05, raw * raw);
    }
    engine.fit();

    c.bench_function("transform_and_resolve", |b| {
        b.iter(|| {
            let (h, v) = engine.transform(black_box(0.62), black_box(0.41));
            black_box(resolve(h, v, &objects, 0.3))
        });
    });
}

criterion_group!(benches, benchmark_select, benchmark_sample_path);
criterion_main!(benches);
