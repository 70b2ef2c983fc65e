//! Cost of one DQN optimization step for the default network size.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use deepq::agent::DqnAgent;
use deepq::config::AgentConfig;
use deepq::replay_buffer::Transition;
use ndarray::Array1;

fn filled_agent(n_state: usize, double_dqn: bool) -> DqnAgent {
    let mut config = AgentConfig::new(n_state, 4).with_seed(0);
    config.doubledqn = double_dqn;
    let mut agent = DqnAgent::new(config).unwrap();
    for i in 0..1000 {
        let state = Array1::from_shape_fn(n_state, |j| ((i * 31 + j * 7) % 17) as f32 / 17.0);
        let next_state = state.mapv(|v| 1.0 - v);
        let transition = Transition::new(state, i % 4, next_state, (i % 3) as f32 - 1.0, i % 50 == 0);
        agent.add_memory(transition).unwrap();
    }
    agent
}

fn bench_optimization_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimization_step");
    for double_dqn in [false, true] {
        let mut agent = filled_agent(8, double_dqn);
        let mut epoch = 0;
        let label = if double_dqn { "double" } else { "vanilla" };
        group.bench_function(BenchmarkId::new(label, 8), |b| {
            b.iter(|| {
                epoch += 1;
                black_box(agent.run_optimization_step(epoch).unwrap())
            })
        });
    }
    group.finish();
}

fn bench_act(c: &mut Criterion) {
    let mut agent = filled_agent(8, false);
    let state = Array1::linspace(0.0, 1.0, 8);
    c.bench_function("greedy_act", |b| b.iter(|| black_box(agent.act(state.view()).unwrap())));
}

criterion_group!(benches, bench_optimization_step, bench_act);
criterion_main!(benches);
