mod common;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use wlang::backend;

fn bench_backends(c: &mut Criterion) {
    for (label, path) in common::workloads("loop") {
        let program = common::load_program(&path);

        for backend in backend::backends() {
            c.bench_function(&format!("backend_{}_{label}", backend.name()), |b| {
                b.iter(|| {
                    let output = backend.run(black_box(&program)).expect("run");
                    black_box(output);
                })
            });

            let prepared = backend.prepare(&program).expect("prepare");
            c.bench_function(
                &format!("backend_{}_execute_prepared_{label}", backend.name()),
                |b| {
                    b.iter(|| {
                        let output = prepared.run().expect("run prepared");
                        black_box(output);
                    })
                },
            );
        }
    }
}

criterion_group!(benches, bench_backends);
criterion_main!(benches);
