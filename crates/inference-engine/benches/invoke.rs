use criterion::{black_box, criterion_group, criterion_main, Criterion};
use inference_engine::builder::{fixed_logits_model, gesture_cnn_model};
use inference_engine::InferenceEngine;

fn bench_invoke(c: &mut Criterion) {
    let cnn = gesture_cnn_model(1, 14).expect("cnn model");
    let mut engine: InferenceEngine<'_> = InferenceEngine::new(&cnn);
    engine.init().expect("init");
    engine
        .input_mut()
        .and_then(|input| input.into_f32_mut().map(|x| x.fill(0.5)))
        .expect("input");

    c.bench_function("invoke_gesture_cnn", |b| {
        b.iter(|| {
            engine.invoke().expect("invoke");
            black_box(engine.output().is_ok())
        })
    });

    let fixed = fixed_logits_model(32, 32, &[0.0; 14]).expect("fixed model");
    let mut engine: InferenceEngine<'_> = InferenceEngine::new(&fixed);
    engine.init().expect("init");
    c.bench_function("invoke_fixed_logits", |b| b.iter(|| engine.invoke().expect("invoke")));
}

criterion_group!(benches, bench_invoke);
criterion_main!(benches);
