use camera_capture::{FrameSource, MockCamera};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gesture::{resample_frame, GesturePipeline, ImageEncoder};
use inference_engine::builder::gesture_cnn_model;
use inference_engine::InferenceEngine;

fn bench_resample_invoke(c: &mut Criterion) {
    let model = gesture_cnn_model(1, 14).expect("model");
    let mut engine: InferenceEngine<'_> = InferenceEngine::new(&model);
    engine.init().expect("init");
    let camera = MockCamera::mid_gray();
    let frame = camera.acquire().expect("frame");

    c.bench_function("resample_and_invoke", |b| {
        b.iter(|| {
            let input = engine.input_mut().and_then(|view| view.into_f32_mut()).expect("input");
            resample_frame(&frame, input, 32, 32).expect("resample");
            engine.invoke().expect("invoke");
            black_box(engine.output().is_ok())
        })
    });
    camera.release(frame);

    let pipeline = GesturePipeline::new(MockCamera::mid_gray(), &model, ImageEncoder::default());
    c.bench_function("capture_request", |b| b.iter(|| pipeline.capture().expect("capture")));
}

criterion_group!(benches, bench_resample_invoke);
criterion_main!(benches);
