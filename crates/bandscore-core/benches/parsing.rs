use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bandscore_core::model::Module;
use bandscore_core::parser::{parse_paper_str, PaperFormat};
use bandscore_core::report::ScoreReport;
use bandscore_core::sample::sample_paper;
use bandscore_core::traits::extract_json_object;

fn bench_extract_json(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_json");

    let bare = r#"{"overall_band": 6.5}"#;
    let wrapped = r#"Sure, here is the assessment you asked for:

```json
{"overall_band": 6.5, "criteria": {"task": 6.5}}
```

Let me know if you need anything else."#;
    let long_prose = {
        let mut s = "Thinking about the essay. ".repeat(400);
        s.push_str(r#"{"overall_band": 6.5}"#);
        s.push_str(&" Done.".repeat(100));
        s
    };

    group.bench_function("bare", |b| b.iter(|| extract_json_object(black_box(bare))));
    group.bench_function("wrapped", |b| {
        b.iter(|| extract_json_object(black_box(wrapped)))
    });
    group.bench_function("long_prose", |b| {
        b.iter(|| extract_json_object(black_box(&long_prose)))
    });

    group.finish();
}

fn bench_paper_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("paper_parsing");

    let paper = sample_paper();
    let json = serde_json::to_string(&paper).unwrap();
    let toml = toml::to_string(&paper).unwrap();

    group.bench_function("json", |b| {
        b.iter(|| parse_paper_str(black_box(&json), PaperFormat::Json))
    });
    group.bench_function("toml", |b| {
        b.iter(|| parse_paper_str(black_box(&toml), PaperFormat::Toml))
    });

    group.finish();
}

fn bench_report_validation(c: &mut Criterion) {
    let output = serde_json::json!({
        "overall_band": 6.5,
        "criteria": {"task": 6.5, "coherence": "7", "lexical": 6.3, "grammar": 5.9},
        "band_rationale": {
            "task": ["fully addresses all parts"],
            "coherence": ["logical progression"],
            "lexical": ["good range, some errors"],
            "grammar": ["mix of complex structures"]
        },
        "top_3_weaknesses": [
            {"area": "grammar", "pattern": "subject-verb agreement", "impact": "noticeable"},
            {"area": "lexical", "pattern": "collocations", "impact": "minor"},
            {"area": "task", "pattern": "overview missing", "impact": "caps band"}
        ],
        "next_steps_7_days": [
            {"focus": "overview", "exercise": "write 5 overviews", "success_metric": "all 5 have one"}
        ],
        "delta_vs_last_attempt": {"overall": 0, "criteria": {}}
    });

    c.bench_function("report_validation", |b| {
        b.iter(|| ScoreReport::from_model_output(Module::Writing, black_box(&output), None))
    });
}

criterion_group!(
    benches,
    bench_extract_json,
    bench_paper_parsing,
    bench_report_validation
);
criterion_main!(benches);
