use bubblescan_core::GrayImage;
use bubblescan_layout::{QuestionRegions, Region};
use bubblescan_marks::{DecisionEngine, MarkScorer};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::Point2;

const RADIUS: f32 = 12.0;
const LABELS: [&str; 5] = ["A", "B", "C", "D", "E"];

/// 50 questions x 5 options on a 1240x1754 page, one mark per question.
fn synthetic_sheet() -> (GrayImage, Vec<QuestionRegions>) {
    let (w, h) = (1240usize, 1754usize);
    let mut img = GrayImage::filled(w, h, 232);
    let mut questions = Vec::new();
    for q in 0..50u32 {
        let cy = 150.0 + q as f32 * 30.0;
        let mut regions = Vec::new();
        for (i, label) in LABELS.iter().enumerate() {
            let cx = 300.0 + i as f32 * 40.0;
            let filled = i == (q as usize % LABELS.len());
            let x0 = (cx - RADIUS) as usize;
            let y0 = (cy - RADIUS) as usize;
            for y in y0..y0 + 2 * RADIUS as usize {
                for x in x0..x0 + 2 * RADIUS as usize {
                    let d = ((x as f32 + 0.5 - cx).powi(2) + (y as f32 + 0.5 - cy).powi(2)).sqrt();
                    if (filled && d <= RADIUS) || (d <= RADIUS && d >= RADIUS - 2.0) {
                        img.data[y * w + x] = 45;
                    }
                }
            }
            regions.push(Region {
                question: q + 1,
                label: label.to_string(),
                center: Point2::new(cx, cy),
                radius: RADIUS,
            });
        }
        questions.push(QuestionRegions {
            question: q + 1,
            regions,
        });
    }
    (img, questions)
}

fn bench_score_sheet(c: &mut Criterion) {
    let (img, questions) = synthetic_sheet();
    let scorer = MarkScorer::default();
    let engine = DecisionEngine::default();

    c.bench_function("score_region_r12", |b| {
        let region = &questions[0].regions[0];
        b.iter(|| scorer.score(black_box(&img.view()), black_box(region)))
    });

    c.bench_function("score_and_decide_50x5", |b| {
        b.iter(|| {
            scorer
                .score_sheet(black_box(&img.view()), black_box(&questions))
                .iter()
                .map(|q| engine.decide_question(q))
                .count()
        })
    });
}

criterion_group!(benches, bench_score_sheet);
criterion_main!(benches);
