use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;

use neural_echo::config::VizConfig;
use neural_echo::error::ServiceError;
use neural_echo::model::Dataset;
use neural_echo::model::demo::synthesize;
use neural_echo::projection::{CoordinateProjector, ProjectionOptions, ReductionQuality};
use neural_echo::service::{
    LatestRequest, ReductionMethod, ReductionRequest, ReductionResponse, ReductionService,
    ReductionStats,
};
use neural_echo::viz::{EmbeddingView, Session, Visualization};

/// Answers with a fixed response and remembers what it was asked.
struct ScriptedReduction {
    response: Result<Vec<Vec<f32>>, u16>,
    seen: Mutex<Vec<ReductionRequest>>,
}

impl ScriptedReduction {
    fn ok(rows: Vec<Vec<f32>>) -> Self {
        Self {
            response: Ok(rows),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn failing(status: u16) -> Self {
        Self {
            response: Err(status),
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl ReductionService for ScriptedReduction {
    fn reduce(&self, request: &ReductionRequest) -> Result<ReductionResponse, ServiceError> {
        self.seen.lock().expect("lock").push(request.clone());
        match &self.response {
            Ok(rows) => Ok(ReductionResponse {
                coordinates: rows.clone(),
                original_dim: Some(4),
                stats: Some(ReductionStats {
                    distance_correlation: Some(0.875),
                    ..ReductionStats::default()
                }),
            }),
            Err(status) => Err(ServiceError::Status(*status)),
        }
    }
}

/// Takes longer for bigger inputs so an older, larger request finishes last.
struct SlowReduction;

impl ReductionService for SlowReduction {
    fn reduce(&self, request: &ReductionRequest) -> Result<ReductionResponse, ServiceError> {
        thread::sleep(Duration::from_millis(request.embeddings.len() as u64 * 20));
        let coordinates = (0..request.embeddings.len())
            .map(|row| vec![row as f32; request.n_components])
            .collect();
        Ok(ReductionResponse {
            coordinates,
            ..ReductionResponse::default()
        })
    }
}

fn dataset_with_embeddings(tokens: usize) -> Dataset {
    Dataset {
        tokens: (0..tokens).map(|index| format!("t{index}")).collect(),
        embeddings: Some(
            (0..tokens)
                .map(|index| vec![index as f32, 1.0, -1.0, 0.5])
                .collect(),
        ),
        ..Dataset::default()
    }
}

fn options(method: ReductionMethod) -> ProjectionOptions {
    ProjectionOptions {
        method,
        ..ProjectionOptions::default()
    }
}

#[test]
fn latest_submission_wins_even_when_older_finishes_first() {
    let mut worker = LatestRequest::new();
    let (release_first, first_gate) = mpsc::channel::<()>();
    let (release_second, second_gate) = mpsc::channel::<()>();

    let first = worker.submit(move || {
        let _ = first_gate.recv();
        "first"
    });
    let second = worker.submit(move || {
        let _ = second_gate.recv();
        "second"
    });
    assert!(second > first);
    assert_eq!(worker.generation(), second);

    release_first.send(()).expect("release first");
    thread::sleep(Duration::from_millis(50));
    assert_eq!(worker.poll(), None);
    assert!(worker.is_pending());

    release_second.send(()).expect("release second");
    assert_eq!(worker.wait(Duration::from_secs(5)), Some("second"));
    assert!(!worker.is_pending());
    assert_eq!(worker.poll(), None);
}

#[test]
fn projector_normalizes_service_coordinates() {
    let service = Arc::new(ScriptedReduction::ok(vec![
        vec![0.0, 10.0, -5.0],
        vec![5.0, 20.0, 5.0],
        vec![10.0, 30.0, 0.0],
    ]));
    let projector = CoordinateProjector::new(options(ReductionMethod::Umap), Some(service.clone()));
    let projection = projector.project(&dataset_with_embeddings(3), &mut StdRng::seed_from_u64(1));

    assert!(!projection.is_fallback());
    assert_eq!(projection.method, ReductionMethod::Umap);
    let coords = projection.points.iter().map(|point| point.coords).collect::<Vec<_>>();
    assert_eq!(coords[0], [-1.0, -1.0, -1.0]);
    assert_eq!(coords[1], [0.0, 0.0, 1.0]);
    assert_eq!(coords[2], [1.0, 1.0, 0.0]);
    assert_eq!(
        projection.quality,
        Some(ReductionQuality {
            original_dim: Some(4),
            distance_correlation: Some(0.875),
        })
    );

    let seen = service.seen.lock().expect("lock");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, ReductionMethod::Umap);
    assert_eq!(seen[0].n_components, 3);
    assert_eq!(seen[0].embeddings.len(), 3);
}

#[test]
fn service_failure_falls_back_with_reason() {
    let service = Arc::new(ScriptedReduction::failing(503));
    let projector = CoordinateProjector::new(options(ReductionMethod::Pca), Some(service));
    let projection = projector.project(&dataset_with_embeddings(4), &mut StdRng::seed_from_u64(2));

    assert!(projection.is_fallback());
    assert!(projection.quality.is_none());
    assert_eq!(projection.points.len(), 4);
    let reason = projection.fallback.as_deref().unwrap_or_default();
    assert!(reason.contains("503"), "{reason}");
}

#[test]
fn wrong_row_count_falls_back() {
    let service = Arc::new(ScriptedReduction::ok(vec![vec![0.0, 0.0, 0.0]; 2]));
    let projector = CoordinateProjector::new(options(ReductionMethod::Tsne), Some(service));
    let projection = projector.project(&dataset_with_embeddings(5), &mut StdRng::seed_from_u64(3));

    assert!(projection.is_fallback());
    assert_eq!(projection.points.len(), 5);
    for point in &projection.points {
        assert!(point.coords.iter().all(|value| value.abs() <= 1.0));
    }
}

#[test]
fn non_finite_coordinates_fall_back() {
    let service = Arc::new(ScriptedReduction::ok(vec![
        vec![0.0, f32::NAN, 1.0],
        vec![1.0, 2.0, 3.0],
    ]));
    let projector = CoordinateProjector::new(options(ReductionMethod::Pca), Some(service));
    let projection = projector.project(&dataset_with_embeddings(2), &mut StdRng::seed_from_u64(4));
    assert!(projection.is_fallback());
}

#[test]
fn embedding_view_ignores_superseded_projection() {
    let config = Arc::new(VizConfig::default());
    let reduction: Arc<dyn ReductionService> = Arc::new(SlowReduction);

    let older = Session::new(dataset_with_embeddings(12), config.clone(), Some(reduction.clone()));
    let mut view = EmbeddingView::new(&older);
    assert!(view.is_loading());
    assert!(view.needs_frame());

    let newer_dataset = synthesize("short text", 1, 1, 8);
    assert!(newer_dataset.embeddings.is_some());
    let newer_count = newer_dataset.token_count();
    assert!(newer_count < 12);
    let newer = Session::new(newer_dataset, config, Some(reduction));
    view.update(&newer);

    let deadline = Instant::now() + Duration::from_secs(5);
    while view.projection().is_none() && Instant::now() < deadline {
        view.advance_frame();
        thread::sleep(Duration::from_millis(5));
    }
    let projection = view.projection().expect("newer projection arrives");
    assert_eq!(projection.points.len(), newer_count);
    assert!(!projection.is_fallback());

    // Let the older job finish; its result must not replace the newer one.
    thread::sleep(Duration::from_millis(12 * 20 + 200));
    view.advance_frame();
    let projection = view.projection().expect("projection kept");
    assert_eq!(projection.points.len(), newer_count);

    view.destroy();
    assert!(!view.needs_frame());
}

#[test]
fn embedding_header_reports_reduction_quality() {
    let service: Arc<dyn ReductionService> = Arc::new(ScriptedReduction::ok(vec![
        vec![0.0, 1.0, 2.0],
        vec![1.0, 2.0, 3.0],
        vec![2.0, 3.0, 4.0],
    ]));
    let session = Session::new(
        dataset_with_embeddings(3),
        Arc::new(VizConfig::default()),
        Some(service),
    );
    let mut view = EmbeddingView::new(&session);

    let deadline = Instant::now() + Duration::from_secs(5);
    while view.projection().is_none() && Instant::now() < deadline {
        view.advance_frame();
        thread::sleep(Duration::from_millis(5));
    }
    assert!(view.projection().is_some_and(|projection| !projection.is_fallback()));
    let status = view.status();
    assert!(
        status
            .iter()
            .any(|line| line == "reduction from 4D, distance correlation 0.875"),
        "{status:?}"
    );
}
