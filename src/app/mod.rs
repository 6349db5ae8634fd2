use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Instant;

use eframe::egui::{self, Context};
use tracing::{info, warn};

use neural_echo::attention::{HeadSelector, MatrixSelector};
use neural_echo::config::{MODELS, ModelInfo, VizConfig, model_info};
use neural_echo::model::demo::{EXAMPLE_TEXTS, synthesize};
use neural_echo::model::Dataset;
use neural_echo::render::PerformanceMode;
use neural_echo::service::{
    InferenceOptions, InferenceRequest, InferenceService, ReductionMethod, ReductionService,
};
use neural_echo::util::stable_seed;
use neural_echo::viz::{EventKind, Session, ViewMode, VizEvent, Visualization, construct};

mod search;
mod ui;

use self::ui::FrameStats;

/// Service handles and the loaded configuration, shared by every load.
pub struct Services {
    pub config: Arc<VizConfig>,
    pub inference: Option<Arc<dyn InferenceService>>,
    pub reduction: Option<Arc<dyn ReductionService>>,
}

pub struct NeuralEchoApp {
    services: Services,
    form: RequestForm,
    state: AppState,
    reload_rx: Option<Receiver<LoadOutcome>>,
    frame_stats: FrameStats,
}

enum AppState {
    Idle,
    Loading { rx: Receiver<LoadOutcome> },
    Ready(Box<ViewModel>),
}

/// What the left panel edits before a request is sent.
struct RequestForm {
    text: String,
    model_id: String,
}

struct LoadOutcome {
    dataset: Dataset,
    /// Set when demo data stands in for a failed or missing service.
    warning: Option<String>,
    elapsed_secs: f64,
}

/// The live session and its single visualization instance.
struct ViewModel {
    session: Session,
    mode: ViewMode,
    view: Box<dyn Visualization>,
    events: Receiver<VizEvent>,
    selected: Option<VizEvent>,
    hovered: Option<VizEvent>,
    search: String,
    warning: Option<String>,
    elapsed_secs: f64,
}

impl NeuralEchoApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        services: Services,
        initial_text: Option<String>,
    ) -> Self {
        let form = RequestForm {
            text: initial_text
                .clone()
                .unwrap_or_else(|| EXAMPLE_TEXTS[0].text.to_owned()),
            model_id: services.config.services.model.clone(),
        };
        let mut app = Self {
            services,
            form,
            state: AppState::Idle,
            reload_rx: None,
            frame_stats: FrameStats::default(),
        };
        if initial_text.is_some() {
            app.state = AppState::Loading {
                rx: app.spawn_load(),
            };
        }
        app
    }

    fn spawn_load(&self) -> Receiver<LoadOutcome> {
        let (tx, rx) = mpsc::channel();
        let request = InferenceRequest {
            text: self.form.text.clone(),
            model_id: self.form.model_id.clone(),
            options: InferenceOptions::default(),
        };
        let service = self.services.inference.clone();
        let model = model_for(&self.form.model_id);

        thread::spawn(move || {
            let started = Instant::now();
            let (dataset, warning) = run_inference(service.as_deref(), &request, &model);
            let _ = tx.send(LoadOutcome {
                dataset,
                warning,
                elapsed_secs: started.elapsed().as_secs_f64(),
            });
        });

        rx
    }

    fn request_load(&mut self) {
        match &self.state {
            AppState::Ready(_) => {
                if self.reload_rx.is_none() {
                    self.reload_rx = Some(self.spawn_load());
                }
            }
            AppState::Idle | AppState::Loading { .. } => {
                self.state = AppState::Loading {
                    rx: self.spawn_load(),
                };
            }
        }
    }

    /// A reload updates the live instance in place; a first load constructs it.
    fn accept(&mut self, outcome: LoadOutcome) {
        let session = Session::new(
            outcome.dataset,
            self.services.config.clone(),
            self.services.reduction.clone(),
        );

        if let AppState::Ready(model) = &mut self.state {
            model.replace_dataset(session, outcome.warning, outcome.elapsed_secs);
            return;
        }

        self.state = AppState::Ready(Box::new(ViewModel::new(
            session,
            ViewMode::Graph,
            outcome.warning,
            outcome.elapsed_secs,
        )));
    }
}

fn model_for(id: &str) -> ModelInfo {
    model_info(id).copied().unwrap_or(MODELS[0])
}

/// Calls the inference service and substitutes the offline demo dataset when
/// it fails or is not configured.
fn run_inference(
    service: Option<&dyn InferenceService>,
    request: &InferenceRequest,
    model: &ModelInfo,
) -> (Dataset, Option<String>) {
    let seed = stable_seed(request.text.as_bytes());
    let Some(service) = service else {
        info!(model = model.id, "no inference service configured, using demo data");
        return (
            synthesize(&request.text, model.layers, model.heads, seed),
            Some("No inference service configured. Showing demo data.".to_owned()),
        );
    };

    match service.infer(request) {
        Ok(dataset) => (dataset, None),
        Err(error) => {
            warn!(%error, model = model.id, "inference failed, substituting demo data");
            (
                synthesize(&request.text, model.layers, model.heads, seed),
                Some(format!("Inference failed ({error}). Showing demo data.")),
            )
        }
    }
}

impl ViewModel {
    fn new(session: Session, mode: ViewMode, warning: Option<String>, elapsed_secs: f64) -> Self {
        let mut view = construct(mode, &session);
        let events = view.subscribe();
        Self {
            session,
            mode,
            view,
            events,
            selected: None,
            hovered: None,
            search: String::new(),
            warning,
            elapsed_secs,
        }
    }

    fn replace_dataset(&mut self, mut session: Session, warning: Option<String>, elapsed: f64) {
        session.performance_mode = self.session.performance_mode;
        session.selector = self.session.selector;
        session.config = self.session.config.clone();
        session.search_matches = search::token_matches(&session.tokens, &self.search);
        self.session = session;
        self.selected = None;
        self.hovered = None;
        self.warning = warning;
        self.elapsed_secs = elapsed;
        self.clamp_selector();
        self.view.update(&self.session);
    }

    /// Tears down the live instance before its replacement is constructed.
    fn rebuild_view(&mut self) {
        self.view.destroy();
        self.view = construct(self.mode, &self.session);
        self.events = self.view.subscribe();
        self.hovered = None;
    }

    fn set_mode(&mut self, mode: ViewMode) {
        if self.mode == mode {
            return;
        }
        info!(from = self.mode.label(), to = mode.label(), "switching view");
        self.mode = mode;
        self.selected = None;
        self.rebuild_view();
    }

    fn set_performance_mode(&mut self, mode: PerformanceMode) {
        if self.session.performance_mode == mode {
            return;
        }
        self.session.performance_mode = mode;
        self.rebuild_view();
    }

    fn set_selector(&mut self, selector: MatrixSelector) {
        if self.session.selector == selector {
            return;
        }
        self.session.selector = selector;
        self.clamp_selector();
        self.view.update(&self.session);
    }

    fn set_reduction_method(&mut self, method: ReductionMethod) {
        if self.session.config.reduction_method == method {
            return;
        }
        let mut config = (*self.session.config).clone();
        config.reduction_method = method;
        self.session.config = Arc::new(config);
        self.view.update(&self.session);
    }

    fn refresh_search(&mut self) {
        self.session.search_matches = search::token_matches(&self.session.tokens, &self.search);
        self.view.update(&self.session);
    }

    fn layer_count(&self, model: &ModelInfo) -> usize {
        match self.session.dataset.layer_count() {
            0 => model.layers,
            count => count,
        }
    }

    fn head_count(&self, model: &ModelInfo) -> usize {
        match self.session.dataset.head_count(self.session.selector.layer) {
            0 => model.heads,
            count => count,
        }
    }

    fn clamp_selector(&mut self) {
        let layers = self.session.dataset.layer_count();
        if layers > 0 && self.session.selector.layer >= layers {
            self.session.selector.layer = layers - 1;
        }
        let heads = self.session.dataset.head_count(self.session.selector.layer);
        if let HeadSelector::Head(head) = self.session.selector.head
            && heads > 0
            && head >= heads
        {
            self.session.selector.head = HeadSelector::Average;
        }
    }

    fn drain_events(&mut self) {
        for event in self.events.try_iter() {
            match event.kind {
                EventKind::Click => self.selected = Some(event),
                EventKind::Hover => self.hovered = Some(event),
            }
        }
    }
}

impl Drop for ViewModel {
    fn drop(&mut self) {
        self.view.destroy();
    }
}

enum Transition {
    Loaded(LoadOutcome),
    Idle,
}

fn poll_load(rx: &Receiver<LoadOutcome>) -> Option<Transition> {
    match rx.try_recv() {
        Ok(outcome) => Some(Transition::Loaded(outcome)),
        Err(TryRecvError::Empty) => None,
        Err(TryRecvError::Disconnected) => {
            warn!("inference worker disconnected");
            Some(Transition::Idle)
        }
    }
}

impl eframe::App for NeuralEchoApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.frame_stats.update(ctx);
        let mut transition = None;
        let mut load_requested = false;

        match &mut self.state {
            AppState::Idle => {
                ui::draw_shell(ctx, &mut self.form, &self.frame_stats, false, &mut load_requested);
                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.add_space(120.0);
                        ui.heading("Enter some text and press Analyze");
                    });
                });
            }
            AppState::Loading { rx } => {
                transition = poll_load(rx);

                ui::draw_shell(ctx, &mut self.form, &self.frame_stats, true, &mut load_requested);
                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.add_space(120.0);
                        ui.heading("Running inference...");
                        ui.add_space(8.0);
                        ui.spinner();
                    });
                });
            }
            AppState::Ready(view_model) => {
                if let Some(rx) = self.reload_rx.take() {
                    match poll_load(&rx) {
                        None => self.reload_rx = Some(rx),
                        Some(Transition::Idle) => {}
                        Some(loaded) => transition = Some(loaded),
                    }
                }

                let model = model_for(&self.form.model_id);
                view_model.drain_events();
                ui::draw_ready(
                    ctx,
                    view_model,
                    &mut self.form,
                    &model,
                    &self.frame_stats,
                    self.reload_rx.is_some(),
                    &mut load_requested,
                );
                if view_model.view.needs_frame() {
                    ctx.request_repaint();
                }
            }
        }

        match transition {
            Some(Transition::Loaded(outcome)) => self.accept(outcome),
            Some(Transition::Idle) => self.state = AppState::Idle,
            None => {}
        }

        if load_requested {
            self.request_load();
        }
    }
}
