use eframe::egui::{self, Color32, Ui};

use neural_echo::attention::{HeadSelector, MatrixSelector};
use neural_echo::config::{MODELS, ModelInfo};
use neural_echo::model::demo::EXAMPLE_TEXTS;
use neural_echo::render::PerformanceMode;
use neural_echo::service::{MAX_TEXT_CHARS, ReductionMethod};
use neural_echo::viz::ViewMode;

use super::super::{RequestForm, ViewModel};

const PERFORMANCE_MODES: [PerformanceMode; 3] = [
    PerformanceMode::Auto,
    PerformanceMode::Quality,
    PerformanceMode::Speed,
];

pub(super) fn draw_request_form(
    ui: &mut Ui,
    form: &mut RequestForm,
    busy: bool,
    load_requested: &mut bool,
) {
    ui.heading("Input");
    ui.separator();
    ui.add_space(4.0);

    ui.add(
        egui::TextEdit::multiline(&mut form.text)
            .desired_rows(5)
            .desired_width(f32::INFINITY)
            .hint_text("Text to run through the model"),
    );

    let chars = form.text.chars().count();
    let too_long = chars > MAX_TEXT_CHARS;
    let counter = format!("{chars} / {MAX_TEXT_CHARS} characters");
    if too_long {
        ui.colored_label(Color32::from_rgb(232, 120, 96), counter);
    } else {
        ui.small(counter);
    }

    ui.label("Examples");
    ui.horizontal_wrapped(|ui| {
        for example in &EXAMPLE_TEXTS {
            if ui
                .small_button(example.title)
                .on_hover_text(format!("[{}] {}", example.category, example.text))
                .clicked()
            {
                form.text = example.text.to_owned();
            }
        }
    });

    let selected_model = MODELS
        .iter()
        .find(|model| model.id == form.model_id)
        .map_or(form.model_id.as_str(), |model| model.display_name);
    egui::ComboBox::from_label("Model")
        .selected_text(selected_model)
        .show_ui(ui, |ui| {
            for model in &MODELS {
                ui.selectable_value(&mut form.model_id, model.id.to_owned(), model.display_name)
                    .on_hover_text(format!(
                        "{} layers, {} heads, {}-dim embeddings",
                        model.layers, model.heads, model.embedding_dim
                    ));
            }
        });

    ui.horizontal(|ui| {
        let can_submit = !busy && !too_long && !form.text.trim().is_empty();
        if ui
            .add_enabled(can_submit, egui::Button::new("Analyze"))
            .on_hover_text("Run inference and rebuild the current view.")
            .clicked()
        {
            *load_requested = true;
        }
        if busy {
            ui.spinner();
        }
    });
}

pub(super) fn draw_view_controls(ui: &mut Ui, model: &mut ViewModel, info: &ModelInfo) {
    ui.heading("View");
    ui.separator();
    ui.add_space(4.0);

    ui.horizontal_wrapped(|ui| {
        for mode in ViewMode::ALL {
            if ui.selectable_label(model.mode == mode, mode.label()).clicked() {
                model.set_mode(mode);
            }
        }
    });

    ui.horizontal_wrapped(|ui| {
        ui.label("Rendering:");
        for mode in PERFORMANCE_MODES {
            if ui
                .selectable_label(model.session.performance_mode == mode, mode.label())
                .on_hover_text(match mode {
                    PerformanceMode::Auto => "Vector for small graphs, raster above the node threshold.",
                    PerformanceMode::Quality => "Always draw addressable vector elements.",
                    PerformanceMode::Speed => "Always draw into a single raster surface.",
                })
                .clicked()
            {
                model.set_performance_mode(mode);
            }
        }
    });

    ui.separator();

    let max_layer = model.layer_count(info).saturating_sub(1);
    let mut layer = model.session.selector.layer.min(max_layer);
    ui.add_enabled(
        max_layer > 0,
        egui::Slider::new(&mut layer, 0..=max_layer).text("Layer"),
    );

    let head_count = model.head_count(info);
    let mut head = model.session.selector.head;
    egui::ComboBox::from_label("Head")
        .selected_text(head.label())
        .show_ui(ui, |ui| {
            ui.selectable_value(&mut head, HeadSelector::Average, "average");
            for index in 0..head_count {
                let option = HeadSelector::Head(index);
                ui.selectable_value(&mut head, option, option.label());
            }
        });
    model.set_selector(MatrixSelector { layer, head });

    if model.mode == ViewMode::Embedding {
        ui.horizontal_wrapped(|ui| {
            ui.label("Reduction:");
            for method in ReductionMethod::ALL {
                if ui
                    .selectable_label(model.session.config.reduction_method == method, method.label())
                    .clicked()
                {
                    model.set_reduction_method(method);
                }
            }
        });
    }

    ui.separator();

    ui.label("Search tokens")
        .on_hover_text("Fuzzy-highlight matching tokens without rebuilding the view.");
    if ui.text_edit_singleline(&mut model.search).changed() {
        model.refresh_search();
    }
    let match_count = model.session.search_matches.iter().filter(|hit| **hit).count();
    if !model.search.trim().is_empty() {
        ui.small(format!("{match_count} matching tokens"));
    }

    ui.add_space(6.0);
    if ui.button("Reset view").clicked() {
        model.view.reset_view();
    }
}
