use eframe::egui::{self, Align, Color32, Context, Layout};

use neural_echo::config::ModelInfo;

use super::super::{RequestForm, ViewModel};
use super::FrameStats;
use super::controls::{draw_request_form, draw_view_controls};
use super::details::draw_details;

const WARNING_COLOR: Color32 = Color32::from_rgb(240, 180, 90);

fn draw_top_bar(ctx: &Context, frame_stats: &FrameStats, add_contents: impl FnOnce(&mut egui::Ui)) {
    egui::TopBottomPanel::top("top_bar")
        .resizable(false)
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Neural Echo");
                ui.separator();
                add_contents(ui);
                ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                    if let Some(fps_text) = frame_stats.display_text() {
                        ui.label(fps_text);
                    }
                });
            });
        });
}

/// Layout shown before the first dataset arrives.
pub(in crate::app) fn draw_shell(
    ctx: &Context,
    form: &mut RequestForm,
    frame_stats: &FrameStats,
    busy: bool,
    load_requested: &mut bool,
) {
    draw_top_bar(ctx, frame_stats, |ui| {
        ui.label(if busy { "running inference" } else { "no data loaded" });
    });

    egui::SidePanel::left("controls")
        .resizable(true)
        .default_width(350.0)
        .show(ctx, |ui| draw_request_form(ui, form, busy, load_requested));
}

pub(in crate::app) fn draw_ready(
    ctx: &Context,
    model: &mut ViewModel,
    form: &mut RequestForm,
    info: &ModelInfo,
    frame_stats: &FrameStats,
    reloading: bool,
    load_requested: &mut bool,
) {
    draw_top_bar(ctx, frame_stats, |ui| {
        ui.label(format!("model: {}", model.session.dataset.model_name()));
        ui.label(format!("tokens: {}", model.session.token_count()));
        ui.label(format!("view: {}", model.mode.label()));
        ui.label(format!("rendering: {}", model.session.performance_mode.label()));
        if let Some(warning) = &model.warning {
            ui.colored_label(WARNING_COLOR, format!("⚠ {warning}"));
        }
    });

    egui::SidePanel::left("controls")
        .resizable(true)
        .default_width(350.0)
        .show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                draw_request_form(ui, form, reloading, load_requested);
                ui.add_space(10.0);
                draw_view_controls(ui, model, info);
            });
        });

    egui::SidePanel::right("details")
        .resizable(true)
        .default_width(320.0)
        .show(ctx, |ui| draw_details(ui, model));

    egui::CentralPanel::default()
        .frame(egui::Frame::NONE.fill(neural_echo::render::palette::BACKGROUND))
        .show(ctx, |ui| model.view.show(ui));
}
