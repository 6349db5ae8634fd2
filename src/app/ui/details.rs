use eframe::egui::{RichText, Ui};

use neural_echo::util::format_seconds;
use neural_echo::viz::{HitTarget, VizEvent};

use super::super::ViewModel;

pub(super) fn draw_details(ui: &mut Ui, model: &ViewModel) {
    ui.heading("Selection Details");
    ui.add_space(6.0);

    match &model.selected {
        Some(event) => describe(ui, event),
        None => {
            ui.label("Click a token, point or cell in the view.");
        }
    }

    if let Some(event) = &model.hovered {
        ui.separator();
        ui.label(RichText::new("Hovering").strong());
        ui.small(summary(&event.target));
    }

    ui.separator();
    draw_dataset(ui, model);
}

fn summary(target: &HitTarget) -> String {
    match target {
        HitTarget::Node(node) => match node.layer {
            Some(layer) => format!("{} (layer {layer})", node.label),
            None => node.label.clone(),
        },
        HitTarget::Point(point) => point.label.clone(),
        HitTarget::Cell(cell) => format!("{} → {}", cell.row_label, cell.col_label),
    }
}

fn describe(ui: &mut Ui, event: &VizEvent) {
    ui.label(RichText::new(summary(&event.target)).strong());
    ui.add_space(4.0);

    match &event.target {
        HitTarget::Node(node) => {
            ui.label(format!("Token #{}", node.id));
            ui.label(format!("Category: {}", node.category.label()));
            if let Some(layer) = node.layer {
                ui.label(format!("Layer: {layer}"));
            }
            ui.label(format!("Connections: {}", node.connections));
            if let Some(received) = node.attention_received {
                ui.label(format!("Attention received: {received:.3}"));
            }
            ui.small(format!(
                "position ({:.1}, {:.1}), radius {:.1}",
                node.position.x, node.position.y, node.radius
            ));
        }
        HitTarget::Point(point) => {
            ui.label(format!("Token #{}", point.id));
            ui.label(format!("Category: {}", point.category.label()));
            let coords = point.coords[..point.dims.min(3)]
                .iter()
                .map(|value| format!("{value:.3}"))
                .collect::<Vec<_>>()
                .join(", ");
            ui.label(format!("Coordinates: ({coords})"));
            if let Some(norm) = point.embedding_norm {
                ui.label(format!("Embedding norm: {norm:.3}"));
            }
            if point.fallback {
                ui.small("Random placement, no reduction available.");
            }
        }
        HitTarget::Cell(cell) => {
            ui.label(format!("Attention: {:.4}", cell.value));
            ui.label(format!("Row {} / column {}", cell.row, cell.col));
            if cell.block_size > 1 {
                ui.small(format!(
                    "Block average over {0}×{0} source cells.",
                    cell.block_size
                ));
            }
        }
    }
}

fn draw_dataset(ui: &mut Ui, model: &ViewModel) {
    let dataset = &model.session.dataset;
    ui.label(RichText::new("Dataset").strong());
    ui.label(format!("Model: {}", dataset.model_name()));
    ui.label(format!("Tokens: {}", dataset.token_count()));
    ui.label(format!("Layers: {}", dataset.layer_count()));

    let processing = dataset
        .metadata
        .as_ref()
        .map(|metadata| metadata.processing_time)
        .filter(|seconds| *seconds > 0.0)
        .unwrap_or(model.elapsed_secs);
    ui.label(format!("Processing time: {}", format_seconds(processing)));

    if let Some(stats) = &dataset.embedding_stats {
        ui.label(format!(
            "Embeddings: mean {:.3}, std {:.3}, shape {:?}",
            stats.mean, stats.std, stats.shape
        ));
    }

    ui.separator();
    for line in model.view.status() {
        ui.small(line);
    }
}
