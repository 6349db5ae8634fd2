use std::collections::VecDeque;

use eframe::egui::Context;

const FPS_SAMPLE_WINDOW: usize = 180;

#[derive(Default)]
pub(in crate::app) struct FrameStats {
    current: f32,
    samples: VecDeque<f32>,
}

impl FrameStats {
    pub(in crate::app) fn update(&mut self, ctx: &Context) {
        let dt = ctx.input(|input| input.stable_dt);
        self.record(dt);
    }

    fn record(&mut self, dt: f32) {
        if dt <= f32::EPSILON {
            return;
        }

        self.current = (1.0 / dt).clamp(0.0, 1000.0);
        self.samples.push_back(self.current);
        while self.samples.len() > FPS_SAMPLE_WINDOW {
            self.samples.pop_front();
        }
    }

    pub(in crate::app) fn display_text(&self) -> Option<String> {
        if self.samples.is_empty() {
            return None;
        }

        let avg = self.samples.iter().sum::<f32>() / self.samples.len() as f32;
        let mut parts = vec![format!("FPS {:.0}", self.current), format!("avg {avg:.1}")];
        if let Some(low) = self.samples.iter().copied().reduce(f32::min) {
            parts.push(format!("low {low:.0}"));
        }
        if self.current > f32::EPSILON {
            parts.push(format!("{:.1} ms", 1000.0 / self.current));
        }
        Some(parts.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_keeps_recent_samples() {
        let mut stats = FrameStats::default();
        assert!(stats.display_text().is_none());

        for _ in 0..(FPS_SAMPLE_WINDOW + 20) {
            stats.record(0.02);
        }
        stats.record(0.0);
        assert_eq!(stats.samples.len(), FPS_SAMPLE_WINDOW);

        let text = stats.display_text().expect("samples recorded");
        assert!(text.starts_with("FPS 50"));
        assert!(text.ends_with("20.0 ms"));
    }
}
