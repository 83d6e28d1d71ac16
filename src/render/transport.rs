//! Audio guide panel: generation prompt, seek bar and transport controls

use eframe::egui::{self, Color32, Sense, Stroke};

use crate::audio::AudioOutput;
use crate::guide::AudioGuide;
use crate::service::VoicePreset;
use crate::settings::AppSettings;

/// Speed choices offered in the UI
pub const SPEED_PRESETS: &[f32] = &[0.5, 1.0, 1.25, 1.5, 2.0];

const ACCENT: Color32 = Color32::from_rgb(79, 70, 229);
const OVERVIEW_POINTS: usize = 600;

/// Format seconds as `m:ss`
pub fn format_time(secs: f64) -> String {
    let secs = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
    let mins = (secs / 60.0).floor() as u64;
    let rest = (secs % 60.0).floor() as u64;
    format!("{}:{:02}", mins, rest)
}

/// Audio tab view with a cached waveform overview
#[derive(Default)]
pub struct TransportView {
    overview: Vec<f32>,
    /// Sample count of the buffer the overview was built from
    overview_source: usize,
    /// Pointer position while the playhead is being dragged
    scrub_fraction: Option<f32>,
}

impl TransportView {
    /// Draw the audio tab. Returns true when a persisted setting changed.
    pub fn show<O: AudioOutput>(
        &mut self,
        ui: &mut egui::Ui,
        guide: &mut AudioGuide<O>,
        settings: &mut AppSettings,
    ) -> bool {
        let mut changed = false;

        ui.vertical_centered(|ui| {
            ui.heading("Audio Guide");
            ui.label("Personal AI Audio Narrator");
        });
        ui.add_space(16.0);

        if guide.is_ready() {
            self.seek_bar(ui, guide);
            ui.add_space(12.0);
            self.controls(ui, guide, settings.seek_step_secs);
            ui.add_space(16.0);
            ui.separator();
            changed |= self.voice_selector(ui, guide, settings, false);
            ui.add_space(8.0);
            changed |= self.speed_selector(ui, guide, settings);
        } else if guide.is_generating() {
            ui.vertical_centered(|ui| {
                ui.spinner();
                ui.strong(guide.status().unwrap_or("Working..."));
                ui.small("AI is working on your guide");
            });
        } else {
            self.overview.clear();
            self.overview_source = 0;
            ui.vertical_centered(|ui| {
                ui.label(
                    "Transform your material into a professional audio narration. \
                     Click below to begin the AI synthesis.",
                );
            });
            ui.add_space(8.0);
            changed |= self.voice_selector(ui, guide, settings, true);
            ui.add_space(8.0);
            ui.vertical_centered(|ui| {
                if ui.button("▶ Start Audio Synthesis").clicked() {
                    guide.generate(settings.voice);
                }
            });
        }

        changed
    }

    fn refresh_overview<O: AudioOutput>(&mut self, guide: &AudioGuide<O>) {
        let Some(buffer) = guide.buffer() else {
            self.overview.clear();
            self.overview_source = 0;
            return;
        };
        if self.overview_source != buffer.len() || self.overview.is_empty() {
            self.overview = buffer.overview(OVERVIEW_POINTS);
            self.overview_source = buffer.len();
        }
    }

    fn seek_bar<O: AudioOutput>(&mut self, ui: &mut egui::Ui, guide: &mut AudioGuide<O>) {
        self.refresh_overview(guide);

        let duration = guide.duration();
        let available_width = ui.available_width();
        let (response, painter) =
            ui.allocate_painter(egui::vec2(available_width, 40.0), Sense::click_and_drag());
        let rect = response.rect;

        painter.rect_filled(rect, 4.0, Color32::from_gray(235));

        let played = if duration > 0.0 {
            (guide.current_time() / duration) as f32
        } else {
            0.0
        };
        let fraction = self.scrub_fraction.unwrap_or(played).clamp(0.0, 1.0);

        if !self.overview.is_empty() {
            let center_y = rect.center().y;
            let height = rect.height() * 0.45;
            for (i, peak) in self.overview.iter().enumerate() {
                let t = i as f32 / self.overview.len() as f32;
                let x = rect.left() + t * rect.width();
                let amp = peak.min(1.0) * height;
                let color = if t <= fraction {
                    ACCENT
                } else {
                    Color32::from_gray(170)
                };
                painter.line_segment(
                    [egui::pos2(x, center_y - amp), egui::pos2(x, center_y + amp)],
                    Stroke::new(1.0, color),
                );
            }
        }

        let playhead_x = rect.left() + fraction * rect.width();
        painter.line_segment(
            [
                egui::pos2(playhead_x, rect.top()),
                egui::pos2(playhead_x, rect.bottom()),
            ],
            Stroke::new(2.0, ACCENT),
        );

        // Scrub while dragging, commit the seek on release or click
        let pointer_fraction = response
            .interact_pointer_pos()
            .map(|pos| ((pos.x - rect.left()) / rect.width()).clamp(0.0, 1.0));
        if response.dragged() {
            self.scrub_fraction = pointer_fraction;
        }
        if response.clicked() || response.drag_stopped() {
            if let Some(target) = pointer_fraction.or(self.scrub_fraction) {
                guide.seek_to(target as f64 * duration);
            }
            self.scrub_fraction = None;
        }

        ui.horizontal(|ui| {
            let shown = match self.scrub_fraction {
                Some(f) => f as f64 * duration,
                None => guide.current_time(),
            };
            ui.monospace(format_time(shown));
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.monospace(format_time(duration));
            });
        });
    }

    fn controls<O: AudioOutput>(&self, ui: &mut egui::Ui, guide: &mut AudioGuide<O>, step: f64) {
        ui.horizontal(|ui| {
            let step_label = format!("{}s", step.round() as i64);
            if ui
                .button(format!("⏪ {}", step_label))
                .on_hover_text(format!("Rewind {}", step_label))
                .clicked()
            {
                guide.seek(-step);
            }

            let play_text = if guide.is_playing() { "⏸" } else { "▶" };
            if ui.add(egui::Button::new(play_text).min_size(egui::vec2(48.0, 32.0))).clicked() {
                guide.toggle_play();
            }

            if ui
                .button(format!("{} ⏩", step_label))
                .on_hover_text(format!("Forward {}", step_label))
                .clicked()
            {
                guide.seek(step);
            }
        });
    }

    fn voice_selector<O: AudioOutput>(
        &self,
        ui: &mut egui::Ui,
        guide: &mut AudioGuide<O>,
        settings: &mut AppSettings,
        before_generation: bool,
    ) -> bool {
        let mut changed = false;
        ui.horizontal_wrapped(|ui| {
            ui.label("Voice:");
            for voice in VoicePreset::all() {
                let selected = settings.voice == *voice;
                let text = if before_generation {
                    format!("{} Voice", voice.label())
                } else {
                    voice.label().to_string()
                };
                if ui.selectable_label(selected, text).clicked() && !selected {
                    settings.voice = *voice;
                    guide.select_voice(*voice);
                    changed = true;
                }
            }
        });
        changed
    }

    fn speed_selector<O: AudioOutput>(
        &self,
        ui: &mut egui::Ui,
        guide: &mut AudioGuide<O>,
        settings: &mut AppSettings,
    ) -> bool {
        let mut changed = false;
        ui.horizontal_wrapped(|ui| {
            ui.label("Speed:");
            for speed in SPEED_PRESETS {
                let selected = (guide.rate() - speed).abs() < f32::EPSILON;
                if ui.selectable_label(selected, format!("{}x", speed)).clicked() && !selected {
                    guide.set_rate(*speed);
                    settings.playback_rate = *speed;
                    changed = true;
                }
            }
        });
        changed
    }
}
