//! studyguide-rs - AI study companion
//!
//! Turns a PDF or pasted text into a summary sheet, flashcards, a quiz and a
//! narrated audio guide with a seekable, variable-speed player.

use eframe::egui;
use std::sync::Arc;
use std::time::Duration;

mod audio;
mod guide;
mod render;
mod service;
mod settings;
mod study;

use audio::{CpalOutput, SeekPolicy};
use guide::AudioGuide;
use render::TransportView;
use service::jobs::{self, Job, JobEvent, Material, MaterialKind};
use service::{GeminiClient, StudyInput, StudyService};
use settings::AppSettings;
use study::{FlashcardDeck, QuizSession, StudyData};

/// How the study material is provided
#[derive(Debug, Clone, Copy, PartialEq, Default)]
enum InputMode {
    #[default]
    File,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tab {
    Summary,
    Flashcards,
    Quiz,
    Audio,
}

impl Tab {
    fn all() -> &'static [Tab] {
        &[Tab::Summary, Tab::Flashcards, Tab::Quiz, Tab::Audio]
    }

    fn label(&self) -> &'static str {
        match self {
            Tab::Summary => "📄 Summary",
            Tab::Flashcards => "🗂 Flashcards",
            Tab::Quiz => "❓ Quiz",
            Tab::Audio => "🎧 Audio Guide",
        }
    }

    fn material(&self) -> Option<MaterialKind> {
        match self {
            Tab::Summary => Some(MaterialKind::Summary),
            Tab::Flashcards => Some(MaterialKind::Flashcards),
            Tab::Quiz => Some(MaterialKind::Quiz),
            Tab::Audio => None,
        }
    }
}

fn main() -> eframe::Result<()> {
    env_logger::init();
    log::info!("Starting studyguide-rs");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1000.0, 720.0])
            .with_title("studyguide-rs"),
        ..Default::default()
    };

    eframe::run_native(
        "studyguide-rs",
        options,
        Box::new(|cc| Ok(Box::new(StudyApp::new(cc)))),
    )
}

struct StudyApp {
    settings: AppSettings,
    service: Result<Arc<dyn StudyService>, String>,
    show_settings: bool,

    // Input screen
    input_mode: InputMode,
    text: String,
    document: Option<StudyInput>,
    input_error: Option<String>,

    // Dashboard; present once "Start Learning" is pressed
    session: Option<StudyInput>,
    tab: Tab,
    data: StudyData,
    deck: FlashcardDeck,
    quiz: QuizSession,
    material_jobs: Vec<(MaterialKind, Job<Material>)>,
    material_error: Option<String>,

    guide: Option<AudioGuide<CpalOutput>>,
    audio_error: Option<String>,
    transport: TransportView,

    notification: Option<String>,
}

impl StudyApp {
    fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let settings = AppSettings::load();
        let service = match GeminiClient::from_env(&settings.api) {
            Ok(client) => Ok(Arc::new(client) as Arc<dyn StudyService>),
            Err(e) => {
                log::error!("Generation service unavailable: {}", e);
                Err(e.to_string())
            }
        };

        Self {
            settings,
            service,
            show_settings: false,
            input_mode: InputMode::default(),
            text: String::new(),
            document: None,
            input_error: None,
            session: None,
            tab: Tab::Summary,
            data: StudyData::default(),
            deck: FlashcardDeck::default(),
            quiz: QuizSession::default(),
            material_jobs: Vec::new(),
            material_error: None,
            guide: None,
            audio_error: None,
            transport: TransportView::default(),
            notification: None,
        }
    }

    fn pending_input(&self) -> Option<StudyInput> {
        let input = match self.input_mode {
            InputMode::File => self.document.clone()?,
            InputMode::Text => StudyInput::Text(self.text.trim().to_string()),
        };
        (!input.is_empty()).then_some(input)
    }

    fn start_learning(&mut self) {
        let Some(input) = self.pending_input() else {
            return;
        };
        log::info!("Starting study session");
        self.session = Some(input);
        self.switch_tab(Tab::Summary);
    }

    /// Drop every piece of session state and return to the input screen
    fn new_session(&mut self) {
        if let Some(mut guide) = self.guide.take() {
            guide.dispose();
        }
        self.material_jobs.clear();
        self.session = None;
        self.data = StudyData::default();
        self.deck = FlashcardDeck::default();
        self.quiz = QuizSession::default();
        self.material_error = None;
        self.audio_error = None;
        self.transport = TransportView::default();
        self.document = None;
        self.text.clear();
        self.input_error = None;
        self.tab = Tab::Summary;
    }

    fn switch_tab(&mut self, tab: Tab) {
        if self.tab == Tab::Audio && tab != Tab::Audio {
            if let Some(guide) = self.guide.as_mut() {
                guide.pause();
            }
        }
        self.tab = tab;
        self.material_error = None;

        match tab.material() {
            Some(kind) => self.ensure_material(kind),
            None => self.ensure_guide(),
        }
    }

    fn has_material(&self, kind: MaterialKind) -> bool {
        match kind {
            MaterialKind::Summary => self.data.summary.is_some(),
            MaterialKind::Flashcards => self.data.flashcards.is_some(),
            MaterialKind::Quiz => self.data.quiz.is_some(),
        }
    }

    fn is_loading(&self, kind: MaterialKind) -> bool {
        self.material_jobs.iter().any(|(k, _)| *k == kind)
    }

    /// Generate material for a tab the first time it is visited
    fn ensure_material(&mut self, kind: MaterialKind) {
        if self.has_material(kind) || self.is_loading(kind) {
            return;
        }
        let (Some(input), Ok(service)) = (self.session.clone(), self.service.as_ref()) else {
            return;
        };
        let job = jobs::generate_material(Arc::clone(service), input, kind);
        self.material_jobs.push((kind, job));
    }

    /// Open the audio device and create the guide on first use
    fn ensure_guide(&mut self) {
        if self.guide.is_some() {
            return;
        }
        let (Some(input), Ok(service)) = (self.session.clone(), self.service.as_ref()) else {
            return;
        };
        match CpalOutput::open() {
            Ok(output) => {
                log::info!("Audio output ready on {}", output.device_name);
                let mut guide = AudioGuide::new(output, Arc::clone(service), input);
                guide.set_seek_policy(self.settings.seek_policy);
                guide.set_rate(self.settings.playback_rate);
                guide.select_voice(self.settings.voice);
                self.guide = Some(guide);
                self.audio_error = None;
            }
            Err(e) => {
                log::error!("Failed to open audio output: {}", e);
                self.audio_error = Some(format!("Audio output unavailable: {}", e));
            }
        }
    }

    fn poll_jobs(&mut self) {
        let mut finished = Vec::new();
        for (kind, job) in self.material_jobs.iter_mut() {
            for event in job.poll() {
                if let JobEvent::Finished(result) = event {
                    finished.push((*kind, result));
                }
            }
        }
        self.material_jobs.retain(|(_, job)| !job.is_done());

        for (kind, result) in finished {
            match result {
                Ok(Material::Summary(items)) => self.data.summary = Some(items),
                Ok(Material::Flashcards(cards)) => {
                    self.deck = FlashcardDeck::new(cards.len());
                    self.data.flashcards = Some(cards);
                }
                Ok(Material::Quiz(questions)) => {
                    self.quiz = QuizSession::default();
                    self.data.quiz = Some(questions);
                }
                Err(e) => {
                    log::warn!("Generating {} failed: {}", kind.name(), e);
                    if self.tab.material() == Some(kind) {
                        self.material_error =
                            Some(format!("Failed to process {}. Please try again.", kind.name()));
                    }
                }
            }
        }

        if let Some(guide) = self.guide.as_mut() {
            guide.poll();
            if let Some(message) = guide.take_notification() {
                self.notification = Some(message);
            }
        }
    }

    fn is_busy(&self) -> bool {
        !self.material_jobs.is_empty()
            || self
                .guide
                .as_ref()
                .is_some_and(|g| g.is_generating() || g.is_playing())
    }

    fn input_screen(&mut self, ui: &mut egui::Ui) {
        ui.vertical_centered(|ui| {
            ui.add_space(24.0);
            ui.heading("Master any subject with AI");
            ui.label("Upload a PDF or paste your notes to generate summaries, flashcards, quizzes and an audio guide.");
            ui.add_space(16.0);

            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.input_mode, InputMode::File, "📂 Upload PDF");
                ui.selectable_value(&mut self.input_mode, InputMode::Text, "✏ Paste Text");
            });
            ui.add_space(8.0);

            match self.input_mode {
                InputMode::File => {
                    if ui.button("Choose PDF...").clicked() {
                        if let Some(path) = rfd::FileDialog::new()
                            .add_filter("PDF", &["pdf"])
                            .pick_file()
                        {
                            match StudyInput::from_pdf(&path) {
                                Ok(input) => {
                                    self.document = Some(input);
                                    self.input_error = None;
                                }
                                Err(e) => {
                                    log::warn!("Rejected {}: {}", path.display(), e);
                                    self.document = None;
                                    self.input_error = Some(e.to_string());
                                }
                            }
                        }
                    }
                    if let Some(StudyInput::Document { name, .. }) = &self.document {
                        ui.label(format!("Selected: {}", name));
                    }
                }
                InputMode::Text => {
                    ui.add(
                        egui::TextEdit::multiline(&mut self.text)
                            .hint_text("Paste your study material here...")
                            .desired_rows(12)
                            .desired_width(f32::INFINITY),
                    );
                }
            }

            if let Some(error) = &self.input_error {
                ui.colored_label(egui::Color32::RED, error);
            }
            if let Err(error) = &self.service {
                ui.colored_label(egui::Color32::RED, error);
            }

            ui.add_space(12.0);
            let ready = self.pending_input().is_some() && self.service.is_ok();
            if ui
                .add_enabled(ready, egui::Button::new("🚀 Start Learning"))
                .clicked()
            {
                self.start_learning();
            }
        });
    }

    fn dashboard(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let mut selected = self.tab;
            for tab in Tab::all() {
                let mut label = tab.label().to_string();
                if tab.material().is_some_and(|k| self.is_loading(k)) {
                    label.push_str(" …");
                }
                ui.selectable_value(&mut selected, *tab, label);
            }
            if selected != self.tab {
                self.switch_tab(selected);
            }
        });
        ui.separator();

        if let Some(error) = &self.material_error {
            ui.colored_label(egui::Color32::RED, error);
            if ui.button("Try again").clicked() {
                self.switch_tab(self.tab);
            }
            return;
        }

        match self.tab {
            Tab::Summary => match &self.data.summary {
                Some(items) => {
                    if let Some(message) = render::summary_view(ui, items) {
                        self.notification = Some(message);
                    }
                }
                None => loading(ui, "Generating summary..."),
            },
            Tab::Flashcards => match &self.data.flashcards {
                Some(cards) => render::flashcards_view(ui, cards, &mut self.deck),
                None => loading(ui, "Generating flashcards..."),
            },
            Tab::Quiz => match &self.data.quiz {
                Some(questions) => render::quiz_view(ui, questions, &mut self.quiz),
                None => loading(ui, "Generating quiz..."),
            },
            Tab::Audio => match self.guide.as_mut() {
                Some(guide) => {
                    if self.transport.show(ui, guide, &mut self.settings) {
                        self.settings.save();
                    }
                }
                None => {
                    if let Some(error) = &self.audio_error {
                        ui.colored_label(egui::Color32::RED, error);
                    }
                    if ui.button("Retry audio device").clicked() {
                        self.ensure_guide();
                    }
                }
            },
        }
    }

    fn settings_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Settings");
        ui.separator();

        let mut changed = false;
        ui.collapsing("Playback", |ui| {
            ui.horizontal(|ui| {
                ui.label("Seeking:");
                egui::ComboBox::from_id_salt("seek_policy")
                    .selected_text(self.settings.seek_policy.name())
                    .show_ui(ui, |ui| {
                        for policy in SeekPolicy::all() {
                            changed |= ui
                                .selectable_value(&mut self.settings.seek_policy, *policy, policy.name())
                                .changed();
                        }
                    });
            });
            ui.horizontal(|ui| {
                ui.label("Skip step:");
                changed |= ui
                    .add(
                        egui::Slider::new(&mut self.settings.seek_step_secs, 5.0..=30.0)
                            .step_by(5.0)
                            .suffix("s"),
                    )
                    .changed();
            });
        });

        ui.collapsing("Service", |ui| {
            ui.label(format!("Text model: {}", self.settings.api.text_model));
            ui.label(format!("Speech model: {}", self.settings.api.speech_model));
            match &self.service {
                Ok(_) => ui.label("API key: found in environment"),
                Err(e) => ui.colored_label(egui::Color32::RED, e),
            };
        });

        if changed {
            if let Some(guide) = self.guide.as_mut() {
                guide.set_seek_policy(self.settings.seek_policy);
            }
            self.settings.save();
        }
    }
}

fn loading(ui: &mut egui::Ui, message: &str) {
    ui.vertical_centered(|ui| {
        ui.add_space(32.0);
        ui.spinner();
        ui.label(message);
    });
}

impl eframe::App for StudyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_jobs();
        if self.is_busy() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }

        // Top panel
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("studyguide-rs");
                ui.separator();

                if let Some(StudyInput::Document { name, .. }) = &self.session {
                    ui.label(name);
                    ui.separator();
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.toggle_value(&mut self.show_settings, "⚙ Settings");
                    if self.session.is_some() && ui.button("↺ New Session").clicked() {
                        self.new_session();
                    }
                });
            });
        });

        if self.show_settings {
            egui::SidePanel::right("settings_panel")
                .min_width(220.0)
                .show(ctx, |ui| self.settings_panel(ui));
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.session.is_some() {
                self.dashboard(ui);
            } else {
                self.input_screen(ui);
            }
        });

        if let Some(message) = self.notification.clone() {
            let mut open = true;
            egui::Window::new("Notice")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
                .open(&mut open)
                .show(ctx, |ui| {
                    ui.label(&message);
                    if ui.button("OK").clicked() {
                        self.notification = None;
                    }
                });
            if !open {
                self.notification = None;
            }
        }
    }
}
