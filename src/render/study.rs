//! Summary, flashcard and quiz views

use std::path::Path;

use eframe::egui::{self, Color32, RichText, Sense, Stroke};

use crate::study::{summary_sheet, Flashcard, FlashcardDeck, OptionKey, QuizQuestion, QuizSession};

const ACCENT: Color32 = Color32::from_rgb(79, 70, 229);
const CORRECT: Color32 = Color32::from_rgb(22, 163, 74);
const WRONG: Color32 = Color32::from_rgb(220, 38, 38);

const CARD_SIZE: egui::Vec2 = egui::vec2(260.0, 150.0);

/// Write the summary sheet to `path`
pub fn export_summary(items: &[String], path: &Path) -> std::io::Result<()> {
    std::fs::write(path, summary_sheet(items))?;
    log::info!("Exported summary to {}", path.display());
    Ok(())
}

/// Numbered key points with an export button.
/// Returns a message describing the export outcome, if one was attempted.
pub fn summary_view(ui: &mut egui::Ui, items: &[String]) -> Option<String> {
    let mut message = None;

    ui.horizontal(|ui| {
        ui.heading("Key Summary Points");
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui.button("💾 Export").clicked() {
                if let Some(path) = rfd::FileDialog::new()
                    .add_filter("Text", &["txt"])
                    .set_file_name("study-summary.txt")
                    .save_file()
                {
                    message = Some(match export_summary(items, &path) {
                        Ok(()) => format!("Summary saved to {}", path.display()),
                        Err(e) => {
                            log::error!("Failed to export summary: {}", e);
                            format!("Could not save the summary: {}", e)
                        }
                    });
                }
            }
        });
    });
    ui.separator();

    egui::ScrollArea::vertical().show(ui, |ui| {
        for (i, item) in items.iter().enumerate() {
            ui.horizontal_wrapped(|ui| {
                ui.label(RichText::new(format!("{}.", i + 1)).strong().color(ACCENT));
                ui.label(item);
            });
            ui.add_space(6.0);
        }
    });

    message
}

/// Grid of cards; clicking a card flips it between question and answer
pub fn flashcards_view(ui: &mut egui::Ui, cards: &[Flashcard], deck: &mut FlashcardDeck) {
    ui.heading("Active Recall Cards");
    ui.label(format!("{} cards. Click a card to reveal the answer.", cards.len()));
    ui.separator();

    egui::ScrollArea::vertical().show(ui, |ui| {
        ui.horizontal_wrapped(|ui| {
            for (i, card) in cards.iter().enumerate() {
                let flipped = deck.is_flipped(i);
                let (rect, response) = ui.allocate_exact_size(CARD_SIZE, Sense::click());
                let painter = ui.painter_at(rect);

                let (fill, tag, text) = if flipped {
                    (Color32::from_rgb(238, 242, 255), "ANSWER", &card.answer)
                } else {
                    (Color32::from_gray(250), "QUESTION", &card.question)
                };
                let stroke = if response.hovered() {
                    Stroke::new(2.0, ACCENT)
                } else {
                    Stroke::new(1.0, Color32::from_gray(210))
                };
                painter.rect(rect, 8.0, fill, stroke);

                let inner = rect.shrink(12.0);
                painter.text(
                    inner.left_top(),
                    egui::Align2::LEFT_TOP,
                    tag,
                    egui::FontId::proportional(10.0),
                    ACCENT,
                );
                let galley = painter.layout(
                    text.clone(),
                    egui::FontId::proportional(14.0),
                    Color32::from_gray(40),
                    inner.width(),
                );
                painter.galley(inner.left_top() + egui::vec2(0.0, 18.0), galley, Color32::from_gray(40));

                if response.clicked() {
                    deck.flip(i);
                }
            }
        });
    });
}

/// One question at a time with submit, explanation, next and a results screen
pub fn quiz_view(ui: &mut egui::Ui, questions: &[QuizQuestion], session: &mut QuizSession) {
    if questions.is_empty() {
        ui.label("No questions were generated for this material.");
        return;
    }

    if session.is_finished() {
        ui.vertical_centered(|ui| {
            ui.heading("Quiz Complete!");
            ui.add_space(8.0);
            ui.label(
                RichText::new(format!("{} / {}", session.score(), questions.len()))
                    .size(32.0)
                    .strong()
                    .color(ACCENT),
            );
            ui.add_space(8.0);
            if ui.button("↺ Retake Quiz").clicked() {
                session.restart();
            }
        });
        return;
    }

    let Some(question) = questions.get(session.current()) else {
        session.restart();
        return;
    };

    ui.horizontal(|ui| {
        ui.label(format!(
            "Question {} of {}",
            session.current() + 1,
            questions.len()
        ));
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            ui.label(format!("Score: {}", session.score()));
        });
    });
    ui.add(egui::ProgressBar::new(
        session.current() as f32 / questions.len() as f32,
    ));
    ui.add_space(8.0);
    ui.heading(&question.question);
    ui.add_space(8.0);

    let correct = question.correct_key();
    for key in OptionKey::ALL {
        let text = format!("{}. {}", key.letter(), question.options.get(key));
        let label = if session.is_submitted() && Some(key) == correct {
            RichText::new(text).color(CORRECT).strong()
        } else if session.is_submitted() && Some(key) == session.selected() {
            RichText::new(text).color(WRONG)
        } else {
            RichText::new(text)
        };

        let button = egui::Button::new(label)
            .selected(session.selected() == Some(key))
            .min_size(egui::vec2(ui.available_width(), 32.0));
        if ui.add_enabled(!session.is_submitted(), button).clicked() {
            session.select(key);
        }
    }

    ui.add_space(8.0);
    if session.is_submitted() {
        let verdict = if session.selected() == correct {
            RichText::new("Correct!").color(CORRECT).strong()
        } else {
            RichText::new("Not quite.").color(WRONG).strong()
        };
        ui.label(verdict);
        ui.label(&question.explanation);
        ui.add_space(8.0);

        let last = session.current() + 1 == questions.len();
        if ui.button(if last { "See Results" } else { "Next Question" }).clicked() {
            session.next(questions.len());
        }
    } else if ui
        .add_enabled(session.selected().is_some(), egui::Button::new("Submit Answer"))
        .clicked()
    {
        session.submit(questions);
    }
}
