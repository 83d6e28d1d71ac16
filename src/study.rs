//! Study material: summary sheet, flashcards and multiple-choice quiz
//!
//! The types mirror the JSON the generation service returns. The small state
//! machines here back the flashcard and quiz views.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// A question/answer pair for active recall
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub question: String,
    pub answer: String,
}

/// Answer letter of a quiz option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionKey {
    A,
    B,
    C,
    D,
}

impl OptionKey {
    pub const ALL: [OptionKey; 4] = [Self::A, Self::B, Self::C, Self::D];

    pub fn letter(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }

    /// Parse a letter as returned by the model ("b", " C ", ...)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOptions {
    #[serde(rename = "A")]
    pub a: String,
    #[serde(rename = "B")]
    pub b: String,
    #[serde(rename = "C")]
    pub c: String,
    #[serde(rename = "D")]
    pub d: String,
}

impl QuizOptions {
    pub fn get(&self, key: OptionKey) -> &str {
        match key {
            OptionKey::A => &self.a,
            OptionKey::B => &self.b,
            OptionKey::C => &self.c,
            OptionKey::D => &self.d,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: QuizOptions,
    pub correct_answer: String,
    pub explanation: String,
}

impl QuizQuestion {
    pub fn correct_key(&self) -> Option<OptionKey> {
        OptionKey::parse(&self.correct_answer)
    }
}

/// Everything generated for one study session
#[derive(Debug, Clone, Default)]
pub struct StudyData {
    pub summary: Option<Vec<String>>,
    pub flashcards: Option<Vec<Flashcard>>,
    pub quiz: Option<Vec<QuizQuestion>>,
}

/// Render the summary as a numbered plain-text sheet
pub fn summary_sheet(items: &[String]) -> String {
    let mut sheet = String::from("Study Summary\n=============\n\n");
    for (i, item) in items.iter().enumerate() {
        let _ = writeln!(sheet, "{}. {}", i + 1, item.trim());
    }
    sheet
}

/// Flip state for a grid of flashcards
#[derive(Debug, Clone, Default)]
pub struct FlashcardDeck {
    flipped: Vec<bool>,
}

impl FlashcardDeck {
    pub fn new(len: usize) -> Self {
        Self {
            flipped: vec![false; len],
        }
    }

    pub fn flip(&mut self, index: usize) {
        if let Some(f) = self.flipped.get_mut(index) {
            *f = !*f;
        }
    }

    pub fn is_flipped(&self, index: usize) -> bool {
        self.flipped.get(index).copied().unwrap_or(false)
    }
}

/// Progress through a quiz: select, submit, next
#[derive(Debug, Clone, Default)]
pub struct QuizSession {
    current: usize,
    selected: Option<OptionKey>,
    submitted: bool,
    score: usize,
    finished: bool,
}

impl QuizSession {
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn selected(&self) -> Option<OptionKey> {
        self.selected
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    pub fn score(&self) -> usize {
        self.score
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Choose an option. Ignored once the answer is submitted.
    pub fn select(&mut self, key: OptionKey) {
        if !self.submitted {
            self.selected = Some(key);
        }
    }

    /// Lock in the selection and score it. Returns whether it was correct.
    pub fn submit(&mut self, questions: &[QuizQuestion]) -> Option<bool> {
        if self.submitted || self.finished {
            return None;
        }
        let selected = self.selected?;
        let question = questions.get(self.current)?;

        self.submitted = true;
        let correct = question.correct_key() == Some(selected);
        if correct {
            self.score += 1;
        }
        Some(correct)
    }

    /// Advance to the next question, or finish after the last one
    pub fn next(&mut self, total: usize) {
        if !self.submitted {
            return;
        }
        if self.current + 1 < total {
            self.current += 1;
            self.selected = None;
            self.submitted = false;
        } else {
            self.finished = true;
        }
    }

    pub fn restart(&mut self) {
        *self = Self::default();
    }
}
