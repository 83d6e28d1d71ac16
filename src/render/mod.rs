//! Render module - egui views for the study dashboard

mod study;
mod transport;

pub use study::{flashcards_view, quiz_view, summary_view};
pub use transport::TransportView;
