//! Standard analytics collections.
//!
//! Typed records for the collections every experience reports, each tagged
//! with the [`ExperienceData`] of the build that produced it. Submit them with
//! [`EventClient::send_standard`](crate::EventClient::send_standard).

use serde::{Deserialize, Serialize};

/// A record with a fixed collection name.
pub trait StandardEvent: Serialize {
    const COLLECTION: &'static str;
}

/// Identifies the build and venue an event came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceData {
    pub version_number: String,
    pub experience_label: String,
    pub location: String,
}

/// One play session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Seconds.
    pub duration: f32,
    pub register_status: String,
    pub abandoned: bool,
    pub experience_data: ExperienceData,
}

/// A finished quiz.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizEvent {
    pub quiz_id: String,
    pub quiz_result: String,
    pub experience_data: ExperienceData,
}

/// An answered quiz question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionEvent {
    pub quiz_id: String,
    pub question_id: String,
    pub question_answer: String,
    pub question_answer_value: f32,
    pub experience_data: ExperienceData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEvent {
    pub action_id: String,
    pub experience_data: ExperienceData,
}

/// Time spent on a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pages {
    pub page_name: String,
    /// Seconds.
    pub duration: f32,
    pub experience_data: ExperienceData,
}

impl StandardEvent for Session {
    const COLLECTION: &'static str = "Session";
}

impl StandardEvent for QuizEvent {
    const COLLECTION: &'static str = "QuizEvent";
}

impl StandardEvent for QuestionEvent {
    const COLLECTION: &'static str = "QuestionEvent";
}

impl StandardEvent for ActionEvent {
    const COLLECTION: &'static str = "ActionEvent";
}

impl StandardEvent for Pages {
    const COLLECTION: &'static str = "Pages";
}
