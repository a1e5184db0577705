//! Rule-based DiClass assistant.
//!
//! An utterance is folded (lower case, accents stripped), classified by a
//! fixed sequence of stages and answered by the first stage that matches.
//! Nothing here touches storage; callers persist the exchange.

mod classify;
pub mod expr;
pub mod knowledge;
pub mod solver;

use chrono::{Datelike, Local, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use classify::classify;
pub use knowledge::KnowledgeBase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Role::Student),
            "teacher" => Some(Role::Teacher),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Intent {
    MathExpression,
    LinearEquation,
    SquareRoot,
    Percentage,
    TimeQuery,
    DateQuery,
    AcademicTopic,
    GeneralKnowledge,
    Conversational,
    PlatformHelp,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub intent: Intent,
    pub text: String,
}

/// Lower-case, strip accents from vowels, drop `¿`/`¡` and collapse
/// whitespace. `ñ` is kept.
pub fn fold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars().flat_map(char::to_lowercase) {
        let mapped = match ch {
            'á' | 'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            '¿' | '¡' => continue,
            c if c.is_whitespace() => ' ',
            c => c,
        };
        if mapped == ' ' && (out.is_empty() || out.ends_with(' ')) {
            continue;
        }
        out.push(mapped);
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Answers utterances against a loaded knowledge base.
pub struct Assistant<'a> {
    kb: &'a KnowledgeBase,
}

impl<'a> Assistant<'a> {
    pub fn new(kb: &'a KnowledgeBase) -> Self {
        Self { kb }
    }

    /// Assistant text for `utterance`, using the local clock for time and
    /// date questions. Never empty.
    pub fn respond(&self, utterance: &str, role: Role) -> String {
        self.respond_at(utterance, role, Local::now().naive_local())
            .text
    }

    /// The stage that answers `utterance`.
    pub fn intent(&self, utterance: &str) -> Intent {
        classify(&fold(utterance), self.kb)
    }

    pub fn respond_at(&self, utterance: &str, role: Role, now: NaiveDateTime) -> Reply {
        let folded = fold(utterance);
        let intent = classify(&folded, self.kb);
        debug!(?intent, role = role.as_str(), len = utterance.len(), "intent selected");

        let text = match intent {
            Intent::LinearEquation => solver::solve_linear(&folded),
            Intent::SquareRoot => solver::square_root(&folded),
            Intent::Percentage => solver::percentage(&folded),
            Intent::MathExpression => solver::arithmetic(&folded),
            Intent::TimeQuery => time_answer(now),
            Intent::DateQuery => date_answer(now),
            Intent::AcademicTopic => self.table_answer(&self.kb.academic, &folded, role),
            Intent::GeneralKnowledge => self.table_answer(&self.kb.general, &folded, role),
            Intent::Conversational => self.table_answer(&self.kb.conversational, &folded, role),
            Intent::PlatformHelp => self.table_answer(&self.kb.platform, &folded, role),
            Intent::Fallback => self.kb.fallback(role).to_string(),
        };

        if text.trim().is_empty() {
            return Reply {
                intent,
                text: self.kb.fallback(role).to_string(),
            };
        }
        Reply { intent, text }
    }

    fn table_answer(
        &self,
        table: &knowledge::KnowledgeTable,
        folded: &str,
        role: Role,
    ) -> String {
        match table.lookup(folded) {
            Some(entry) => {
                debug!(table = table.name(), keyword = %entry.keyword, "keyword matched");
                entry.answer.for_role(role).to_string()
            }
            None => self.kb.fallback(role).to_string(),
        }
    }
}

fn time_answer(now: NaiveDateTime) -> String {
    let (hour, minute) = (now.hour(), now.minute());
    if hour == 1 {
        format!("Es la {hour}:{minute:02}.")
    } else {
        format!("Son las {hour}:{minute:02}.")
    }
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "lunes",
        Weekday::Tue => "martes",
        Weekday::Wed => "miércoles",
        Weekday::Thu => "jueves",
        Weekday::Fri => "viernes",
        Weekday::Sat => "sábado",
        Weekday::Sun => "domingo",
    }
}

const MONTHS: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

fn date_answer(now: NaiveDateTime) -> String {
    let month = MONTHS[now.month0() as usize];
    format!(
        "Hoy es {}, {} de {} de {}.",
        weekday_name(now.weekday()),
        now.day(),
        month,
        now.year()
    )
}

/// Example prompts shown next to the chat box.
pub fn suggestions(role: Role) -> &'static [&'static str] {
    match role {
        Role::Student => &[
            "¿Cómo entrego una tarea?",
            "Resuelve 3x + 5 = 20",
            "¿Qué es la fotosíntesis?",
            "¿Cuál es la capital de Francia?",
            "¿Dónde veo mi calificación?",
        ],
        Role::Teacher => &[
            "¿Cómo creo una tarea?",
            "¿Cómo pongo una calificación?",
            "¿Cuánto es el 15% de 200?",
            "¿Cómo creo una clase?",
            "¿Qué día es hoy?",
        ],
    }
}
