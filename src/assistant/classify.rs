use std::sync::LazyLock;

use regex::Regex;

use super::knowledge::KnowledgeBase;
use super::Intent;

/// Any of these marks the utterance as a math problem.
static MATH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // 2 + 3, 4*5, 6 x 7, 8 × 9, 10 ÷ 2, 1.5/3, 2^8
        r"\d\s*[-+*/^x×÷]\s*[\d(]",
        r"[\d)]\s*[-+*/^x×÷]\s*\(",
        // spoken operators between numbers
        r"\d\s*(?:mas|menos|por|entre|dividido (?:por|entre)|multiplicado por|elevado a)\s*\d",
        r"\d\s*al (?:cuadrado|cubo)\b",
        r"raiz cuadrada de",
        r"\d\s*%\s*de\b",
        r"\bresolver\b.*=",
        r"\bresuelve\b",
        r"\bcalcula(?:r)?\b",
        r"\bcuanto (?:es|da)\b",
        // 3x + 5 = 20
        r"-?\d*\s*x\s*[-+]\s*\d+\s*=\s*-?\d",
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("math pattern"))
    .collect()
});

/// A standalone variable `x` (not the `x` inside a word, not `2 x 3`).
static VARIABLE_X: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^a-z])-?\d*(?:\.\d+)?\s*x\s*(?:[-+=]|$)").expect("variable regex")
});
static SQUARE_ROOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"raiz cuadrada de").expect("sqrt regex"));
static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%\s*de\b").expect("percent regex"));
static TIME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bhora\b").expect("time regex"));
static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"dia es hoy|\bfecha\b").expect("date regex"));

fn is_math(folded: &str) -> bool {
    MATH_PATTERNS.iter().any(|re| re.is_match(folded))
}

fn math_intent(folded: &str) -> Intent {
    if folded.contains('=') && VARIABLE_X.is_match(folded) {
        Intent::LinearEquation
    } else if SQUARE_ROOT.is_match(folded) {
        Intent::SquareRoot
    } else if PERCENT.is_match(folded) {
        Intent::Percentage
    } else {
        Intent::MathExpression
    }
}

/// Pick the answering stage for an already folded utterance. Stages are
/// tried in a fixed order and the first match wins.
pub fn classify(folded: &str, kb: &KnowledgeBase) -> Intent {
    if folded.is_empty() {
        return Intent::Fallback;
    }
    if is_math(folded) {
        return math_intent(folded);
    }
    if TIME.is_match(folded) {
        return Intent::TimeQuery;
    }
    if DATE.is_match(folded) {
        return Intent::DateQuery;
    }
    if kb.academic.lookup(folded).is_some() {
        return Intent::AcademicTopic;
    }
    if kb.general.lookup(folded).is_some() {
        return Intent::GeneralKnowledge;
    }
    if kb.conversational.lookup(folded).is_some() {
        return Intent::Conversational;
    }
    if kb.platform.lookup(folded).is_some() {
        return Intent::PlatformHelp;
    }
    Intent::Fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::fold;

    fn intent(text: &str) -> Intent {
        let kb = KnowledgeBase::builtin().expect("builtin knowledge");
        classify(&fold(text), &kb)
    }

    #[test]
    fn math_family() {
        assert_eq!(intent("3x + 5 = 20"), Intent::LinearEquation);
        assert_eq!(intent("Resuelve x - 2 = 7"), Intent::LinearEquation);
        assert_eq!(intent("resolver 2x=8"), Intent::LinearEquation);
        assert_eq!(intent("¿Cuál es la raíz cuadrada de 81?"), Intent::SquareRoot);
        assert_eq!(intent("el 20% de 150"), Intent::Percentage);
        assert_eq!(intent("¿Cuánto es 7 por 8?"), Intent::MathExpression);
        assert_eq!(intent("6 x 7"), Intent::MathExpression);
        assert_eq!(intent("10 ÷ 2"), Intent::MathExpression);
        assert_eq!(intent("2^10"), Intent::MathExpression);
        assert_eq!(intent("(1 + 2) * 3"), Intent::MathExpression);
        assert_eq!(intent("5 al cuadrado"), Intent::MathExpression);
        assert_eq!(intent("calcula mi promedio"), Intent::MathExpression);
    }

    #[test]
    fn time_and_date() {
        assert_eq!(intent("¿Qué hora es?"), Intent::TimeQuery);
        assert_eq!(intent("¿Qué día es hoy?"), Intent::DateQuery);
        assert_eq!(intent("fecha de hoy"), Intent::DateQuery);
        // "ahora" contains "hora" but is not a time question.
        assert_ne!(intent("y ahora que hago"), Intent::TimeQuery);
    }

    #[test]
    fn table_stages_in_order() {
        assert_eq!(intent("Explícame la fotosíntesis"), Intent::AcademicTopic);
        assert_eq!(intent("capital de Japón"), Intent::GeneralKnowledge);
        assert_eq!(intent("Buenos días"), Intent::Conversational);
        assert_eq!(intent("¿cómo veo mi calificación?"), Intent::PlatformHelp);
        assert_eq!(intent("qwerty"), Intent::Fallback);
        assert_eq!(intent(""), Intent::Fallback);
    }

    #[test]
    fn earlier_stage_wins_on_overlap() {
        // math before conversation
        assert_eq!(intent("hola 2 + 2"), Intent::MathExpression);
        // time before conversation
        assert_eq!(intent("hola, qué hora es"), Intent::TimeQuery);
        // academic before platform help
        assert_eq!(intent("tarea sobre la célula"), Intent::AcademicTopic);
        // conversation before platform help
        assert_eq!(intent("gracias por la ayuda con la tarea"), Intent::Conversational);
    }

    #[test]
    fn accents_do_not_matter() {
        assert_eq!(intent("RAIZ CUADRADA DE 9"), intent("raíz cuadrada de 9"));
        assert_eq!(intent("que dia es hoy"), Intent::DateQuery);
        assert_eq!(intent("calificacion"), intent("Calificación"));
    }
}
