//! Math answers: linear equations, square roots, percentages and plain
//! arithmetic. Every function returns text; failures become messages.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::expr::{self, MAX_INPUT_LEN};

pub const MATH_APOLOGY: &str = "Lo siento, no pude resolver ese problema matemático. ¿Podrías escribirlo de otra forma? Por ejemplo: \"2 + 2\", \"3x + 5 = 20\" o \"raíz cuadrada de 16\".";
pub const EQ_NO_COEFFICIENT: &str =
    "No pude identificar el coeficiente de x. Escribe la ecuación como \"3x + 5 = 20\".";
pub const EQ_NO_CONSTANT: &str =
    "No pude identificar el término independiente. Escribe la ecuación como \"3x + 5 = 20\".";
pub const EQ_UNREADABLE: &str =
    "No pude entender la ecuación. Asegúrate de que tenga la forma \"ax + b = c\".";
pub const EQ_ZERO_COEFFICIENT: &str =
    "El coeficiente de x no puede ser cero: la ecuación no tiene una única solución.";
pub const NUMBER_MISSING: &str =
    "No pude identificar el número. Escribe, por ejemplo, \"raíz cuadrada de 16\" o \"20% de 150\".";

const NUM: &str = r"\d+(?:\.\d+)?";

static GREETING_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:hola|oye|buenos dias|buenas tardes|buenas noches)\b\s*[,!.]?\s*")
        .expect("greeting prefix regex")
});

static COMMAND_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:por favor|me puedes decir|puedes decirme|dime)\s*,?\s*)?(?:cual es el resultado de|el resultado de|cuanto es|cuanto da|calcular|calcula|resuelve|resolver)\s*:?\s*",
    )
    .expect("command prefix regex")
});

static DECIMAL_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d),(\d)").expect("decimal comma regex"));

static EQ_COEFFICIENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?\d*(?:\.\d+)?)x").expect("coefficient regex"));

static EQ_CONSTANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([+-]?)(\d+(?:\.\d+)?)\+?$").expect("constant regex"));

static SQRT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"raiz cuadrada de\s*(-?\s*{NUM})?")).expect("sqrt regex")
});

static PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"({NUM})?\s*%\s*de\s*({NUM})?")).expect("percent regex")
});

static TIMES_SIGN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\d)])\s*[x×]\s*([\d(])").expect("times regex"));

/// Word operators in replacement order: longer phrases first.
static WORD_OPERATORS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\bmultiplicado por\b", " * "),
        (r"\bdividido (?:por|entre)\b", " / "),
        (r"\belevado a(?:\s+la)?\b", " ^ "),
        (r"\bal cuadrado\b", " ^ 2 "),
        (r"\bal cubo\b", " ^ 3 "),
        (r"\bpor\b", " * "),
        (r"\bentre\b", " / "),
        (r"\bmas\b", " + "),
        (r"\bmenos\b", " - "),
    ]
    .into_iter()
    .map(|(pat, rep)| (Regex::new(pat).expect("operator regex"), rep))
    .collect()
});

/// Shortest round-trip rendering: `5.0` prints as `5`.
pub fn format_number(v: f64) -> String {
    if v == 0.0 {
        // Avoid "-0".
        return "0".to_string();
    }
    format!("{v}")
}

fn strip_command(folded: &str) -> String {
    let s = GREETING_PREFIX.replace(folded.trim(), "");
    let s = COMMAND_PREFIX.replace(s.trim_start(), "");
    s.trim()
        .trim_end_matches(['?', '.', '!'])
        .trim()
        .to_string()
}

/// Drop words in front of the equation ("la ecuacion 3x + 5 = 20").
fn skip_leading_words(text: &str) -> String {
    text.split_whitespace()
        .skip_while(|tok| {
            *tok != "x" && tok.chars().all(|c| c.is_alphabetic() || matches!(c, ':' | ','))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_num(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Solve `ax + b = c` / `ax - b = c` and explain it in four steps.
pub fn solve_linear(folded: &str) -> String {
    let body = skip_leading_words(&strip_command(folded));
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();

    let sides: Vec<&str> = compact.split('=').collect();
    if sides.len() != 2 || sides[0].is_empty() || sides[1].is_empty() {
        return EQ_UNREADABLE.to_string();
    }
    let (left, right) = (sides[0], sides[1]);

    let Some(coef_match) = EQ_COEFFICIENT.captures(left) else {
        return EQ_NO_COEFFICIENT.to_string();
    };
    let coef_text = coef_match.get(1).map(|m| m.as_str()).unwrap_or("");
    let coefficient = match coef_text {
        "" | "+" => 1.0,
        "-" => -1.0,
        t => match parse_num(t) {
            Some(v) => v,
            None => return EQ_NO_COEFFICIENT.to_string(),
        },
    };
    let x_term = coef_match.get(0).map(|m| m.range()).unwrap_or(0..0);
    let rest = format!("{}{}", &left[..x_term.start], &left[x_term.end..]);

    let Some(const_match) = EQ_CONSTANT.captures(&rest) else {
        return EQ_NO_CONSTANT.to_string();
    };
    let sign = match const_match.get(1).map(|m| m.as_str()) {
        Some("-") => "-",
        _ => "+",
    };
    let Some(constant) = const_match.get(2).and_then(|m| parse_num(m.as_str())) else {
        return EQ_NO_CONSTANT.to_string();
    };
    let Some(rhs) = parse_num(right) else {
        return EQ_UNREADABLE.to_string();
    };
    if coefficient == 0.0 {
        return EQ_ZERO_COEFFICIENT.to_string();
    }

    let a = format_number(coefficient);
    let b = format_number(constant);
    let c = format_number(rhs);
    let (moved, step3) = if sign == "+" {
        let m = rhs - constant;
        (m, format!("Restamos {b} en ambos lados: {a}x = {c} - {b} = {}", format_number(m)))
    } else {
        let m = rhs + constant;
        (m, format!("Sumamos {b} en ambos lados: {a}x = {c} + {b} = {}", format_number(m)))
    };
    let x = moved / coefficient;
    debug!(coefficient, constant, rhs, "solved linear equation");

    format!(
        "Para resolver la ecuación {a}x {sign} {b} = {c}:\n\
         1. Identificamos el coeficiente de x: {a}\n\
         2. Identificamos el término independiente: {sign}{b}\n\
         3. {step3}\n\
         4. Dividimos ambos lados entre {a}: x = {} / {a}\n\
         Por lo tanto, x = {}",
        format_number(moved),
        format_number(x),
    )
}

pub fn square_root(folded: &str) -> String {
    let Some(n) = SQRT
        .captures(folded)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_num(m.as_str()))
    else {
        return NUMBER_MISSING.to_string();
    };
    if n < 0.0 {
        return format!(
            "La raíz cuadrada de {} no es un número real: los números negativos no tienen raíz cuadrada real.",
            format_number(n)
        );
    }
    format!(
        "La raíz cuadrada de {} es {}",
        format_number(n),
        format_number(n.sqrt())
    )
}

pub fn percentage(folded: &str) -> String {
    let caps = PERCENT.captures(folded);
    let pct = caps
        .as_ref()
        .and_then(|c| c.get(1))
        .and_then(|m| parse_num(m.as_str()));
    let base = caps
        .as_ref()
        .and_then(|c| c.get(2))
        .and_then(|m| parse_num(m.as_str()));
    let (Some(pct), Some(base)) = (pct, base) else {
        return NUMBER_MISSING.to_string();
    };
    let value = (pct / 100.0) * base;
    format!(
        "El {}% de {} es {}",
        format_number(pct),
        format_number(base),
        format_number(value)
    )
}

/// Rewrite a spoken expression (`5 por 3 mas 2`) into operator form.
/// Only a leading greeting and command phrase are dropped; whatever else
/// remains goes to the evaluator as is, which rejects stray words.
pub fn normalize_expression(folded: &str) -> String {
    let mut s = strip_command(folded);
    // "1,5" is one and a half.
    s = DECIMAL_COMMA.replace_all(&s, "$1.$2").into_owned();
    for (re, rep) in WORD_OPERATORS.iter() {
        s = re.replace_all(&s, *rep).into_owned();
    }
    s = s.replace('÷', "/");
    // Adjacent matches share a digit ("2x3x4"), so repeat until stable.
    for _ in 0..MAX_INPUT_LEN {
        let next = TIMES_SIGN.replace_all(&s, "$1 * $2").into_owned();
        if next == s {
            break;
        }
        s = next;
    }
    s.trim_end_matches(['=', '?', ' '])
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn arithmetic(folded: &str) -> String {
    let expression = normalize_expression(folded);
    match expr::evaluate(&expression) {
        Ok(v) => format!("El resultado de {expression} es {}", format_number(v)),
        Err(e) => {
            debug!(error = %e, "arithmetic evaluation rejected");
            MATH_APOLOGY.to_string()
        }
    }
}
