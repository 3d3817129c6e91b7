// src/normalize.rs - Spanish-aware name normalization and audience
// classification.
//
// Everything here is a pure function of its input: normalization must be
// idempotent so re-running the backfill over already-normalized records is a
// no-op.

use deunicode::deunicode_char;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::models::core::Audience;

/// Spanish prepositions and articles that stay lowercase mid-name. The same
/// set marks non-significant words when extracting blocking initials.
pub const SPANISH_CONNECTOR_WORDS: [&str; 27] = [
    "de", "del", "la", "las", "el", "los", "y", "e", "o", "u", "da", "do", "dos", "das", "al", "a",
    "en", "con", "por", "para", "sin", "sobre", "bajo", "entre", "desde", "hasta", "hacia",
];

/// Role/title words that mark a registrant as staff. Matched as substrings of
/// the lowercased career text, so feminine forms also cover their stems.
const STAFF_KEYWORDS: [&str; 28] = [
    "profesor",
    "profesora",
    "docente",
    "académico",
    "académica",
    "funcionario",
    "funcionaria",
    "administrativo",
    "administrativa",
    "secretario",
    "secretaria",
    "director",
    "directora",
    "coordinador",
    "coordinadora",
    "jefe",
    "jefa",
    "asistente",
    "técnico",
    "técnica",
    "empleado",
    "empleada",
    "trabajador",
    "trabajadora",
    "staff",
    "colaborador",
    "colaboradora",
    "personal",
];

static NON_WORD_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w]").unwrap());

pub fn is_connector_word(word: &str) -> bool {
    SPANISH_CONNECTOR_WORDS.contains(&word)
}

/// Strips diacritics via NFD decomposition, discarding combining marks.
/// Characters the decomposition leaves outside ASCII fall back to a
/// transliteration table.
pub fn remove_diacritics(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let decomposed: String = text.nfd().filter(|c| !is_combining_mark(*c)).collect();
    if decomposed.is_ascii() {
        return decomposed;
    }

    decomposed
        .chars()
        .map(|c| {
            if c.is_ascii() {
                c.to_string()
            } else {
                deunicode_char(c).unwrap_or("").to_string()
            }
        })
        .collect()
}

/// Capitalizes the first letter of each word, keeping the connector words
/// lowercase unless they open the string.
pub fn spanish_title_case(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let lowered = text.to_lowercase();
    let mut result: Vec<String> = Vec::new();

    for (i, word) in lowered.split_whitespace().enumerate() {
        // Punctuation-stripped form decides whether this is a connector word.
        let clean_word = NON_WORD_CHARS.replace_all(word, "");
        if i > 0 && is_connector_word(&clean_word) {
            result.push(word.to_string());
        } else {
            result.push(capitalize(word));
        }
    }

    result.join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Canonical normalization applied at ingestion and by the backfill:
/// whitespace collapse, diacritic removal, Spanish title case.
pub fn normalize_full_name(raw_name: &str) -> String {
    let cleaned = raw_name.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return String::new();
    }
    spanish_title_case(&remove_diacritics(&cleaned))
}

/// Careers only need whitespace hygiene; diacritics are kept because the
/// career text is compared case-insensitively, not fuzzily.
pub fn normalize_career(raw_career: &str) -> String {
    raw_career.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keyword-driven classification of a registrant's segment. Staff keywords
/// take precedence; anything ambiguous or empty defaults to `Student`, which
/// is the documented policy since most registrants are students.
pub fn classify_audience(career: &str, raw_career: &str) -> Audience {
    let full_text = format!("{} {}", career.to_lowercase(), raw_career.to_lowercase());

    for keyword in STAFF_KEYWORDS {
        if full_text.contains(keyword) {
            return Audience::Staff;
        }
    }

    Audience::Student
}

/// The unit of similarity comparison: normalized name and career joined with
/// a separator, snapshotted onto candidates so reviewers see exactly what was
/// compared.
pub fn comparison_context(normalized_name: &str, career: &str) -> String {
    format!("{} | {}", normalized_name, career.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_diacritics() {
        assert_eq!(remove_diacritics("José María Núñez"), "Jose Maria Nunez");
        assert_eq!(remove_diacritics("Ingeniería"), "Ingenieria");
        assert_eq!(remove_diacritics(""), "");
        assert_eq!(remove_diacritics("sin acentos"), "sin acentos");
    }

    #[test]
    fn test_spanish_title_case_keeps_connectors_lowercase() {
        assert_eq!(spanish_title_case("juan de la cruz"), "Juan de la Cruz");
        assert_eq!(spanish_title_case("maria DEL CARMEN"), "Maria del Carmen");
        // A connector word opening the string is still capitalized.
        assert_eq!(spanish_title_case("de la fuente pedro"), "De la Fuente Pedro");
    }

    #[test]
    fn test_normalize_full_name() {
        assert_eq!(normalize_full_name("José María Núñez"), "Jose Maria Nunez");
        assert_eq!(normalize_full_name("  maria   perez   soto "), "Maria Perez Soto");
        assert_eq!(normalize_full_name(""), "");
        assert_eq!(normalize_full_name("   "), "");
    }

    #[test]
    fn test_normalize_full_name_is_idempotent() {
        for raw in [
            "José María Núñez",
            "juan de la cruz",
            "MARIA PEREZ SOTO",
            "  Ñandú   del  Sur ",
        ] {
            let once = normalize_full_name(raw);
            assert_eq!(normalize_full_name(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_classify_audience_defaults_to_student() {
        assert_eq!(classify_audience("", ""), Audience::Student);
        assert_eq!(classify_audience("Ingeniería Civil", ""), Audience::Student);
    }

    #[test]
    fn test_classify_audience_staff_keyword_wins() {
        // Staff keyword in either field wins even with student-looking text.
        assert_eq!(
            classify_audience("Ingeniería", "Profesor de Ingeniería"),
            Audience::Staff
        );
        assert_eq!(classify_audience("Coordinadora Académica", ""), Audience::Staff);
        assert_eq!(classify_audience("", "staff"), Audience::Staff);
    }

    #[test]
    fn test_comparison_context() {
        assert_eq!(
            comparison_context("Maria Perez Soto", " Ingenieria Civil "),
            "Maria Perez Soto | Ingenieria Civil"
        );
        assert_eq!(comparison_context("Juan Soto", ""), "Juan Soto | ");
    }
}
