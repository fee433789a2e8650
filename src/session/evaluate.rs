//! Answer checking for typed words and assembled sentences.

use icu_normalizer::DecomposingNormalizerBorrowed;

/// Letters with an ASCII spelling learners are allowed to type instead.
const TRANSLITERATIONS: &[(char, &str)] = &[('ä', "ae"), ('ö', "oe"), ('ü', "ue"), ('ß', "ss")];

/// Stripped from sentence tokens before comparing.
const PUNCTUATION: &[char] = &[
    '.', ',', '!', '?', ';', ':', '"', '\'', '«', '»', '„', '“', '”', '(', ')',
];

/// Canonical form of a typed answer: trimmed, lowercased, umlauts spelled
/// out, remaining accents dropped, runs of whitespace collapsed.
pub fn normalize_written(text: &str) -> String {
    let lowered = text.trim().to_lowercase();

    let mut spelled = String::with_capacity(lowered.len());
    for ch in lowered.chars() {
        match TRANSLITERATIONS.iter().find(|(from, _)| *from == ch) {
            Some((_, to)) => spelled.push_str(to),
            None => spelled.push(ch),
        }
    }

    let nfd = DecomposingNormalizerBorrowed::new_nfd();
    let decomposed = nfd.normalize(&spelled);
    let stripped: String = decomposed
        .chars()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_combining_mark(ch: char) -> bool {
    matches!(ch, '\u{0300}'..='\u{036F}')
}

pub fn check_written(answer: &str, expected: &str) -> bool {
    let answer = normalize_written(answer);
    !answer.is_empty() && answer == normalize_written(expected)
}

/// Tiles shown to the user, in sentence order (callers shuffle).
pub fn tiles(sentence: &str) -> Vec<String> {
    sentence.split_whitespace().map(str::to_string).collect()
}

/// Tokens compared when checking a sentence: lowercased, punctuation removed,
/// tokens left empty by that dropped.
pub fn sentence_tokens<S: AsRef<str>>(tokens: &[S]) -> Vec<String> {
    tokens
        .iter()
        .flat_map(|t| t.as_ref().split_whitespace())
        .map(|t| {
            t.to_lowercase()
                .chars()
                .filter(|c| !PUNCTUATION.contains(c))
                .collect::<String>()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

pub fn check_sentence<S: AsRef<str>>(answer: &[S], reference: &str) -> bool {
    let expected = sentence_tokens(&[reference]);
    !expected.is_empty() && sentence_tokens(answer) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_ignores_case_and_whitespace() {
        assert!(check_written("  das   haus ", "Das Haus"));
        assert!(!check_written("das Maus", "das Haus"));
    }

    #[test]
    fn test_umlauts_accept_letter_pairs() {
        assert_eq!(normalize_written("Mädchen"), "maedchen");
        assert!(check_written("maedchen", "Mädchen"));
        assert!(check_written("MÄDCHEN", "Mädchen"));
        assert!(check_written("die Strasse", "die Straße"));
        assert!(check_written("Tuer", "Tür"));
        assert!(!check_written("Tur", "Tür"));
    }

    #[test]
    fn test_other_accents_are_dropped() {
        assert_eq!(normalize_written("Café"), "cafe");
        assert!(check_written("resume", "résumé"));
    }

    #[test]
    fn test_empty_answer_never_matches() {
        assert!(!check_written("   ", ""));
    }

    #[test]
    fn test_sentence_tokens_strip_punctuation() {
        assert_eq!(
            sentence_tokens(&["Mach", "bitte", "die", "Tür", "zu!"]),
            vec!["mach", "bitte", "die", "tür", "zu"]
        );
        assert_eq!(sentence_tokens(&["„Hallo“", "-", "("]), vec!["hallo", "-"]);
    }

    #[test]
    fn test_check_sentence_requires_order() {
        let reference = "Das Haus ist alt.";
        assert!(check_sentence(&["das", "Haus", "ist", "alt."], reference));
        assert!(check_sentence(&["Das", "Haus", "ist", "alt"], reference));
        assert!(!check_sentence(&["Haus", "das", "ist", "alt."], reference));
        assert!(!check_sentence(&["Das", "Haus", "ist"], reference));
    }

    #[test]
    fn test_tiles_keep_punctuation() {
        assert_eq!(tiles("Das Haus ist alt."), vec!["Das", "Haus", "ist", "alt."]);
    }
}
