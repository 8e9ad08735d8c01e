//! Forbidden-Word Filter
//!
//! Matches Unicode-normalized content (diacritics stripped, case-folded)
//! against precomputed base terms plus leet-speak substitution variants.
//! Matching is boundary-aware: terms only match as full tokens, so short
//! terms never fire inside longer words.

use serde::Serialize;

// ============================================================================
// DEFAULT TERM LISTS
// ============================================================================

/// Attack-coordination phrases. A hit is an immediate kick.
const COORDINATION_TERMS: &[&str] = &[
    "raid this server",
    "raid them",
    "join the raid",
    "nuke this server",
    "nuke the server",
    "spam everyone",
    "mass report",
];

/// Profanity / contraband terms. Hits walk the three-strike ladder.
const CONTRABAND_TERMS: &[&str] = &[
    "fuck",
    "shit",
    "bitch",
    "asshole",
    "dumbass",
    "free nitro",
    "free robux",
    "nitro giveaway",
];

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Strip common Latin diacritics after lowercasing.
fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'į' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => 'o',
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ů' | 'ű' => 'u',
        'ç' | 'ć' | 'č' => 'c',
        'ñ' | 'ń' | 'ň' => 'n',
        'ý' | 'ÿ' => 'y',
        'ś' | 'š' => 's',
        'ź' | 'ż' | 'ž' => 'z',
        _ => c,
    }
}

/// Letter-substitution (leet-speak) fold applied as a second matching pass.
fn fold_leet(c: char) -> char {
    match c {
        '0' => 'o',
        '1' | '!' => 'i',
        '3' => 'e',
        '4' | '@' => 'a',
        '5' | '$' => 's',
        '7' | '+' => 't',
        '8' => 'b',
        _ => c,
    }
}

fn normalize(content: &str) -> String {
    content
        .chars()
        .flat_map(char::to_lowercase)
        .map(fold_diacritic)
        .collect()
}

/// Split into alphanumeric tokens - token boundaries are what keep short
/// terms from matching inside longer words.
fn tokenize(normalized: &str) -> Vec<String> {
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

// ============================================================================
// FILTER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TermCategory {
    /// Attack coordination - immediate kick
    Coordination,
    /// Profanity / contraband - warning ladder
    Contraband,
}

#[derive(Debug, Clone, Serialize)]
pub struct WordHit {
    pub category: TermCategory,
    pub term: String,
}

pub struct WordFilter {
    coordination: Vec<Vec<String>>,
    contraband: Vec<Vec<String>>,
}

impl WordFilter {
    pub fn with_defaults() -> Self {
        let mut filter = Self {
            coordination: Vec::new(),
            contraband: Vec::new(),
        };
        for term in COORDINATION_TERMS {
            filter.add_term(TermCategory::Coordination, term);
        }
        for term in CONTRABAND_TERMS {
            filter.add_term(TermCategory::Contraband, term);
        }
        filter
    }

    pub fn add_term(&mut self, category: TermCategory, term: &str) {
        let tokens = tokenize(&normalize(term));
        if tokens.is_empty() {
            return;
        }
        match category {
            TermCategory::Coordination => self.coordination.push(tokens),
            TermCategory::Contraband => self.contraband.push(tokens),
        }
    }

    /// First match wins; coordination terms are checked before contraband.
    pub fn check(&self, content: &str) -> Option<WordHit> {
        let plain = tokenize(&normalize(content));
        if plain.is_empty() {
            return None;
        }
        let leet: Vec<String> = plain
            .iter()
            .map(|t| t.chars().map(fold_leet).collect())
            .collect();

        for term in &self.coordination {
            if contains_phrase(&plain, term) || contains_phrase(&leet, term) {
                return Some(WordHit {
                    category: TermCategory::Coordination,
                    term: term.join(" "),
                });
            }
        }
        for term in &self.contraband {
            if contains_phrase(&plain, term) || contains_phrase(&leet, term) {
                return Some(WordHit {
                    category: TermCategory::Contraband,
                    term: term.join(" "),
                });
            }
        }
        None
    }
}

/// Contiguous full-token phrase match.
fn contains_phrase(tokens: &[String], phrase: &[String]) -> bool {
    if phrase.is_empty() || tokens.len() < phrase.len() {
        return false;
    }
    tokens
        .windows(phrase.len())
        .any(|window| window.iter().zip(phrase).all(|(a, b)| a == b))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leet_variant_matches_base_term() {
        let filter = WordFilter::with_defaults();
        let hit = filter.check("get your FR33 N1TR0 here").unwrap();
        assert_eq!(hit.category, TermCategory::Contraband);
        assert_eq!(hit.term, "free nitro");
    }

    #[test]
    fn test_no_match_inside_longer_word() {
        let filter = WordFilter::with_defaults();
        // "classic" contains "as" but not as a bounded token.
        assert!(filter.check("a classic example").is_none());
        // "shitake"-style containment must not fire either.
        assert!(filter.check("mushroom shiitake soup").is_none());
    }

    #[test]
    fn test_diacritics_stripped() {
        let filter = WordFilter::with_defaults();
        let hit = filter.check("frée nítro").unwrap();
        assert_eq!(hit.term, "free nitro");
    }

    #[test]
    fn test_coordination_before_contraband() {
        let filter = WordFilter::with_defaults();
        let hit = filter.check("fuck it, raid this server now").unwrap();
        assert_eq!(hit.category, TermCategory::Coordination);
    }

    #[test]
    fn test_phrase_requires_contiguous_tokens() {
        let filter = WordFilter::with_defaults();
        assert!(filter.check("free as in nitro").is_none());
    }

    #[test]
    fn test_added_term_is_matched() {
        let mut filter = WordFilter::with_defaults();
        filter.add_term(TermCategory::Contraband, "crypto doubler");
        assert!(filter.check("try the CRYPTO D0UBLER").is_some());
    }
}
