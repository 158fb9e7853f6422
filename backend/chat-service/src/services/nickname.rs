//! Nickname generation for auto-created accounts.
//!
//! The word list is embedded at compile time and parsed once; it is
//! immutable for the life of the process.

use once_cell::sync::Lazy;
use rand::Rng;
use serde::Deserialize;

#[derive(Deserialize)]
struct WordList {
    adjectives: Vec<String>,
    nouns: Vec<String>,
}

static WORDS: Lazy<WordList> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../resources/nicknames.json"))
        .expect("embedded nicknames.json is valid")
});

/// Build an `<adjective><noun>[number]` nickname. `digits` bounds the
/// numeric suffix at `10^digits`; zero omits the suffix entirely.
pub fn generate(digits: u32) -> String {
    let mut rng = rand::thread_rng();
    let adjective = &WORDS.adjectives[rng.gen_range(0..WORDS.adjectives.len())];
    let noun = &WORDS.nouns[rng.gen_range(0..WORDS.nouns.len())];

    if digits == 0 {
        format!("{adjective}{noun}")
    } else {
        format!("{adjective}{noun}{}", rng.gen_range(0..10u64.pow(digits)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_list_loads() {
        assert!(!WORDS.adjectives.is_empty());
        assert!(!WORDS.nouns.is_empty());
    }

    #[test]
    fn bare_nickname_has_no_digits() {
        let nickname = generate(0);
        assert!(!nickname.chars().any(|c| c.is_ascii_digit()));
    }

    #[test]
    fn suffixed_nickname_stays_within_bound() {
        for _ in 0..50 {
            let nickname = generate(2);
            let digits: String = nickname.chars().filter(|c| c.is_ascii_digit()).collect();
            if !digits.is_empty() {
                assert!(digits.parse::<u64>().unwrap() < 100);
            }
        }
    }
}
