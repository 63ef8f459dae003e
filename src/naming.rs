//! Random display names for new conversations
//!
//! Names have the shape `<Adjective>-<Noun>-<NN>`. They are a display
//! convenience, not an identity: collisions are allowed and never checked.

use rand::seq::IndexedRandom;
use rand::Rng;

/// Upper bound on `len(adjective) + len(noun)`
pub const MAX_WORDS_LEN: usize = 16;

/// Adjectives a name can start with
pub const ADJECTIVES: &[&str] = &[
    "Silent", "Golden", "Quantum", "Majestic", "Frosty", "Shy", "Bold", "Radiant", "Velvety",
    "Hidden", "Witty", "Zany", "Lively", "Eager", "Rapid", "Swift", "Crimson", "Cosmic", "Bouncy",
    "Brisk", "Cheery", "Gentle", "Mellow", "Chilly", "Curious", "Playful", "Mystic", "Nimble",
];

/// Nouns a name can use
pub const NOUNS: &[&str] = &[
    "Echo", "Pulse", "Labyrinth", "Nexus", "Odyssey", "Signal", "Summit", "Vertex", "Mirage",
    "Beacon", "Galaxy", "Whisper", "Harbor", "Fragment", "Crystal", "Voyager", "Orbit", "Flame",
    "Nova", "Dust", "Cloud", "Meadow", "Horizon", "Circuit", "Pattern", "Memory", "Sparkle",
];

/// Generate a name using the thread-local RNG
///
/// # Examples
///
/// ```
/// use clover::naming::random_conversation_name;
///
/// let name = random_conversation_name();
/// assert_eq!(name.split('-').count(), 3);
/// ```
pub fn random_conversation_name() -> String {
    random_conversation_name_with(&mut rand::rng())
}

/// Generate a name from the given RNG
///
/// Both words are re-drawn until their combined length fits
/// [`MAX_WORDS_LEN`]. The trailing number is zero-padded to two digits.
pub fn random_conversation_name_with<R: Rng>(rng: &mut R) -> String {
    let number: u8 = rng.random_range(0..100);
    let (adjective, noun) = loop {
        // Both lists are non-empty constants
        let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("Silent");
        let noun = NOUNS.choose(rng).copied().unwrap_or("Echo");
        if adjective.len() + noun.len() <= MAX_WORDS_LEN {
            break (adjective, noun);
        }
    };
    format!("{}-{}-{:02}", adjective, noun, number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn split(name: &str) -> (String, String, String) {
        let parts: Vec<&str> = name.split('-').collect();
        assert_eq!(parts.len(), 3, "unexpected name shape: {name}");
        (
            parts[0].to_string(),
            parts[1].to_string(),
            parts[2].to_string(),
        )
    }

    #[test]
    fn test_name_length_invariant_holds_for_many_draws() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..5_000 {
            let name = random_conversation_name_with(&mut rng);
            let (adjective, noun, _) = split(&name);
            assert!(
                adjective.len() + noun.len() <= MAX_WORDS_LEN,
                "{name} exceeds the word budget"
            );
        }
    }

    #[test]
    fn test_every_draw_comes_from_the_word_lists() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1_000 {
            let (adjective, noun, number) = split(&random_conversation_name_with(&mut rng));
            assert!(ADJECTIVES.contains(&adjective.as_str()));
            assert!(NOUNS.contains(&noun.as_str()));
            assert_eq!(number.len(), 2);
            assert!(number.parse::<u8>().unwrap() < 100);
        }
    }

    #[test]
    fn test_word_lists_admit_valid_pairs() {
        // At least one pair must fit, otherwise the redraw loop never ends.
        let fitting = ADJECTIVES
            .iter()
            .flat_map(|a| NOUNS.iter().map(move |n| a.len() + n.len()))
            .filter(|len| *len <= MAX_WORDS_LEN)
            .count();
        assert!(fitting > 0);
    }

    #[test]
    fn test_over_budget_pairs_are_never_emitted() {
        let mut rng = StdRng::seed_from_u64(3);
        let over_budget: Vec<(&str, &str)> = ADJECTIVES
            .iter()
            .flat_map(|a| NOUNS.iter().map(move |n| (*a, *n)))
            .filter(|(a, n)| a.len() + n.len() > MAX_WORDS_LEN)
            .collect();
        assert!(!over_budget.is_empty());

        for _ in 0..5_000 {
            let (adjective, noun, _) = split(&random_conversation_name_with(&mut rng));
            assert!(!over_budget.contains(&(adjective.as_str(), noun.as_str())));
        }
    }

    #[test]
    fn test_random_conversation_name_uses_thread_rng() {
        let name = random_conversation_name();
        let (adjective, noun, _) = split(&name);
        assert!(adjective.len() + noun.len() <= MAX_WORDS_LEN);
    }
}
