//! Publisher authority tiers
//!
//! Maps publisher display names to authority scores in [0.0, 1.0] based on
//! editorial judgement of credibility and reputation. Three tiers:
//!
//! - Tier 1 (1.0): wire services, papers of record, major internationals
//! - Tier 2 (0.7): established national / digital outlets
//! - Tier 3 (0.4): tabloids, regional, niche, and unknown publishers

const TIER_1: &[&str] = &[
    "Associated Press News",
    "The Guardian",
    "Le Monde",
    "Los Angeles Times",
    "The Washington Times",
    "The New Yorker",
    "Nature",
    "Voice Of America",
    "Frankfurter Allgemeine Zeitung",
    "Süddeutsche Zeitung",
    "Die Zeit",
    "Tagesschau",
    "Le Figaro",
    "Deutsche Welle",
    "ZDF",
];

const TIER_2: &[&str] = &[
    "The Independent",
    "Business Insider",
    "Fox News",
    "CNBC",
    "The Intercept",
    "TechCrunch",
    "Wired",
    "Rolling Stone",
    "Euronews (EN)",
    "Euronews (FR)",
    "Euronews (DE)",
    "Spiegel Online",
    "Die Welt",
    "Stern",
    "Focus Online",
    "Nine News",
    "Rest of World",
    "The Nation",
    "Bild",
    "N-Tv",
    "T-Online",
    "Tagesspiegel",
    "Berliner Zeitung",
    "Die Tageszeitung (taz)",
];

const DEFAULT_SCORE: f64 = 0.4;

/// Authority tier (1, 2, or 3) for a publisher display name
pub fn publisher_tier(publisher: &str) -> u8 {
    if TIER_1.contains(&publisher) {
        1
    } else if TIER_2.contains(&publisher) {
        2
    } else {
        3
    }
}

/// Authority score in [0.0, 1.0] for a publisher display name
pub fn authority_score(publisher: &str) -> f64 {
    match publisher_tier(publisher) {
        1 => 1.0,
        2 => 0.7,
        _ => DEFAULT_SCORE,
    }
}
