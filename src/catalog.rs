//! Pattern catalog: the static extraction rules the narrative scanner runs.
//!
//! Pure data, no logic. Each semantic category gets a table of surface
//! patterns plus metadata (canonical name, place kind, tags). The built-in
//! catalog covers the common fantasy role-play vocabulary; hosts can extend
//! or replace it since every table is plain serializable data.

use serde::{Deserialize, Serialize};

/// Semantic categories a candidate fact can belong to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum FactCategory {
    /// A named place the scene is set in (singleton).
    Location,
    /// Broad terrain the scene moves through (singleton).
    Terrain,
    /// An organization or group (singleton for "current", accumulating registry).
    Faction,
    /// A named character (set-accumulating).
    Person,
    /// An object of interest (set-accumulating).
    Item,
    /// A combat-state transition signal (singleton).
    CombatSignal,
    /// Current weather (singleton).
    Weather,
    /// Time of day (singleton).
    TimeOfDay,
}

impl FactCategory {
    /// Short stable identifier used to derive entity ids.
    pub fn slug(&self) -> &'static str {
        match self {
            FactCategory::Location => "location",
            FactCategory::Terrain => "terrain",
            FactCategory::Faction => "faction",
            FactCategory::Person => "person",
            FactCategory::Item => "item",
            FactCategory::CombatSignal => "combat",
            FactCategory::Weather => "weather",
            FactCategory::TimeOfDay => "time",
        }
    }

    /// Singleton categories hold at most one current value; for these the
    /// last successful match in text order wins within a message.
    pub fn is_singleton(&self) -> bool {
        !matches!(self, FactCategory::Person | FactCategory::Item)
    }

    /// Categories whose entities are kept in a registry of records.
    pub fn has_registry(&self) -> bool {
        matches!(
            self,
            FactCategory::Location
                | FactCategory::Faction
                | FactCategory::Person
                | FactCategory::Item
        )
    }
}

/// A rule matching a named place, with its kind and descriptive tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceRule {
    /// Canonical display name recorded when any phrase matches.
    pub canonical: String,
    /// Lowercase surface phrases, matched at word boundaries.
    pub phrases: Vec<String>,
    /// Broad kind of place (settlement, wilderness, structure, ...).
    pub kind: String,
    /// Tags unioned into the store and consulted by gate triggers.
    pub tags: Vec<String>,
}

impl PlaceRule {
    /// Create a place rule with its canonical name and kind.
    pub fn new(canonical: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            canonical: canonical.into(),
            phrases: Vec::new(),
            kind: kind.into(),
            tags: Vec::new(),
        }
    }

    /// Add surface phrases.
    pub fn with_phrases(mut self, phrases: &[&str]) -> Self {
        self.phrases.extend(phrases.iter().map(|p| p.to_string()));
        self
    }

    /// Add tags.
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags.extend(tags.iter().map(|t| t.to_string()));
        self
    }
}

/// A rule matching a simple named value (terrain, faction, weather, time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedRule {
    /// Canonical display name.
    pub canonical: String,
    /// Lowercase surface phrases, matched at word boundaries.
    pub phrases: Vec<String>,
}

impl NamedRule {
    /// Create a named rule.
    pub fn new(canonical: impl Into<String>, phrases: &[&str]) -> Self {
        Self {
            canonical: canonical.into(),
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// The full set of extraction rules the scanner applies to each message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternCatalog {
    /// Named places.
    pub places: Vec<PlaceRule>,
    /// Terrain vocabulary.
    pub terrains: Vec<NamedRule>,
    /// Known factions and groups.
    pub factions: Vec<NamedRule>,
    /// Weather vocabulary.
    pub weather: Vec<NamedRule>,
    /// Time-of-day vocabulary.
    pub times_of_day: Vec<NamedRule>,
    /// Positive combat signals; two or more distinct hits in one message
    /// mean combat is underway.
    pub combat_signals: Vec<String>,
    /// Phrases that veto every combat signal in the message (hypothetical
    /// or retrospective framing).
    pub combat_suppressors: Vec<String>,
    /// First-word keywords marking a bracketed token as a system directive,
    /// excluded from person/item extraction.
    pub directive_keywords: Vec<String>,
    /// Leading characters that mark a bracketed token as a system directive.
    pub directive_sigils: Vec<char>,
    /// Honorific words that introduce a person name ("Sir Aldric").
    pub honorifics: Vec<String>,
    /// Verbs that follow a person name ("Elena says ...").
    pub person_verbs: Vec<String>,
    /// Words that introduce a name ("a woman named Elena").
    pub name_introducers: Vec<String>,
    /// Phrases that introduce an item in narration ("you find a ...").
    pub item_lead_ins: Vec<String>,
    /// Capitalized words that are never person names (sentence starters,
    /// pronouns, articles).
    pub capital_stopwords: Vec<String>,
}

impl PatternCatalog {
    /// The built-in catalog.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// An empty catalog, useful as a base for fully custom rule sets.
    pub fn empty() -> Self {
        Self {
            places: Vec::new(),
            terrains: Vec::new(),
            factions: Vec::new(),
            weather: Vec::new(),
            times_of_day: Vec::new(),
            combat_signals: Vec::new(),
            combat_suppressors: Vec::new(),
            directive_keywords: Vec::new(),
            directive_sigils: Vec::new(),
            honorifics: Vec::new(),
            person_verbs: Vec::new(),
            name_introducers: Vec::new(),
            item_lead_ins: Vec::new(),
            capital_stopwords: Vec::new(),
        }
    }

    /// Look up the place rule with the given canonical name.
    pub fn place(&self, canonical: &str) -> Option<&PlaceRule> {
        self.places.iter().find(|p| p.canonical == canonical)
    }
}

/// Check if `text` contains `word` starting exactly at byte offset `at`,
/// bounded by non-alphanumeric characters (or the ends of the string).
pub(crate) fn phrase_at(text: &str, word: &str, at: usize) -> bool {
    let text_bytes = text.as_bytes();
    let word_bytes = word.as_bytes();
    if at + word_bytes.len() > text_bytes.len() {
        return false;
    }
    if &text_bytes[at..at + word_bytes.len()] != word_bytes {
        return false;
    }
    let left_ok = at == 0 || !text_bytes[at - 1].is_ascii_alphanumeric();
    let right = at + word_bytes.len();
    let right_ok = right == text_bytes.len() || !text_bytes[right].is_ascii_alphanumeric();
    left_ok && right_ok
}

/// Find every word-boundary occurrence of `phrase` in `text`, returning byte
/// offsets in ascending order. Both inputs are expected lowercase.
pub(crate) fn phrase_occurrences(text: &str, phrase: &str) -> Vec<usize> {
    let mut found = Vec::new();
    if phrase.is_empty() || phrase.len() > text.len() {
        return found;
    }
    let mut i = 0;
    while i + phrase.len() <= text.len() {
        if phrase_at(text, phrase, i) {
            found.push(i);
        }
        i += 1;
    }
    found
}

/// Check if `text` contains `phrase` at a word boundary.
pub(crate) fn contains_phrase(text: &str, phrase: &str) -> bool {
    !phrase_occurrences(text, phrase).is_empty()
}

lazy_static::lazy_static! {
    /// The built-in pattern catalog.
    static ref BUILTIN: PatternCatalog = build_builtin();
}

fn build_builtin() -> PatternCatalog {
    PatternCatalog {
        places: vec![
            PlaceRule::new("tavern", "settlement")
                .with_phrases(&["tavern", "inn", "alehouse", "pub", "taproom"])
                .with_tags(&["social", "rest", "rumors"]),
            PlaceRule::new("market", "settlement")
                .with_phrases(&["market", "marketplace", "bazaar", "market square"])
                .with_tags(&["social", "trade", "rumors"]),
            PlaceRule::new("guild hall", "settlement")
                .with_phrases(&["guild hall", "guildhall", "notice board", "quest board"])
                .with_tags(&["social", "quests"]),
            PlaceRule::new("temple", "structure")
                .with_phrases(&["temple", "shrine", "chapel", "cathedral"])
                .with_tags(&["sacred", "rest"]),
            PlaceRule::new("castle", "structure")
                .with_phrases(&["castle", "keep", "fortress", "citadel"])
                .with_tags(&["authority", "danger"]),
            PlaceRule::new("dungeon", "structure")
                .with_phrases(&["dungeon", "crypt", "catacombs", "tomb"])
                .with_tags(&["danger", "loot"]),
            PlaceRule::new("village", "settlement")
                .with_phrases(&["village", "hamlet"])
                .with_tags(&["social", "rest"]),
            PlaceRule::new("city", "settlement")
                .with_phrases(&["city", "town", "city gates", "town square"])
                .with_tags(&["social", "trade", "rumors"]),
            PlaceRule::new("harbor", "settlement")
                .with_phrases(&["harbor", "harbour", "docks", "port", "wharf"])
                .with_tags(&["trade", "travel"]),
            PlaceRule::new("blacksmith", "settlement")
                .with_phrases(&["blacksmith", "smithy", "forge"])
                .with_tags(&["trade", "crafting"]),
            PlaceRule::new("library", "structure")
                .with_phrases(&["library", "archive", "scriptorium"])
                .with_tags(&["lore", "quiet"]),
            PlaceRule::new("camp", "wilderness")
                .with_phrases(&["camp", "campsite", "campfire"])
                .with_tags(&["rest", "travel"]),
            PlaceRule::new("cave", "wilderness")
                .with_phrases(&["cave", "cavern", "grotto"])
                .with_tags(&["danger", "shelter"]),
            PlaceRule::new("bridge", "structure")
                .with_phrases(&["bridge", "crossing"])
                .with_tags(&["travel"]),
            PlaceRule::new("graveyard", "structure")
                .with_phrases(&["graveyard", "cemetery", "burial ground"])
                .with_tags(&["danger", "sacred"]),
            PlaceRule::new("tower", "structure")
                .with_phrases(&["tower", "spire", "watchtower"])
                .with_tags(&["lore", "danger"]),
        ],
        terrains: vec![
            NamedRule::new("forest", &["forest", "woods", "woodland", "grove", "thicket"]),
            NamedRule::new("mountains", &["mountain", "mountains", "peak", "cliffs", "ridge"]),
            NamedRule::new("plains", &["plains", "grassland", "meadow", "fields", "steppe"]),
            NamedRule::new("desert", &["desert", "dunes", "wasteland", "badlands"]),
            NamedRule::new("swamp", &["swamp", "marsh", "bog", "mire", "fen"]),
            NamedRule::new("coast", &["coast", "shore", "beach", "shoreline", "seaside"]),
            NamedRule::new("underground", &["underground", "tunnels", "depths", "underdark"]),
            NamedRule::new("river", &["river", "riverbank", "stream", "ford"]),
            NamedRule::new("hills", &["hills", "hillside", "foothills"]),
        ],
        factions: vec![
            NamedRule::new("City Watch", &["city watch", "town guard", "the watch", "guardsmen"]),
            NamedRule::new("Thieves' Guild", &["thieves' guild", "thieves guild", "the guild of shadows"]),
            NamedRule::new("Mages' Circle", &["mages' circle", "mages guild", "arcane order", "the circle"]),
            NamedRule::new("The Crown", &["the crown", "royal army", "king's men", "queen's men"]),
            NamedRule::new("Bandits", &["bandits", "brigands", "highwaymen", "raiders"]),
            NamedRule::new("The Cult", &["cult", "cultists", "the cult"]),
            NamedRule::new("Merchants' Guild", &["merchants' guild", "merchant guild", "trade consortium"]),
            NamedRule::new("The Church", &["the church", "priesthood", "clergy", "the faith"]),
            NamedRule::new("Rebels", &["rebels", "the resistance", "insurgents"]),
        ],
        weather: vec![
            NamedRule::new("rain", &["rain", "raining", "drizzle", "downpour"]),
            NamedRule::new("storm", &["storm", "thunderstorm", "thunder", "lightning", "tempest"]),
            NamedRule::new("snow", &["snow", "snowing", "snowfall", "blizzard"]),
            NamedRule::new("fog", &["fog", "mist", "misty", "haze"]),
            NamedRule::new("wind", &["wind", "windy", "gale", "gusts"]),
            NamedRule::new("clear", &["clear skies", "clear sky", "sunny", "sunshine", "cloudless"]),
            NamedRule::new("overcast", &["overcast", "cloudy", "grey clouds", "gray clouds"]),
        ],
        times_of_day: vec![
            NamedRule::new("dawn", &["dawn", "daybreak", "sunrise", "first light"]),
            NamedRule::new("morning", &["morning"]),
            NamedRule::new("midday", &["midday", "noon", "high noon"]),
            NamedRule::new("afternoon", &["afternoon"]),
            NamedRule::new("dusk", &["dusk", "sunset", "twilight", "evening"]),
            NamedRule::new("night", &["night", "nightfall", "midnight", "moonlight"]),
        ],
        combat_signals: [
            "attack", "attacks", "attacked", "attacking",
            "ambush", "ambushed",
            "lunges", "lunged", "charges at", "charged at",
            "roll initiative", "initiative",
            "combat", "battle cry", "melee",
            "blade", "sword", "dagger", "axe", "spear", "bow", "arrow", "crossbow",
            "claws", "fangs", "snarls", "growls",
            "draws a weapon", "draws her weapon", "draws his weapon", "weapon drawn",
            "swings at", "slashes at", "stabs",
            "hits you", "wounds you", "blood is drawn",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        combat_suppressors: [
            "long ago", "years ago", "in the past", "once fought", "had fought",
            "remembers", "recalls", "recounts", "tale of", "story of", "stories of",
            "legend", "legends", "imagine", "imagines", "what if",
            "in your dream", "in a dream", "dreamed", "dreamt",
            "died long", "fell in battle long",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        directive_keywords: [
            "ooc", "system", "gm", "dm", "roll", "note", "meta", "pause", "end",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        directive_sigils: vec!['!', '#', '@', '-', '=', '/'],
        honorifics: [
            "sir", "lady", "lord", "captain", "king", "queen", "prince", "princess",
            "elder", "master", "mistress", "brother", "sister", "father", "mother", "old",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        person_verbs: [
            "says", "said", "asks", "asked", "whispers", "whispered", "replies",
            "replied", "nods", "smiles", "laughs", "greets", "shouts", "exclaims",
            "approaches", "snarls", "grins", "bows", "frowns", "sighs", "attacks",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        name_introducers: ["named", "called", "introduces"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        item_lead_ins: [
            "picks up the", "pick up the", "picks up a", "pick up a",
            "you find a", "you find the", "you found a",
            "hands you a", "hands you the", "gives you a", "gives you the",
            "you receive a", "you receive the", "receives a",
            "you acquire a", "you acquire the",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        capital_stopwords: [
            "you", "your", "the", "a", "an", "i", "he", "she", "it", "they", "we",
            "there", "this", "that", "these", "those", "as", "when", "then", "but",
            "and", "or", "if", "in", "on", "at", "his", "her", "their", "its",
            "what", "who", "now", "suddenly", "meanwhile", "here", "with", "from",
            "before", "after", "inside", "outside", "nearby", "beyond",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables_present() {
        let catalog = PatternCatalog::builtin();
        assert!(!catalog.places.is_empty());
        assert!(!catalog.factions.is_empty());
        assert!(!catalog.combat_signals.is_empty());
        assert!(!catalog.combat_suppressors.is_empty());
    }

    #[test]
    fn test_tavern_tags() {
        let catalog = PatternCatalog::builtin();
        let tavern = catalog.place("tavern").unwrap();
        for tag in ["social", "rest", "rumors"] {
            assert!(tavern.tags.iter().any(|t| t == tag), "missing tag {tag}");
        }
    }

    #[test]
    fn test_singleton_split() {
        assert!(FactCategory::Location.is_singleton());
        assert!(FactCategory::Weather.is_singleton());
        assert!(FactCategory::CombatSignal.is_singleton());
        assert!(!FactCategory::Person.is_singleton());
        assert!(!FactCategory::Item.is_singleton());
    }

    #[test]
    fn test_registry_split() {
        assert!(FactCategory::Location.has_registry());
        assert!(FactCategory::Item.has_registry());
        assert!(!FactCategory::Weather.has_registry());
        assert!(!FactCategory::CombatSignal.has_registry());
    }

    #[test]
    fn test_phrase_occurrences_word_boundaries() {
        assert_eq!(phrase_occurrences("the tavern door", "tavern"), vec![4]);
        assert!(phrase_occurrences("taverns everywhere", "tavern").is_empty());
        assert!(phrase_occurrences("thorin speaks", "thor").is_empty());
        assert_eq!(phrase_occurrences("thor speaks", "thor"), vec![0]);
        assert_eq!(
            phrase_occurrences("rain, rain, go away", "rain"),
            vec![0, 6]
        );
    }

    #[test]
    fn test_contains_phrase_multi_word() {
        assert!(contains_phrase("you reach the city gates at dusk", "city gates"));
        assert!(!contains_phrase("electricity gates nothing", "city gates"));
    }

    #[test]
    fn test_catalog_serde_round_trip() {
        let catalog = PatternCatalog::builtin();
        let json = serde_json::to_string(&catalog).unwrap();
        let back: PatternCatalog = serde_json::from_str(&json).unwrap();
        assert_eq!(back.places.len(), catalog.places.len());
        assert_eq!(back.combat_signals, catalog.combat_signals);
    }
}
