//! Wire messages exchanged with the game authority.
//!
//! Everything on the channel is a JSON object with a `"type"` tag, modeled
//! here as two closed tagged enums: `ServerMessage` (inbound) and
//! `ClientMessage` (outbound). Inbound tags we do not recognize deserialize
//! to `ServerMessage::Unknown` so newer authorities never break older
//! clients; absent fields default instead of failing.

use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Public identity of a session participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub username: String,
}

/// One pointer-sample delta of the artist's stroke.
///
/// Coordinates are canvas-local. The wire field for the width is camelCase
/// (`lineWidth`) to match the authority's JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingSegment {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub color: String,
    #[serde(rename = "lineWidth")]
    pub line_width: f64,
}

/// Phrase options for the artist, grouped by category.
///
/// Category order matters: the confirmed phrase is assembled in the order the
/// authority listed the categories, so deserialization preserves document key
/// order rather than going through a sorted map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PhraseOptions(pub Vec<PhraseCategory>);

/// One category and its candidate words.
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseCategory {
    pub name: String,
    pub words: Vec<String>,
}

impl PhraseOptions {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Category names in document order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|c| c.name.as_str())
    }
}

impl<'de> Deserialize<'de> for PhraseOptions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OptionsVisitor;

        impl<'de> Visitor<'de> for OptionsVisitor {
            type Value = PhraseOptions;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of category name to word list")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut categories = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, words)) = map.next_entry::<String, Vec<String>>()? {
                    categories.push(PhraseCategory { name, words });
                }
                Ok(PhraseOptions(categories))
            }
        }

        deserializer.deserialize_map(OptionsVisitor)
    }
}

impl Serialize for PhraseOptions {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for category in &self.0 {
            map.serialize_entry(&category.name, &category.words)?;
        }
        map.end()
    }
}

/// Messages pushed by the authority.
///
/// Every kind except `DrawingUpdate` is a complete, idempotent snapshot the
/// client can resync from at any time; `DrawingUpdate` is the one incremental
/// kind and gets its own in-order delivery path in the channel layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A player entered the session; carries the full roster.
    PlayerJoined {
        username: String,
        players: Vec<PlayerInfo>,
        #[serde(default)]
        host: Option<String>,
    },
    /// A player left; carries the remaining roster.
    PlayerLeft {
        username: String,
        players: Vec<PlayerInfo>,
        #[serde(default)]
        host: Option<String>,
    },
    /// Host changed (previous host left).
    NewHost { host: String },
    /// The host picked a word package.
    PackageSelected { package: String },
    /// A round is starting.
    RoundStart {
        round: u32,
        total_rounds: u32,
        artist: String,
        #[serde(default)]
        duration: Option<u64>,
    },
    /// The artist picked a phrase; masked form for guessers, full form only
    /// ever addressed to the artist.
    PhraseSelected {
        #[serde(default)]
        masked_phrase: Option<String>,
        #[serde(default)]
        full_phrase: Option<String>,
    },
    /// Somebody guessed a word of the phrase.
    WordGuessed {
        guesser: String,
        word: String,
        #[serde(default)]
        points_earned: Option<i64>,
        #[serde(default)]
        speed_bonus: i64,
        revealed_phrase: String,
        #[serde(default)]
        scores: Option<HashMap<String, i64>>,
    },
    /// Round over; reveals the phrase.
    RoundEnd {
        #[serde(default)]
        full_phrase: Option<String>,
        #[serde(default)]
        scores: Option<HashMap<String, i64>>,
    },
    /// Game over.
    GameEnd {
        #[serde(default)]
        final_scores: Option<HashMap<String, i64>>,
    },
    /// Package list for the lobby (sent to the host).
    AvailablePackages {
        packages: Vec<String>,
        #[serde(default)]
        selected_package: Option<String>,
    },
    /// Phrase choices for the artist.
    SelectPhraseOptions { words: PhraseOptions },
    /// One replayed stroke segment.
    DrawingUpdate { data: DrawingSegment },
    /// The artist wiped the canvas.
    CanvasCleared,
    /// A wrong guess, relayed as chat.
    ChatMessage { username: String, message: String },
    /// Authority-side rejection of a client action.
    Error { message: String },
    /// Forward compatibility: any tag we do not know.
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Parse one inbound frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Messages this client sends to the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A guess attempt (never sent by the artist).
    Guess { guess: String },
    /// The artist's confirmed phrase, one word per category in category order.
    SelectPhrase { phrase: Vec<String> },
    /// Host starts the game.
    StartGame,
    /// Host picks a word package.
    SelectPackage { package: String },
    /// Artist wipes the canvas for everyone.
    ClearCanvas,
    /// One throttled stroke segment.
    DrawingData { data: DrawingSegment },
}

impl ClientMessage {
    /// Encode for the wire.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_round_start() {
        let msg = ServerMessage::parse(
            r#"{"type":"round_start","round":1,"total_rounds":3,"artist":"Ana","duration":60}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ServerMessage::RoundStart {
                round: 1,
                total_rounds: 3,
                artist: "Ana".to_string(),
                duration: Some(60),
            }
        );
    }

    #[test]
    fn test_parse_round_start_without_duration() {
        let msg = ServerMessage::parse(
            r#"{"type":"round_start","round":2,"total_rounds":4,"artist":"Bob"}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::RoundStart { duration, .. } => assert_eq!(duration, None),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_word_guessed() {
        let msg = ServerMessage::parse(
            r#"{"type":"word_guessed","guesser":"Bob","word":"dog","points_earned":20,
                "speed_bonus":30,"revealed_phrase":"d _ g","scores":{"Ana":0,"Bob":20}}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::WordGuessed {
                guesser,
                speed_bonus,
                revealed_phrase,
                scores,
                ..
            } => {
                assert_eq!(guesser, "Bob");
                assert_eq!(speed_bonus, 30);
                assert_eq!(revealed_phrase, "d _ g");
                assert_eq!(scores.unwrap().get("Bob"), Some(&20));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_word_guessed_minimal() {
        // The authority may omit the bonus fields entirely.
        let msg = ServerMessage::parse(
            r#"{"type":"word_guessed","guesser":"Bob","word":"dog","revealed_phrase":"dog"}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::WordGuessed {
                points_earned,
                speed_bonus,
                scores,
                ..
            } => {
                assert_eq!(points_earned, None);
                assert_eq!(speed_bonus, 0);
                assert_eq!(scores, None);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_tag_is_ignored() {
        let msg = ServerMessage::parse(r#"{"type":"spectator_count","count":4}"#).unwrap();
        assert_eq!(msg, ServerMessage::Unknown);
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        assert!(ServerMessage::parse("not json").is_err());
        assert!(ServerMessage::parse(r#"{"no_type":true}"#).is_err());
    }

    #[test]
    fn test_phrase_options_preserve_document_order() {
        // "Subjekt" before "Vlastnost" in the document must survive parsing,
        // even though it is not alphabetical.
        let msg = ServerMessage::parse(
            r#"{"type":"select_phrase_options",
                "words":{"Subjekt":["Klaun","Robot"],"Vlastnost":["Vzteklý"],"Činnost":["tančí"]}}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::SelectPhraseOptions { words } => {
                let order: Vec<&str> = words.categories().collect();
                assert_eq!(order, vec!["Subjekt", "Vlastnost", "Činnost"]);
                assert_eq!(words.0[0].words, vec!["Klaun", "Robot"]);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_drawing_segment_wire_names() {
        let seg = DrawingSegment {
            x0: 1.0,
            y0: 2.0,
            x1: 3.0,
            y1: 4.0,
            color: "#000000".to_string(),
            line_width: 5.0,
        };
        let encoded = ClientMessage::DrawingData { data: seg.clone() }.encode().unwrap();
        assert!(encoded.contains(r#""type":"drawing_data""#));
        assert!(encoded.contains(r#""lineWidth":5.0"#));

        let round_tripped =
            ServerMessage::parse(&encoded.replace("drawing_data", "drawing_update")).unwrap();
        assert_eq!(round_tripped, ServerMessage::DrawingUpdate { data: seg });
    }

    #[test]
    fn test_encode_unit_kinds() {
        assert_eq!(
            ClientMessage::StartGame.encode().unwrap(),
            r#"{"type":"start_game"}"#
        );
        assert_eq!(
            ClientMessage::ClearCanvas.encode().unwrap(),
            r#"{"type":"clear_canvas"}"#
        );
    }

    #[test]
    fn test_encode_select_phrase() {
        let msg = ClientMessage::SelectPhrase {
            phrase: vec!["Líný".to_string(), "Robot".to_string()],
        };
        assert_eq!(
            msg.encode().unwrap(),
            r#"{"type":"select_phrase","phrase":["Líný","Robot"]}"#
        );
    }
}
