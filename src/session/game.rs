//! Game session state, mirrored from the authority.
//!
//! `GameSession` is a read-mirror: every scores/players/guessed-set update is
//! replaced wholesale from message payloads and the client never does scoring
//! arithmetic of its own. `apply` is total over the closed message enum and
//! assumes in-order delivery per round; whatever arrives is applied verbatim,
//! leaving consistency to the authority.

use std::collections::{HashMap, HashSet};

use super::message::{PhraseOptions, PlayerInfo, ServerMessage};

/// Round length when the authority does not send one.
pub const DEFAULT_ROUND_SECS: u64 = 90;

/// What a chat line is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    /// A relayed wrong guess
    Guess,
    /// A correct-guess announcement
    Correct,
    /// Authority notice (rejected action etc.)
    System,
}

/// One line of the round-scoped chat log.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    /// Absent for system notices
    pub username: Option<String>,
    pub text: String,
    pub kind: ChatKind,
    pub at: chrono::DateTime<chrono::Utc>,
}

impl ChatEntry {
    fn new(username: Option<String>, text: String, kind: ChatKind) -> Self {
        Self {
            username,
            text,
            kind,
            at: chrono::Utc::now(),
        }
    }
}

/// Display tier for a speed bonus. Purely cosmetic; the point value always
/// comes from the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BonusTier {
    Lightning,
    Gold,
    Silver,
    Bronze,
}

impl BonusTier {
    /// Tier for a bonus value, or `None` for no bonus.
    pub fn for_bonus(bonus: i64) -> Option<Self> {
        match bonus {
            b if b >= 50 => Some(Self::Lightning),
            b if b >= 30 => Some(Self::Gold),
            b if b >= 15 => Some(Self::Silver),
            b if b > 0 => Some(Self::Bronze),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Lightning => "lightning",
            Self::Gold => "gold",
            Self::Silver => "silver",
            Self::Bronze => "bronze",
        }
    }
}

/// Per-render player status, derived on demand and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    /// The current artist
    Drawing,
    /// Solved this round's phrase
    Guessed,
    /// Still guessing
    Guessing,
}

/// Side effects the orchestrator must perform after applying a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    /// Re-seed the round countdown.
    TimerReset { secs: u64 },
    /// Freeze the countdown at zero.
    TimerStopped,
    /// Show the transient point-burst animation.
    PointBurst {
        username: String,
        points: i64,
        bonus: i64,
    },
}

/// Phrase choices offered to the artist, with one toggleable pick per
/// category. Confirming requires a pick in every category and yields the
/// picks in the order the authority listed the categories.
#[derive(Debug, Clone, PartialEq)]
pub struct PhrasePrompt {
    options: PhraseOptions,
    picks: HashMap<String, String>,
}

impl PhrasePrompt {
    fn new(options: PhraseOptions) -> Self {
        Self {
            options,
            picks: HashMap::new(),
        }
    }

    pub fn options(&self) -> &PhraseOptions {
        &self.options
    }

    /// Current pick for a category.
    pub fn pick(&self, category: &str) -> Option<&str> {
        self.picks.get(category).map(String::as_str)
    }

    /// Pick a word, or unpick it when it is already the pick for its
    /// category. Words not offered for the category are ignored.
    pub fn toggle(&mut self, category: &str, word: &str) {
        let offered = self
            .options
            .0
            .iter()
            .any(|c| c.name == category && c.words.iter().any(|w| w == word));
        if !offered {
            return;
        }
        if self.pick(category) == Some(word) {
            self.picks.remove(category);
        } else {
            self.picks.insert(category.to_string(), word.to_string());
        }
    }

    pub fn is_complete(&self) -> bool {
        self.options.0.iter().all(|c| self.picks.contains_key(&c.name))
    }

    fn confirm(&self) -> Option<Vec<String>> {
        if !self.is_complete() {
            return None;
        }
        Some(
            self.options
                .0
                .iter()
                .filter_map(|c| self.picks.get(&c.name).cloned())
                .collect(),
        )
    }
}

/// Mirrored state of one running game session.
#[derive(Debug, Clone)]
pub struct GameSession {
    /// Short join code
    pub code: String,

    /// Roster in authority (= join) order
    players: Vec<PlayerInfo>,

    /// Current host username
    pub host: String,

    /// Word package the host picked
    pub selected_package: String,

    /// Packages offered to the host
    pub available_packages: Vec<String>,

    pub current_round: u32,
    pub total_rounds: u32,

    /// Artist of the active round
    pub current_artist: Option<String>,

    /// Phrase with unguessed words masked
    pub masked_phrase: String,

    /// Full phrase; shown only to the artist until round end
    pub full_phrase: String,

    scores: HashMap<String, i64>,

    pub started: bool,
    pub over: bool,

    /// Who solved the active round's phrase; cleared at round start
    guessed: HashSet<String>,

    /// Round-scoped chat log; cleared at round start
    chat: Vec<ChatEntry>,

    /// Open phrase prompt, if the authority asked us to choose
    phrase_prompt: Option<PhrasePrompt>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl GameSession {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            players: Vec::new(),
            host: String::new(),
            selected_package: String::new(),
            available_packages: Vec::new(),
            current_round: 0,
            total_rounds: 0,
            current_artist: None,
            masked_phrase: String::new(),
            full_phrase: String::new(),
            scores: HashMap::new(),
            started: false,
            over: false,
            guessed: HashSet::new(),
            chat: Vec::new(),
            phrase_prompt: None,
            created_at: chrono::Utc::now(),
        }
    }

    /// Apply one authority message, returning the side effects the
    /// orchestrator must perform. Unknown kinds are a no-op.
    pub fn apply(&mut self, msg: ServerMessage) -> Vec<SessionEffect> {
        match msg {
            ServerMessage::PlayerJoined { players, host, .. }
            | ServerMessage::PlayerLeft { players, host, .. } => {
                self.players = players;
                if let Some(host) = host {
                    self.host = host;
                }
                vec![]
            }
            ServerMessage::NewHost { host } => {
                self.host = host;
                vec![]
            }
            ServerMessage::PackageSelected { package } => {
                self.selected_package = package;
                vec![]
            }
            ServerMessage::RoundStart {
                round,
                total_rounds,
                artist,
                duration,
            } => {
                self.current_round = round;
                self.total_rounds = total_rounds;
                self.current_artist = Some(artist);
                self.started = true;
                self.masked_phrase.clear();
                self.full_phrase.clear();
                self.guessed.clear();
                self.chat.clear();
                self.phrase_prompt = None;
                vec![SessionEffect::TimerReset {
                    secs: duration.unwrap_or(DEFAULT_ROUND_SECS),
                }]
            }
            ServerMessage::PhraseSelected {
                masked_phrase,
                full_phrase,
            } => {
                if let Some(masked) = masked_phrase {
                    self.masked_phrase = masked;
                }
                if let Some(full) = full_phrase {
                    self.full_phrase = full;
                }
                vec![]
            }
            ServerMessage::WordGuessed {
                guesser,
                word,
                points_earned,
                speed_bonus,
                revealed_phrase,
                scores,
            } => {
                self.guessed.insert(guesser.clone());
                self.masked_phrase = revealed_phrase;
                if let Some(scores) = scores {
                    self.scores = scores;
                }
                let text = match BonusTier::for_bonus(speed_bonus) {
                    Some(tier) => format!(
                        "Guessed the word \"{}\"! ({} bonus +{} points)",
                        word,
                        tier.label(),
                        speed_bonus
                    ),
                    None => format!(
                        "Guessed the word \"{}\"! (+{} points)",
                        word,
                        points_earned.unwrap_or(0)
                    ),
                };
                self.chat
                    .push(ChatEntry::new(Some(guesser.clone()), text, ChatKind::Correct));
                match points_earned {
                    Some(points) if points != 0 => vec![SessionEffect::PointBurst {
                        username: guesser,
                        points,
                        bonus: speed_bonus,
                    }],
                    _ => vec![],
                }
            }
            ServerMessage::RoundEnd {
                full_phrase,
                scores,
            } => {
                if let Some(full) = full_phrase {
                    self.masked_phrase = full;
                }
                if let Some(scores) = scores {
                    self.scores = scores;
                }
                vec![SessionEffect::TimerStopped]
            }
            ServerMessage::GameEnd { final_scores } => {
                if let Some(scores) = final_scores {
                    self.scores = scores;
                }
                self.over = true;
                vec![SessionEffect::TimerStopped]
            }
            ServerMessage::AvailablePackages {
                packages,
                selected_package,
            } => {
                self.available_packages = packages;
                self.selected_package = selected_package.unwrap_or_default();
                vec![]
            }
            ServerMessage::SelectPhraseOptions { words } => {
                self.phrase_prompt = Some(PhrasePrompt::new(words));
                vec![]
            }
            ServerMessage::ChatMessage { username, message } => {
                self.chat
                    .push(ChatEntry::new(Some(username), message, ChatKind::Guess));
                vec![]
            }
            ServerMessage::Error { message } => {
                self.chat.push(ChatEntry::new(None, message, ChatKind::System));
                vec![]
            }
            // Drawing traffic is the pipeline's business, and unknown kinds
            // are ignored for forward compatibility.
            ServerMessage::DrawingUpdate { .. }
            | ServerMessage::CanvasCleared
            | ServerMessage::Unknown => vec![],
        }
    }

    // Phrase prompt

    /// The open phrase prompt, if any.
    pub fn phrase_prompt(&self) -> Option<&PhrasePrompt> {
        self.phrase_prompt.as_ref()
    }

    /// Toggle a pick on the open prompt.
    pub fn toggle_phrase_pick(&mut self, category: &str, word: &str) {
        if let Some(prompt) = self.phrase_prompt.as_mut() {
            prompt.toggle(category, word);
        }
    }

    /// Confirm the prompt: with a pick in every category this closes the
    /// prompt and returns the phrase in category order, otherwise the prompt
    /// stays open and nothing is returned.
    pub fn confirm_phrase(&mut self) -> Option<Vec<String>> {
        let phrase = self.phrase_prompt.as_ref().and_then(PhrasePrompt::confirm)?;
        self.phrase_prompt = None;
        Some(phrase)
    }

    // Derived views

    /// Roster in join order.
    pub fn players(&self) -> &[PlayerInfo] {
        &self.players
    }

    pub fn scores(&self) -> &HashMap<String, i64> {
        &self.scores
    }

    pub fn score_of(&self, username: &str) -> i64 {
        self.scores.get(username).copied().unwrap_or(0)
    }

    pub fn chat(&self) -> &[ChatEntry] {
        &self.chat
    }

    pub fn guessed(&self) -> &HashSet<String> {
        &self.guessed
    }

    pub fn is_host(&self, username: &str) -> bool {
        self.host == username
    }

    pub fn is_artist(&self, username: &str) -> bool {
        self.current_artist.as_deref() == Some(username)
    }

    /// Per-render status of one player.
    pub fn player_status(&self, username: &str) -> PlayerStatus {
        if self.is_artist(username) {
            PlayerStatus::Drawing
        } else if self.guessed.contains(username) {
            PlayerStatus::Guessed
        } else {
            PlayerStatus::Guessing
        }
    }

    /// The phrase as `viewer` may see it: the artist reads the full phrase as
    /// soon as one is set, everyone else the masked one.
    pub fn visible_phrase(&self, viewer: &str) -> &str {
        if self.is_artist(viewer) && !self.full_phrase.is_empty() {
            &self.full_phrase
        } else {
            &self.masked_phrase
        }
    }

    /// Players with scores, best first; ties keep join order.
    pub fn standings(&self) -> Vec<(&str, i64)> {
        let mut rows: Vec<(&str, i64)> = self
            .players
            .iter()
            .map(|p| (p.username.as_str(), self.score_of(&p.username)))
            .collect();
        rows.sort_by_key(|&(_, score)| std::cmp::Reverse(score));
        rows
    }
}
