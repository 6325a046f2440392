//! Deck handling for the dealer.
//!
//! The dealer holds the plaintext deck in memory for the lifetime of a hand
//! and publishes only a SHA-256 commitment on-chain before play begins. The
//! deck is known to this process before the commitment lands, so fairness
//! rests on operator trust rather than cryptography.
//!
//! Card encoding: card = suit * 13 + rank
//! - suit: 0=clubs, 1=diamonds, 2=hearts, 3=spades
//! - rank: 0=2, 1=3, ..., 8=10, 9=J, 10=Q, 11=K, 12=A
//!
//! Slot layout per hand, with k seats dealt in: slots `0..2k` are hole cards
//! (two consecutive slots per seat, in seat order), then burn, flop x3, burn,
//! turn, burn, river.

use rand::seq::SliceRandom;
use rand::thread_rng;
use sha2::{Digest, Sha256};

pub const DECK_SIZE: usize = 52;

const NUM_RANKS: u32 = 13;
const RANK_CHARS: [char; 13] = [
    '2', '3', '4', '5', '6', '7', '8', '9', 'T', 'J', 'Q', 'K', 'A',
];
const SUIT_CHARS: [char; 4] = ['c', 'd', 'h', 's'];

/// Deck state held for one hand. SECRET apart from the commitment.
#[derive(Clone, Debug, Default)]
pub struct DeckState {
    /// Shuffled card values (0-51). Never leaves the process.
    pub cards: Vec<u32>,
}

/// Create a freshly shuffled deck (Fisher-Yates via `SliceRandom`).
pub fn shuffle_deck() -> DeckState {
    let mut rng = thread_rng();

    let mut cards: Vec<u32> = (0..DECK_SIZE as u32).collect();
    cards.shuffle(&mut rng);

    DeckState { cards }
}

impl DeckState {
    /// SHA-256 over the full deck order, hex-encoded. This is the only view
    /// of the deck that ever leaves the process for the chain.
    pub fn commitment(&self) -> String {
        let mut hasher = Sha256::new();
        for card in &self.cards {
            hasher.update([*card as u8]);
        }
        hex::encode(hasher.finalize())
    }

    /// Hole cards for the n-th dealt seat (two consecutive slots).
    pub fn hole_pair(&self, deal_index: usize) -> [u32; 2] {
        [self.cards[deal_index * 2], self.cards[deal_index * 2 + 1]]
    }

    /// Flop cards: one burn after the hole cards, then three.
    pub fn flop(&self, seats: usize) -> [u32; 3] {
        let base = seats * 2 + 1;
        [self.cards[base], self.cards[base + 1], self.cards[base + 2]]
    }

    /// Turn card: one burn after the flop.
    pub fn turn(&self, seats: usize) -> u32 {
        self.cards[seats * 2 + 5]
    }

    /// River card: one burn after the turn.
    pub fn river(&self, seats: usize) -> u32 {
        self.cards[seats * 2 + 7]
    }
}

/// Human-readable card name, e.g. `Ah` or `Tc`.
pub fn format_card(card: u32) -> String {
    let rank = (card % NUM_RANKS) as usize;
    let suit = (card / NUM_RANKS) as usize;
    format!("{}{}", RANK_CHARS[rank], SUIT_CHARS[suit])
}
