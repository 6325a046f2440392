//! Poker hand evaluation.
//!
//! Card encoding: card_value = suit * 13 + rank
//! - suit: 0=Clubs, 1=Diamonds, 2=Hearts, 3=Spades
//! - rank: 0=2, 1=3, ..., 8=10, 9=J, 10=Q, 11=K, 12=A
//!
//! A hand scores as `category * 1_000_000 + tiebreak`. The tiebreak packs
//! the five card ranks (values 2..=14, grouped by frequency, bigger groups
//! and bigger ranks first) into a base-15 number, so any hand of a higher
//! category outranks every hand of a lower one and equal scores mean a
//! genuine tie.

use std::collections::HashMap;

const NUM_RANKS: u32 = 13;

pub const HIGH_CARD: u32 = 0;
pub const PAIR: u32 = 1;
pub const TWO_PAIR: u32 = 2;
pub const THREE_OF_A_KIND: u32 = 3;
pub const STRAIGHT: u32 = 4;
pub const FLUSH: u32 = 5;
pub const FULL_HOUSE: u32 = 6;
pub const FOUR_OF_A_KIND: u32 = 7;
pub const STRAIGHT_FLUSH: u32 = 8;

pub const CATEGORY_SCALE: u32 = 1_000_000;

const TIEBREAK_BASE: u32 = 15;

/// Evaluate the best 5-card hand from 5, 6 or 7 cards.
/// Returns a score where higher = better hand; fewer than 5 cards scores 0.
pub fn evaluate_best(cards: &[u32]) -> u32 {
    match cards.len() {
        n if n < 5 => 0,
        5 => score_five(cards),
        6 => {
            let mut best_score: u32 = 0;
            for skip in 0..6 {
                let mut hand = [0u32; 5];
                let mut idx = 0usize;
                for (k, &card) in cards.iter().enumerate() {
                    if k != skip {
                        hand[idx] = card;
                        idx += 1;
                    }
                }
                let score = score_five(&hand);
                if score > best_score {
                    best_score = score;
                }
            }
            best_score
        }
        _ => {
            // All C(7,5) = 21 combinations, by choosing which 2 to skip.
            let mut best_score: u32 = 0;
            for skip1 in 0..7 {
                for skip2 in (skip1 + 1)..7 {
                    let mut hand = [0u32; 5];
                    let mut idx = 0usize;
                    for (k, &card) in cards.iter().enumerate() {
                        if k != skip1 && k != skip2 {
                            hand[idx] = card;
                            idx += 1;
                        }
                    }
                    let score = score_five(&hand);
                    if score > best_score {
                        best_score = score;
                    }
                }
            }
            best_score
        }
    }
}

/// Score exactly 5 cards.
fn score_five(cards: &[u32]) -> u32 {
    let mut ranks: Vec<u32> = cards.iter().map(|c| c % NUM_RANKS).collect();
    ranks.sort_unstable_by(|a, b| b.cmp(a));

    let is_flush = cards.iter().all(|c| c / NUM_RANKS == cards[0] / NUM_RANKS);

    // Ace-low straight (A-2-3-4-5 = wheel)
    let is_wheel = ranks == [12, 3, 2, 1, 0];
    let is_straight = is_wheel || ranks.windows(2).all(|w| w[0] == w[1] + 1);

    let mut freq = [0u32; NUM_RANKS as usize];
    for &r in &ranks {
        freq[r as usize] += 1;
    }

    // Rank groups ordered by count, then rank, both descending.
    let mut groups: Vec<(u32, u32)> = freq
        .iter()
        .enumerate()
        .filter(|(_, &count)| count > 0)
        .map(|(rank, &count)| (count, rank as u32))
        .collect();
    groups.sort_unstable_by(|a, b| b.cmp(a));

    let category = if is_straight && is_flush {
        STRAIGHT_FLUSH
    } else if groups[0].0 == 4 {
        FOUR_OF_A_KIND
    } else if groups[0].0 == 3 && groups[1].0 == 2 {
        FULL_HOUSE
    } else if is_flush {
        FLUSH
    } else if is_straight {
        STRAIGHT
    } else if groups[0].0 == 3 {
        THREE_OF_A_KIND
    } else if groups[0].0 == 2 && groups[1].0 == 2 {
        TWO_PAIR
    } else if groups[0].0 == 2 {
        PAIR
    } else {
        HIGH_CARD
    };

    // The wheel scores with the ace demoted below the deuce.
    let ordered: Vec<u32> = if is_wheel {
        vec![5, 4, 3, 2, 1]
    } else {
        groups
            .iter()
            .flat_map(|&(count, rank)| std::iter::repeat(rank + 2).take(count as usize))
            .collect()
    };

    let tiebreak = ordered.iter().fold(0u32, |acc, &v| acc * TIEBREAK_BASE + v);

    category * CATEGORY_SCALE + tiebreak
}

/// Winning seats at showdown, ascending. More than one entry means a
/// genuine tie on score.
pub fn find_winners(hands: &HashMap<u32, Vec<u32>>) -> Vec<u32> {
    let mut entries: Vec<(u32, &Vec<u32>)> = hands.iter().map(|(&s, c)| (s, c)).collect();
    entries.sort_unstable_by_key(|(seat, _)| *seat);

    let mut best_score: u32 = 0;
    let mut winners: Vec<u32> = Vec::new();
    for (seat, cards) in entries {
        let score = evaluate_best(cards);
        if score > best_score {
            best_score = score;
            winners.clear();
            winners.push(seat);
        } else if score == best_score && best_score > 0 {
            winners.push(seat);
        }
    }
    winners
}
