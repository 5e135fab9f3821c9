use chrono::{DateTime, Utc};
use quiz_types::{LobbyError, PowerupKind, Question};
use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use std::collections::BTreeMap;

/// Power-up units each member starts a session with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerupAllowance {
    counts: BTreeMap<PowerupKind, u32>,
}

impl Default for PowerupAllowance {
    fn default() -> Self {
        Self {
            counts: PowerupKind::ALL.iter().map(|kind| (*kind, 1)).collect(),
        }
    }
}

impl PowerupAllowance {
    pub fn none() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    pub fn with(mut self, kind: PowerupKind, count: u32) -> Self {
        self.counts.insert(kind, count);
        self
    }

    pub fn inventory(&self) -> BTreeMap<PowerupKind, u32> {
        self.counts.clone()
    }
}

/// What activating a power-up did to the round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerupEffect {
    DoublePointsArmed,
    Hint { options: Vec<String> },
    TimeExtended { deadline: DateTime<Utc> },
}

pub fn ensure_available(
    inventory: &BTreeMap<PowerupKind, u32>,
    kind: PowerupKind,
) -> Result<(), LobbyError> {
    match inventory.get(&kind) {
        Some(count) if *count > 0 => Ok(()),
        _ => Err(LobbyError::invalid_input(format!(
            "no {:?} power-ups remaining",
            kind
        ))),
    }
}

pub fn consume(inventory: &mut BTreeMap<PowerupKind, u32>, kind: PowerupKind) {
    if let Some(count) = inventory.get_mut(&kind) {
        *count = count.saturating_sub(1);
    }
}

/// Narrows a multiple-choice question to the correct option plus one decoy.
pub fn hint_options<R: Rng + ?Sized>(question: &Question, rng: &mut R) -> Option<Vec<String>> {
    let correct = question
        .options
        .iter()
        .find(|option| question.is_correct(option))?;
    let decoys: Vec<&String> = question
        .options
        .iter()
        .filter(|option| !question.is_correct(option))
        .collect();
    let decoy = decoys.choose(rng)?;

    let mut options = vec![correct.clone(), (*decoy).clone()];
    options.shuffle(rng);
    Some(options)
}
