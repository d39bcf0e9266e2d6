//! Per-battle rule switches

use serde::{Deserialize, Serialize};

/// Typed battle properties; fixed at creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleProperties {
    pub damage_enabled: bool,
    pub friendly_fire: bool,
    pub self_damage_enabled: bool,
    pub instant_self_destruct: bool,
    pub supplies_cooldown_enabled: bool,
    pub deactivate_mines_on_death: bool,
    pub parkour_mode: bool,
    pub rearming_enabled: bool,
    pub bonuses_enabled: bool,
    pub min_rank: u8,
    pub max_rank: u8,
    pub max_people: usize,
    pub time_limit_secs: u32,
    pub score_limit: u32,
}

impl Default for BattleProperties {
    fn default() -> Self {
        Self {
            damage_enabled: true,
            friendly_fire: false,
            self_damage_enabled: true,
            instant_self_destruct: false,
            supplies_cooldown_enabled: true,
            deactivate_mines_on_death: true,
            parkour_mode: false,
            rearming_enabled: true,
            bonuses_enabled: true,
            min_rank: 1,
            max_rank: 30,
            max_people: 16,
            time_limit_secs: 0,
            score_limit: 0,
        }
    }
}

impl BattleProperties {
    /// Apply the overrides parkour mode implies
    pub fn normalized(mut self) -> Self {
        if self.parkour_mode {
            self.damage_enabled = false;
            self.instant_self_destruct = true;
            self.supplies_cooldown_enabled = false;
        }
        if self.min_rank > self.max_rank {
            std::mem::swap(&mut self.min_rank, &mut self.max_rank);
        }
        self.max_people = self.max_people.max(1);
        self
    }

    pub fn allows_rank(&self, rank: u8) -> bool {
        (self.min_rank..=self.max_rank).contains(&rank)
    }
}
