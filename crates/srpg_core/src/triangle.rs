//! Weapon triangle lookup.
//!
//! Each weapon type carries an advantage and a disadvantage list. For a
//! pairing, the last entry in declaration order that matches the opposing
//! weapon type and whose rank requirement the wielder meets is selected
//! from each list. Both selections apply together.

use serde::{Deserialize, Serialize};

use crate::data::{AdvantageEntry, Database, RankMatch};
use crate::item::Item;
use crate::unit::Unit;

/// Summed triangle deltas for one side of a pairing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriangleBonus {
    /// Added to own accuracy.
    pub accuracy: i32,
    /// Subtracted from opponent accuracy.
    pub avoid: i32,
    /// Added to own crit.
    pub crit: i32,
    /// Subtracted from opponent crit.
    pub dodge: i32,
    /// Added to own might.
    pub damage: i32,
    /// Subtracted from opponent might.
    pub resist: i32,
    /// Added to own attack speed.
    pub attack_speed: i32,
    /// Subtracted from opponent attack speed.
    pub defense_speed: i32,
}

impl TriangleBonus {
    fn with_entry(mut self, entry: &AdvantageEntry) -> Self {
        self.accuracy += entry.accuracy;
        self.avoid += entry.avoid;
        self.crit += entry.crit;
        self.dodge += entry.dodge;
        self.damage += entry.damage;
        self.resist += entry.resist;
        self.attack_speed += entry.attack_speed;
        self.defense_speed += entry.defense_speed;
        self
    }
}

fn rank_satisfied(db: &Database, requirement: &RankMatch, wexp: i32) -> bool {
    match requirement {
        RankMatch::All => true,
        RankMatch::Rank(rank) => db.weapon_rank(rank).is_some_and(|rank| wexp >= rank.requirement),
    }
}

/// Select the advantage (or disadvantage) entry for `unit`'s weapon against
/// `opponent_weapon`. `None` when either side has no typed weapon or nothing
/// qualifies.
#[must_use]
pub fn compute_advantage<'a>(
    db: &'a Database,
    unit: &Unit,
    weapon: Option<&Item>,
    opponent_weapon: Option<&Item>,
    advantage: bool,
) -> Option<&'a AdvantageEntry> {
    let weapon_type = weapon?.weapon_type.as_deref()?;
    let opponent_type = opponent_weapon?.weapon_type.as_deref()?;
    let data = db.weapon_type(weapon_type)?;
    let entries = if advantage { &data.advantage } else { &data.disadvantage };
    let wexp = unit.wexp_for(weapon_type);
    entries
        .iter()
        .rev()
        .find(|entry| entry.weapon_type.matches(opponent_type) && rank_satisfied(db, &entry.weapon_rank, wexp))
}

/// Advantage plus disadvantage contribution for `unit`'s side.
#[must_use]
pub fn triangle_bonus(db: &Database, unit: &Unit, weapon: Option<&Item>, opponent_weapon: Option<&Item>) -> TriangleBonus {
    [true, false]
        .into_iter()
        .filter_map(|advantage| compute_advantage(db, unit, weapon, opponent_weapon, advantage))
        .fold(TriangleBonus::default(), TriangleBonus::with_entry)
}
