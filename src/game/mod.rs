pub mod battle;
pub mod bonus;
pub mod combat;
pub mod constants;
pub mod damage;
pub mod effects;
pub mod mines;
pub mod modes;
pub mod player;
pub mod properties;
pub mod tank;
pub mod timers;
pub mod weapons;

pub use battle::{Battle, BattleError, BattleId, BattleInfo, BattleServices, BattleState, BattleSummary, BattleTimings};
pub use modes::BattleMode;
pub use player::{BattlePlayer, Team};
pub use properties::BattleProperties;
pub use tank::TankState;
