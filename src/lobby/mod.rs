//! Battle registry and lifecycle

pub mod manager;

pub use manager::{BattleManager, CreateBattle, LeaveOutcome, ManagerError};
