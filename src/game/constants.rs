/// Tank constants
pub mod tank {
    /// Full health in client health units
    pub const MAX_HEALTH: f64 = 10_000.0;
    /// Health units removed per point of weapon damage
    pub const HEALTH_PER_DAMAGE: f64 = 30.0;
    /// Placement height above a spawn point
    pub const SPAWN_HEIGHT_OFFSET: f64 = 200.0;
    /// Position of a freshly created tank before placement
    pub const INITIAL_HEIGHT: f64 = 1000.0;
}

/// Damage and weapon constants
pub mod damage {
    /// World units to meters for weakening/splash radii
    pub const TO_METERS: f64 = 0.01;
    /// Each further rail hit deals ceil(previous * falloff)
    pub const RAILGUN_CHAIN_FALLOFF: f64 = 0.5;
    pub const ISIDA_DAMAGE: f64 = 20.0;
    pub const ISIDA_HEAL: f64 = 20.0;
    pub const ISIDA_SELF_HEAL: f64 = 10.0;
    pub const SHAFT_SNIPING_DAMAGE: f64 = 150.0;
    pub const MINE_DAMAGE: f64 = 80.0;
}

/// Supply effects
pub mod effects {
    pub const REPAIR_KIT_HEAL: f64 = 150.0;
    pub const REPAIR_KIT_DURATION_SECS: u64 = 2;
    pub const BOOST_DURATION_SECS: u64 = 55;
    pub const COOLDOWN_SECS: u64 = 20;
    pub const DOUBLE_MULTIPLIER: f64 = 2.0;
    pub const NITRO_SPEED_MULTIPLIER: f64 = 1.3;
    /// Supply count shown for every inventory slot
    pub const INVENTORY_COUNT: u32 = 100;
}

/// Bonus boxes
pub mod bonus {
    pub const SUPPLY_LIFETIME_SECS: u64 = 20;
    pub const CRYSTAL_LIFETIME_SECS: u64 = 15 * 60;
    pub const GOLD_LIFETIME_SECS: u64 = 10 * 60;
    pub const CRYSTAL_REWARD: i64 = 10;
    pub const GOLD_REWARD: i64 = 1000;
    /// Height above the bonus point a box is dropped from
    pub const DROP_HEIGHT: f64 = 0.0;
}

/// Mine model sent to clients
pub mod mines {
    pub const ACTIVATION_TIME_MS: u64 = 1000;
    pub const MIN_DAMAGE: u32 = 120;
    pub const MAX_DAMAGE: u32 = 240;
    pub const RADIUS: f64 = 0.5;
    pub const IMPACT_FORCE: f64 = 3.0;
    pub const NEAR_VISIBILITY_RADIUS: f64 = 7.0;
    pub const FAR_VISIBILITY_RADIUS: f64 = 10.0;
    pub const MIN_DISTANCE_FROM_BASE: f64 = 5.0;
}

/// Scoring
pub mod scoring {
    pub const KILL_SCORE: u32 = 10;
    pub const FUND_PER_KILL: u32 = 4;
}

/// Capture the flag
pub mod ctf {
    /// Flags float above their pedestal/drop point
    pub const FLAG_OFFSET_Z: f64 = 80.0;
}

/// Control points
pub mod dom {
    pub const MINE_ACTIVATION_RADIUS: f64 = 5.0;
}

/// Network constants
pub mod net {
    /// Default bytes buffered without a delimiter before teardown
    pub const MAX_FRAME_SIZE: usize = 64 * 1024;
    /// Bytes requested per socket read
    pub const READ_CHUNK_SIZE: usize = 8 * 1024;
    /// Client kick period advertised in the battle model
    pub const KICK_PERIOD_MS: u64 = 125_000;
    pub const INVISIBLE_TIME_MS: u64 = 3_500;
}
