use tracing::debug;

use super::{HandlerContext, HandlerError};
use crate::net::dispatch::{ArgumentError, BoundArgs};

/// `battle;activate_item;<itemId>[;...]`; trailing client data is ignored
pub async fn activate_item(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    let item = args.raw().first().ok_or(ArgumentError::Missing(0))?.clone();
    ctx.with_battle(|state, username| state.activate_item(username, &item))
}

/// `battle;attempt_to_take_bonus;<bonusKey>`
pub async fn take_bonus(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    let key = args.str(0)?;
    let kind = ctx.with_battle(|state, username| state.claim_bonus(username, key))?;
    debug!(conn = ctx.socket.id(), bonus = %key, kind = kind.key(), "Bonus taken");
    Ok(())
}

/// `battle;mine_hit;<mineKey>`
pub async fn trigger_mine(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    let key = args.str(0)?;
    ctx.with_battle(|state, username| state.trigger_mine(username, key))
}
