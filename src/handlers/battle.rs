use tracing::{debug, trace};

use super::{lobby, raw_payload, HandlerContext, HandlerError};
use crate::net::dispatch::BoundArgs;
use crate::net::payloads::MovePayload;
use crate::net::protocol::{Command, CommandName};

/// `battle;get_init_data_local_tank`: second load stage
pub async fn init_local_tank(ctx: HandlerContext, _args: BoundArgs) -> Result<(), HandlerError> {
    ctx.with_battle(|state, username| state.init_local(username))
}

/// `battle;ping`
///
/// The first ping after the local models marks the end of loading.
pub async fn ping(ctx: HandlerContext, _args: BoundArgs) -> Result<(), HandlerError> {
    if ctx.socket.battle_id().is_some() {
        let entered = ctx.with_battle(|state, username| state.init_battle(username))?;
        if entered {
            debug!(conn = ctx.socket.id(), "Battle load complete");
        }
    }
    ctx.socket.send(Command::new(CommandName::Pong));
    Ok(())
}

/// Movement reports are relayed verbatim as `<client command>;<username>;<payload>`
pub async fn movement(ctx: HandlerContext, args: BoundArgs, relay: CommandName) -> Result<(), HandlerError> {
    let payload = raw_payload(&args);
    let position = match relay {
        CommandName::ClientMove | CommandName::ClientFullMove => MovePayload::position_of(&payload),
        _ => None,
    };
    ctx.with_battle(|state, username| {
        if state.track_movement(username, position)? {
            state.broadcast_except(username, Command::with_args(relay, [username.to_string(), payload]));
        } else {
            trace!(tank = %username, command = %relay.key(), "Movement from a dead tank dropped");
        }
        Ok(())
    })
}

pub async fn ready_to_spawn(ctx: HandlerContext, _args: BoundArgs) -> Result<(), HandlerError> {
    ctx.with_battle(|state, username| state.spawn_tank(username))
}

pub async fn ready_to_respawn(ctx: HandlerContext, _args: BoundArgs) -> Result<(), HandlerError> {
    ctx.with_battle(|state, username| state.respawn(username))
}

pub async fn self_destruct(ctx: HandlerContext, _args: BoundArgs) -> Result<(), HandlerError> {
    ctx.with_battle(|state, username| state.request_self_destruct(username))
}

/// `battle;i_exit_from_battle`
pub async fn exit_from_battle(ctx: HandlerContext, _args: BoundArgs) -> Result<(), HandlerError> {
    if ctx.socket.battle_id().is_none() {
        return Err(HandlerError::NotInBattle);
    }
    lobby::return_to_battle_select(&ctx)
}
