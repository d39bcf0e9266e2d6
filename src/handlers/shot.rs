//! Weapon commands; the fire payload is handed to the battle as the raw JSON text

use super::{raw_payload, HandlerContext, HandlerError};
use crate::net::dispatch::BoundArgs;

pub async fn start_fire(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    let payload = raw_payload(&args);
    ctx.with_battle(|state, shooter| state.start_fire(shooter, &payload))
}

pub async fn fire(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    let payload = raw_payload(&args);
    ctx.with_battle(|state, shooter| state.fire(shooter, &payload))
}

pub async fn fire_static(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    let payload = raw_payload(&args);
    ctx.with_battle(|state, shooter| state.fire_static(shooter, &payload))
}

pub async fn fire_target(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    let payload = raw_payload(&args);
    ctx.with_battle(|state, shooter| state.fire_target(shooter, &payload))
}

pub async fn stop_fire(ctx: HandlerContext, _args: BoundArgs) -> Result<(), HandlerError> {
    ctx.with_battle(|state, shooter| state.stop_fire(shooter))
}

pub async fn set_target(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    let payload = raw_payload(&args);
    ctx.with_battle(|state, shooter| state.set_target(shooter, &payload))
}

pub async fn reset_target(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    let payload = raw_payload(&args);
    ctx.with_battle(|state, shooter| state.reset_target(shooter, &payload))
}

pub async fn enter_sniping(ctx: HandlerContext, _args: BoundArgs) -> Result<(), HandlerError> {
    ctx.with_battle(|state, shooter| state.enter_sniping_mode(shooter))
}

pub async fn exit_sniping(ctx: HandlerContext, _args: BoundArgs) -> Result<(), HandlerError> {
    ctx.with_battle(|state, shooter| state.exit_sniping_mode(shooter))
}

/// Shaft shot fired from the scope
pub async fn fire_sniping(ctx: HandlerContext, args: BoundArgs) -> Result<(), HandlerError> {
    let payload = raw_payload(&args);
    ctx.with_battle(|state, shooter| state.fire_sniping(shooter, &payload))
}
