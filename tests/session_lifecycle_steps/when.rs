//! When steps for session lifecycle BDD scenarios.

use std::time::Duration;

use super::world::{SessionWorld, run_async};
use concierge::session::domain::{HistoryEntry, HistoryRole};
use eyre::WrapErr;
use rstest_bdd_macros::when;

fn record_turn(world: &SessionWorld, role: HistoryRole, text: &str) -> Result<(), eyre::Report> {
    let id = world.session_id()?;
    let entry = HistoryEntry::new(role, text, &world.clock);
    run_async(world.manager.add_to_history(id, entry))
        .wrap_err_with(|| format!("record {} turn", role.as_str()))
}

#[when(r#"the caller says "{text}""#)]
fn caller_says(world: &mut SessionWorld, text: String) -> Result<(), eyre::Report> {
    record_turn(world, HistoryRole::Caller, &text)
}

#[when(r#"the agent replies "{text}""#)]
fn agent_replies(world: &mut SessionWorld, text: String) -> Result<(), eyre::Report> {
    record_turn(world, HistoryRole::Agent, &text)
}

#[when("{minutes:u64} minutes pass")]
fn minutes_pass(world: &SessionWorld, minutes: u64) {
    world
        .clock
        .advance(Duration::from_secs(minutes.saturating_mul(60)));
}

#[when("the session is looked up again")]
fn session_looked_up_again(world: &mut SessionWorld) -> Result<(), eyre::Report> {
    let id = world.session_id()?.clone();
    run_async(world.manager.get_or_create_session(&id)).wrap_err("look up session")?;
    Ok(())
}
