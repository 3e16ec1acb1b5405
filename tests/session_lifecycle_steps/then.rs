//! Then steps for session lifecycle BDD scenarios.

use super::world::{SessionWorld, run_async};
use concierge::session::domain::HistoryEntry;
use eyre::WrapErr;
use rstest_bdd_macros::then;

fn recent(world: &SessionWorld, count: usize) -> Result<Vec<HistoryEntry>, eyre::Report> {
    let id = world.session_id()?;
    run_async(world.manager.get_recent_history(id, count)).wrap_err("read recent history")
}

#[then(r#"the last {count:usize} turns read "{turns}""#)]
fn last_turns_read(world: &SessionWorld, count: usize, turns: String) -> Result<(), eyre::Report> {
    let expected: Vec<&str> = turns.split(" | ").collect();
    let history = recent(world, count)?;
    let actual: Vec<&str> = history.iter().map(HistoryEntry::content).collect();
    if actual != expected {
        return Err(eyre::eyre!("expected turns {expected:?}, found {actual:?}"));
    }
    Ok(())
}

#[then(r#"the speakers are "{roles}""#)]
fn speakers_are(world: &SessionWorld, roles: String) -> Result<(), eyre::Report> {
    let expected: Vec<&str> = roles.split(", ").collect();
    let history = recent(world, expected.len())?;
    let actual: Vec<&str> = history.iter().map(|entry| entry.role().as_str()).collect();
    if actual != expected {
        return Err(eyre::eyre!("expected speakers {expected:?}, found {actual:?}"));
    }
    Ok(())
}

#[then("the history length is {count:usize}")]
fn history_length_is(world: &SessionWorld, count: usize) -> Result<(), eyre::Report> {
    let len = recent(world, usize::MAX)?.len();
    if len != count {
        return Err(eyre::eyre!("expected {count} turns, found {len}"));
    }
    Ok(())
}

#[then("the session is live")]
fn session_is_live(world: &SessionWorld) -> Result<(), eyre::Report> {
    let id = world.session_id()?;
    let session = run_async(world.manager.get_session(id)).wrap_err("get session")?;
    if session.is_none() {
        return Err(eyre::eyre!("session {id} has expired"));
    }
    Ok(())
}

#[then("the session has expired")]
fn session_has_expired(world: &SessionWorld) -> Result<(), eyre::Report> {
    let id = world.session_id()?;
    let live = run_async(world.manager.list_sessions()).wrap_err("list sessions")?;
    if live.contains(id) {
        return Err(eyre::eyre!("session {id} is still live"));
    }
    Ok(())
}

#[then("a cleanup pass removes {count:usize} session")]
fn cleanup_removes(world: &SessionWorld, count: usize) -> Result<(), eyre::Report> {
    let removed = run_async(world.manager.cleanup_expired()).wrap_err("clean up sessions")?;
    if removed != count {
        return Err(eyre::eyre!("expected {count} removed, found {removed}"));
    }
    Ok(())
}
