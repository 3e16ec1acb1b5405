//! Given steps for session lifecycle BDD scenarios.

use std::time::Duration;

use super::world::{SessionWorld, run_async};
use concierge::protocol::domain::SessionId;
use eyre::WrapErr;
use rstest_bdd_macros::given;

#[given("sessions live for {minutes:u64} minutes")]
fn sessions_live_for(world: &mut SessionWorld, minutes: u64) {
    world.set_ttl(Duration::from_secs(minutes.saturating_mul(60)));
}

#[given(r#"a fresh session "{id}""#)]
fn fresh_session(world: &mut SessionWorld, id: String) -> Result<(), eyre::Report> {
    let session_id = SessionId::new(id);
    let session = run_async(world.manager.get_or_create_session(&session_id))
        .wrap_err("create session")?;
    if !session.history().is_empty() {
        return Err(eyre::eyre!("expected an empty history on a fresh session"));
    }
    world.session_id = Some(session_id);
    Ok(())
}
