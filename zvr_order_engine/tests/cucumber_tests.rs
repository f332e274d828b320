mod cucumber;
mod support;

use ::cucumber::{codegen::LocalBoxFuture, event::ScenarioFinished, gherkin, writer, World};
use futures_util::FutureExt;
use log::*;
use tokio::runtime::Runtime;

use crate::cucumber::StoreWorld;

fn main() {
    dotenvy::from_filename(".env.test").ok();
    env_logger::init();
    let sys = Runtime::new().unwrap();
    sys.block_on(
        StoreWorld::cucumber()
            .with_writer(writer::Libtest::or_basic())
            .after(|_f, _r, scenario, ev, w| post_test_hook(scenario, ev, w))
            .run("tests/features"),
    );
    info!("🚀️ Tests complete");
}

fn post_test_hook<'a>(
    scenario: &'a gherkin::Scenario,
    ev: &'a ScenarioFinished,
    world: Option<&'a mut StoreWorld>,
) -> LocalBoxFuture<'a, ()> {
    let fut = async move {
        trace!("🚀️ After-scenario hook running for \"{}\"", scenario.name);
        let Some(sys) = world.and_then(|w| w.system.take()) else {
            warn!("🚀️ No store was set up. Nothing to clean up.");
            return;
        };
        match ev {
            ScenarioFinished::StepFailed(_, _, _) | ScenarioFinished::StepSkipped => {
                error!("🚀️ Error in scenario, database retained: {}", sys.db.url());
            },
            ScenarioFinished::StepPassed => {
                debug!("🚀️ Scenario complete, removing database: {}", sys.db.url());
                sys.tear_down().await;
            },
            _ => trace!("🚀️ Unhandled event: {ev:?}"),
        }
        trace!("🚀️ After-scenario hook complete");
    };
    fut.boxed_local()
}
