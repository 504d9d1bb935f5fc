use commission_engine::db_types::{CommissionRate, NewPartner};
use cucumber::given;

use crate::cucumber::{world::CommissionSystem, CommissionWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut CommissionWorld) {
    let system = CommissionSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "an active partner '{word}' with a commission rate of {int} basis points")]
async fn active_partner(world: &mut CommissionWorld, name: String, bps: i64) {
    let rate = CommissionRate::from_bps(bps).expect("Invalid commission rate");
    let email = format!("{}@example.com", name.to_lowercase());
    let partner = NewPartner::new(name.clone(), email).with_commission_rate(rate);
    let sys = world.system();
    let partner = sys.partners.register_partner(partner).await.expect("Error registering partner");
    let partner = sys.partners.activate(partner.id).await.expect("Error activating partner");
    world.partners.insert(name, partner);
}
