use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use tick_prediction::config::SimulationConfig;
use tick_prediction::game::{Actions, ReconcileOutcome};
use tick_prediction::netsim::{LinkConditions, LoopbackSession};

fn random_movement(rng: &mut ChaCha8Rng, ticks: usize) -> Vec<Actions> {
    (0..ticks)
        .map(|_| Actions {
            forward: rng.gen_bool(0.5),
            backward: rng.gen_bool(0.2),
            strafe_left: rng.gen_bool(0.3),
            strafe_right: rng.gen_bool(0.3),
            primary: false,
        })
        .collect()
}

fn assert_pruning_invariant(session: &LoopbackSession) {
    let predictor = session.predictor();
    let history = predictor.history();
    assert_eq!(history.input_ticks(), history.state_ticks());
    if let Some(acked) = predictor.last_reconciled() {
        assert!(history.input_ticks().iter().all(|t| *t > acked));
    }
}

#[test]
fn latency_without_loss_never_corrects() {
    let config = SimulationConfig::default();
    let link = LinkConditions::delayed(4);
    let mut session = LoopbackSession::new(&config, link, link, 11);
    let mut rng = ChaCha8Rng::seed_from_u64(11);

    session.queue_actions(random_movement(&mut rng, 200));
    for _ in 0..200 {
        let report = session.step();
        for outcome in &report.outcomes {
            assert!(matches!(outcome, ReconcileOutcome::Confirmed { .. }), "{:?}", outcome);
        }
        assert_pruning_invariant(&session);
    }

    // Drain the links
    session.run(20);

    let authority = session.authority_state().unwrap();
    assert_eq!(session.predictor().corrections(), 0);
    assert_eq!(session.owner_position(), authority.position);
    assert_eq!(session.replicated_state().position, authority.position);
}

#[test]
fn lossy_jittery_session_converges_once_idle() {
    let config = SimulationConfig::default();
    let link = LinkConditions {
        latency: 2,
        jitter: 3,
        loss: 0.2,
    };
    let mut session = LoopbackSession::new(&config, link, link, 2024);
    let mut rng = ChaCha8Rng::seed_from_u64(2024);

    session.queue_actions(random_movement(&mut rng, 300));
    let mut stale = 0;
    for _ in 0..360 {
        let report = session.step();
        stale += report.outcomes.iter().filter(|o| o.is_stale()).count();
        assert_pruning_invariant(&session);
    }

    let authority = session.authority_state().unwrap();
    let owner = session.owner_position();
    assert!(
        owner.distance_squared(&authority.position) < config.position_epsilon_sq,
        "owner {:?} vs authority {:?}",
        owner,
        authority.position
    );

    assert!(session.predictor().corrections() > 0);
    assert!(session.uplink().stats().dropped > 0);
    assert!(stale > 0, "jitter should have reordered some authoritative updates");
}

#[test]
fn reference_authority_accepts_reordered_inputs() {
    let config = SimulationConfig {
        reject_stale_inputs: false,
        ..Default::default()
    };
    let uplink = LinkConditions {
        latency: 1,
        jitter: 4,
        loss: 0.0,
    };
    let mut session = LoopbackSession::new(&config, uplink, LinkConditions::perfect(), 5);
    let mut rng = ChaCha8Rng::seed_from_u64(5);

    session.queue_actions(random_movement(&mut rng, 100));
    let reports = session.run(140);

    // Without hardening every input is eventually applied
    let rejected: usize = reports.iter().map(|r| r.inputs_rejected).sum();
    let applied: usize = reports.iter().map(|r| r.inputs_applied).sum();
    assert_eq!(rejected, 0);
    assert_eq!(applied, 140 - session.uplink().in_flight());

    let authority = session.authority_state().unwrap();
    assert!(session.owner_position().distance_squared(&authority.position) < config.position_epsilon_sq);
}

#[test]
fn outage_then_recovery_snaps_owner_back() {
    let config = SimulationConfig::default();
    let mut session = LoopbackSession::new(&config, LinkConditions::perfect(), LinkConditions::perfect(), 9);
    let outage = LinkConditions {
        latency: 0,
        jitter: 0,
        loss: 1.0,
    };
    let spawn = session.owner_position();

    session.set_uplink(outage);
    session.set_downlink(outage);
    session.queue_actions(vec![
        Actions {
            forward: true,
            ..Default::default()
        };
        60
    ]);
    let reports = session.run(60);
    assert!(reports.iter().all(|r| r.outcomes.is_empty()));
    assert!(session.owner_position().z > spawn.z);

    // Nothing moved on the authority: the first update after recovery snaps back
    session.set_uplink(LinkConditions::perfect());
    session.set_downlink(LinkConditions::perfect());
    session.run(30);

    assert!(session.predictor().corrections() > 0);
    assert_eq!(session.owner_position(), spawn);
    assert_eq!(session.authority_state().unwrap().position, spawn);
    assert_pruning_invariant(&session);
}
