use desim::{Environment, RunOutcome, SimulationError};

#[test]
fn run_reports_exhaustion_and_ends_the_environment() {
    let env = Environment::new();
    env.timeout(3.0).unwrap();

    assert_eq!(env.run().unwrap(), RunOutcome::Exhausted);
    assert!(env.is_ended());
    assert_eq!(env.run().unwrap_err(), SimulationError::EnvironmentEnded);
    assert_eq!(
        env.run_until(10.0).unwrap_err(),
        SimulationError::EnvironmentEnded
    );
}

#[test]
fn run_without_work_is_rejected() {
    let env = Environment::new();
    assert_eq!(env.run().unwrap_err(), SimulationError::UnboundedRun);
    assert!(!env.is_ended());
}

#[test]
fn run_until_an_unreachable_event_is_rejected() {
    let env = Environment::new();
    let never = env.event::<()>();

    assert_eq!(
        env.run_until_event(&never).unwrap_err(),
        SimulationError::UnboundedRun
    );
    assert!(!env.is_ended());
    assert!(never.is_pending());

    never.succeed(()).unwrap();
    assert_eq!(
        env.run_until_event(&never).unwrap(),
        RunOutcome::TargetCompleted
    );
}

#[test]
fn run_until_stops_at_the_horizon() {
    let env = Environment::new();
    let early = env.timeout(2.0).unwrap();
    let on_edge = env.timeout(5.0).unwrap();
    let late = env.timeout(8.0).unwrap();

    assert_eq!(env.run_until(5.0).unwrap(), RunOutcome::HorizonReached);
    assert_eq!(env.now(), 5.0);
    assert!(early.is_succeeded());
    assert!(on_edge.is_succeeded());
    assert!(!late.is_succeeded());

    assert_eq!(env.run_until(20.0).unwrap(), RunOutcome::Exhausted);
    assert!(late.is_succeeded());
    assert_eq!(env.now(), 8.0);
}

#[test]
fn run_until_with_an_idle_agenda_moves_the_clock() {
    let env = Environment::new();
    env.timeout(1.0).unwrap();
    env.timeout(10.0).unwrap();

    assert_eq!(env.run_until(4.0).unwrap(), RunOutcome::HorizonReached);
    assert_eq!(env.now(), 4.0);
}

#[test]
fn horizon_in_the_past_is_rejected() {
    let env = Environment::new();
    env.timeout(5.0).unwrap();
    env.timeout(10.0).unwrap();
    env.run_until(5.0).unwrap();

    assert_eq!(
        env.run_until(3.0).unwrap_err(),
        SimulationError::InvalidHorizon {
            until: 3.0,
            now: 5.0
        }
    );
}

#[test]
fn run_until_event_stops_when_the_target_completes() {
    let env = Environment::new();
    let target = env.timeout(4.0).unwrap();
    let after = env.timeout(9.0).unwrap();

    assert_eq!(
        env.run_until_event(&target).unwrap(),
        RunOutcome::TargetCompleted
    );
    assert_eq!(env.now(), 4.0);
    assert!(!after.is_succeeded());
}

#[test]
fn run_until_a_failed_event_reports_it() {
    let env = Environment::new();
    let target = env.event::<&str>();
    let trigger = target.clone();
    env.process(move |ctx| async move {
        ctx.timeout(2.0)?.await?;
        trigger.fail("boom")?;
        Ok::<_, SimulationError>(())
    });

    assert_eq!(
        env.run_until_event(&target).unwrap_err(),
        SimulationError::TargetFailed
    );
    assert!(target.is_failed());
    assert_eq!(env.now(), 2.0);
}

#[test]
fn run_until_event_from_another_environment_is_rejected() {
    let env = Environment::new();
    let other = Environment::new();
    let foreign = other.timeout(1.0).unwrap();
    env.timeout(1.0).unwrap();

    assert_eq!(
        env.run_until_event(&foreign).unwrap_err(),
        SimulationError::ForeignEnvironment
    );
}

#[test]
fn invalid_delays_fail_fast() {
    let env = Environment::new();
    for delay in [-1.0, f64::NAN, f64::INFINITY] {
        assert!(matches!(
            env.timeout(delay),
            Err(SimulationError::InvalidDelay(_))
        ));
    }
    assert_eq!(env.pending_count(), 0);
}

#[test]
fn step_processes_one_item_at_a_time() {
    let env = Environment::new();
    env.timeout(1.0).unwrap();
    env.timeout(2.0).unwrap();

    assert!(env.step().unwrap());
    assert_eq!(env.now(), 1.0);
    assert!(!env.step().unwrap());
    assert_eq!(env.now(), 2.0);
    assert_eq!(env.events_processed(), 2);
}

#[test]
fn running_from_inside_a_process_is_rejected() {
    let env = Environment::new();
    let weak = env.downgrade();
    let nested = env.process(move |_ctx| async move {
        let env = weak.upgrade()?;
        env.run_until(10.0).map(|_| ())
    });

    env.run().unwrap();
    assert_eq!(nested.value(), Some(Err(SimulationError::ReentrantRun)));
}
