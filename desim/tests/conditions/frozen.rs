use desim::{Environment, SimulationError};

#[test]
fn or_of_and_keeps_its_first_result() {
    let env = Environment::new();
    let a = env.event::<()>();
    let b = env.event::<()>();
    let c = env.event::<()>();
    let bc = b.and(&c).unwrap();
    let cond = a.or(&bc).unwrap();

    let (ta, tb, tc) = (a.clone(), b.clone(), c.clone());
    env.process(move |ctx| async move {
        ta.succeed(())?;
        ctx.timeout(1.0)?.await?;
        tb.succeed(())?;
        tc.succeed(())?;
        Ok::<_, SimulationError>(())
    });

    env.run_until(0.5).unwrap();
    assert_eq!(cond.value().unwrap(), vec![a.erase()]);

    env.run().unwrap();
    assert!(bc.is_succeeded());
    assert_eq!(bc.value().unwrap(), vec![b.erase(), c.erase()]);
    assert_eq!(cond.value().unwrap(), vec![a.erase()]);
}

#[test]
fn nested_condition_contributes_only_itself() {
    let env = Environment::new();
    let x = env.timeout(1.0).unwrap();
    let y = env.timeout(2.0).unwrap();
    let z = env.timeout(3.0).unwrap();
    let xy = x.and(&y).unwrap();
    let all = xy.and(&z).unwrap();

    env.run().unwrap();
    assert_eq!(all.value().unwrap(), vec![xy.erase(), z.erase()]);
}

#[test]
fn later_completions_do_not_change_a_fired_any_of() {
    let env = Environment::new();
    let timeouts: Vec<_> = (1..=4)
        .map(|i| env.timeout(f64::from(i)).unwrap())
        .collect();
    let any = env.any_of(&timeouts).unwrap();

    env.run().unwrap();
    assert!(timeouts.iter().all(|t| t.is_succeeded()));
    assert_eq!(any.value().unwrap(), vec![timeouts[0].erase()]);
}

#[test]
fn conditions_cannot_be_triggered_by_hand() {
    let env = Environment::new();
    let t = env.timeout(1.0).unwrap();
    let cond = t.or(&t).unwrap();
    assert_eq!(
        cond.succeed(Vec::new()).unwrap_err(),
        SimulationError::NotTriggerable
    );
}

#[test]
fn children_from_another_environment_are_rejected() {
    let env = Environment::new();
    let other = Environment::new();
    let mine = env.timeout(1.0).unwrap();
    let theirs = other.timeout(1.0).unwrap();

    assert_eq!(
        mine.and(&theirs).unwrap_err(),
        SimulationError::ForeignEnvironment
    );
}
