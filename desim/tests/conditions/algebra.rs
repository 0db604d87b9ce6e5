use std::{cell::Cell, rc::Rc};

use desim::{AnyEvent, Environment, SimulationError};

#[test]
fn all_of_completes_with_the_last_child() {
    let env = Environment::new();
    let timeouts: Vec<_> = (0..3)
        .map(|i| env.timeout(f64::from(i)).unwrap())
        .collect();
    let all = env.all_of(&timeouts).unwrap();
    let fired_at = Rc::new(Cell::new(f64::NAN));

    let at = fired_at.clone();
    let waiting = all.clone();
    env.process(move |ctx| async move {
        waiting.await?;
        at.set(ctx.now()?);
        Ok::<_, SimulationError>(())
    });

    env.run().unwrap();
    assert_eq!(fired_at.get(), 2.0);
    let expected: Vec<AnyEvent> = timeouts.iter().map(|t| t.erase()).collect();
    assert_eq!(all.value().unwrap(), expected);
}

#[test]
fn any_of_completes_with_the_first_child() {
    let env = Environment::new();
    let timeouts: Vec<_> = (0..3)
        .map(|i| env.timeout(f64::from(i)).unwrap())
        .collect();
    let any = env.any_of(&timeouts).unwrap();

    assert_eq!(env.run_until_event(&any).unwrap(), desim::RunOutcome::TargetCompleted);
    assert_eq!(env.now(), 0.0);
    assert_eq!(any.value().unwrap(), vec![timeouts[0].erase()]);
}

#[test]
fn processes_joined_by_all_of() {
    let env = Environment::new();
    let short = env.process(|ctx| async move {
        ctx.timeout(3.0)?.await?;
        Ok::<_, SimulationError>("short")
    });
    let long = env.process(|ctx| async move {
        ctx.timeout(7.0)?.await?;
        Ok::<_, SimulationError>("long")
    });

    let (a, b) = (short.clone(), long.clone());
    let joiner = env.process(move |ctx| async move {
        let both = ctx.env().upgrade()?.all_of([a.erase(), b.erase()])?;
        let fired = both.await?;
        Ok::<_, SimulationError>((ctx.now()?, fired))
    });

    env.run().unwrap();
    let (now, fired) = joiner.value().unwrap().unwrap();
    assert_eq!(now, 7.0);
    assert_eq!(fired, vec![short.erase(), long.erase()]);
    assert_eq!(fired[1].value::<Result<&str, SimulationError>>(), Some(Ok("long")));
}

#[test]
fn children_of_different_types_mix() {
    let env = Environment::new();
    let count = env.timeout_with(1.0, 42_u32).unwrap();
    let label = env.timeout_with(2.0, "label".to_string()).unwrap();
    let both = count.and(&label).unwrap();

    env.run().unwrap();
    let fired = both.value().unwrap();
    assert_eq!(fired[0].value::<u32>(), Some(42));
    assert_eq!(fired[1].value::<String>(), Some("label".to_string()));
    assert_eq!(fired[0].value::<String>(), None);
}

#[test]
fn duplicate_children_are_kept_positionally() {
    let env = Environment::new();
    let t = env.timeout(1.0).unwrap();
    let twice = t.and(&t).unwrap();

    env.run().unwrap();
    assert_eq!(twice.value().unwrap(), vec![t.erase(), t.erase()]);
}

#[test]
fn failed_children_never_enter_the_result() {
    let env = Environment::new();
    let broken = env.event::<()>();
    let slow = env.timeout(5.0).unwrap();
    let either = broken.or(&slow).unwrap();

    let trigger = broken.clone();
    env.process(move |ctx| async move {
        ctx.timeout(1.0)?.await?;
        trigger.fail(())
    });

    env.run_until(2.0).unwrap();
    assert!(broken.is_failed());
    assert!(either.is_pending());

    env.run().unwrap();
    assert_eq!(either.value().unwrap(), vec![slow.erase()]);
}

#[test]
fn custom_predicate_sees_child_states() {
    let env = Environment::new();
    let timeouts: Vec<_> = [1.0, 4.0, 6.0]
        .into_iter()
        .map(|delay| env.timeout(delay).unwrap())
        .collect();
    let two_of_three = env
        .condition(&timeouts, |view| {
            (0..view.len()).filter(|&i| view.succeeded(i)).count() >= 2
        })
        .unwrap();

    env.run_until_event(&two_of_three).unwrap();
    assert_eq!(env.now(), 4.0);
    assert_eq!(
        two_of_three.value().unwrap(),
        vec![timeouts[0].erase(), timeouts[1].erase()]
    );
}

#[test]
fn custom_predicate_can_react_to_failures() {
    let env = Environment::new();
    let job = env.event::<u32>();
    let deadline = env.timeout(10.0).unwrap();
    let settled = env
        .condition([job.erase(), deadline.erase()], |view| {
            view.any_failed() || view.any_succeeded()
        })
        .unwrap();

    let trigger = job.clone();
    env.process(move |ctx| async move {
        ctx.timeout(3.0)?.await?;
        trigger.fail(500)
    });

    env.run_until_event(&settled).unwrap();
    assert_eq!(env.now(), 3.0);
    assert!(settled.value().unwrap().is_empty());
}

#[test]
fn condition_already_satisfied_fires_immediately() {
    let env = Environment::new();
    let early = env.timeout(1.0).unwrap();
    let late = env.timeout(5.0).unwrap();
    env.run_until(2.0).unwrap();

    let any = early.or(&late).unwrap();
    env.run_until(2.0).unwrap();
    assert!(any.is_succeeded());
    assert_eq!(any.value().unwrap(), vec![early.erase()]);
}
