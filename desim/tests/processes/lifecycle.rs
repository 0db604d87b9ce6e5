use desim::{Environment, SimulationError};

#[test]
fn suspended_process_waits_for_resume() {
    let env = Environment::new();
    let sleeper = env.process(|ctx| async move {
        let wake = ctx.suspend()?;
        wake.await?;
        ctx.now()
    });

    let target = sleeper.clone();
    let waker = env.process(move |ctx| async move {
        ctx.timeout(5.0)?.await?;
        let first = target.resume()?;
        let second = target.resume()?;
        Ok::<_, SimulationError>((first, second))
    });

    env.run().unwrap();
    assert_eq!(sleeper.value(), Some(Ok(5.0)));
    assert_eq!(waker.value(), Some(Ok((true, false))));
}

#[test]
fn resume_after_delays_the_wake_up() {
    let env = Environment::new();
    let sleeper = env.process(|ctx| async move {
        ctx.suspend()?.await?;
        ctx.now()
    });

    let target = sleeper.clone();
    env.process(move |ctx| async move {
        ctx.timeout(1.0)?.await?;
        target.resume_after(3.0)
    });

    env.run().unwrap();
    assert_eq!(sleeper.value(), Some(Ok(4.0)));
}

#[test]
fn resuming_a_running_process_is_a_no_op() {
    let env = Environment::new();
    let busy = env.process(|ctx| async move {
        ctx.timeout(10.0)?.await?;
        Ok::<_, SimulationError>(())
    });
    env.run_until(1.0).unwrap();

    assert!(!busy.resume().unwrap());
    assert!(busy.is_alive());
}

#[test]
fn delayed_process_starts_later() {
    let env = Environment::new();
    let late = env
        .delayed_process(4.0, |ctx| async move { ctx.now() })
        .unwrap();

    env.run_until(3.0).unwrap();
    assert!(late.is_alive());
    env.run().unwrap();
    assert_eq!(late.value(), Some(Ok(4.0)));
    assert!(!late.is_alive());
}

#[test]
fn delayed_process_rejects_invalid_delays() {
    let env = Environment::new();
    let result = env.delayed_process(-2.0, |_ctx| async move {});
    assert_eq!(result.unwrap_err(), SimulationError::InvalidDelay(-2.0));
}

#[test]
fn active_process_is_only_set_while_a_body_runs() {
    let env = Environment::new();
    assert_eq!(env.active_process(), None);

    let weak = env.downgrade();
    let probe = env.process(move |ctx| async move {
        let seen = weak.upgrade()?.active_process();
        Ok::<_, SimulationError>(seen == Some(ctx.id()))
    });

    env.run().unwrap();
    assert_eq!(probe.value(), Some(Ok(true)));
    assert_eq!(env.active_process(), None);
}

#[test]
fn awaiting_a_foreign_future_is_reported() {
    let env = Environment::new();
    let stuck = env.process(|_ctx| async move {
        std::future::pending::<()>().await;
    });

    assert_eq!(
        env.run().unwrap_err(),
        SimulationError::ForeignAwait {
            process: stuck.id().index() as u64
        }
    );
}
