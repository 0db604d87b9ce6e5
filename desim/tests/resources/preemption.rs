use desim::{Environment, Preempted, SimulationError};

#[test]
fn urgent_request_evicts_the_holder_and_notifies_it() {
    let env = Environment::new();
    let machine = env.preemptive_resource(1).unwrap();

    let res = machine.clone();
    let low = env.process(move |ctx| async move {
        let job = res.request_with_priority(5.0)?;
        (&job).await?;
        match ctx.timeout(10.0)?.await {
            Ok(_) => Ok::<_, SimulationError>(None),
            Err(err) if err.is_interrupted() => {
                let notice = ctx.preempted().ok_or(SimulationError::Interrupted)?;
                assert!(!job.is_granted());
                drop(job);

                let retry = res.request_with_priority(5.0)?;
                (&retry).await?;
                Ok(Some((notice, ctx.now()?)))
            }
            Err(err) => Err(err.into()),
        }
    });

    let res = machine.clone();
    let high = env.process(move |ctx| async move {
        ctx.timeout(2.0)?.await?;
        let job = res.request_with_priority(0.0)?;
        (&job).await?;
        let granted = ctx.now()?;
        ctx.timeout(3.0)?.await?;
        Ok::<_, SimulationError>(granted)
    });

    env.run().unwrap();
    assert_eq!(high.value(), Some(Ok(2.0)));
    assert_eq!(
        low.value(),
        Some(Ok(Some((
            Preempted {
                by: Some(high.id()),
                usage_since: 0.0
            },
            5.0
        ))))
    );
    assert_eq!(machine.count(), 0);
}

#[test]
fn usage_since_is_the_grant_time_of_the_victim() {
    let env = Environment::new();
    let machine = env.preemptive_resource(1).unwrap();
    let blocker = machine.request_with_priority(1.0).unwrap();
    let _keep_running = env.timeout(50.0).unwrap();

    let res = machine.clone();
    let victim = env.process(move |ctx| async move {
        let job = res.request_with(3.0, false)?;
        (&job).await?;
        let granted = ctx.now()?;
        match ctx.timeout(100.0)?.await {
            Ok(_) => Ok::<_, SimulationError>(None),
            Err(_) => Ok(ctx.preempted().map(|notice| (granted, notice))),
        }
    });

    env.run_until(1.0).unwrap();
    drop(blocker);
    env.run_until(6.0).unwrap();

    // Issued outside any process, so the notice names no preemptor.
    let urgent = machine.request_with_priority(0.0).unwrap();
    assert!(urgent.is_granted());
    env.run_until(7.0).unwrap();

    assert_eq!(
        victim.value(),
        Some(Ok(Some((
            1.0,
            Preempted {
                by: None,
                usage_since: 1.0
            }
        ))))
    );
}

#[test]
fn non_preempting_urgent_request_waits_its_turn() {
    let env = Environment::new();
    let machine = env.preemptive_resource(1).unwrap();

    let res = machine.clone();
    let holder = env.process(move |ctx| async move {
        let job = res.request_with_priority(9.0)?;
        (&job).await?;
        ctx.timeout(5.0)?.await?;
        Ok::<_, SimulationError>(ctx.now()?)
    });

    let res = machine.clone();
    let polite = env.process(move |ctx| async move {
        ctx.timeout(1.0)?.await?;
        let job = res.request_with(0.0, false)?;
        (&job).await?;
        Ok::<_, SimulationError>(ctx.now()?)
    });

    env.run().unwrap();
    assert_eq!(holder.value(), Some(Ok(5.0)));
    assert_eq!(polite.value(), Some(Ok(5.0)));
}

#[test]
fn released_slot_goes_to_the_most_urgent_waiter() {
    let env = Environment::new();
    let machine = env.preemptive_resource(1).unwrap();
    let holder = machine.request_with(0.0, false).unwrap();
    let background = machine.request_with(7.0, false).unwrap();
    let important = machine.request_with(2.0, false).unwrap();

    assert_eq!(machine.queue_len(), 2);
    let released = machine.release(&holder).unwrap();
    assert!(important.is_granted());
    assert!(!background.is_granted());

    env.run().unwrap();
    assert!(released.is_succeeded());
}
