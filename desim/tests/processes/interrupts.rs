use std::{cell::RefCell, rc::Rc};

use desim::{Environment, Process, SimulationError};

#[test]
fn interrupt_wakes_a_waiting_process() {
    let env = Environment::new();
    let victim = env.process(|ctx| async move {
        let nap = ctx.timeout(10.0)?;
        match (&nap).await {
            Err(err) if err.is_interrupted() => {
                let interrupt = ctx.interrupted().ok_or(SimulationError::Interrupted)?;
                Ok((ctx.now()?, interrupt.value::<&str>(), nap))
            }
            Err(err) => Err(err.into()),
            Ok(_) => Err(SimulationError::EventFailed),
        }
    });

    let target = victim.clone();
    env.process(move |ctx| async move {
        ctx.timeout(3.0)?.await?;
        target.interrupt_with("wake up")
    });

    env.run().unwrap();
    let (woken_at, cause, nap) = victim.value().unwrap().unwrap();
    assert_eq!(woken_at, 3.0);
    assert_eq!(cause, Some("wake up"));
    assert!(nap.is_succeeded());
    assert_eq!(env.now(), 10.0);
}

#[test]
fn every_pending_interrupt_is_observable() {
    let env = Environment::new();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let log = seen.clone();
    let victim = env.process(move |ctx| async move {
        loop {
            match ctx.timeout(100.0)?.await {
                Ok(_) => return Ok::<_, SimulationError>(()),
                Err(err) if err.is_interrupted() => {
                    while let Some(interrupt) = ctx.interrupted() {
                        log.borrow_mut().push((ctx.now()?, interrupt.value::<u32>()));
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    });

    let target = victim.clone();
    env.process(move |ctx| async move {
        ctx.timeout(1.0)?.await?;
        target.interrupt_with(1_u32)?;
        target.interrupt_with(2_u32)?;
        ctx.timeout(1.0)?.await?;
        target.interrupt()
    });

    env.run().unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![(1.0, Some(1)), (1.0, Some(2)), (2.0, None)]
    );
    assert_eq!(victim.value(), Some(Ok(())));
}

#[test]
fn ignoring_an_interrupt_is_reported() {
    let env = Environment::new();
    let careless = env.process(|ctx| async move {
        let _ = ctx.timeout(10.0)?.await;
        ctx.timeout(1.0)?.await?;
        Ok::<_, SimulationError>(())
    });

    let target = careless.clone();
    env.process(move |ctx| async move {
        ctx.timeout(2.0)?.await?;
        target.interrupt()
    });

    assert_eq!(
        env.run().unwrap_err(),
        SimulationError::UncheckedInterrupt {
            process: careless.id().index() as u64
        }
    );
}

#[test]
fn interrupt_beats_a_resumption_due_at_the_same_time() {
    let env = Environment::new();
    let slot: Rc<RefCell<Option<Process<&str>>>> = Rc::new(RefCell::new(None));

    let victim_handle = slot.clone();
    env.process(move |ctx| async move {
        ctx.timeout(5.0)?.await?;
        let victim = victim_handle.borrow().clone().expect("victim is registered");
        victim.interrupt()
    });

    let victim = env.process(|ctx| async move {
        match ctx.timeout(5.0) {
            Ok(timeout) => match timeout.await {
                Ok(_) => "timeout",
                Err(_) => {
                    ctx.interrupted();
                    "interrupt"
                }
            },
            Err(_) => "invalid",
        }
    });
    *slot.borrow_mut() = Some(victim.clone());

    env.run().unwrap();
    assert_eq!(victim.value(), Some("interrupt"));
}

#[test]
fn a_process_cannot_interrupt_itself() {
    let env = Environment::new();
    let slot: Rc<RefCell<Option<Process<Result<(), SimulationError>>>>> =
        Rc::new(RefCell::new(None));

    let me = slot.clone();
    let process = env.process(move |ctx| async move {
        ctx.timeout(1.0)?.await?;
        let handle = me.borrow().clone().expect("process is registered");
        handle.interrupt()
    });
    *slot.borrow_mut() = Some(process.clone());

    env.run().unwrap();
    assert_eq!(process.value(), Some(Err(SimulationError::InterruptSelf)));
}

#[test]
fn interrupting_a_finished_process_fails() {
    let env = Environment::new();
    let quick = env.process(|_ctx| async move { 1 });
    env.run().unwrap();

    assert!(quick.is_finished());
    assert_eq!(
        quick.interrupt().unwrap_err(),
        SimulationError::ProcessFinished(quick.id().index() as u64)
    );
}
