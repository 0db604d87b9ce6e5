use std::{cell::RefCell, rc::Rc};

use desim::{Environment, SimulationError};

#[test]
fn simultaneous_processes_run_in_creation_order() {
    super::init_tracing();
    let env = Environment::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    for name in ["a", "b", "c", "d"] {
        let log = log.clone();
        env.process(move |ctx| async move {
            ctx.timeout(1.0)?.await?;
            log.borrow_mut().push(name);
            Ok::<_, SimulationError>(())
        });
    }

    env.run().unwrap();
    assert_eq!(*log.borrow(), vec!["a", "b", "c", "d"]);
    assert_eq!(env.now(), 1.0);
}

#[test]
fn timeouts_complete_by_time_then_scheduling_order() {
    let env = Environment::new();
    let late = env.timeout_with(2.0, "late").unwrap();
    let first = env.timeout_with(1.0, "first").unwrap();
    let second = env.timeout_with(1.0, "second").unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    for event in [late, first, second] {
        let log = log.clone();
        env.process(move |_ctx| async move {
            let label = event.await?;
            log.borrow_mut().push(label);
            Ok::<_, SimulationError>(())
        });
    }

    env.run().unwrap();
    assert_eq!(*log.borrow(), vec!["first", "second", "late"]);
}

#[test]
fn same_seed_same_trace() {
    fn trace(seed: u64) -> Vec<(usize, f64)> {
        let env = Environment::new_with_seed(seed);
        let log = Rc::new(RefCell::new(Vec::new()));
        for worker in 0..5 {
            let log = log.clone();
            env.process(move |ctx| async move {
                for _ in 0..4 {
                    let delay = ctx.env().random_range(0.0..10.0)?;
                    ctx.timeout(delay)?.await?;
                    log.borrow_mut().push((worker, ctx.now()?));
                }
                Ok::<_, SimulationError>(())
            });
        }
        env.run().unwrap();
        let trace = log.borrow().clone();
        trace
    }

    assert_eq!(trace(7), trace(7));
    assert_ne!(trace(7), trace(8));
}

#[test]
fn environments_are_independent() {
    let a = Environment::new();
    let b = Environment::new();
    a.timeout(5.0).unwrap();
    b.timeout(1.0).unwrap();

    a.run().unwrap();
    assert_eq!(a.now(), 5.0);
    assert_eq!(b.now(), 0.0);
    assert_eq!(b.pending_count(), 1);
}
