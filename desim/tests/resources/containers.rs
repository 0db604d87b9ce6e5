use std::{cell::RefCell, rc::Rc};

use desim::{Environment, SimulationError};

#[test]
fn level_is_conserved_across_gets_and_puts() {
    let env = Environment::new_with_seed(3);
    let tank = env.container(100.0, 4.0).unwrap();
    let moved = Rc::new(RefCell::new((0.0, 0.0)));

    let (supply, log) = (tank.clone(), moved.clone());
    env.process(move |ctx| async move {
        for _ in 0..5 {
            let amount = ctx.env().random_range(3.0..4.0)?;
            let put = supply.put(amount)?.await?;
            log.borrow_mut().0 += put;
            ctx.timeout(1.0)?.await?;
        }
        Ok::<_, SimulationError>(())
    });

    let (demand, log) = (tank.clone(), moved.clone());
    env.process(move |ctx| async move {
        for _ in 0..6 {
            let got = demand.get(2.0)?.await?;
            log.borrow_mut().1 += got;
            ctx.timeout(0.5)?.await?;
        }
        Ok::<_, SimulationError>(())
    });

    env.run().unwrap();
    let (put, got) = *moved.borrow();
    assert_eq!(got, 12.0);
    assert!((tank.level() - (4.0 + put - got)).abs() < 1e-9);
}

#[test]
fn a_put_unblocks_a_waiting_get() {
    let env = Environment::new();
    let tank = env.container(10.0, 0.0).unwrap();

    let source = tank.clone();
    let consumer = env.process(move |ctx| async move {
        let got = source.get(6.0)?.await?;
        Ok::<_, SimulationError>((ctx.now()?, got))
    });

    let sink = tank.clone();
    env.process(move |ctx| async move {
        ctx.timeout(1.0)?.await?;
        sink.put(3.0)?.await?;
        ctx.timeout(1.0)?.await?;
        sink.put(4.0)?.await?;
        Ok::<_, SimulationError>(())
    });

    env.run().unwrap();
    assert_eq!(consumer.value(), Some(Ok((2.0, 6.0))));
    assert_eq!(tank.level(), 1.0);
}

#[test]
fn a_get_unblocks_a_waiting_put() {
    let env = Environment::new();
    let tank = env.container(10.0, 9.0).unwrap();

    let sink = tank.clone();
    let producer = env.process(move |ctx| async move {
        sink.put(5.0)?.await?;
        ctx.now()
    });

    let source = tank.clone();
    env.process(move |ctx| async move {
        ctx.timeout(3.0)?.await?;
        source.get(4.0)?.await?;
        Ok::<_, SimulationError>(())
    });

    env.run().unwrap();
    assert_eq!(producer.value(), Some(Ok(3.0)));
    assert_eq!(tank.level(), 10.0);
}

#[test]
fn over_capacity_requests_fail_synchronously() {
    let env = Environment::new();
    let tank = env.container(5.0, 1.0).unwrap();
    assert!(matches!(
        tank.put(6.0),
        Err(SimulationError::ExcessiveQuantity { .. })
    ));
    assert!(matches!(tank.get(-0.5), Err(SimulationError::NegativeQuantity(_))));
    assert_eq!(tank.get_queue_len() + tank.put_queue_len(), 0);
}
