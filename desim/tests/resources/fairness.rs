use std::{cell::RefCell, rc::Rc};

use desim::{Environment, SimulationError, WaitPolicy};

fn service_order(env: &Environment, policy: WaitPolicy, customers: usize) -> Vec<usize> {
    let counter = env.resource_with_policy(1, policy).unwrap();
    let served = Rc::new(RefCell::new(Vec::new()));

    for customer in 0..customers {
        let counter = counter.clone();
        let served = served.clone();
        env.process(move |ctx| async move {
            let turn = counter.request()?;
            (&turn).await?;
            served.borrow_mut().push(customer);
            ctx.timeout(2.0)?.await?;
            Ok::<_, SimulationError>(())
        });
    }

    env.run().unwrap();
    assert_eq!(counter.count(), 0);
    assert_eq!(counter.queue_len(), 0);
    let order = served.borrow().clone();
    order
}

#[test]
fn fifo_resource_serves_in_request_order() {
    let env = Environment::new();
    assert_eq!(service_order(&env, WaitPolicy::Fifo, 6), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(env.now(), 12.0);
}

#[test]
fn lifo_resource_serves_the_latest_waiter_first() {
    let env = Environment::new();
    assert_eq!(service_order(&env, WaitPolicy::Lifo, 4), vec![0, 3, 2, 1]);
}

#[test]
fn random_queue_is_reproducible_for_a_seed() {
    let first = service_order(&Environment::new_with_seed(11), WaitPolicy::Random, 8);
    let again = service_order(&Environment::new_with_seed(11), WaitPolicy::Random, 8);
    assert_eq!(first, again);

    let mut sorted = first.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, (0..8).collect::<Vec<_>>());
}

#[test]
fn explicit_dispose_then_drop_counts_once() {
    let env = Environment::new();
    let desk = env.resource(2).unwrap();

    let clerk = desk.clone();
    let worker = env.process(move |ctx| async move {
        let seat = clerk.request()?;
        (&seat).await?;
        ctx.timeout(1.0)?.await?;
        let first = seat.dispose();
        let second = seat.dispose();
        drop(seat);
        Ok::<_, SimulationError>((first, second, clerk.count()))
    });

    let _other = desk.request().unwrap();
    env.run().unwrap();
    assert_eq!(worker.value(), Some(Ok((true, false, 1))));
    assert_eq!(desk.count(), 1);
}

#[test]
fn release_event_completes_and_hands_over_the_slot() {
    let env = Environment::new();
    let desk = env.resource(1).unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    for name in ["first", "second"] {
        let desk = desk.clone();
        let log = log.clone();
        env.process(move |ctx| async move {
            let seat = desk.request()?;
            (&seat).await?;
            log.borrow_mut().push((name, ctx.now()?));
            ctx.timeout(3.0)?.await?;
            desk.release(&seat)?.await?;
            Ok::<_, SimulationError>(())
        });
    }

    env.run().unwrap();
    assert_eq!(*log.borrow(), vec![("first", 0.0), ("second", 3.0)]);
}
