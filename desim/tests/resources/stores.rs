use std::{cell::RefCell, rc::Rc};

use desim::{Environment, SimulationError, StorePolicies, WaitPolicy};

#[test]
fn bounded_store_throttles_the_producer() {
    let env = Environment::new();
    let belt = env.store_with_capacity::<u32>(2).unwrap();
    let put_times = Rc::new(RefCell::new(Vec::new()));

    let (out, times) = (belt.clone(), put_times.clone());
    env.process(move |ctx| async move {
        for item in 0..5 {
            out.put(item)?.await?;
            times.borrow_mut().push(ctx.now()?);
        }
        Ok::<_, SimulationError>(())
    });

    let input = belt.clone();
    let consumer = env.process(move |ctx| async move {
        let mut received = Vec::new();
        for _ in 0..5 {
            ctx.timeout(1.0)?.await?;
            received.push(input.get()?.await?);
        }
        Ok::<_, SimulationError>(received)
    });

    env.run().unwrap();
    assert_eq!(consumer.value(), Some(Ok(vec![0, 1, 2, 3, 4])));
    assert_eq!(*put_times.borrow(), vec![0.0, 0.0, 1.0, 2.0, 3.0]);
    assert!(belt.is_empty());
}

#[test]
fn priority_items_come_out_lowest_first() {
    let env = Environment::new();
    let inbox = env
        .store_with::<&str>(
            None,
            StorePolicies {
                item: WaitPolicy::Priority,
                ..StorePolicies::default()
            },
        )
        .unwrap();

    inbox.put_with_priorities("routine", 0.0, 5.0).unwrap();
    inbox.put_with_priorities("urgent", 0.0, 1.0).unwrap();
    inbox.put_with_priorities("later", 0.0, 9.0).unwrap();
    assert_eq!(inbox.items(), vec!["urgent", "routine", "later"]);

    let first = inbox.get().unwrap();
    env.run().unwrap();
    assert_eq!(first.event().value(), Some("urgent"));
}

#[test]
fn getter_disposed_before_a_put_does_not_steal_it() {
    let env = Environment::new();
    let mailbox = env.store::<u32>().unwrap();
    let early = mailbox.get().unwrap();
    let late = mailbox.get().unwrap();

    assert!(early.dispose());
    mailbox.put(11).unwrap();
    env.run().unwrap();

    assert!(early.event().is_pending());
    assert_eq!(late.event().value(), Some(11));
}

#[test]
fn filter_store_matches_parts_to_machines() {
    #[derive(Debug, Clone, PartialEq)]
    struct Part {
        kind: &'static str,
        serial: u32,
    }

    let env = Environment::new();
    let bin = env.filter_store::<Part>().unwrap();
    let fitted = Rc::new(RefCell::new(Vec::new()));

    for (machine, kind) in [("lathe", "bolt"), ("press", "plate")] {
        let (bin, fitted) = (bin.clone(), fitted.clone());
        env.process(move |ctx| async move {
            for _ in 0..2 {
                let part = bin.get_filtered(move |p: &Part| p.kind == kind)?.await?;
                fitted
                    .borrow_mut()
                    .push((machine, part.serial, ctx.now()?));
            }
            Ok::<_, SimulationError>(())
        });
    }

    let supply = bin.clone();
    env.process(move |ctx| async move {
        for (serial, kind) in [(1, "plate"), (2, "bolt"), (3, "plate"), (4, "bolt")] {
            ctx.timeout(1.0)?.await?;
            supply.put(Part { kind, serial })?.await?;
        }
        Ok::<_, SimulationError>(())
    });

    env.run().unwrap();
    let mut fitted = fitted.borrow().clone();
    fitted.sort_by(|a, b| a.2.total_cmp(&b.2));
    assert_eq!(
        fitted,
        vec![
            ("press", 1, 1.0),
            ("lathe", 2, 2.0),
            ("press", 3, 3.0),
            ("lathe", 4, 4.0)
        ]
    );
    assert!(bin.is_empty());
}
