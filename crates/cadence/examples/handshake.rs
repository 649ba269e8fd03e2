// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A multiplayer session handshake written as one sequential fiber:
//!
//! 1. Join the lobby and wait for the server to acknowledge
//! 2. Register with the master server, retrying while it reports being busy
//! 3. Try a NAT punch-through, falling back to a relay when it takes too long
//! 4. Ping the lobby once per second, then leave
//!
//! The host loop runs at 60 frames per second on a manual clock.

use std::cell::Cell;
use std::ops::ControlFlow;
use std::rc::Rc;
use std::time::Duration;

use anyhow::anyhow;
use cadence::{Clock, FiberError, ManualClock, Scheduler, Step, compose, fiber};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const FRAME: Duration = Duration::from_micros(16_667);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let clock = ManualClock::new();
    let scheduler = Scheduler::builder().with_name("network").build();

    let session = scheduler.run_async(|s| async move {
        println!("[{:>5}] joining lobby", tick(&s));
        s.sleep(Duration::from_millis(300)).await;

        // The master server is busy for the first two attempts.
        let registration = compose::retry(&s, 5, Duration::from_millis(500), |attempt| {
            fiber::from_fn(move |_cx| {
                if attempt < 2 {
                    Step::Fail(FiberError::msg("master server busy"))
                } else {
                    Step::Complete(format!("ticket-{attempt}"))
                }
            })
        })
        .await
        .into_result()?;
        println!("[{:>5}] registered with {registration}", tick(&s));

        let nat_punch = s.scheduler().run_async(|s| async move {
            s.sleep(Duration::from_secs(10)).await;
            Ok("direct")
        });
        let route = match compose::with_timeout(&s, &nat_punch, Duration::from_secs(2)).await {
            Ok(outcome) => outcome.into_result()?,
            Err(elapsed) => {
                println!("[{:>5}] {elapsed}, using relay", tick(&s));
                "relay"
            }
        };

        let pings = Rc::new(Cell::new(0_u32));
        let pinger = {
            let pings = Rc::clone(&pings);
            s.scheduler().run(compose::every(Duration::from_secs(1), move |cx| {
                pings.set(pings.get() + 1);
                println!("[{:>5}] ping #{} over {route}", cx.now().map_or(0, |now| now.tick()), pings.get());

                if pings.get() == 3 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
            }))
        };
        s.join(pinger).await.into_result()?;

        println!("[{:>5}] leaving lobby", tick(&s));
        Ok(pings.get())
    });

    while !session.is_finished() {
        clock.advance(FRAME);
        scheduler.update(&clock);
    }

    let pings = session
        .take_outcome()
        .ok_or_else(|| anyhow!("session did not finish"))?
        .into_result()
        .map_err(|error| anyhow!("session failed: {error}"))?;

    println!("session finished after {} ticks with {pings} pings", clock.tick());
    Ok(())
}

fn tick(s: &cadence::Suspender) -> u64 {
    s.now().map_or(0, |now| now.tick())
}
