// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A skydiver simulated on a fixed 20ms step while a HUD runs once per presentation frame.
//!
//! The simulation fiber integrates the fall and deploys the canopy below 300m. The HUD fiber on
//! the presentation scheduler waits for the deployment, which happens on the other clock, and
//! then reports the altitude until landing. Frames vary in length to show that the simulation
//! keeps its fixed rate regardless.

use std::cell::Cell;
use std::ops::ControlFlow;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use cadence::{Clock, FixedStepClock, FrameClock, Scheduler, Step, compose, fiber};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const STEP: Duration = Duration::from_millis(20);
const GRAVITY: f64 = 9.81;
const FREE_FALL_DRAG: f64 = 0.0039;
const CANOPY_DRAG: f64 = 0.35;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut frame_clock = FrameClock::new();
    let mut step_clock = FixedStepClock::new(STEP);
    let simulation = Scheduler::builder().with_name("simulation").build();
    let presentation = Scheduler::builder().with_name("presentation").build();

    let altitude = Rc::new(Cell::new(1_500.0_f64));

    // Integrates the fall until the canopy opens, completing with the deployment altitude.
    let deploy = {
        let altitude = Rc::clone(&altitude);
        let mut speed = 0.0_f64;
        let dt = STEP.as_secs_f64();

        simulation.run(fiber::from_fn(move |_cx| {
            speed += (GRAVITY - FREE_FALL_DRAG * speed * speed) * dt;
            altitude.set(altitude.get() - speed * dt);

            if altitude.get() <= 300.0 { Step::Complete(altitude.get()) } else { Step::next_tick() }
        }))
    };

    let hud = {
        let altitude = Rc::clone(&altitude);
        let simulation = simulation.clone();

        presentation.run_async(|s| async move {
            let deployed_at = s.wait_for(&deploy).await.into_result()?;
            println!("canopy open at {deployed_at:.0}m after {:.1}s", s.now().map_or(0.0, |now| now.elapsed().as_secs_f64()));

            let descent = {
                let altitude = Rc::clone(&altitude);
                let mut speed = 55.0_f64;
                let dt = STEP.as_secs_f64();

                simulation.run(fiber::from_fn(move |_cx| {
                    speed += (GRAVITY - CANOPY_DRAG * speed * speed) * dt;
                    altitude.set((altitude.get() - speed * dt).max(0.0));

                    if altitude.get() <= 0.0 { Step::Complete(speed) } else { Step::next_tick() }
                }))
            };

            let reports = s.scheduler().run(compose::every(Duration::from_secs(10), move |cx| {
                println!("  altitude {:>4.0}m at frame {}", altitude.get(), cx.now().map_or(0, |now| now.tick()));
                ControlFlow::<()>::Continue(())
            }));

            let touchdown = s.join(descent).await.into_result()?;
            reports.cancel();

            Ok(touchdown)
        })
    };

    // Frames alternate between 12ms and 21ms to mimic an uneven frame rate.
    let mut now = Instant::now();
    let mut frame = 0_u32;

    while !hud.is_finished() {
        frame_clock.begin_frame_at(now);
        step_clock.accumulate(frame_clock.delta());
        while step_clock.step() {
            simulation.update(&step_clock);
        }
        presentation.update(&frame_clock);

        now += if frame % 2 == 0 { Duration::from_millis(12) } else { Duration::from_millis(21) };
        frame += 1;
    }

    let touchdown = hud
        .take_outcome()
        .ok_or_else(|| anyhow!("the HUD did not finish"))?
        .into_result()
        .map_err(|error| anyhow!("the HUD failed: {error}"))?;

    println!(
        "landed at {touchdown:.1}m/s: {} frames, {} simulation steps, {:.1}s",
        frame_clock.tick(),
        step_clock.tick(),
        step_clock.elapsed().as_secs_f64()
    );

    Ok(())
}
