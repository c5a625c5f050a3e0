//! End-to-end exercises of the full engine: animation ticks land values in
//! the scene graph, the store produces the draw list, and the painter
//! repaints exactly what changed.

use sable::{
    Easing, Engine, ManualClock, ManualScheduler, Path, PropertyKey, RecordingFactory,
    RecordingSurface, Rgba, SableConfig, Style, SurfaceOp, Value,
};

struct Harness {
    engine: Engine,
    factory: RecordingFactory,
    scheduler: ManualScheduler,
    clock: ManualClock,
}

fn harness() -> Harness {
    let factory = RecordingFactory::new();
    let scheduler = ManualScheduler::new();
    let clock = ManualClock::new();
    let mut config = SableConfig::default();
    config.canvas.width = 400;
    config.canvas.height = 300;
    let engine = Engine::with_clock(
        Box::new(factory.clone()),
        Box::new(scheduler.clone()),
        &config,
        Box::new(clock.clone()),
    )
    .unwrap();
    Harness {
        engine,
        factory,
        scheduler,
        clock,
    }
}

fn base_layer(h: &mut Harness) -> RecordingSurface {
    let id = h.engine.painter().layer(0).unwrap().surface().id();
    h.factory.surface(id).unwrap()
}

fn fill_count(surface: &RecordingSurface) -> usize {
    surface.count_ops(|op| matches!(op, SurfaceOp::FillPath { .. }))
}

#[test]
fn animated_property_flows_into_repaint() {
    let mut h = harness();
    let node = h
        .engine
        .storage()
        .displayable(Path::rect(0.0, 0.0, 20.0, 20.0), Style::default());
    h.engine.add(node);

    let mut animator = h.engine.animate(node);
    animator
        .when(h.engine.storage(), 0.0, [(PropertyKey::X, Value::Number(0.0))])
        .when(
            h.engine.storage(),
            1000.0,
            [(PropertyKey::X, Value::Number(100.0))],
        )
        .start(Easing::Linear, false);
    h.engine.add_animator(animator);

    h.engine.update();
    let surface = base_layer(&mut h);
    assert_eq!(fill_count(&surface), 1);

    // Half-way through the animation the node has moved and the layer was
    // repainted with the interpolated transform.
    h.clock.advance(500.0);
    h.engine.update();
    let transforms: Vec<f64> = surface
        .ops()
        .iter()
        .filter_map(|op| match op {
            SurfaceOp::SetTransform(t) => Some(t.tx),
            _ => None,
        })
        .collect();
    assert!(transforms.contains(&50.0));

    // With the animation finished and nothing dirty, a further update
    // leaves the layer content alone.
    h.clock.advance(600.0);
    h.engine.update();
    let clears_after_finish = surface.count_ops(|op| matches!(op, SurfaceOp::Clear(_)));
    h.clock.advance(100.0);
    h.engine.update();
    assert_eq!(
        surface.count_ops(|op| matches!(op, SurfaceOp::Clear(_))),
        clears_after_finish
    );
}

#[test]
fn looping_animation_keeps_scheduling_repaints() {
    let mut h = harness();
    let node = h
        .engine
        .storage()
        .displayable(Path::rect(0.0, 0.0, 20.0, 20.0), Style::default());
    h.engine.add(node);

    let mut animator = h.engine.animate(node).with_loop(true);
    animator
        .when(h.engine.storage(), 0.0, [(PropertyKey::X, Value::Number(0.0))])
        .when(
            h.engine.storage(),
            800.0,
            [(PropertyKey::X, Value::Number(80.0))],
        )
        .start(Easing::Linear, false);
    h.engine.add_animator(animator);

    h.engine.update();
    for _ in 0..5 {
        h.clock.advance(400.0);
        h.engine.update();
    }
    // 2000 ms into an 800 ms loop: two full cycles, then half-way again.
    let x = h.engine.storage().get(node).unwrap().position()[0];
    assert_eq!(x, 40.0);
}

#[test]
fn progressive_scene_drains_through_scheduled_frames() {
    let mut h = harness();
    for i in 0..9 {
        let node = h
            .engine
            .storage()
            .displayable(Path::rect(0.0, 0.0, 5.0, 5.0), Style::default());
        h.engine.storage().get_mut(node).unwrap().set_progressive(Some(i / 3));
        h.engine.add(node);
    }
    h.engine.refresh(false);

    let mut ticks = 0;
    while h.scheduler.take() {
        h.engine.on_scheduled_frame();
        ticks += 1;
        assert!(ticks < 10);
    }
    assert_eq!(ticks, 3);

    let surface = base_layer(&mut h);
    assert!(surface.count_ops(|op| matches!(op, SurfaceOp::DrawSurface { .. })) >= 1);
}

#[test]
fn color_animation_interpolates_channelwise() {
    let mut h = harness();
    let node = h.engine.storage().displayable(
        Path::rect(0.0, 0.0, 20.0, 20.0),
        Style::filled(Rgba::opaque(0.0, 0.0, 0.0)),
    );
    h.engine.add(node);

    let mut animator = h.engine.animate(node);
    animator
        .when(
            h.engine.storage(),
            1000.0,
            [(PropertyKey::Fill, Value::Text("rgb(200, 100, 50)".into()))],
        )
        .start(Easing::Linear, false);
    h.engine.add_animator(animator);

    h.engine.update();
    h.clock.advance(500.0);
    h.engine.update();

    let fill = h
        .engine
        .storage()
        .get(node)
        .unwrap()
        .style()
        .unwrap()
        .fill
        .unwrap();
    assert_eq!((fill.r, fill.g, fill.b), (100.0, 50.0, 25.0));
    assert_eq!(fill.a, 1.0);
}

#[test]
fn dispose_tears_everything_down() {
    let mut h = harness();
    let node = h
        .engine
        .storage()
        .displayable(Path::rect(0.0, 0.0, 20.0, 20.0), Style::default());
    h.engine.add(node);
    h.engine.update();

    h.engine.dispose();
    assert!(h.engine.painter().is_disposed());
    assert!(h.engine.storage().display_list(true, true).is_empty());
    // Further updates must be harmless no-ops.
    h.clock.advance(100.0);
    h.engine.update();
}
