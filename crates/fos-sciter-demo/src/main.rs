//! fOS Sciter demo
//!
//! Drives the binding against the recording engine: window setup, resource
//! loading from an archive, behaviors, native methods and async requests.
//!
//! Usage: `fos-sciter-demo [options.json]`

use std::cell::Cell;
use std::rc::Rc;

use anyhow::{Context, Result};
use fos_sciter::archive::{spawn_file_delivery, Archive, ArchiveLoader};
use fos_sciter::events::{BehaviorEventParams, BUTTON_CLICK, SINKING};
use fos_sciter::handler::behavior_refcount;
use fos_sciter::mock::RecordingEngine;
use fos_sciter::{
    ConvertMode, Element, ElementHandle, EventHandler, Request, RuntimeOptions, Value, Window, WindowConfig,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const INDEX_HTML: &str = r#"<html><body><button #ok>OK</button><div.clock/></body></html>"#;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("fOS Sciter v{}", fos_sciter::VERSION);

    let options = match std::env::args().nth(1) {
        Some(path) => RuntimeOptions::from_path(&path).with_context(|| format!("reading options from {}", path))?,
        None => RuntimeOptions { debug_mode: Some(true), ..Default::default() },
    };

    let engine = RecordingEngine::install();
    options.apply_global()?;

    let window = Window::create(&WindowConfig::default()).context("creating window")?;
    options.apply(&window)?;
    window.set_home_url("this://app/")?;

    // Resources and behaviors
    let mut archive = Archive::new();
    archive.insert("index.html", INDEX_HTML.as_bytes().to_vec());
    let clock = Rc::new(clock_behavior());
    let callbacks = Rc::new(ArchiveLoader::new(archive).into_callback().with_behavior("clock", Rc::clone(&clock)));
    window.set_callback(&callbacks)?;

    window.load_html(INDEX_HTML.as_bytes(), "this://app/")?;
    let rq = engine.requests().add("this://app/index.html", 1);
    let load = engine.load_data(window.handle(), "this://app/index.html", rq);
    tracing::info!("SC_LOAD_DATA answered {:?}, served {:?}", load, engine.data_ready_log());

    // Elements
    let ok = ElementHandle(0x42);
    engine.set_selection("#ok", &[ok]);
    let root = window.root_element()?;
    let button = root.select_by_id("ok")?;
    let clicks = Rc::new(Cell::new(0));
    let counter = Rc::clone(&clicks);
    button.on_click(move || counter.set(counter.get() + 1))?;

    let mut click = BehaviorEventParams::new(BUTTON_CLICK, SINKING, button.handle());
    engine.send_behavior_event(button.handle(), &mut click);
    tracing::info!("Button clicked {} time(s)", clicks.get());

    // Script calls into the host
    window.define_function("sum", |args| Value::from(args.iter().map(Value::to_int).sum::<i32>()))?;
    let sum = engine.call_native_method(window.handle(), "sum", &[Value::from(2), Value::from(40)]);
    tracing::info!("sum(2, 40) = {:?}", sum.map(|v| v.to_int()));

    let inc = Value::functor(|args: &[Value]| Value::from(args.first().map_or(0, Value::to_int) + 1));
    let incremented = inc.invoke(&Value::new(), "inc", &[Value::from(41)])?;
    tracing::info!("inc(41) = {}", incremented);

    // One behavior, several elements
    for i in 0..3 {
        engine.attach_behavior(window.handle(), ElementHandle(0x100 + i), "clock");
    }
    tracing::info!("clock attached to {} element(s)", behavior_refcount(clock.id()));
    for i in 0..3 {
        engine.remove_element(ElementHandle(0x100 + i));
    }
    tracing::info!("clock attached to {} element(s)", behavior_refcount(clock.id()));

    // Values
    let mut state = Value::map();
    state.set("clicks", Value::from(clicks.get() as i32));
    state.set("title", Value::from("fOS"));
    let mut items = Value::new();
    for i in [10, 20, 30] {
        items.append(Value::from(i));
    }
    state.set("items", items);
    tracing::info!("state = {}", state.to_literal(ConvertMode::JsonLiteral)?);

    // Completion from a worker thread
    let rq = engine.requests().add("this://app/Cargo.toml", 1);
    let request = Request::new(rq)?;
    spawn_file_delivery(request, "Cargo.toml")
        .join()
        .map_err(|_| anyhow::anyhow!("delivery thread panicked"))??;
    tracing::info!("Cargo.toml delivered with status {:?}", engine.requests().status(rq));

    drop(button);
    drop(root);
    tracing::info!("Done after {} engine calls", engine.calls().len());
    Ok(())
}

fn clock_behavior() -> EventHandler {
    let mut clock = EventHandler::new();
    clock.on_attached = Some(Box::new(|e: &Element| tracing::info!("clock attached to {:?}", e.handle())));
    clock.on_detached = Some(Box::new(|e: &Element| tracing::info!("clock detached from {:?}", e.handle())));
    clock
}
