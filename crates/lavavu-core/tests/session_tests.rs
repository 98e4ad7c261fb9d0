//! Session-level integration tests: state, time steps, control requests
//! and rendering from other threads

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use lavavu_core::backend::CommandJournal;
use lavavu_core::colour::parse_colour;
use lavavu_core::{
    HeadlessBackend, LavaVuError, PropertyCollection, Session, SessionConfig, SessionMode,
};
use serde_json::{json, Value};

#[test]
fn test_store_clear_restore() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let lv = common::direct();
    let pts = lv.points(Some("pts"), json!({"pointsize": 4})).unwrap();
    pts.vertices(common::unit_square()).unwrap();
    lv.store(&path).unwrap();

    lv.clear(true, false).unwrap();
    assert!(lv.object_names().unwrap().is_empty());

    assert!(lv.restore(&path).unwrap());
    assert_eq!(lv.object_names().unwrap(), vec!["pts"]);
    let state = lv.state().unwrap();
    assert_eq!(state["objects"][0]["pointsize"], json!(4));

    assert!(!lv.restore(&dir.path().join("missing.json")).unwrap());
}

#[test]
fn test_set_state_replaces_objects() {
    let lv = common::direct();
    lv.points(Some("a"), Value::Null).unwrap();
    let mut state = lv.get_state().unwrap();
    state["objects"][0]["name"] = json!("b");
    lv.set_state(&state).unwrap();
    assert_eq!(lv.object_names().unwrap(), vec!["b"]);
}

#[test]
fn test_state_is_a_copy() {
    let lv = common::direct();
    let mut state = lv.state().unwrap();
    state["properties"]["title"] = json!("edited");
    assert_ne!(lv.state().unwrap()["properties"]["title"], json!("edited"));
}

#[test]
fn test_addstep_and_timesteps() {
    let lv = common::direct();
    lv.addstep(None, Value::Null).unwrap();
    lv.addstep(Some(10), Value::Null).unwrap();
    let steps = lv.timesteps().unwrap();
    assert!(steps.contains(&10));
    assert_eq!(lv.timestep().unwrap(), 10);
    lv.set_timestep(steps[0]).unwrap();
    assert_eq!(lv.timestep().unwrap(), steps[0]);
}

#[test]
fn test_rgba_string() {
    let rgba = parse_colour("rgba(255,24,128,1.0)").unwrap();
    let expected = [1.0, 24.0 / 255.0, 128.0 / 255.0, 1.0];
    for (got, want) in rgba.iter().zip(expected) {
        assert!((got - want).abs() < 1e-3, "{:?} != {:?}", rgba, expected);
    }
    assert!(parse_colour("no such colour").is_err());
}

#[test]
fn test_image_from_another_thread() {
    let lv = common::threaded();
    lv.points(Some("pts"), Value::Null)
        .unwrap()
        .vertices(common::unit_square())
        .unwrap();

    let core = lv.core();
    let url = thread::spawn(move || core.image(None, Some((1, 1)), false))
        .join()
        .unwrap()
        .unwrap();
    assert!(url.starts_with("data:image/png;base64,"));
    assert!(url.len() > "data:image/png;base64,".len());

    let state = lv.state().unwrap();
    assert_eq!(state["objects"][0]["name"], json!("pts"));
}

#[test]
fn test_commands_run_in_order() {
    let journal = CommandJournal::new();
    let lv = Session::with_backend(
        Box::new(HeadlessBackend::with_journal(journal.clone())),
        SessionConfig::default().with_mode(SessionMode::Thread),
    )
    .unwrap();
    for n in 1..=5 {
        lv.commands(&format!("zoom {}", n)).unwrap();
    }
    let zooms: Vec<String> = journal
        .entries()
        .into_iter()
        .filter(|line| line.starts_with("zoom"))
        .collect();
    assert_eq!(zooms, vec!["zoom 1", "zoom 2", "zoom 3", "zoom 4", "zoom 5"]);
    assert_eq!(lv.state().unwrap()["views"][0]["zoom"], json!(120.0));
}

#[test]
fn test_control_requests() {
    let lv = common::direct();
    lv.points(Some("pts"), Value::Null).unwrap();

    lv.control("<pts>pointsize=6").unwrap();
    assert_eq!(lv.state().unwrap()["objects"][0]["pointsize"], json!(6));

    lv.control(".addstep 3").unwrap();
    assert!(lv.timesteps().unwrap().contains(&3));

    lv.control("zoom 2").unwrap();
    assert_eq!(lv.get("zoom").unwrap().to_json(), json!(2.0));

    assert!(matches!(lv.control("<nothing>.clear"), Err(LavaVuError::Backend(_))));
}

#[test]
fn test_control_collection() {
    let lv = common::direct();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let collection = Arc::new(PropertyCollection::new("ctl").with_callback(move |_, _| {
        seen.fetch_add(1, Ordering::SeqCst);
    }));
    lv.register_collection(&collection);

    lv.control("$ctl opacity 0.25").unwrap();
    assert_eq!(collection.get("opacity"), Some(json!(0.25)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Dropped collections are ignored
    drop(collection);
    lv.control("$ctl opacity 1").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_script_and_state_files() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("setup.script");
    std::fs::write(&script, "zoom 3\nbackground=black\n").unwrap();

    let lv = common::direct();
    lv.file(&script, None, Value::Null).unwrap();
    assert_eq!(lv.get("zoom").unwrap().to_json(), json!(3.0));

    let pts = lv.points(Some("pts"), Value::Null).unwrap();
    let saved = dir.path().join("saved.json");
    lv.store(&saved).unwrap();
    pts.delete().unwrap();

    let loaded = lv.file(&saved, None, json!({"opacity": 0.5})).unwrap();
    assert_eq!(loaded.map(|o| o.name().to_string()), Some("pts".to_string()));
    assert_eq!(lv.state().unwrap()["objects"][0]["opacity"], json!(0.5));

    assert!(lv.file(&dir.path().join("data.xyz"), None, Value::Null).is_err());
}

#[test]
fn test_figures_keep_their_view() {
    let lv = common::direct();
    lv.points(Some("a"), Value::Null).unwrap();
    lv.points(Some("b"), Value::Null).unwrap();
    let wide = lv.figure("wide", &["a"], json!({"zoom": 0.5})).unwrap();
    let close = lv.figure("close", &[], json!({"zoom": 4.0})).unwrap();

    wide.activate().unwrap();
    assert_eq!(lv.get("zoom").unwrap().to_json(), json!(0.5));
    close.activate().unwrap();
    assert_eq!(lv.get("zoom").unwrap().to_json(), json!(4.0));
    assert_eq!(lv.figures().unwrap().len(), 2);
}
