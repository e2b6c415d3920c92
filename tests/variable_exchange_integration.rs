//! Integration tests for queue conversations
//!
//! These tests validate complete read/write workflows against the loopback
//! queue engine:
//! - Write-then-read round trips through the variable server
//! - Tolerance of malformed response lines
//! - Mapped reads and writes with scaling
//! - GUI session state tracking

#![cfg(feature = "mock-engine")]

mod common;

use common::mock_helpers::create_test_exchange;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use sumo_rs::config::BatchFile;
use sumo_rs::engine::LoopbackQueueEngine;
use sumo_rs::queue::{GuiSession, MappingEntry, MessageQueue};
use sumo_rs::types::{Value, VariableMap};
use sumo_rs::SumoError;

#[test]
fn test_write_then_read_back() {
    let engine = Arc::new(LoopbackQueueEngine::new());
    let (exchange, _key) = create_test_exchange(engine.clone());

    let mut values = VariableMap::new();
    values.insert("x".to_string(), Value::Int(5));
    values.insert("y".to_string(), Value::Float(2.5));
    let echoed = exchange.write_variables(&values).unwrap();
    assert_eq!(echoed, values);
    assert_eq!(engine.variable("x").as_deref(), Some("5"));

    let read = exchange.read_variables(&["x", "y", "missing"]).unwrap();
    assert_eq!(read.len(), 2);
    assert_eq!(read["x"], Value::Int(5));
    assert_eq!(read["y"], Value::Float(2.5));
}

#[test]
fn test_malformed_lines_are_skipped() {
    let engine = Arc::new(LoopbackQueueEngine::new().without_variable_server());
    let (exchange, key) = create_test_exchange(engine.clone());

    engine.inject(&key, "garbage");
    engine.inject(&key, "a|a=1;2");
    engine.inject(&key, "b|missing-assignment");
    engine.inject(&key, "ReadEnd");

    let read = exchange.read_variables(&["a", "b"]).unwrap();
    assert_eq!(read.len(), 1);
    assert_eq!(read["a"], Value::Seq(vec![Value::Int(1), Value::Int(2)]));
    assert_eq!(engine.sent(&key), vec!["read ,a,b"]);
}

#[test]
fn test_conversation_ends_when_queue_closes() {
    let engine = Arc::new(LoopbackQueueEngine::new().without_variable_server());
    let (exchange, key) = create_test_exchange(engine.clone());

    let remote = engine.clone();
    let hangup_key = key.clone();
    let hangup = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        remote.inject(&hangup_key, "a|a=7");
        remote.hang_up(&hangup_key);
    });

    let read = exchange.read_variables(&["a"]).unwrap();
    hangup.join().unwrap();
    assert_eq!(read["a"], Value::Int(7));

    // The queue is gone, so the next send fails
    assert!(matches!(
        exchange.read_variables(&["a"]),
        Err(SumoError::TransportFailure { .. })
    ));

    exchange.close();
    assert!(matches!(
        exchange.read_variables(&["a"]),
        Err(SumoError::QueueClosed(_))
    ));
}

#[test]
fn test_mapped_read_and_write() {
    let engine = Arc::new(LoopbackQueueEngine::new().with_variable("PLC.Q", "10"));
    let (exchange, _key) = create_test_exchange(engine.clone());

    let inflow = MappingEntry::new("Sumo__Plant__Influent__Q", "PLC.Q").with_transform(2.0, 1.0);
    let read = exchange
        .read_mapped(std::slice::from_ref(&inflow), |e| e.is_input())
        .unwrap();
    common::assert_float_eq(
        read["Sumo__Plant__Influent__Q"].as_f64().unwrap(),
        4.0,
        1e-9,
    );

    let mut values = VariableMap::new();
    values.insert("Sumo__Plant__Influent__Q".to_string(), Value::Float(4.0));
    exchange
        .write_mapped(std::slice::from_ref(&inflow), &values, |_| true)
        .unwrap();
    assert_eq!(engine.variable("PLC.Q").as_deref(), Some("10.0"));
}

#[test]
fn test_mapped_read_reports_missing_tag() {
    let engine = Arc::new(LoopbackQueueEngine::new());
    let (exchange, _key) = create_test_exchange(engine);

    let entry = MappingEntry::new("Sumo__Plant__Temp", "PLC.Absent");
    assert!(matches!(
        exchange.read_mapped(&[entry], |_| true),
        Err(SumoError::UnknownVariable(tag)) if tag == "PLC.Absent"
    ));
}

#[test]
fn test_mapping_table_from_batch_file() {
    let batch: BatchFile = toml::from_str(
        r#"
[[jobs]]
model = "plant/sumoproject.dll"

[[mapping]]
io = "I"
sumo_name = "Sumo__Plant__Influent__Q"
opc_tag = "PLC.Q"
scaling = 0.5

[[mapping]]
io = "O"
sumo_name = "Sumo__Plant__Effluent__TN"
opc_tag = "PLC.TN"
"#,
    )
    .unwrap();

    let engine = Arc::new(
        LoopbackQueueEngine::new()
            .with_variable("PLC.Q", "3")
            .with_variable("PLC.TN", "99"),
    );
    let (exchange, key) = create_test_exchange(engine.clone());

    let inputs = exchange.read_mapped(&batch.mapping, |e| e.is_input()).unwrap();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs["Sumo__Plant__Influent__Q"], Value::Float(6.0));
    assert_eq!(engine.sent(&key), vec!["read ,PLC.Q"]);
}

#[test]
fn test_gui_session_tracks_state() {
    let engine = Arc::new(LoopbackQueueEngine::new());
    let queue = MessageQueue::new(engine.clone(), "gui-test");
    let client = queue.create().unwrap();
    let key = client.key().to_string();
    let mut gui = GuiSession::new(client);

    gui.select_maintab("Simulate").unwrap();
    gui.set_variable("Sumo__StopTime", 86_400_000).unwrap();
    assert_eq!(engine.sent(&key).len(), 2);

    engine.hang_up(&key);
    assert!(!gui.communicate());
    assert!(gui.state().closed);
}
