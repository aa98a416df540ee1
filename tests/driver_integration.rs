//! End-to-end scenarios driving the whole `Driver` against an in-memory loopback
//! transport, standing in for the device described in the protocol.

use std::time::Duration;

use boardctl::driver::SignalLevel;
use boardctl::transport::loopback::LoopbackPort;
use boardctl::{Config, Driver, DriverError, PinId};
use serde_json::Value;

const TIMEOUT: Option<Duration> = Some(Duration::from_secs(2));

fn open_driver() -> (Driver, LoopbackPort) {
    let port = LoopbackPort::new();
    let driver = Driver::new(port.clone(), port.clone(), Config::default());
    let mut flush_handle = port.clone();
    let handle = driver.open(&mut flush_handle).unwrap();
    respond_ok(&port, last_written_id(&port), None);
    assert!(handle.wait(TIMEOUT));
    handle.result().unwrap();
    (driver, port)
}

/// Parse the `id` field out of the most recently written frame.
fn last_written_id(port: &LoopbackPort) -> u64 {
    let written = port.written();
    let text = String::from_utf8(written).unwrap();
    let last_line = text.lines().last().expect("at least one frame written");
    let value: Value = serde_json::from_str(last_line).unwrap();
    value["id"].as_u64().expect("frame carries an id")
}

fn respond_ok(port: &LoopbackPort, id: u64, value: Option<Value>) {
    let mut frame = serde_json::json!({"id": id, "type": "response", "ok": true});
    if let Some(v) = value {
        frame["value"] = v;
    }
    let mut line = serde_json::to_vec(&frame).unwrap();
    line.push(b'\n');
    port.push_inbound(&line);
}

fn respond_err(port: &LoopbackPort, id: u64, error: &str) {
    let frame = serde_json::json!({"id": id, "type": "response", "ok": false, "error": error});
    let mut line = serde_json::to_vec(&frame).unwrap();
    line.push(b'\n');
    port.push_inbound(&line);
}

fn respond_sample(port: &LoopbackPort, id: u64, value: i64) {
    let frame = serde_json::json!({"id": id, "type": "sample", "value": value});
    let mut line = serde_json::to_vec(&frame).unwrap();
    line.push(b'\n');
    port.push_inbound(&line);
}

#[test]
fn digital_write_then_read() {
    let (driver, port) = open_driver();

    let set = driver
        .set_signal(PinId::Digital(40), SignalLevel::High)
        .unwrap();
    respond_ok(&port, last_written_id(&port), None);
    assert!(set.wait(TIMEOUT));
    set.result().unwrap();

    let get = driver.get_signal(PinId::Digital(30)).unwrap();
    respond_ok(&port, last_written_id(&port), Some(Value::from("HIGH")));
    assert!(get.wait(TIMEOUT));
    assert_eq!(get.result().unwrap(), Value::from("HIGH"));

    let set_low = driver
        .set_signal(PinId::Digital(40), SignalLevel::Low)
        .unwrap();
    respond_ok(&port, last_written_id(&port), None);
    assert!(set_low.wait(TIMEOUT));
    set_low.result().unwrap();

    let get_low = driver.get_signal(PinId::Digital(30)).unwrap();
    respond_ok(&port, last_written_id(&port), Some(Value::from("LOW")));
    assert!(get_low.wait(TIMEOUT));
    assert_eq!(get_low.result().unwrap(), Value::from("LOW"));
}

#[test]
fn analog_write_then_read() {
    let (driver, port) = open_driver();

    let set_high = driver
        .set_signal(PinId::Dac(0), SignalLevel::Analog(255))
        .unwrap();
    respond_ok(&port, last_written_id(&port), None);
    assert!(set_high.wait(TIMEOUT));
    set_high.result().unwrap();

    let get_high = driver.get_signal(PinId::Analog(0)).unwrap();
    respond_ok(&port, last_written_id(&port), Some(Value::from(900)));
    assert!(get_high.wait(TIMEOUT));
    assert!(get_high.result().unwrap().as_i64().unwrap() > 800);

    let set_low = driver
        .set_signal(PinId::Dac(0), SignalLevel::Analog(0))
        .unwrap();
    respond_ok(&port, last_written_id(&port), None);
    assert!(set_low.wait(TIMEOUT));
    set_low.result().unwrap();

    let get_low = driver.get_signal(PinId::Analog(0)).unwrap();
    respond_ok(&port, last_written_id(&port), Some(Value::from(400)));
    assert!(get_low.wait(TIMEOUT));
    assert!(get_low.result().unwrap().as_i64().unwrap() < 600);
}

#[test]
fn invalid_pin_fails_the_handle() {
    let (driver, port) = open_driver();

    let set = driver
        .set_signal(PinId::Digital(99), SignalLevel::High)
        .unwrap();
    respond_err(&port, last_written_id(&port), "INVALID_PIN");
    assert!(set.wait(TIMEOUT));
    match set.result() {
        Err(DriverError::Device(boardctl::DeviceErrorKind::InvalidPin, _)) => {}
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn duplicate_logging_job_fails_the_second_start() {
    let (driver, port) = open_driver();

    let (first_handle, _first_recording) = driver.log_signal(PinId::Digital(30), 1000).unwrap();
    respond_ok(&port, last_written_id(&port), None);
    assert!(first_handle.wait(TIMEOUT));
    first_handle.result().unwrap();

    let (second_handle, _second_recording) = driver.log_signal(PinId::Digital(30), 500).unwrap();
    respond_err(&port, last_written_id(&port), "DUPLICATE_LOGGING_JOB");
    assert!(second_handle.wait(TIMEOUT));
    match second_handle.result() {
        Err(DriverError::Device(boardctl::DeviceErrorKind::DuplicateLoggingJob, _)) => {}
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn ninth_logging_job_yields_too_many_jobs() {
    let (driver, port) = open_driver();

    for n in 30..38 {
        let (handle, _recording) = driver.log_signal(PinId::Digital(n), 1000).unwrap();
        respond_ok(&port, last_written_id(&port), None);
        assert!(handle.wait(TIMEOUT));
        handle.result().unwrap();
    }

    let (ninth_handle, _ninth_recording) = driver.log_signal(PinId::Digital(38), 1000).unwrap();
    respond_err(&port, last_written_id(&port), "TOO_MANY_LOGGING_JOBS");
    assert!(ninth_handle.wait(TIMEOUT));
    match ninth_handle.result() {
        Err(DriverError::Device(boardctl::DeviceErrorKind::TooManyLoggingJobs, _)) => {}
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn streaming_correctness_first_six_samples() {
    let (driver, port) = open_driver();

    let (start_handle, recording) = driver.log_signal(PinId::Digital(30), 500).unwrap();
    let start_id = last_written_id(&port);
    respond_ok(&port, start_id, None);
    assert!(start_handle.wait(TIMEOUT));
    start_handle.result().unwrap();

    for value in [0, 0, 1, 1, 0, 0] {
        respond_sample(&port, start_id, value);
    }

    // give the reader thread a moment to drain the pushed samples
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while recording.samples_so_far().len() < 6 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }

    let samples = recording.samples_so_far();
    assert_eq!(samples.len(), 6);
    let as_bits: Vec<i32> = samples
        .iter()
        .map(|s| match s {
            boardctl::Sample::Digital(true) => 1,
            boardctl::Sample::Digital(false) => 0,
            boardctl::Sample::Analog(v) => *v as i32,
        })
        .collect();
    assert_eq!(as_bits, vec![0, 0, 1, 1, 0, 0]);

    let end_handle = driver.end_log_signal(PinId::Digital(30)).unwrap();
    respond_ok(&port, last_written_id(&port), None);
    assert!(end_handle.wait(TIMEOUT));
    end_handle.result().unwrap();

    assert!(recording.wait(TIMEOUT));
    let snapshot = recording.result().unwrap();
    assert_eq!(snapshot.values.len(), 6);
}

#[test]
fn end_log_signal_on_a_pin_with_no_active_job_fails() {
    let (driver, port) = open_driver();

    let (start, _recording) = driver.log_signal(PinId::Digital(30), 500).unwrap();
    respond_ok(&port, last_written_id(&port), None);
    assert!(start.wait(TIMEOUT));
    start.result().unwrap();

    let end = driver.end_log_signal(PinId::Digital(31)).unwrap();
    respond_err(&port, last_written_id(&port), "LOGGING_REQUEST_NOT_FOUND");
    assert!(end.wait(TIMEOUT));
    match end.result() {
        Err(DriverError::Device(boardctl::DeviceErrorKind::LoggingRequestNotFound, _)) => {}
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn process_errors_reports_unsolicited_samples() {
    let (driver, port) = open_driver();
    respond_sample(&port, 9999, 1);
    std::thread::sleep(Duration::from_millis(100));
    match driver.process_errors() {
        Err(DriverError::Protocol(boardctl::ProtocolErrorKind::UnsolicitedSample, _)) => {}
        other => panic!("unexpected: {other:?}"),
    }
}
