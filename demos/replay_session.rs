//! Session replay example
//!
//! Feeds recorded notification frames through a session orchestrator and
//! prints every event. Uploads go to a backend stub that logs the request
//! and answers with a success envelope.
//!
//! Frames are read one per line as hex (spaces optional). Lines starting
//! with `#` are ignored. Without a file a built-in sample night is used.
//!
//! Run with: cargo run --example replay_session
//!
//! To replay a capture:
//!   cargo run --example replay_session -- --file night.txt --user 1001

use async_trait::async_trait;
use serde_json::Value;
use sleep_protocol_ble::{
    Error, Result, SessionConfig, SessionEvent, SessionOrchestrator, SleepApi, TransportError,
};
use std::sync::Arc;
use std::time::Duration;

const SAMPLE_NIGHT: &str = "\
# sleep start
04
06 00 aa bb
06 00 cc
# P08 closes the P06 batch
08 00 01 02
# P07 closes the P08 batch
07 00 10 11
# HR/SpO2 closes P07 and carries its own reading
09 37 32 2c 39 38
# unknown tag
7f 00
05
";

/// Backend stub that logs each request.
struct LoggingBackend;

#[async_trait]
impl SleepApi for LoggingBackend {
    async fn post(
        &self,
        endpoint: &str,
        body: Value,
    ) -> std::result::Result<String, TransportError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        println!("  POST {} {}", endpoint, body);
        Ok(r#"{"retCd":"0000","retMsg":"OK"}"#.to_string())
    }
}

fn parse_hex_line(line: &str) -> Result<Vec<u8>> {
    let digits: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    if !digits.is_ascii() || digits.len() % 2 != 0 {
        return Err(Error::InvalidParameter {
            name: "frame".to_string(),
            value: line.to_string(),
        });
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| Error::InvalidParameter {
                name: "frame".to_string(),
                value: line.to_string(),
            })
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; RUST_LOG overrides the default filter
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("warn,sleep_protocol_ble=debug")
            }),
        )
        .init();

    println!("Sleep Session Replay");
    println!("====================\n");

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let file = args
        .iter()
        .position(|arg| arg == "--file")
        .and_then(|i| args.get(i + 1));
    let user_sno = args
        .iter()
        .position(|arg| arg == "--user")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(1001);

    let capture = match file {
        Some(path) => std::fs::read_to_string(path).map_err(|e| Error::InvalidParameter {
            name: "file".to_string(),
            value: format!("{}: {}", path, e),
        })?,
        None => SAMPLE_NIGHT.to_string(),
    };

    let orchestrator = SessionOrchestrator::new(Arc::new(LoggingBackend), SessionConfig::new(user_sno))?;

    let _events = orchestrator.on_event(|event| match event {
        SessionEvent::SleepStart { session } => println!("[event] sleep start ({})", session),
        SessionEvent::SleepEnd { session } => println!("[event] sleep end ({:?})", session),
        SessionEvent::Upload {
            protocol, result, ..
        } => match result {
            Some(Ok(response)) => println!("[event] {} uploaded: {}", protocol, response.ret_cd),
            Some(Err(e)) => println!("[event] {} failed: {}", protocol, e),
            None => println!("[event] {} had nothing to upload", protocol),
        },
        SessionEvent::FrameRejected(e) => println!("[event] frame rejected: {}", e),
        SessionEvent::DataDropped {
            protocol, bytes, ..
        } => println!("[event] {} dropped {} bytes", protocol, bytes),
    });

    for line in capture.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match parse_hex_line(line) {
            Ok(frame) => orchestrator.on_frame(frame),
            Err(e) => eprintln!("Skipping line: {}", e),
        }

        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    orchestrator.shutdown().await?;

    // Let the event callback catch up
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("\nReplay complete.");
    Ok(())
}
