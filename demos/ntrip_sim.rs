//! NTRIP source and rover simulator
//!
//! Run with: cargo run --example ntrip_sim [CASTER_ADDR] [SECONDS]
//!
//! Connects a source to the `admin` mountpoint of a running caster (see the
//! `simple_caster` example), then a rover subscribed to the same mountpoint.
//! The source sends one RTCM 3 station message (type 1005) per second; the
//! rover logs every complete message it receives.

use std::time::Duration;

use bytes::{BufMut, BytesMut};

use ntrip_caster::client::{ClientConfig, NtripClient, NtripSource};
use ntrip_caster::protocol::rtcm;

/// Payload of a message type 1005 with a zeroed station position
fn station_message(station_id: u16) -> BytesMut {
    let mut payload = BytesMut::with_capacity(19);
    // 12-bit message type, 12-bit station id
    let head: u32 = (1005 << 12) | u32::from(station_id & 0x0FFF);
    payload.put_u8((head >> 16) as u8);
    payload.put_u8((head >> 8) as u8);
    payload.put_u8(head as u8);
    payload.put_bytes(0, 16);
    payload
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ntrip_caster=info".parse()?)
                .add_directive("ntrip_sim=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let addr = args.get(1).cloned().unwrap_or_else(|| "127.0.0.1:2101".to_owned());
    let seconds: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(600);

    let source_config = ClientConfig::new(&addr, "admin")
        .password("admin")
        .user_agent("test-source/1.0");
    let (mut source, mut events) = NtripSource::new(source_config);
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::info!(event = ?event, "Source event");
        }
    });
    source.connect().await?;
    println!("source connected");

    tokio::time::sleep(Duration::from_millis(500)).await;

    let rover_config = ClientConfig::new(&addr, "admin")
        .basic_auth("admin", "admin")
        .user_agent("test-client/1.0");
    let mut rover = NtripClient::connect(&rover_config).await?;
    println!("client connected");

    let rover_task = tokio::spawn(async move {
        let mut pending = BytesMut::new();
        while let Ok(Some(chunk)) = rover.next_chunk().await {
            pending.extend_from_slice(&chunk);
            while let Some(start) = rtcm::find_frame_start(&pending) {
                let Some(len) = rtcm::frame_len(&pending[start..]) else { break };
                if pending.len() < start + len {
                    break;
                }
                let frame = pending.split_to(start + len).split_off(start);
                tracing::info!(
                    message_type = ?rtcm::message_type(&frame),
                    bytes = frame.len(),
                    "Rover received RTCM message"
                );
            }
        }
        rover.bytes_received()
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    for _ in 0..seconds {
        ticker.tick().await;
        let Some(frame) = rtcm::encode_frame(&station_message(2101)) else {
            continue;
        };
        source.send_bytes(frame).await?;
    }

    source.disconnect().await;
    println!("source sent {} bytes", source.bytes_sent());

    tokio::time::sleep(Duration::from_millis(500)).await;
    rover_task.abort();
    Ok(())
}
