//! Light Sensor Demo - simulated sensor reporting light intensity
//!
//! Usage: light-sensor [--config <file>] [--mqtt] [--reset-after <samples>]
//!
//! Without `--mqtt` telemetry goes to an in-memory loopback hub; with
//! `--reset-after` the hub sends a `ResetDevice` command once that many samples
//! were delivered.

use std::thread;
use std::time::Duration;

use lumen_runtime::{logging, Agent, AgentConfig, Collaborators};
use lumen_transport::{LoopbackHub, Message, MqttTransport, TransportFactory};
use rand::Rng;
use tracing::info;

/// Ticks between samples
const SAMPLE_EVERY: u64 = 20;

struct Args {
    config: Option<String>,
    mqtt: bool,
    reset_after: Option<usize>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        config: None,
        mqtt: false,
        reset_after: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = Some(iter.next().ok_or("--config needs a path")?),
            "--mqtt" => args.mqtt = true,
            "--reset-after" => {
                let n = iter.next().ok_or("--reset-after needs a count")?;
                args.reset_after = Some(n.parse().map_err(|_| format!("bad count '{}'", n))?);
            }
            other => return Err(format!("unknown argument '{}'", other)),
        }
    }
    Ok(args)
}

/// Light level drifting around mid-scale like a room through the day
struct SimulatedSensor {
    level: i32,
}

impl SimulatedSensor {
    fn read(&mut self) -> i32 {
        self.level = (self.level + rand::thread_rng().gen_range(-40..=40)).clamp(0, 1023);
        self.level
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => AgentConfig::from_json_file(path)?,
        None => AgentConfig::default(),
    };
    logging::init(&config.log)?;

    let hub = LoopbackHub::new();
    let transport: Box<dyn TransportFactory> = if args.mqtt {
        Box::new(MqttTransport::new())
    } else {
        Box::new(hub.transport())
    };

    let mut agent = Agent::new(config, Collaborators::host(transport))?;
    let mut sensor = SimulatedSensor { level: 512 };
    let mut reset_sent = false;
    let tick_interval: Duration = agent.tick_interval();

    info!(device = %agent.device_id(), mqtt = args.mqtt, "light sensor started");

    let mut tick: u64 = 0;
    loop {
        agent.tick();
        if agent.is_initialized() && tick % SAMPLE_EVERY == 0 {
            agent.send(sensor.read());
        }

        if let Some(limit) = args.reset_after {
            if !reset_sent && hub.delivered().len() >= limit {
                info!(delivered = limit, "hub sending ResetDevice");
                hub.push_message(Message::from_payload(b"ResetDevice")?);
                reset_sent = true;
            }
        }

        tick += 1;
        thread::sleep(tick_interval);
    }
}
