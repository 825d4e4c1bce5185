//! Bench utility binary: list ports, print the default configuration,
//! and exercise the configured stages (status readback, homing).

use anyhow::Context;
use sinterkit::{init_logging, Config, Motor, MotorController, SerialTransport, Transport};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("ports") => {
            for port in sinterkit::list_ports().context("listing serial ports")? {
                println!("{}", port);
            }
        }
        Some("config") => {
            println!("{}", serde_json::to_string_pretty(&Config::new())?);
        }
        Some("status") => {
            let config = load_config(args.get(2))?;
            for controller in open_controllers(&config)? {
                for motor in controller.motors() {
                    let status = controller.status(motor.axis).await?;
                    let position = controller.position(motor.axis).await?;
                    info!(
                        channel = controller.name(),
                        motor = %motor.name,
                        axis = motor.axis,
                        %status,
                        position,
                        "stage status"
                    );
                    println!(
                        "{} axis {} ({}): {} at {:.4} mm",
                        controller.name(),
                        motor.axis,
                        motor.role,
                        status,
                        position
                    );
                }
            }
        }
        Some("home") => {
            let config = load_config(args.get(2))?;
            for controller in open_controllers(&config)? {
                info!(channel = controller.name(), "homing");
                controller.home_all().await?;
                println!("{}: homed", controller.name());
            }
        }
        _ => {
            eprintln!("sinterkit {} ({})", sinterkit::VERSION, sinterkit::BUILD_DATE);
            eprintln!("usage: sinterkit <ports|config|status|home> [config.json]");
        }
    }

    Ok(())
}

fn load_config(path: Option<&String>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from_file(Path::new(path))
            .with_context(|| format!("loading {}", path)),
        None => Ok(Config::new()),
    }
}

/// One controller per configured port, carrying that port's motors.
fn open_controllers(config: &Config) -> anyhow::Result<Vec<MotorController>> {
    let mut controllers = Vec::new();
    for port in config.ports() {
        let transport: Arc<dyn Transport> =
            Arc::new(SerialTransport::open(port, &config.serial).with_context(|| {
                format!("opening {}", port)
            })?);
        let motors = config
            .motors_on_port(port)
            .into_iter()
            .map(Motor::from_settings)
            .collect();
        controllers.push(MotorController::new(
            port,
            transport,
            motors,
            config.motion.clone(),
        ));
    }
    Ok(controllers)
}
