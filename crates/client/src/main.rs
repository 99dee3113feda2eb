//! RehaFlow Client - command-line entry point.

use anyhow::{bail, Context};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rehaflow_client::application::FeedbackPresenter;
use rehaflow_client::config::{load_dotenv_from_repo_root, ClientConfig};
use rehaflow_client::{ClientEvent, SensorClient};
use rehaflow_shared::CommandResponse;

const USAGE: &str = "Usage: rehaflow-client <command>

Commands:
  monitor                    Print events until Ctrl-C
  exercise <known_weight>    Run a guided exercise against a reference weight
  tare                       Tare the scale
  zero                       Measure the zero reference
  weight                     Query the current weight
  history [limit]            Query recent readings (default 50)
  init <known_weight>        Initialize the scale with a known weight
  calibrate <known_weight>   Calibrate the scale with a known weight";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Monitor,
    Exercise { known_weight: f64 },
    Tare,
    Zero,
    Weight,
    History { limit: Option<u32> },
    Init { known_weight: f64 },
    Calibrate { known_weight: f64 },
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Command> {
    let Some(name) = args.next() else {
        bail!(USAGE);
    };

    let mut known_weight = || -> anyhow::Result<f64> {
        let raw = args
            .next()
            .with_context(|| format!("`{name}` needs a known weight\n\n{USAGE}"))?;
        raw.parse()
            .with_context(|| format!("Invalid known weight: {raw}"))
    };

    let command = match name.as_str() {
        "monitor" => Command::Monitor,
        "exercise" => Command::Exercise {
            known_weight: known_weight()?,
        },
        "tare" => Command::Tare,
        "zero" => Command::Zero,
        "weight" => Command::Weight,
        "init" => Command::Init {
            known_weight: known_weight()?,
        },
        "calibrate" => Command::Calibrate {
            known_weight: known_weight()?,
        },
        "history" => Command::History {
            limit: args
                .next()
                .map(|raw| raw.parse().with_context(|| format!("Invalid limit: {raw}")))
                .transpose()?,
        },
        other => bail!("Unknown command: {other}\n\n{USAGE}"),
    };
    Ok(command)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root
    load_dotenv_from_repo_root();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rehaflow_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let command = parse_args(std::env::args().skip(1))?;
    let config = ClientConfig::from_env().context("Invalid client configuration")?;
    let client = SensorClient::new(config)?;

    tracing::info!(url = %client.connection().url(), "Starting RehaFlow client");
    client
        .open()
        .await
        .with_context(|| format!("Could not connect to {}", client.connection().url()))?;

    let outcome = run(&client, command).await;
    client.close().await;
    outcome
}

async fn run(client: &SensorClient, command: Command) -> anyhow::Result<()> {
    let commands = client.commands();
    match command {
        Command::Monitor => monitor(client).await,
        Command::Exercise { known_weight } => exercise(client, known_weight).await,
        Command::Tare => print_response(&commands.tare_scale().await?),
        Command::Zero => print_response(&commands.trigger_zero().await?),
        Command::Weight => print_response(&commands.get_current_weight().await?),
        Command::History { limit } => print_response(&commands.weight_history(limit).await?),
        Command::Init { known_weight } => {
            print_response(&commands.init_scale(known_weight).await?)
        }
        Command::Calibrate { known_weight } => {
            print_response(&commands.calibrate_scale(known_weight).await?)
        }
    }
}

fn print_response(response: &CommandResponse) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

async fn monitor(client: &SensorClient) -> anyhow::Result<()> {
    let subscription = client.events().subscribe_all(|event| match event {
        ClientEvent::WeightData(reading) => tracing::info!(
            scale = reading.secondary_scale,
            top = reading.pressure.top,
            front = reading.pressure.front,
            back = reading.pressure.back,
            "Reading"
        ),
        ClientEvent::ServerError(error) => {
            tracing::warn!(message = ?error.message, "Server error")
        }
        other => tracing::info!(event = %other.kind(), "Event"),
    });

    tokio::signal::ctrl_c().await?;
    client.events().unsubscribe(&subscription);
    Ok(())
}

async fn exercise(client: &SensorClient, known_weight: f64) -> anyhow::Result<()> {
    let mut run = client
        .start_exercise(FeedbackPresenter::default(), known_weight)
        .await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            feedback = run.next_feedback() => {
                let Some(feedback) = feedback else { break };
                let marker = if feedback.is_warning() { "!" } else { "-" };
                println!("[{:>4}s] {marker} {}", feedback.elapsed_secs, feedback.message);
            }
        }
    }

    if let Some(session) = client.stop_exercise(run).await? {
        tracing::info!(
            elapsed_secs = session.elapsed_secs(),
            readings = session.history_len(),
            "Exercise finished"
        );
    }
    Ok(())
}
