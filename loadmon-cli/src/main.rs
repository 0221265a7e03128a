use clap::{Parser, Subcommand};
use colored::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::PathBuf;

mod doctor;

#[derive(Parser, Debug)]
#[clap(version, about = "Query and configure a running loadmond")]
struct Args {
    /// Base URL of the loadmond service
    #[clap(long, default_value = "http://127.0.0.1:3000")]
    url: String,

    /// Disable colorized output
    #[clap(long)]
    no_color: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show recent load samples
    Load {
        #[clap(long, default_value_t = 10)]
        limit: i64,
    },
    /// Show recent alert events
    Events {
        #[clap(long, default_value_t = 10)]
        limit: i64,
    },
    /// Show current alert thresholds
    Thresholds,
    /// Replace the alert thresholds (all five values required)
    SetThresholds {
        #[clap(long)]
        cpu: f64,
        #[clap(long)]
        gpu: f64,
        #[clap(long)]
        memory: f64,
        #[clap(long)]
        net_sent: f64,
        #[clap(long)]
        net_recv: f64,
    },
    /// Export samples in a time range as CSV
    Export {
        /// Range start, ISO 8601 (e.g. 2025-04-15T10:00:00)
        #[clap(long)]
        start: String,
        /// Range end, ISO 8601
        #[clap(long)]
        end: String,
        /// Write to a file instead of stdout
        #[clap(long)]
        output: Option<PathBuf>,
    },
    /// Check daemon health and connectivity
    Doctor,
}

#[derive(Debug, Deserialize)]
struct LoadRow {
    cpu: f32,
    memory: f32,
    net_sent: Option<f64>,
    net_recv: Option<f64>,
    gpu_percent: Option<f32>,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct EventRow {
    message: String,
    level: String,
    timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Thresholds {
    cpu: f64,
    gpu: f64,
    memory: f64,
    net_sent: f64,
    net_recv: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    if args.no_color {
        colored::control::set_override(false);
    }
    let client = Client::new();

    match args.command {
        Command::Load { limit } => run_load(&client, &args.url, limit).await,
        Command::Events { limit } => run_events(&client, &args.url, limit).await,
        Command::Thresholds => run_thresholds(&client, &args.url).await,
        Command::SetThresholds {
            cpu,
            gpu,
            memory,
            net_sent,
            net_recv,
        } => {
            let thresholds = Thresholds {
                cpu,
                gpu,
                memory,
                net_sent,
                net_recv,
            };
            run_set_thresholds(&client, &args.url, &thresholds).await
        }
        Command::Export { start, end, output } => {
            run_export(&client, &args.url, &start, &end, output).await
        }
        Command::Doctor => doctor::run_doctor(&args.url).await,
    }
}

async fn run_load(client: &Client, url: &str, limit: i64) -> Result<(), Box<dyn Error>> {
    let rows: Vec<LoadRow> = client
        .get(format!("{url}/api/load"))
        .query(&[("limit", limit)])
        .send()
        .await?
        .json()
        .await?;

    println!(
        "{:<20} {:>6} {:>6} {:>6} {:>12} {:>12}",
        "TIMESTAMP", "CPU%", "GPU%", "MEM%", "SENT B/s", "RECV B/s"
    );
    for row in rows {
        println!(
            "{:<20} {:>6.1} {:>6} {:>6.1} {:>12} {:>12}",
            row.timestamp,
            row.cpu,
            format_opt_pct(row.gpu_percent),
            row.memory,
            format_opt_rate(row.net_sent),
            format_opt_rate(row.net_recv),
        );
    }
    Ok(())
}

async fn run_events(client: &Client, url: &str, limit: i64) -> Result<(), Box<dyn Error>> {
    let events: Vec<EventRow> = client
        .get(format!("{url}/api/events"))
        .query(&[("limit", limit)])
        .send()
        .await?
        .json()
        .await?;

    if events.is_empty() {
        println!("{}", "no events".dimmed());
        return Ok(());
    }
    for event in events {
        let level = match event.level.as_str() {
            "critical" => event.level.to_uppercase().red().bold(),
            other => other.to_uppercase().normal(),
        };
        println!("{:<20} {:<10} {}", event.timestamp, level, event.message);
    }
    Ok(())
}

async fn run_thresholds(client: &Client, url: &str) -> Result<(), Box<dyn Error>> {
    let thresholds: Thresholds = client
        .get(format!("{url}/api/thresholds"))
        .send()
        .await?
        .json()
        .await?;
    print_thresholds(&thresholds);
    Ok(())
}

async fn run_set_thresholds(
    client: &Client,
    url: &str,
    thresholds: &Thresholds,
) -> Result<(), Box<dyn Error>> {
    let resp = client
        .post(format!("{url}/api/thresholds"))
        .json(thresholds)
        .send()
        .await?;

    if resp.status().is_success() {
        let applied: Thresholds = resp.json().await?;
        println!("{}", "thresholds updated".green());
        print_thresholds(&applied);
        Ok(())
    } else {
        let status = resp.status();
        let body: serde_json::Value = resp.json().await.unwrap_or_default();
        let reason = body["error"].as_str().unwrap_or("unknown error");
        Err(format!("update rejected ({status}): {reason}").into())
    }
}

async fn run_export(
    client: &Client,
    url: &str,
    start: &str,
    end: &str,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let resp = client
        .get(format!("{url}/api/export"))
        .query(&[("start", start), ("end", end)])
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body: serde_json::Value = resp.json().await.unwrap_or_default();
        let reason = body["error"].as_str().unwrap_or("unknown error");
        return Err(format!("export failed ({status}): {reason}").into());
    }

    let csv = resp.text().await?;
    match output {
        Some(path) => {
            std::fs::write(&path, &csv)?;
            let rows = csv.lines().count().saturating_sub(1);
            println!("wrote {} rows to {}", rows, path.display());
        }
        None => print!("{csv}"),
    }
    Ok(())
}

fn print_thresholds(thresholds: &Thresholds) {
    println!("cpu:      {:>12.1} %", thresholds.cpu);
    println!("gpu:      {:>12.1} %", thresholds.gpu);
    println!("memory:   {:>12.1} %", thresholds.memory);
    println!("net_sent: {:>12.1} B/s", thresholds.net_sent);
    println!("net_recv: {:>12.1} B/s", thresholds.net_recv);
}

fn format_opt_pct(value: Option<f32>) -> String {
    match value {
        Some(v) => format!("{v:.1}"),
        None => "-".to_string(),
    }
}

fn format_opt_rate(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    }
}
