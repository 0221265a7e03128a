use colored::*;
use reqwest::Client;
use serde::Deserialize;
use std::error::Error;

#[derive(Deserialize, Debug)]
struct HealthResponse {
    #[allow(dead_code)]
    status: String,
    version: String,
}

#[derive(Deserialize, Debug)]
struct Thresholds {
    cpu: f64,
    memory: f64,
}

pub async fn run_doctor(url: &str) -> Result<(), Box<dyn Error>> {
    println!("{}", "Loadmon Doctor".bold().cyan());
    println!("{}", "Checking daemon health...".dimmed());
    println!();

    let client = Client::new();

    // 1. Connectivity & health
    print!("• Daemon connectivity: ");
    match client.get(format!("{url}/healthz")).send().await {
        Ok(resp) if resp.status().is_success() => match resp.json::<HealthResponse>().await {
            Ok(health) => println!("{} (v{})", "OK".green(), health.version),
            Err(_) => println!("{}", "OK (invalid JSON)".yellow()),
        },
        Ok(resp) => {
            println!("{}", format!("FAIL (status {})", resp.status()).red());
            return Ok(());
        }
        Err(e) => {
            println!("{}", format!("FAIL ({e})").red());
            println!("  → Is loadmond running? Try 'systemctl status loadmond'");
            return Ok(());
        }
    }

    // 2. Thresholds readable
    print!("• Alert thresholds:    ");
    match client.get(format!("{url}/api/thresholds")).send().await {
        Ok(resp) => match resp.json::<Thresholds>().await {
            Ok(t) => println!("{} (cpu {}%, memory {}%)", "OK".green(), t.cpu, t.memory),
            Err(e) => println!("{}", format!("FAIL ({e})").red()),
        },
        Err(e) => println!("{}", format!("FAIL ({e})").red()),
    }

    // 3. Samples flowing
    print!("• Sample history:      ");
    match client
        .get(format!("{url}/api/load"))
        .query(&[("limit", 1)])
        .send()
        .await
    {
        Ok(resp) => match resp.json::<Vec<serde_json::Value>>().await {
            Ok(rows) if rows.is_empty() => {
                println!("{}", "EMPTY (no samples recorded yet)".yellow())
            }
            Ok(rows) => println!(
                "{} (latest at {})",
                "OK".green(),
                rows[0]["timestamp"].as_str().unwrap_or("?")
            ),
            Err(e) => println!("{}", format!("FAIL ({e})").red()),
        },
        Err(e) => println!("{}", format!("FAIL ({e})").red()),
    }

    Ok(())
}
