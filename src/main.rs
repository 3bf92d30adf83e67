use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

use annonces_scraper::config::Settings;
use annonces_scraper::model::Site;
use annonces_scraper::service::{AggregationService, RunSummary};
use annonces_scraper::store;

#[derive(Parser)]
#[command(name = "annonces_scraper", about = "Minibus classified-ads aggregator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every source once and overwrite the record file
    Run {
        /// Search keyword for sources with a search form
        #[arg(short, long)]
        keyword: Option<String>,
        /// Avito category page
        #[arg(long)]
        avito_url: Option<String>,
        /// Record file to write
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the status snapshot as JSON
    Status,
    /// Table of the persisted records
    List {
        /// Only this source (e.g. "avito", "Truck1.co.ma")
        #[arg(short, long)]
        site: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load()?;

    let result = match cli.command {
        Commands::Run {
            keyword,
            avito_url,
            output,
        } => {
            if let Some(k) = keyword {
                settings.keyword = k;
            }
            if let Some(u) = avito_url {
                settings.avito_url = u;
            }
            if let Some(o) = output {
                settings.output_path = o;
            }
            let query = settings.default_query();
            let service = AggregationService::new(settings);

            println!(
                "Searching '{}' across {} sources...",
                query.keyword,
                Site::ALL.len()
            );
            let summary = service.trigger(&query).await?;
            match &summary {
                RunSummary::Completed { count } => println!(
                    "Saved {} ads to {}",
                    count,
                    service.settings().output_path.display()
                ),
                RunSummary::Failed { message } => println!("Run failed: {}", message),
            }
            if let Some(n) = summary.notification() {
                println!("[{}] {}", n.title, n.body);
            }
            Ok(())
        }
        Commands::Status => {
            let service = AggregationService::new(settings);
            println!("{}", serde_json::to_string_pretty(&service.status())?);
            Ok(())
        }
        Commands::List { site, limit } => {
            let filter = match site.as_deref() {
                Some(label) => match Site::from_label(label) {
                    Some(s) => Some(s),
                    None => anyhow::bail!("Unknown site '{}'", label),
                },
                None => None,
            };
            let records = store::load_records(&settings.output_path)?;
            let rows: Vec<_> = records
                .iter()
                .filter(|r| filter.map_or(true, |s| r.site == s))
                .take(limit)
                .collect();
            if rows.is_empty() {
                println!("No ads found. Run 'run' first.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<18} | {:<28} | {:<14} | {:<12} | {:<14}",
                "#", "Site", "Model", "Price", "Date", "Phone"
            );
            println!("{}", "-".repeat(104));
            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<18} | {:<28} | {:<14} | {:<12} | {:<14}",
                    i + 1,
                    r.site,
                    cell(&r.model, 28),
                    cell(&r.price, 14),
                    cell(&r.published, 12),
                    cell(&r.phone, 14)
                );
            }
            println!("\n{} of {} ads | {}", rows.len(), records.len(), settings.output_path.display());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", elapsed_label(elapsed));
    }

    result
}

/// Fit `s` into a table column of `width` chars, marking cut text with `…`.
fn cell(s: &str, width: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= width {
        return s.to_string();
    }
    let kept: String = s.chars().take(width.saturating_sub(1)).collect();
    format!("{}…", kept.trim_end())
}

/// Run time as `4.2s`, `3m07s` or `1h02m`.
fn elapsed_label(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    match secs {
        0..=59 => format!("{:.1}s", d.as_secs_f64()),
        60..=3599 => format!("{}m{:02}s", secs / 60, secs % 60),
        _ => format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn cell_keeps_column_width() {
        assert_eq!(cell("Ford Transit", 28), "Ford Transit");
        assert_eq!(cell("Mercedes Sprinter 516", 10), "Mercedes…");
        assert_eq!(cell("Aujourd'hui à 10:12", 12).chars().count(), 12);
    }

    #[test]
    fn elapsed_labels() {
        assert_eq!(elapsed_label(Duration::from_millis(4200)), "4.2s");
        assert_eq!(elapsed_label(Duration::from_secs(187)), "3m07s");
        assert_eq!(elapsed_label(Duration::from_secs(3720)), "1h02m");
    }
}
