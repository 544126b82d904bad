// OverDrive Tools - Audiobook chapter lookup and loan downloads
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use overdrive_tools::api::{MetadataClient, Region};
use overdrive_tools::chapters::{ChapterExtractor, Prompter};
use overdrive_tools::download::{DownloadProgress, DownloadState, OverDriveDownloader};
use overdrive_tools::logging::init_logger;
use overdrive_tools::odm::{LicenseClient, OdmDocument};
use overdrive_tools::{Config, OverdriveError};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "overdrive-tools")]
#[command(about = "Chapter lookup and loan downloads for OverDrive audiobooks", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up chapters for the book in a directory and write chapters.txt
    Chapters {
        /// Directory holding the book (and optionally its .odm file)
        #[arg(short, long, default_value = ".")]
        directory: PathBuf,
        /// Catalog region; asked interactively when omitted
        #[arg(short, long)]
        region: Option<String>,
    },
    /// Search by author and title and write a chapters file
    Search {
        #[arg(short, long)]
        author: String,
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        region: Option<String>,
        #[arg(short, long, default_value = "chapters.txt")]
        output: PathBuf,
    },
    /// Acquire the license for an ODM file
    License {
        odm: PathBuf,
    },
    /// Acquire the license if needed and download every part
    Download {
        odm: PathBuf,
        /// Create the book directory here instead of the working directory
        #[arg(long)]
        output_base: Option<PathBuf>,
    },
    /// Return a loan early
    Return {
        odm: PathBuf,
    },
    /// List catalog regions
    Regions,
}

/// Prompts on stdin/stdout
struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn ask(&mut self, question: &str, default: Option<&str>) -> overdrive_tools::Result<String> {
        match default {
            Some(d) => print!("{} [{}]: ", question, d),
            None => print!("{}: ", question),
        }
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(OverdriveError::Cancelled);
        }

        let answer = line.trim();
        match default {
            Some(d) if answer.is_empty() => Ok(d.to_string()),
            _ => Ok(answer.to_string()),
        }
    }

    fn show(&mut self, text: &str) {
        println!("{}", text);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    if let Err(error) = run(cli.command).await {
        eprintln!("Error: {}", describe(&error));
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<()> {
    let config = Config::from_env();

    match command {
        Commands::Chapters { directory, region } => {
            let mut prompter = TerminalPrompter;
            let region = match region {
                Some(code) => Region::parse(&code)?,
                None => ask_region(&config, &mut prompter)?,
            };

            let client = MetadataClient::new(config).context("Failed to create metadata client")?;
            let extractor = ChapterExtractor::new(directory, client);
            let report = extractor.extract(region, &mut prompter).await?;
            println!(
                "Successfully extracted {} chapters to {}",
                report.chapter_count,
                report.path.display()
            );
        }
        Commands::Search {
            author,
            title,
            region,
            output,
        } => {
            let region = Region::parse(region.as_deref().unwrap_or(&config.region))?;
            let client = MetadataClient::new(config).context("Failed to create metadata client")?;
            let report = ChapterExtractor::search_and_get_chapters(
                &client,
                &author,
                &title,
                region,
                &output,
                &mut TerminalPrompter,
            )
            .await?;
            println!("Chapters have been saved to {}", report.path.display());
        }
        Commands::License { odm } => {
            let client = LicenseClient::new(config)?;
            client
                .acquire(&odm)
                .await
                .with_context(|| format!("Could not acquire license for {}", odm.display()))?;
            println!("License ready for {}", odm.display());
        }
        Commands::Download { odm, output_base } => {
            let mut downloader = OverDriveDownloader::new(&odm, config)
                .await
                .with_context(|| format!("Could not read {}", odm.display()))?;
            if let Some(base) = output_base {
                downloader = downloader.with_output_base(base);
            }

            downloader.acquire_license().await?;
            let report = downloader.download(print_progress).await?;
            println!(
                "Downloaded {} of {} parts to {} (chapters in {})",
                report.downloaded.len(),
                report.total_parts(),
                report.output_dir.display(),
                report.chapters_file.display()
            );
        }
        Commands::Return { odm } => {
            let document = OdmDocument::load(&odm)
                .await
                .with_context(|| format!("Could not read {}", odm.display()))?;
            LicenseClient::new(config)?.early_return(&document).await?;
            println!("Loan returned");
        }
        Commands::Regions => {
            for region in Region::all() {
                println!("{:<4}{}", region.code(), region.catalog_url());
            }
        }
    }

    Ok(())
}

fn ask_region(config: &Config, prompter: &mut TerminalPrompter) -> Result<Region> {
    prompter.show(&format!("Available regions: {}", Region::codes_display()));
    loop {
        let answer = prompter.ask("Enter region code", Some(&config.region))?;
        match Region::parse(&answer) {
            Ok(region) => return Ok(region),
            Err(e) => prompter.show(&e.to_string()),
        }
    }
}

fn print_progress(progress: DownloadProgress) {
    match progress.state {
        DownloadState::Downloading => {
            print!("\r{}", progress.display_string());
            let _ = io::stdout().flush();
        }
        _ => println!("\r{}", progress.display_string()),
    }
}

/// Library errors are shown with their user-facing message
fn describe(error: &anyhow::Error) -> String {
    match error.downcast_ref::<OverdriveError>() {
        Some(inner) => {
            let outer = error.to_string();
            if outer == inner.to_string() {
                inner.user_message()
            } else {
                format!("{}: {}", outer, inner.user_message())
            }
        }
        None => format!("{:#}", error),
    }
}
