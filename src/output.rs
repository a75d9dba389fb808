use std::io::{self, Write};

use crossterm::style::Stylize;
use serde::Serialize;

use crate::app::{FetchResult, ProgressEvent, ProgressSink};
use crate::domain::{ObjectIdentity, SourceName};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_identity(identity: &ObjectIdentity) -> io::Result<()> {
        Self::print_json(identity)
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress lines on stderr for interactive runs.
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!(
                "{} {} {}",
                "›".dark_grey(),
                event.message,
                format!("({} ms)", elapsed.as_millis()).dark_grey()
            ),
            None => eprintln!("{} {}", "›".dark_grey(), event.message),
        }
    }
}

pub fn print_fetch_summary(result: &FetchResult) {
    println!("{}", format!("spectrator: {}", result.identifier).cyan().bold());
    if let Some(position) = result.identity.position {
        println!(
            "  RA {:.6}°  Dec {:+.6}°  record key {}",
            position.ra_deg,
            position.dec_deg,
            result.identity.record_key().unwrap_or("-")
        );
    }
    for report in &result.reports {
        let line = format!(
            "{:<9} {:<6} {} artifact(s)",
            report.source.label(),
            report.status,
            report.artifacts
        );
        match report.status {
            "found" => println!("  {}", line.green()),
            "failed" => println!("  {}", line.red()),
            _ => println!("  {}", line.yellow()),
        }
        if let Some(detail) = &report.detail {
            println!("            {}", detail.as_str().dark_grey());
        }
    }
    for entry in &result.entries {
        let label = match &entry.filter_label {
            Some(filter) => format!("{} [{filter}]", entry.source.label()),
            None => entry.source.label().to_string(),
        };
        let location = entry
            .artifact_url
            .clone()
            .unwrap_or_else(|| entry.artifact_path.to_string());
        println!("  {:<14} {location}", label);
    }
    println!("  manifest: {}", result.manifest_path);
}

/// Human names for the `lookup` command.
pub fn describe_source(source: SourceName) -> String {
    format!(
        "{} ({}, wavelength in {})",
        source.display_name(),
        source.label(),
        source.wavelength_unit()
    )
}
