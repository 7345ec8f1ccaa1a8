// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for headless inspection
//!
//! This module provides command-line functionality for:
//! - Listing cameras of the configured backend
//! - Analyzing a single image file and printing the bill
//! - Running one auto-capture walk
//! - Checking backend health
//! - Starting a service session for a vehicle
//! - Converting serial telemetry lines to JSON updates, optionally saving them

use service_bay::app::{Inspector, Message, Services, VideoSourceKind};
use service_bay::backends::camera::{self, Frame};
use service_bay::backends::remote_feed::{FeedSource, HttpFeedSource};
use service_bay::backends::session::{HttpSessionClient, VehicleInfo};
use service_bay::config::Config;
use service_bay::sensors::parse_serial_line;
use service_bay::station::StationId;
use std::io::BufRead;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// List cameras of the configured backend
pub fn list_cameras(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let backend = camera::backend_from_config(config);
    println!("Backend: {}", backend.backend_type());

    let devices = backend.enumerate_devices()?;
    if devices.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    let assignment = camera::assign_devices(&devices);
    println!("Available cameras:");
    println!();
    for (index, device) in devices.iter().enumerate() {
        let station = assignment
            .iter()
            .find(|(_, assigned)| assigned.as_ref() == Some(device))
            .map(|(station, _)| station.display_name())
            .unwrap_or("-");
        println!("  [{}] {} ({})", index, device.name, device.id);
        println!("      Station: {}", station);
    }
    println!();

    Ok(())
}

/// Upload an image file for one station and print the result and bill
pub fn analyze_file(
    config: Config,
    station: StationId,
    file: PathBuf,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = Frame::from(std::fs::read(&file)?);
    if image.image_format().is_none() {
        return Err(format!("Not a supported image: {}", file.display()).into());
    }

    println!("Analyzing {} as {}...", file.display(), station.display_name());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let services = Services::from_config(&config);
        let mut inspector = Inspector::new(config, services);
        inspector.update(Message::UploadImage { station, image })?;
        inspector.settle().await;

        let slot = inspector.state().slots[station].clone();
        let bill = inspector.state().bill.clone();
        inspector.shutdown();

        if let Some(error) = slot.last_error {
            return Err(format!("Analysis failed: {}", error).into());
        }
        let Some(result) = slot.result else {
            return Err("Analysis produced no result".into());
        };

        println!();
        println!("Scratches: {}", result.counts.scratches);
        println!("Dents:     {}", result.counts.dents);
        println!("Cracks:    {}", result.counts.cracks);
        if let Some(status) = result.brake_status {
            println!("Brakes:    {}", status);
        }
        println!();
        println!("{}", bill);

        if let (Some(path), Some(annotated)) = (output, slot.after) {
            std::fs::write(&path, &annotated.data[..])?;
            println!("Annotated image saved: {}", path.display());
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Walk the stations once with auto-capture and print the bill
pub fn auto_capture(config: Config, remote: bool) -> Result<(), Box<dyn std::error::Error>> {
    let source = if remote {
        VideoSourceKind::RemoteFeed
    } else {
        VideoSourceKind::LocalCamera
    };
    println!("Source: {}", source);

    let stop = CancellationToken::new();
    let stop_handler = stop.clone();
    ctrlc::set_handler(move || stop_handler.cancel())?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let services = Services::from_config(&config);
        let warmup = config.feed_poll_interval() * 2;
        let mut inspector = Inspector::new(config, services);

        inspector.update(Message::SetSource(source))?;
        if remote {
            // Give the poller a chance to deliver the first frames
            tokio::time::sleep(warmup).await;
        }
        inspector.settle().await;
        inspector.update(Message::StartAutoCapture)?;

        println!("Capturing... (press Ctrl+C to stop early)");
        let mut last_station = None;
        loop {
            let current = inspector.state().auto_capture.current_station();
            if current != last_station {
                if let Some(station) = current {
                    println!("  {}", station.display_name());
                }
                last_station = current;
            }
            if current.is_none() && inspector.in_flight_count() == 0 {
                break;
            }

            tokio::select! {
                _ = stop.cancelled() => {
                    println!();
                    println!("Stopping early...");
                    break;
                }
                processed = inspector.next_message() => match processed {
                    Some(Err(e)) => eprintln!("  {}", e),
                    Some(Ok(())) => {}
                    None => break,
                },
            }
        }

        let state = inspector.state();
        println!();
        for (station, slot) in state.slots.iter() {
            match (&slot.result, &slot.last_error) {
                (Some(result), _) => println!(
                    "{:<8} scratches {} dents {} cracks {}",
                    station.display_name(),
                    result.counts.scratches,
                    result.counts.dents,
                    result.counts.cracks
                ),
                (None, Some(error)) => println!("{:<8} failed: {}", station.display_name(), error),
                (None, None) => println!("{:<8} not captured", station.display_name()),
            }
        }
        println!();
        println!("{}", state.bill);

        inspector.shutdown();
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Check whether the backend reports itself online
pub fn health(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let feed = HttpFeedSource::new(config.backend_url.clone());
    let rt = tokio::runtime::Runtime::new()?;
    let online = rt.block_on(feed.health())?;

    if online {
        println!("{}: online", config.backend_url);
        Ok(())
    } else {
        Err(format!("{}: not online", config.backend_url).into())
    }
}

/// Register a vehicle and print the new service record id
///
/// With `remember_in`, the id is stored as the session of that config file.
pub fn start_service(
    config: &Config,
    vehicle: VehicleInfo,
    remember_in: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = HttpSessionClient::new(config.backend_url.clone());
    let rt = tokio::runtime::Runtime::new()?;
    let started = rt.block_on(client.start_service(&vehicle))?;

    println!("Service record: {}", started.service_record_id);
    if let Some(vehicle_id) = &started.vehicle_id {
        println!("Vehicle:        {}", vehicle_id);
    }

    match remember_in {
        Some(path) => {
            // Reload so command-line overrides are not written back
            let mut stored = Config::load_from(&path)?;
            stored.session_id = Some(started.service_record_id);
            stored.save_to(&path)?;
            println!("Saved as current session in {}", path.display());
        }
        None => println!(
            "Pass --session {} to follow this service",
            started.service_record_id
        ),
    }
    Ok(())
}

/// Read serial telemetry lines from stdin and print one JSON update per line
///
/// With `save`, every update is also saved to the configured session's
/// service record. Failed saves are reported and reading continues.
pub fn ingest(config: &Config, save: bool) -> Result<(), Box<dyn std::error::Error>> {
    let target = if save {
        let Some(session) = config.session_id.clone() else {
            return Err("--save needs a session (use --session or `start --save`)".into());
        };
        let client = HttpSessionClient::new(config.backend_url.clone());
        Some((tokio::runtime::Runtime::new()?, client, session))
    } else {
        None
    };

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let update = parse_serial_line(&line?);
        if update.is_empty() {
            continue;
        }
        println!("{}", serde_json::to_string(&update)?);

        if let Some((rt, client, session)) = &target {
            if let Err(e) = rt.block_on(client.save_sensor_data(session, &update)) {
                eprintln!("  save failed: {}", e);
            }
        }
    }
    Ok(())
}
