//! Enrollment station CLI.
//!
//! Foreground workflows are invoked one at a time from here while the
//! background presence poller runs for the lifetime of the process.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{bail, IntoDiagnostic, Result};

use enrollment_station::adapters::ca::CommandCaClient;
use enrollment_station::adapters::entropy::{DeviceNodeEntropy, EntropySource, NoEntropySource};
use enrollment_station::adapters::transport::TransportProvider;
use enrollment_station::domain::{PivPin, PivPuk};
use enrollment_station::infra::settings::{Settings, SettingsManager, SETTINGS_FILE};
use enrollment_station::infra::store::{EnrollmentStore, STORE_FILE};
use enrollment_station::services::{self, DeviceDetector};

#[derive(Parser)]
#[command(name = "enrollment-station")]
#[command(about = "Enroll smart-card tokens against a CA and manage their lifecycle")]
#[command(long_about = "
Enrollment Station - binds hardware tokens to CA-issued certificates

EXAMPLES:
    # Show the inserted token and HSM status
    enrollment-station status

    # Enroll the inserted (factory-fresh) token for a user
    enrollment-station enroll --user jdoe

    # Revoke a certificate without touching the device
    enrollment-station revoke --serial 123456

    # Revoke and wipe in one pass
    enrollment-station terminate --serial 123456

ENVIRONMENT VARIABLES:
    RUST_LOG        Logging level (debug, info, warn, error)
")]
#[command(version)]
struct Cli {
    /// Enrollment store file
    #[arg(long, global = true, default_value = STORE_FILE)]
    store: PathBuf,

    /// Settings file
    #[arg(long, global = true, default_value = SETTINGS_FILE)]
    settings: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the inserted token, its mode, and HSM presence
    Status,

    /// List enrolled devices from the store
    List,

    /// Watch for token insertion/removal and mode changes
    Watch,

    /// Enroll the inserted factory-fresh token
    Enroll {
        /// User the certificate is enrolled for
        #[arg(short, long)]
        user: String,
    },

    /// Reset the PIN of an enrolled device using its PUK
    ResetPin {
        /// Device serial
        #[arg(short, long)]
        serial: u32,

        /// Current PUK
        #[arg(long)]
        puk: String,

        /// New PIN
        #[arg(long)]
        new_pin: String,
    },

    /// Factory-reset a device (wipes PIN, PUK, keys; does NOT revoke)
    Reset {
        /// Device serial
        #[arg(short, long)]
        serial: u32,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Revoke the certificate of an enrolled device (does NOT wipe it)
    Revoke {
        /// Device serial
        #[arg(short, long)]
        serial: u32,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Terminate a device: revoke its certificate, then wipe it
    Terminate {
        /// Device serial
        #[arg(short, long)]
        serial: u32,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Toggle the CCID (smart-card) interface on the inserted token
    ToggleCcid,

    /// Export the certificate of an enrolled device from the store
    ExportCert {
        /// Device serial
        #[arg(short, long)]
        serial: u32,

        /// Output file (DER)
        #[arg(short, long)]
        out: PathBuf,

        /// Read slot 9a of the inserted device instead of the store
        #[arg(long)]
        from_device: bool,
    },

    /// Settings management
    #[command(subcommand)]
    Settings(SettingsCommands),
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show current settings
    Show,

    /// Write a default settings file to edit
    Init,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status => cmd_status(&cli.settings),
        Commands::List => cmd_list(&cli.store),
        Commands::Watch => cmd_watch(),
        Commands::Enroll { user } => cmd_enroll(&cli.store, &cli.settings, &user),
        Commands::ResetPin {
            serial,
            puk,
            new_pin,
        } => cmd_reset_pin(serial, &puk, &new_pin),
        Commands::Reset { serial, yes } => cmd_reset(&cli.store, serial, yes),
        Commands::Revoke { serial, yes } => cmd_revoke(&cli.store, &cli.settings, serial, yes),
        Commands::Terminate { serial, yes } => {
            cmd_terminate(&cli.store, &cli.settings, serial, yes)
        }
        Commands::ToggleCcid => cmd_toggle_ccid(),
        Commands::ExportCert {
            serial,
            out,
            from_device,
        } => cmd_export_cert(&cli.store, serial, &out, from_device),
        Commands::Settings(command) => cmd_settings(&cli.settings, command),
    }
}

/// Open the compiled-in hardware backend.
fn provider() -> Result<Box<dyn TransportProvider>> {
    #[cfg(feature = "pcsc-backend")]
    {
        Ok(Box::new(enrollment_station::adapters::pcsc::PcscProvider))
    }
    #[cfg(not(feature = "pcsc-backend"))]
    {
        bail!("no device backend compiled in; rebuild with --features pcsc-backend")
    }
}

fn detector() -> Result<&'static DeviceDetector> {
    Ok(DeviceDetector::init(provider()?))
}

fn load_settings(path: &PathBuf) -> Result<Settings> {
    Ok(SettingsManager::new(path).load()?)
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush().into_diagnostic()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).into_diagnostic()?;
    Ok(line.trim().eq_ignore_ascii_case("y"))
}

/// The "please insert this specific device" gate. Runs before any lock is
/// taken; the workflows re-verify the serial under the lock.
fn insert_device_gate(serial: u32) -> Result<()> {
    print!("Insert device with serial {serial} and press Enter (or 'q' to abort): ");
    io::stdout().flush().into_diagnostic()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).into_diagnostic()?;
    if line.trim().eq_ignore_ascii_case("q") {
        bail!("aborted by operator");
    }
    Ok(())
}

fn cmd_status(settings_path: &PathBuf) -> Result<()> {
    let detector = detector()?;
    let provider = provider()?;

    let entropy: Box<dyn EntropySource> = match SettingsManager::new(settings_path)
        .load()
        .ok()
        .and_then(|s| s.entropy_device)
    {
        Some(path) => Box::new(DeviceNodeEntropy::new(path)),
        None => Box::new(NoEntropySource),
    };
    println!(
        "HSM present: {}",
        if entropy.is_present() { "Yes" } else { "No" }
    );

    match services::read_status(detector, provider.as_ref()) {
        Ok(status) => {
            println!("Device serial:    {}", status.serial);
            println!("Firmware:         {}", status.firmware);
            println!("PIV applet:       {}", status.piv_applet);
            println!("Interface mode:   {}", status.mode);
            println!("PIN tries left:   {}", status.pin_tries_left);
            println!(
                "Enrolled:         {}",
                if status.enrolled { "Yes" } else { "No" }
            );
            println!(
                "CCID active:      {}",
                if status.mode.is_ccid_active() {
                    "Yes"
                } else {
                    "No"
                }
            );
        }
        Err(e) => println!("No device: {e}"),
    }
    Ok(())
}

fn cmd_list(store_path: &PathBuf) -> Result<()> {
    let store = EnrollmentStore::load(store_path)?;
    if store.is_empty() {
        println!("No enrolled devices.");
        return Ok(());
    }
    println!(
        "{:<10} {:<16} {:<24} {:<20} CA",
        "SERIAL", "USER", "ENROLLED AT", "CERT SERIAL"
    );
    for device in store.devices() {
        println!(
            "{:<10} {:<16} {:<24} {:<20} {}",
            device.device_serial,
            device.username,
            device.enrolled_at.format("%Y-%m-%d %H:%M:%S UTC"),
            device.certificate.serial,
            device.ca
        );
    }
    Ok(())
}

fn cmd_watch() -> Result<()> {
    let detector = detector()?;
    let changes = detector.subscribe();
    detector.start();

    println!("Watching for device changes (Ctrl-C to stop)...");
    while changes.recv().is_ok() {
        match detector.last_snapshot() {
            Some(snapshot) if snapshot.present => {
                println!(
                    "Device present (mode byte: {})",
                    snapshot
                        .mode_byte
                        .map_or_else(|| "unknown".to_string(), |b| format!("0x{b:02x}"))
                );
            }
            _ => println!("Device removed"),
        }
    }
    Ok(())
}

fn cmd_enroll(store_path: &PathBuf, settings_path: &PathBuf, user: &str) -> Result<()> {
    let settings = load_settings(settings_path)?;
    if settings.ca_name.is_empty() {
        bail!("no CA configured; edit {}", settings_path.display());
    }

    let detector = detector()?;
    let provider = provider()?;
    let ca = CommandCaClient::from_settings(&settings);
    let mut store = EnrollmentStore::load(store_path)?;

    let outcome = services::enroll(
        detector,
        provider.as_ref(),
        &ca,
        &settings,
        &mut store,
        user,
    )?;

    println!(
        "Enrolled device {} for {}.",
        outcome.record.device_serial, outcome.record.username
    );
    println!("Certificate serial: {}", outcome.record.certificate.serial);
    println!("Subject:            {}", outcome.record.certificate.subject);
    println!();
    println!("Hand these to the user; the station keeps no copy:");
    println!("  PIN: {}", outcome.pin.as_str());
    println!("  PUK: {}", outcome.puk.as_str());
    Ok(())
}

fn cmd_reset_pin(serial: u32, puk: &str, new_pin: &str) -> Result<()> {
    let puk = PivPuk::new(puk)?;
    let new_pin = PivPin::new(new_pin)?;

    insert_device_gate(serial)?;

    let detector = detector()?;
    let provider = provider()?;
    services::reset_pin(detector, provider.as_ref(), serial, &puk, &new_pin)?;
    println!("PIN reset on device {serial}.");
    Ok(())
}

fn cmd_reset(store_path: &PathBuf, serial: u32, yes: bool) -> Result<()> {
    let store = EnrollmentStore::load(store_path)?;
    if store.get(serial).is_none() {
        log::warn!("device {serial} is not in the store; resetting anyway");
    }

    if !yes
        && !confirm(
            "This wipes PIN, PUK, management key and certificates but does NOT revoke. Proceed?",
        )?
    {
        bail!("aborted by operator");
    }

    insert_device_gate(serial)?;

    let detector = detector()?;
    let provider = provider()?;
    services::factory_reset(detector, provider.as_ref(), serial)?;
    println!("Device {serial} wiped.");
    Ok(())
}

fn cmd_revoke(store_path: &PathBuf, settings_path: &PathBuf, serial: u32, yes: bool) -> Result<()> {
    let settings = load_settings(settings_path)?;
    let mut store = EnrollmentStore::load(store_path)?;
    let Some(record) = store.get(serial) else {
        bail!("no enrollment found for device {serial}");
    };

    println!(
        "Will revoke certificate {} ({}) issued by {}, enrolled {} for {}.",
        record.certificate.serial,
        record.certificate.subject,
        record.certificate.issuer,
        record.enrolled_at,
        record.username
    );
    if !yes && !confirm("Revoke the certificate? The device is NOT wiped.")? {
        bail!("aborted by operator");
    }

    let ca = CommandCaClient::from_settings(&settings);
    services::revoke(&ca, &mut store, serial)?;
    println!("Certificate revoked; enrollment record removed.");
    Ok(())
}

fn cmd_terminate(
    store_path: &PathBuf,
    settings_path: &PathBuf,
    serial: u32,
    yes: bool,
) -> Result<()> {
    let settings = load_settings(settings_path)?;
    let mut store = EnrollmentStore::load(store_path)?;
    let Some(record) = store.get(serial) else {
        bail!("no enrollment found for device {serial}");
    };

    println!(
        "Will revoke certificate {} AND wipe device {}.",
        record.certificate.serial, serial
    );
    if !yes && !confirm("Terminate (revoke + wipe)?")? {
        bail!("aborted by operator");
    }

    insert_device_gate(serial)?;

    let detector = detector()?;
    let provider = provider()?;
    let ca = CommandCaClient::from_settings(&settings);
    services::terminate(detector, provider.as_ref(), &ca, &mut store, serial)?;
    println!("Device {serial} terminated.");
    Ok(())
}

fn cmd_toggle_ccid() -> Result<()> {
    let detector = detector()?;
    let provider = provider()?;
    let next = services::toggle_ccid(detector, provider.as_ref())?;
    println!("Mode set to {next}; re-plug the device to apply.");
    Ok(())
}

fn cmd_export_cert(store_path: &PathBuf, serial: u32, out: &PathBuf, from_device: bool) -> Result<()> {
    if from_device {
        insert_device_gate(serial)?;

        let detector = detector()?;
        let provider = provider()?;
        let Some(der) = services::read_certificate(detector, provider.as_ref(), serial)? else {
            bail!("device {serial} has no certificate in slot 9a");
        };
        std::fs::write(out, &der).into_diagnostic()?;
        println!("Wrote slot 9a certificate of device {serial} to {}.", out.display());
        return Ok(());
    }

    let store = EnrollmentStore::load(store_path)?;
    let Some(record) = store.get(serial) else {
        bail!("no enrollment found for device {serial}");
    };
    std::fs::write(out, &record.certificate.raw_der).into_diagnostic()?;
    println!(
        "Wrote certificate {} to {}.",
        record.certificate.serial,
        out.display()
    );
    Ok(())
}

fn cmd_settings(settings_path: &PathBuf, command: SettingsCommands) -> Result<()> {
    let manager = SettingsManager::new(settings_path);
    match command {
        SettingsCommands::Show => {
            let settings = manager.load()?;
            println!("{}", serde_json::to_string_pretty(&settings).into_diagnostic()?);
        }
        SettingsCommands::Init => {
            if manager.exists() {
                bail!("{} already exists", settings_path.display());
            }
            manager.save(&Settings::default())?;
            println!(
                "Wrote default settings to {}; edit the CA name and commands.",
                settings_path.display()
            );
        }
    }
    Ok(())
}
