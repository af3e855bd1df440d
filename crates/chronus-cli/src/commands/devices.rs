//! `chronus devices` - list audio output devices.

use clap::Args;

#[derive(Args)]
pub struct DevicesArgs {
    /// Emit machine-readable JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: DevicesArgs) -> anyhow::Result<()> {
    let devices = chronus_io::list_devices()?;

    if args.json {
        let entries: Vec<_> = devices
            .iter()
            .map(|d| {
                serde_json::json!({
                    "name": d.name,
                    "default_sample_rate": d.default_sample_rate,
                    "is_default": d.is_default,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No audio output devices found.");
        return Ok(());
    }

    println!("Output devices:");
    for device in devices {
        let marker = if device.is_default { " (default)" } else { "" };
        println!(
            "  {}{marker} - {} Hz",
            device.name, device.default_sample_rate
        );
    }
    Ok(())
}
