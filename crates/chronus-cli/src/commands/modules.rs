//! `chronus modules` - list registered module types.

use chronus_core::SmoothingMode;
use chronus_registry::ModuleRegistry;
use clap::Args;

#[derive(Args)]
pub struct ModulesArgs {
    /// Show only one module type
    #[arg(long)]
    r#type: Option<String>,

    /// Emit the machine-readable schema snapshot
    #[arg(long)]
    json: bool,
}

pub fn run(args: ModulesArgs) -> anyhow::Result<()> {
    let registry = ModuleRegistry::with_builtins();

    if args.json {
        println!("{}", chronus_osc::server::schema_json(&registry));
        return Ok(());
    }

    let mut found = false;
    for schema in registry.schemas() {
        if let Some(filter) = &args.r#type
            && schema.type_name != filter.as_str()
        {
            continue;
        }
        found = true;

        println!("{}", schema.type_name);
        if schema.max_inputs > 1 {
            println!("  inputs: up to {}", schema.max_inputs);
        }
        if schema.params.is_empty() {
            println!("  (no parameters)");
        }
        for param in schema.params {
            let smoothing = match param.smoothing {
                SmoothingMode::None => String::from("unsmoothed"),
                SmoothingMode::Linear { window_ms } => format!("linear {window_ms} ms"),
                SmoothingMode::OnePole { window_ms } => format!("one-pole {window_ms} ms"),
            };
            println!(
                "  {:<12} {}..{}{} (default {}, {smoothing})",
                param.name,
                param.min,
                param.max,
                param.unit.suffix(),
                param.default,
            );
        }
        println!();
    }

    if !found {
        anyhow::bail!(
            "unknown module type {:?}",
            args.r#type.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
