//! analyze_frame - run one image through detection + OCR and print the result

use anyhow::{anyhow, Context, Result};
use base64::Engine as _;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use iva_kernel::runtime;
use iva_kernel::{EventJournal, FrameCoordinator, IvaConfig, MemoryJournal};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image file (JPEG or PNG).
    #[arg(long)]
    image: PathBuf,
    /// Subject the resulting event is attributed to.
    #[arg(long, default_value = "local")]
    subject: String,
    /// Do not write the event to the configured journal.
    #[arg(long)]
    no_journal: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let cfg = IvaConfig::load()?;

    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    let image_base64 = base64::engine::general_purpose::STANDARD.encode(bytes);

    let journal: Arc<dyn EventJournal> = if args.no_journal {
        Arc::new(MemoryJournal::new())
    } else {
        runtime::open_journal(&cfg)?
    };
    let coordinator: FrameCoordinator = runtime::build_coordinator(&cfg, journal)?;
    let result = coordinator
        .process_frame(&image_base64, &args.subject)
        .map_err(|e| anyhow!("{}: {}", args.image.display(), e))?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
