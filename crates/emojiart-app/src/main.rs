//! Headless EmojiArt shell.
//!
//! Works on the auto-saved document: every editing command restores it,
//! applies the change and saves it straight back.

use anyhow::Context;
use clap::{Parser, Subcommand};
use emojiart_core::{
    BackgroundRef, DropPayload, EmojiArtSession, FetchStatus, FileStorage, HttpFetcher,
    PaletteStore, RasterDecoder, SessionConfig, Storage, default_is_emoji,
    palette::stored_names,
};
use kurbo::{Point, Size};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// How long `--fetch` waits for a remote background.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "emojiart", version, about = "Inspect and edit EmojiArt documents")]
struct Cli {
    /// Directory holding the auto-save slot and palette stores.
    #[arg(long, env = "EMOJIART_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Name of the palette store to use.
    #[arg(long, default_value = "Default")]
    palette_store: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the auto-saved document, or a document file.
    Show {
        file: Option<PathBuf>,
        /// Resolve the background and report its size.
        #[arg(long)]
        fetch: bool,
    },
    /// Place an emoji.
    Add {
        emoji: String,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        x: i64,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        y: i64,
        #[arg(long, default_value_t = 40)]
        size: i64,
    },
    /// Set the background from a link or an image file.
    Background {
        source: String,
        /// Do not wait for a remote background to resolve.
        #[arg(long)]
        no_fetch: bool,
    },
    /// Remove the background.
    ClearBackground,
    /// Write the document to a file.
    Export { file: PathBuf },
    /// Replace the document with a file.
    Import { file: PathBuf },
    /// List palettes.
    Palettes {
        /// List the saved palette store names instead.
        #[arg(long)]
        stores: bool,
    },
    /// Forget the auto-saved document.
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    log::info!("Starting EmojiArt");

    let cli = Cli::parse();
    let storage = Arc::new(match &cli.data_dir {
        Some(dir) => FileStorage::new(dir.clone())?,
        None => FileStorage::default_location()?,
    });
    log::debug!("Data directory: {}", storage.base_path().display());

    let command = match cli.command {
        Command::Palettes { stores: true } => {
            for name in stored_names(storage.as_ref()).context("Could not list palette stores")? {
                println!("{}", name);
            }
            return Ok(());
        }
        Command::Palettes { stores: false } => {
            let store = PaletteStore::open(&cli.palette_store, storage);
            for palette in store.palettes() {
                println!("{:>3}  {:<12} {}", palette.id, palette.name, palette.emojis);
            }
            return Ok(());
        }
        command => command,
    };

    let fetcher = HttpFetcher::new().context("Could not create HTTP client")?;
    let mut session = EmojiArtSession::new(
        SessionConfig::default(),
        storage,
        Arc::new(fetcher),
        Arc::new(RasterDecoder),
        Handle::current(),
    );

    match command {
        Command::Show { file, fetch } => {
            match file {
                Some(path) => session
                    .import(&path)
                    .with_context(|| format!("Could not open {}", path.display()))?,
                None => {
                    session.restore().await;
                }
            }
            print_document(&session);
            if fetch && !session.document().background().is_blank() {
                report_background(&session).await;
            }
            return Ok(());
        }
        Command::Add { emoji, x, y, size } => {
            session.restore().await;
            let id = session.add_emoji(&emoji, (x, y), size);
            println!("Added {} as #{}", emoji, id);
        }
        Command::Background { source, no_fetch } => {
            session.restore().await;
            let path = PathBuf::from(&source);
            let payload = if path.is_file() {
                let bytes = std::fs::read(&path)
                    .with_context(|| format!("Could not read {}", path.display()))?;
                DropPayload::ImageData(bytes)
            } else {
                DropPayload::Url(source.clone())
            };
            // Links and image bytes ignore the drop point.
            let font_size = session.config().default_font_size;
            let dropped =
                session.handle_drop(payload, Point::ZERO, Size::ZERO, font_size, default_is_emoji);
            if !dropped {
                anyhow::bail!("{} is neither an image file nor a link", source);
            }
            if !no_fetch {
                report_background(&session).await;
            }
        }
        Command::ClearBackground => {
            session.restore().await;
            session.set_background(BackgroundRef::Blank);
        }
        Command::Export { file } => {
            session.restore().await;
            session
                .export(&file)
                .with_context(|| format!("Could not export to {}", file.display()))?;
            println!("Exported {} emoji to {}", session.document().len(), file.display());
            return Ok(());
        }
        Command::Import { file } => {
            session
                .import(&file)
                .with_context(|| format!("Could not import {}", file.display()))?;
            println!("Imported {} emoji", session.document().len());
        }
        Command::Reset => {
            if session.discard_autosave().await.context("Could not reset")? {
                println!("Discarded the auto-saved document");
            } else {
                println!("Nothing to discard");
            }
            return Ok(());
        }
        Command::Palettes { .. } => {}
    }

    session.flush().await.context("Could not save document")?;
    Ok(())
}

fn print_document<S: Storage + 'static>(session: &EmojiArtSession<S>) {
    let document = session.document();
    match document.background() {
        BackgroundRef::Blank => println!("Background: none"),
        BackgroundRef::Url(url) => println!("Background: {}", url),
        BackgroundRef::ImageData(bytes) => println!("Background: inline image ({} bytes)", bytes.len()),
    }
    println!("{} emoji", document.len());
    for element in document.elements() {
        println!(
            "  #{:<4} {}  at ({}, {})  size {}",
            element.id(),
            element.text(),
            element.x(),
            element.y(),
            element.size()
        );
    }
}

async fn report_background<S: Storage + 'static>(session: &EmojiArtSession<S>) {
    let mut status = session.subscribe_status();
    let settled = tokio::time::timeout(FETCH_TIMEOUT, async {
        status.wait_for(|s| !s.is_fetching()).await.map(|_| ())
    })
    .await;
    match settled {
        Err(_) => println!("Background still loading after {:?}", FETCH_TIMEOUT),
        Ok(Err(_)) => println!("Background resolver stopped"),
        Ok(Ok(_)) => match session.fetch_status() {
            FetchStatus::Failed(Some(url)) => println!("Could not load background from {}", url),
            FetchStatus::Failed(None) => println!("Background is not a usable image"),
            _ => match session.background_image() {
                Some(image) => {
                    let (width, height) = image.size();
                    println!("Background image: {}x{}", width, height);
                }
                None => println!("Background: none"),
            },
        },
    }
}
