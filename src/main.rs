use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
mod auth;
use cryptnos::password::{self, DeriveRequest};
use cryptnos::transfer::{self, Background};
use cryptnos::{
    CancelFlag, CharTypes, CommitOptions, Cryptnos, FileStore, HashAlgorithm, KdfParams, Progress,
    RecordCipher, Reporter, Settings, SiteParameters, TextEncoding,
};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

#[derive(Debug, clap::Args)]
struct Argon2Args {
    /// Argon2 memory cost in KiB for record encryption (default: 65536)
    #[arg(long = "argon-mem", global = true)]
    mem_cost_kib: Option<u32>,

    /// Argon2 time cost / iterations (default: 3)
    #[arg(long = "argon-time", global = true)]
    time_cost: Option<u32>,

    /// Argon2 parallelism (default: 1)
    #[arg(long = "argon-parallelism", global = true)]
    parallelism: Option<u32>,
}

impl Argon2Args {
    fn apply(&self, base: KdfParams) -> Result<KdfParams> {
        Ok(KdfParams::new(
            self.mem_cost_kib.unwrap_or(base.mem_cost_kib()),
            self.time_cost.unwrap_or(base.time_cost()),
            self.parallelism.unwrap_or(base.parallelism()),
        )?)
    }
}

#[derive(Debug, Parser)]
#[command(name = "cryptnos")]
#[command(
    version,
    about = "Offline, deterministic per-site password generator written in Rust."
)]
struct Cli {
    /// Path to the parameter store file
    #[arg(long, global = true, value_name = "PATH", env = "CRYPTNOS_STORE")]
    store: Option<PathBuf>,

    /// Text encoding for sites and passphrases (utf-8, utf-16le, utf-16be, iso-8859-1, us-ascii)
    #[arg(long, global = true, value_name = "NAME")]
    encoding: Option<TextEncoding>,

    /// Salt text for site keys and record encryption
    #[arg(long, global = true, value_name = "TEXT")]
    salt: Option<String>,

    #[command(flatten)]
    argon2: Argon2Args,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generates the password for a site
    #[command(arg_required_else_help = true)]
    Generate {
        site: String,

        /// Hash algorithm (MD5, SHA-1, SHA-224, SHA-256, SHA-384, SHA-512)
        #[arg(long, default_value_t = HashAlgorithm::Sha1)]
        hash: HashAlgorithm,

        /// Number of hash iterations
        #[arg(short, long, default_value_t = 1)]
        iterations: u32,

        /// Allowed characters (all, alnum-underscore, alnum, alpha, numeric)
        #[arg(short, long, default_value_t = CharTypes::AllCharacters)]
        char_types: CharTypes,

        /// Maximum password length, 0 for no limit
        #[arg(short, long, default_value_t = 0)]
        limit: usize,

        /// Save the parameters for later use with `show`
        #[arg(long)]
        save: bool,

        /// Copy the password to the clipboard instead of printing it
        #[arg(long)]
        copy: bool,
    },

    /// Regenerates the password for a saved site
    #[command(arg_required_else_help = true)]
    Show {
        site: String,

        /// Copy the password to the clipboard instead of printing it
        #[arg(long)]
        copy: bool,
    },

    /// Lists saved sites and their parameters
    List,

    /// Removes the saved parameters of a site
    #[command(arg_required_else_help = true)]
    Remove { site: String },

    /// Removes every saved site
    Clear {
        /// Confirm removal of all records
        #[arg(long)]
        yes: bool,
    },

    /// Exports saved parameters to a file
    #[command(arg_required_else_help = true)]
    Export {
        file: PathBuf,

        /// Only export this site (repeatable)
        #[arg(long = "site", value_name = "SITE")]
        sites: Vec<String>,

        /// Protect the export file with a different passphrase
        #[arg(long)]
        new_passphrase: bool,
    },

    /// Imports parameters from an export file
    #[command(arg_required_else_help = true)]
    Import {
        file: PathBuf,

        /// Replace sites that are already saved
        #[arg(long)]
        overwrite: bool,

        /// Only import this site (repeatable)
        #[arg(long = "site", value_name = "SITE")]
        sites: Vec<String>,

        /// The export file uses a different passphrase
        #[arg(long)]
        file_passphrase: bool,
    },

    /// Re-keys saved records after the encoding or salt changed
    RefreshKeys {
        /// Encoding the records were saved with
        #[arg(long, value_name = "NAME")]
        old_encoding: Option<TextEncoding>,

        /// Salt text the records were saved with
        #[arg(long, value_name = "TEXT")]
        old_salt: Option<String>,
    },

    /// Shows information about the store and settings
    Info,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn resolve_settings(args: &Cli) -> Result<Settings> {
    let mut settings = Settings::from_env().context("invalid CRYPTNOS_* configuration")?;
    if let Some(encoding) = args.encoding {
        settings.text_encoding = encoding;
    }
    if let Some(salt) = &args.salt {
        settings.salt = salt.clone();
    }
    settings.kdf = args.argon2.apply(settings.kdf)?;
    settings.validate()?;
    Ok(settings)
}

/// Raises the returned flag on Ctrl-C.
fn cancel_on_interrupt() -> Result<CancelFlag> {
    let flag = CancelFlag::new();
    let handler_flag = flag.clone();
    ctrlc::set_handler(move || handler_flag.cancel()).context("failed to install Ctrl-C handler")?;
    Ok(flag)
}

/// Derives in the foreground, or on a worker with a progress line when the
/// iteration count is above the warning threshold.
fn derive(request: DeriveRequest, settings: &Settings) -> Result<Zeroizing<String>> {
    if !settings.is_slow(request.iterations) {
        return Ok(password::derive_with_progress(&request, settings, &Reporter::silent())?);
    }

    let (handle, progress) = password::spawn_derive(request, settings.clone());
    let show = io::stderr().is_terminal();
    for event in progress {
        if let Progress::Iteration { current, total } = event {
            if show && (current % 10 == 0 || current == total) {
                eprint!("\rderiving {current}/{total}");
            }
        }
    }
    if show {
        eprintln!();
    }

    let password = handle
        .join()
        .map_err(|_| anyhow!("derivation worker panicked"))??;
    Ok(password)
}

fn output(password: &str, copy: bool) -> Result<()> {
    if copy {
        let mut clipboard = arboard::Clipboard::new().context("clipboard unavailable")?;
        clipboard
            .set_text(password.to_string())
            .context("failed to copy password")?;
        println!("password copied to clipboard");
    } else {
        println!("{password}");
    }
    Ok(())
}

/// Logs progress events of a background transfer until the worker is done.
fn wait<T>(run: Background<T>) -> Result<T> {
    for event in run.progress.iter() {
        match event {
            Progress::State(state) => tracing::debug!(?state, "transfer state"),
            Progress::Record { index, total } => tracing::debug!(index, total, "record processed"),
            Progress::Iteration { .. } => {}
        }
    }
    Ok(run.wait()?)
}

fn print_table(records: &[SiteParameters]) {
    let site_width = records
        .iter()
        .map(|p| p.site().len())
        .chain(std::iter::once("Site".len()))
        .max()
        .unwrap_or(0);

    println!(
        "{:<site_width$}  {:<7}  {:>10}  {:<16}  {:>5}",
        "Site", "Hash", "Iterations", "Characters", "Limit"
    );
    println!(
        "{:-<site_width$}  {:-<7}  {:->10}  {:-<16}  {:->5}",
        "", "", "", "", ""
    );
    for p in records {
        let limit = match p.char_limit() {
            0 => "-".to_string(),
            n => n.to_string(),
        };
        println!(
            "{:<site_width$}  {:<7}  {:>10}  {:<16}  {:>5}",
            p.site(),
            p.hash().name(),
            p.iterations(),
            p.char_types().name(),
            limit
        );
    }
}

fn non_empty(sites: Vec<String>) -> Option<Vec<String>> {
    if sites.is_empty() { None } else { Some(sites) }
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let args = Cli::parse();
    let settings = resolve_settings(&args)?;
    let mut cn: Cryptnos<FileStore> = Cryptnos::open(args.store.clone(), settings)?;

    match args.command {
        Commands::Generate {
            site,
            hash,
            iterations,
            char_types,
            limit,
            save,
            copy,
        } => {
            let passphrase = auth::read_passphrase()?;
            let request = DeriveRequest {
                site: site.clone(),
                passphrase: passphrase.clone(),
                hash,
                iterations,
                char_types,
                char_limit: limit,
            };
            let password = derive(request, cn.settings())?;

            if save {
                let params =
                    SiteParameters::new(&site, hash, iterations, char_types, limit, cn.settings())?;
                if cn.save(&params, &passphrase)? {
                    eprintln!("updated parameters for '{site}'");
                } else {
                    eprintln!("saved parameters for '{site}'");
                }
            }
            output(&password, copy)?;
        }
        Commands::Show { site, copy } => {
            let passphrase = auth::read_passphrase()?;
            let params = cn
                .load(&site, &passphrase)?
                .ok_or_else(|| anyhow!("no saved parameters for '{site}'"))?;
            let password = derive(params.request(&passphrase), cn.settings())?;
            output(&password, copy)?;
        }
        Commands::List => {
            let passphrase = auth::read_passphrase()?;
            let records = cn.sites(&passphrase)?;
            if records.is_empty() {
                println!("No sites stored.");
                return Ok(());
            }
            print_table(&records);
        }
        Commands::Remove { site } => {
            if !cn.remove(&site)? {
                bail!("no saved parameters for '{site}'");
            }
            println!("site '{site}' removed successfully");
        }
        Commands::Clear { yes } => {
            if !yes {
                bail!("refusing to remove every site without --yes");
            }
            let removed = cn.clear()?;
            println!("removed {removed} site(s)");
        }
        Commands::Export {
            file,
            sites,
            new_passphrase,
        } => {
            let passphrase = auth::read_passphrase()?;
            let sites = non_empty(sites);
            let records = cn.selection(&passphrase, sites.as_deref())?;

            let file_passphrase = if new_passphrase {
                auth::read_new_passphrase_with_confirmation()?
            } else {
                passphrase
            };
            let cipher = RecordCipher::new(&file_passphrase, cn.settings())?;

            let run = transfer::spawn_export(file.clone(), records, cipher, cancel_on_interrupt()?);
            let count = wait(run)?;
            println!("exported {count} site(s) to '{}'", file.display());
        }
        Commands::Import {
            file,
            overwrite,
            sites,
            file_passphrase,
        } => {
            let passphrase = auth::read_passphrase()?;
            let file_pass = if file_passphrase {
                auth::read_file_passphrase()?
            } else {
                passphrase.clone()
            };
            let cipher = RecordCipher::new(&file_pass, cn.settings())?;
            let cancel = cancel_on_interrupt()?;

            let mut session = wait(transfer::spawn_import(file, cipher, cancel.clone()))?;
            for failure in session.failures() {
                eprintln!("line {}: {}", failure.line, failure.error);
            }

            let options = CommitOptions {
                sites: non_empty(sites),
                overwrite,
            };
            let report = cn.commit(&mut session, &passphrase, &options, &Reporter::silent(), &cancel)?;

            println!(
                "imported {} site(s), {} replaced, {} skipped",
                report.written,
                report.replaced,
                report.skipped.len()
            );
            if !report.skipped.is_empty() {
                eprintln!(
                    "already saved (use --overwrite to replace): {}",
                    report.skipped.join(", ")
                );
            }
            if session.failed_count() > 0 {
                eprintln!("{} line(s) could not be imported", session.failed_count());
            }
        }
        Commands::RefreshKeys {
            old_encoding,
            old_salt,
        } => {
            if old_encoding.is_none() && old_salt.is_none() {
                bail!("nothing to refresh: pass --old-encoding and/or --old-salt");
            }
            let new_settings = cn.settings().clone();
            let mut old_settings = new_settings.clone();
            if let Some(encoding) = old_encoding {
                old_settings.text_encoding = encoding;
            }
            if let Some(salt) = old_salt {
                old_settings.salt = salt;
            }

            let passphrase = auth::read_passphrase()?;
            let mut old = Cryptnos::new(cn.into_store(), old_settings)?;
            let moved = old.refresh_site_keys(&passphrase, new_settings)?;
            println!("refreshed {moved} site(s)");
        }
        Commands::Info => {
            let s = cn.settings();
            println!("store:             {}", cn.store().storage().path().display());
            println!("created:           {}", cn.store().creation_date());
            println!("sites:             {}", cn.count()?);
            println!("text encoding:     {}", s.text_encoding);
            println!("iteration warning: {}", s.iteration_warning);
            println!("max iterations:    {}", s.max_iterations);
            println!(
                "argon2:            m={} KiB, t={}, p={}",
                s.kdf.mem_cost_kib(),
                s.kdf.time_cost(),
                s.kdf.parallelism()
            );
        }
    }

    Ok(())
}
