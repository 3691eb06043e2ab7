use std::io::Read;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kanuka_core::workflows::{self, CreateOptions, FileOpOptions, InitOptions, KeySource, RegisterTarget, RevokeSelector};
use kanuka_core::{CancelFlag, FileStatus, StoreHandle, UserDirs, UserStatus};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Kanuka: commit encrypted env files, share access per teammate")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Initialize a new project in the current directory
    Init {
        /// Project name (defaults to the directory name)
        #[arg(long)]
        name: Option<String>,
        /// Your email, required on this workstation's first run
        #[arg(long)]
        email: Option<String>,
        /// Device name for this workstation (defaults to the hostname)
        #[arg(long)]
        device: Option<String>,
    },
    /// Add this workstation to an existing project as a pending device
    Create {
        #[arg(long)]
        device: Option<String>,
        /// Your email, required on this workstation's first run
        #[arg(long)]
        email: Option<String>,
    },
    /// Grant a pending user access to the project key
    Register {
        /// Email of the pending user to grant
        #[arg(long, conflicts_with_all = ["file", "pubkey_text"])]
        user: Option<String>,
        /// Path to a .pub file to grant
        #[arg(long)]
        file: Option<PathBuf>,
        /// Raw public key text (PEM or ssh-rsa line)
        #[arg(long = "pubkey-text", conflicts_with = "file")]
        pubkey_text: Option<String>,
        /// Email to record alongside --file / --pubkey-text
        #[arg(long, conflicts_with = "user")]
        email: Option<String>,
    },
    /// Encrypt environment files into .kanuka siblings
    Encrypt {
        /// Files, directories, or globs (defaults to the whole project)
        paths: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Decrypt .kanuka files back to plaintext
    Decrypt {
        paths: Vec<String>,
        #[arg(long)]
        dry_run: bool,
        /// Read the private key from standard input
        #[arg(long)]
        private_key_stdin: bool,
    },
    /// Remove a user's access and rotate the project key
    Revoke {
        /// Email of the user to revoke (all devices unless --device)
        #[arg(long, conflicts_with = "file")]
        user: Option<String>,
        /// Narrow --user to a single device
        #[arg(long, requires = "user")]
        device: Option<String>,
        /// Path to the device's .pub file
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Replace this device's keypair, keeping the project key
    Rotate {
        /// Skip the confirmation warning
        #[arg(long)]
        force: bool,
    },
    /// Rotate the project key and re-encrypt every secret file
    Sync {
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete orphaned key wrappings (no matching public key)
    Clean {
        #[arg(long)]
        dry_run: bool,
    },
    /// Show who has access and which files are out of date
    Status,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(std::env::var_os("NO_COLOR").is_none())
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;
    let user_dirs = UserDirs::discover()?;

    let cancel = CancelFlag::new();
    let handler = cancel.clone();
    ctrlc::set_handler(move || handler.cancel())?;

    match cli.cmd {
        Cmd::Init { name, email, device } => {
            let report = workflows::init(
                &cwd,
                &user_dirs,
                &InitOptions {
                    project_name: name,
                    email,
                    device_name: device,
                },
            )?;
            println!(
                "Initialized project {} ({}) as device {}",
                report.project_name, report.project_uuid, report.device_name
            );
        }
        Cmd::Create { device, email } => {
            let mut store = StoreHandle::open_mut(&cwd, user_dirs)?;
            let report = workflows::create(
                &mut store,
                &CreateOptions {
                    device_name: device,
                    email,
                },
            )?;
            println!(
                "Added device {} ({}); ask a teammate to run `kanuka register` to grant access",
                report.device_name, report.user_uuid
            );
        }
        Cmd::Register { user, file, pubkey_text, email } => {
            let target = if let Some(user) = user {
                RegisterTarget::Email(user)
            } else if let Some(text) = pubkey_text {
                RegisterTarget::PubkeyText { text, email }
            } else if let Some(path) = file {
                RegisterTarget::PubkeyFile { path, email }
            } else {
                anyhow::bail!("one of --user, --file, or --pubkey-text is required");
            };
            let mut store = StoreHandle::open_mut(&cwd, user_dirs)?;
            let report = workflows::register(&mut store, &target, &KeySource::Default, None)?;
            for (uuid, email) in &report.granted {
                println!("Granted {email} ({uuid})");
            }
        }
        Cmd::Encrypt { paths, dry_run } => {
            let store = StoreHandle::open_mut(&cwd, user_dirs)?;
            let report = workflows::encrypt(
                &store,
                &FileOpOptions {
                    patterns: paths,
                    dry_run,
                },
                &KeySource::Default,
                None,
                &cancel,
            )?;
            print_file_report("Encrypted", &report);
        }
        Cmd::Decrypt { paths, dry_run, private_key_stdin } => {
            let key = if private_key_stdin {
                let mut text = String::new();
                std::io::stdin().read_to_string(&mut text)?;
                KeySource::Text(text)
            } else {
                KeySource::Default
            };
            let store = StoreHandle::open_mut(&cwd, user_dirs)?;
            let report = workflows::decrypt(
                &store,
                &FileOpOptions {
                    patterns: paths,
                    dry_run,
                },
                &key,
                None,
                &cancel,
            )?;
            print_file_report("Decrypted", &report);
        }
        Cmd::Revoke { user, device, file, dry_run } => {
            let selector = if let Some(email) = user {
                RevokeSelector::Email { email, device }
            } else if let Some(path) = file {
                RevokeSelector::File(path)
            } else {
                anyhow::bail!("one of --user or --file is required");
            };
            let mut store = StoreHandle::open_mut(&cwd, user_dirs)?;
            let report = workflows::revoke(
                &mut store,
                &selector,
                dry_run,
                &KeySource::Default,
                None,
                &cancel,
            )?;
            let verb = if dry_run { "Would revoke" } else { "Revoked" };
            println!(
                "{verb} {} device(s); {} user(s) keep access, {} file(s) re-encrypted",
                report.revoked.len(),
                report.users_count(),
                report.files_count()
            );
        }
        Cmd::Rotate { force } => {
            if !force {
                eprintln!("note: this replaces the keypair for this device only; pass --force to skip this notice");
            }
            let store = StoreHandle::open_mut(&cwd, user_dirs)?;
            let report = workflows::rotate(&store, &KeySource::Default, None)?;
            println!("Rotated keypair for device {}", report.user_uuid);
        }
        Cmd::Sync { dry_run } => {
            let store = StoreHandle::open_mut(&cwd, user_dirs)?;
            let report = workflows::sync(&store, dry_run, &KeySource::Default, None, &cancel)?;
            let verb = if dry_run { "Would re-encrypt" } else { "Re-encrypted" };
            println!(
                "{verb} {} file(s) for {} user(s)",
                report.files_count(),
                report.users_count()
            );
        }
        Cmd::Clean { dry_run } => {
            let store = StoreHandle::open_mut(&cwd, user_dirs)?;
            let report = workflows::clean(&store, dry_run)?;
            if report.removed.is_empty() {
                println!("No orphaned wrappings");
            } else {
                let verb = if dry_run { "Would remove" } else { "Removed" };
                for uuid in &report.removed {
                    println!("{verb} orphaned wrapping {uuid}");
                }
            }
        }
        Cmd::Status => {
            let store = StoreHandle::open(&cwd, user_dirs)?;
            let report = workflows::status(&store)?;
            println!("Users:");
            for user in &report.users {
                let status = match user.status {
                    UserStatus::Active => "active",
                    UserStatus::Pending => "pending",
                    UserStatus::Orphan => "orphan",
                };
                let who = user.email.as_deref().unwrap_or(&user.uuid);
                match &user.device {
                    Some(device) => println!("  {status:8} {who} [{device}]"),
                    None => println!("  {status:8} {who}"),
                }
            }
            println!("Files:");
            for file in &report.files {
                let status = match file.status {
                    FileStatus::Current => "current",
                    FileStatus::Stale => "stale",
                    FileStatus::Unencrypted => "unencrypted",
                    FileStatus::EncryptedOnly => "encrypted-only",
                };
                let path = file
                    .plaintext
                    .strip_prefix(store.layout().root())
                    .unwrap_or(&file.plaintext);
                println!("  {status:14} {}", path.display());
            }
        }
    }
    Ok(())
}

fn print_file_report(verb: &str, report: &workflows::FileOpReport) {
    let verb = if report.dry_run {
        format!("Would have {}", verb.to_lowercase())
    } else {
        verb.to_string()
    };
    for file in &report.files {
        println!("{verb} {}", file.display());
    }
}
