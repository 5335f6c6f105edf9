//! QuMail CLI - layered payload encryption
//!
//! Usage:
//!   qumail init     - Create a KEM identity and write the config
//!   qumail encrypt  - Turn a message into an envelope
//!   qumail decrypt  - Open an envelope
//!   qumail status   - Show configuration and key source state

mod keychain;
mod settings;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use qumail_core::{
    Attachment, CryptoConfig, CryptoService, EncryptRequest, EncryptionMethod, Envelope, Payload,
    SecurityLevel,
};
use qumail_keys::{DirectoryClient, KemServiceClient};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::keychain::IdentityKeychain;
use crate::settings::Profile;

#[derive(Parser)]
#[command(name = "qumail")]
#[command(version)]
#[command(about = "Quantum-safe payload encryption at four security levels", long_about = None)]
struct Cli {
    /// Config file [default: ~/.qumail/config.json]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request a KEM identity, keep the private key in the OS keychain
    Init {
        /// Your user id, usually an email address
        #[arg(long)]
        user: String,

        #[arg(long)]
        key_manager_url: Option<String>,

        #[arg(long)]
        kem_url: Option<String>,

        #[arg(long)]
        directory_url: Option<String>,

        /// Replace an existing identity
        #[arg(long)]
        force: bool,
    },

    /// Encrypt a message body (stdin if --body is absent)
    Encrypt {
        /// 1 one-time pad, 2 key-derived AEAD, 3 hybrid KEM, 4 plaintext
        #[arg(short, long, default_value = "2")]
        level: SecurityLevel,

        /// Key source for levels 1 and 2: qkd or pqc
        #[arg(short, long, default_value = "qkd")]
        method: EncryptionMethod,

        /// Recipient user id
        #[arg(long)]
        to: Option<String>,

        /// Recipient public key (base64), skips the directory lookup
        #[arg(long)]
        recipient_key: Option<String>,

        #[arg(short, long)]
        body: Option<String>,

        /// Attach a file (repeatable)
        #[arg(short, long = "attach")]
        attachments: Vec<PathBuf>,

        /// Write the envelope here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decrypt an envelope (stdin if no file is given)
    Decrypt {
        input: Option<PathBuf>,

        /// Write attachments into this directory
        #[arg(long)]
        save_attachments: Option<PathBuf>,
    },

    /// Show configuration, identity and simulator state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    let config_path = match cli.config {
        Some(path) => path,
        None => settings::default_config_path()?,
    };

    match cli.command {
        Commands::Init {
            user,
            key_manager_url,
            kem_url,
            directory_url,
            force,
        } => {
            let mut config = CryptoConfig::load_or_default(&config_path)?;
            if let Some(url) = key_manager_url {
                config.key_manager_url = url;
            }
            if kem_url.is_some() {
                config.kem_authority_url = kem_url;
            }
            if directory_url.is_some() {
                config.directory_url = directory_url;
            }
            let config = config.with_env_overrides()?;
            init(&config, &config_path, &user, force).await?;
        }

        Commands::Encrypt {
            level,
            method,
            to,
            recipient_key,
            body,
            attachments,
            output,
        } => {
            let config = load_config(&config_path)?;
            config.check_shareable(level, method)?;
            let service = CryptoService::from_config(&config)?;

            let body = match body {
                Some(body) => body,
                None => read_stdin()?,
            };
            let mut payload = Payload::new(body);
            for path in &attachments {
                payload = payload.with_attachment(read_attachment(path)?);
            }

            let mut request = EncryptRequest::new(level, payload).method(method);
            if let Some(to) = to {
                request = request.recipient_id(to);
            }
            if let Some(key) = recipient_key {
                let key = STANDARD
                    .decode(key.trim())
                    .context("--recipient-key is not valid base64")?;
                request = request.recipient_public_key(key);
            }

            let envelope = service.encrypt_to_json(&request).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &envelope)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("Envelope written to {}", path.display());
                }
                None => println!("{}", envelope),
            }
        }

        Commands::Decrypt {
            input,
            save_attachments,
        } => {
            let config = load_config(&config_path)?;
            let service = CryptoService::from_config(&config)?;

            let text = match input {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => read_stdin()?,
            };
            let envelope = Envelope::parse(text.trim())?;

            let private_key = if envelope.level() == SecurityLevel::Hybrid {
                let profile = Profile::load(&settings::profile_path(&config_path))?
                    .context("No identity; run `qumail init` first")?;
                Some(IdentityKeychain::new().load_private_key(&profile.user_id)?)
            } else {
                None
            };

            let payload = service
                .decrypt(&envelope, private_key.as_ref().map(|k| k.as_slice()))
                .await?;

            println!("{}", payload.body);
            if let Some(dir) = save_attachments {
                save_attachment_files(&dir, &payload.attachments)?;
            } else if !payload.attachments.is_empty() {
                println!();
                for attachment in &payload.attachments {
                    println!("[attachment] {} ({} bytes)", attachment.filename, attachment.content.len());
                }
            }
        }

        Commands::Status => {
            let config = load_config(&config_path)?;
            let service = CryptoService::from_config(&config)?;

            println!("Config: {}", config_path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!();
            match Profile::load(&settings::profile_path(&config_path))? {
                Some(profile) => println!("Identity: {}", profile.user_id),
                None => println!("Identity: none (run `qumail init`)"),
            }
            println!();
            println!("Quantum simulator:");
            println!("{}", serde_json::to_string_pretty(&service.quantum().status())?);
            if config.directory_url.is_none() {
                println!();
                println!("No directory configured: quantum keys only decrypt in the process that made them.");
            }
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<CryptoConfig> {
    Ok(CryptoConfig::load_or_default(path)?.with_env_overrides()?)
}

async fn init(config: &CryptoConfig, config_path: &Path, user: &str, force: bool) -> Result<()> {
    let profile_path = settings::profile_path(config_path);
    if let Some(existing) = Profile::load(&profile_path)? {
        if !force {
            bail!(
                "Identity {} already exists; pass --force to replace it",
                existing.user_id
            );
        }
    }

    println!("Initializing QuMail for {}...", user);

    let kem = KemServiceClient::new(config.kem_url(), config.timeout())?;
    let identity = kem
        .generate_identity(user)
        .await
        .context("Failed to obtain a key pair from the KEM authority")?;

    IdentityKeychain::new()
        .store_private_key(user, identity.private_key())
        .context("Failed to store the private key in the OS keychain")?;
    println!("  ✓ Private key stored in the system keychain");

    if let Some(url) = &config.directory_url {
        let directory = DirectoryClient::new(url, config.timeout())?;
        match directory.publish_public_key(user, &identity.public_key).await {
            Ok(()) => println!("  ✓ Public key published to {}", url),
            Err(e) => warn!("Public key not published: {}", e),
        }
    }

    config.save(config_path)?;
    Profile {
        user_id: user.to_string(),
        public_key_b64: STANDARD.encode(&identity.public_key),
    }
    .save(&profile_path)?;
    println!("  ✓ Config written to {}", config_path.display());

    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read stdin")?;
    Ok(text)
}

fn read_attachment(path: &Path) -> Result<Attachment> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Not a file name: {}", path.display()))?;
    let content =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Attachment::new(filename, content))
}

fn save_attachment_files(dir: &Path, attachments: &[Attachment]) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    for attachment in attachments {
        // Only the final component; an envelope must not choose where we write.
        let Some(name) = Path::new(&attachment.filename).file_name() else {
            warn!("Skipping attachment with unusable name {:?}", attachment.filename);
            continue;
        };
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        file.write_all(&attachment.content)?;
        println!("[attachment] saved {}", path.display());
    }
    Ok(())
}
