use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use logvault::auth::{generate_password, Algorithm, Challenge, CredentialFile, Verifier};

#[derive(Parser)]
#[command(name = "logvault-passwd", version, about = "Manage the logvault credentials file")]
struct Cli {
    /// Credentials file to use
    #[arg(long, global = true, default_value = "credentials.tsv")]
    tsv: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a user or replace their password
    Set {
        /// plain, pbkdf2[,iters[,size[,hash]]] or bcrypt[,cost]
        #[arg(long, default_value = "pbkdf2")]
        algorithm: String,
        /// Read the password from stdin instead of generating one
        #[arg(long)]
        password: bool,
        /// Read the password from a file
        #[arg(long = "password-file")]
        password_file: Option<PathBuf>,
        username: String,
    },
    /// Verify a password read from stdin or a file
    Check {
        #[arg(long = "password-file")]
        password_file: Option<PathBuf>,
        username: String,
    },
}

fn main() {
    env_logger::init();
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<bool> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Set {
            algorithm,
            password,
            password_file,
            username,
        } => {
            let algorithm = Algorithm::parse(&algorithm)?;
            let secret = match (password_file, password) {
                (Some(path), _) => read_password_file(&path)?,
                (None, true) => prompt("New Password: ")?,
                (None, false) => {
                    let generated = generate_password();
                    println!("{generated}");
                    generated
                }
            };

            let mut credentials = CredentialFile::load_or_create(&cli.tsv)
                .with_context(|| format!("loading {}", cli.tsv.display()))?;
            let challenge = Challenge::create(algorithm, &secret)?;
            let replaced = credentials.set(&username, challenge)?;
            credentials.save()?;
            if replaced {
                eprintln!("Wrote {:?} with new password for {username:?}", cli.tsv);
            } else {
                eprintln!("Added password for {username:?} to {:?}", cli.tsv);
            }
            Ok(true)
        }
        Commands::Check {
            password_file,
            username,
        } => {
            let credentials = CredentialFile::load(&cli.tsv)
                .with_context(|| format!("loading {}", cli.tsv.display()))?;
            if !credentials.contains(&username) {
                bail!("user {username:?} not found in {}", cli.tsv.display());
            }
            let secret = match password_file {
                Some(path) => read_password_file(&path)?,
                None => prompt("Current Password: ")?,
            };
            if credentials.verify(&username, &secret) {
                eprintln!("Password for {username:?} is valid");
                Ok(true)
            } else {
                eprintln!("Password for {username:?} is NOT valid");
                Ok(false)
            }
        }
    }
}

fn read_password_file(path: &Path) -> Result<String> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading password file {}", path.display()))?;
    Ok(data.trim().to_string())
}

fn prompt(label: &str) -> Result<String> {
    let mut stderr = io::stderr();
    stderr.write_all(label.as_bytes())?;
    stderr.flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading password from stdin")?;
    Ok(line.trim().to_string())
}
