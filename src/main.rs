use facebank::core::{EnrollmentRequest, VerificationRequest};
use facebank::service::{Response, ServiceClient};

use anyhow::{Context, Result};
use base64::Engine as _;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Parser)]
#[command(name = "facebank")]
#[command(about = "Face-verified banking over a local service")]
struct Cli {
    /// Talk to a development service on the local socket
    #[arg(long, global = true)]
    dev: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new account from a face capture
    Register {
        /// Phone number used as the account identifier
        #[arg(short, long)]
        phone: String,
        /// Name shown on the account
        #[arg(short, long)]
        name: String,
        /// Date of birth, YYYY-MM-DD
        #[arg(short, long)]
        dob: String,
        /// Image file containing exactly one face
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Log in with a face capture and print a session token
    Login {
        #[arg(short, long)]
        phone: String,
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Show the current balance
    Balance {
        #[arg(short, long)]
        token: String,
    },
    /// Deposit funds
    Deposit {
        #[arg(short, long)]
        token: String,
        #[arg(short, long)]
        amount: String,
    },
    /// Transfer funds to another account
    Transfer {
        #[arg(short, long)]
        token: String,
        /// Receiving phone number
        #[arg(long)]
        to: String,
        #[arg(short, long)]
        amount: String,
    },
    /// Pay an external party
    Pay {
        #[arg(short, long)]
        token: String,
        #[arg(short, long)]
        amount: String,
    },
    /// End the session
    Logout {
        #[arg(short, long)]
        token: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.dev);

    let client = ServiceClient::new(cli.dev);

    let response = match cli.command {
        Commands::Register {
            phone,
            name,
            dob,
            image,
        } => client.enroll(EnrollmentRequest {
            identifier: phone,
            display_name: name,
            date_of_birth: dob,
            image_payload: image_payload(&image)?,
        })?,
        Commands::Login { phone, image } => client.verify(VerificationRequest {
            identifier: phone,
            image_payload: image_payload(&image)?,
        })?,
        Commands::Balance { token } => client.balance(&token)?,
        Commands::Deposit { token, amount } => client.deposit(&token, parse_amount(&amount)?)?,
        Commands::Transfer { token, to, amount } => {
            client.transfer(&token, &to, parse_amount(&amount)?)?
        }
        Commands::Pay { token, amount } => client.pay(&token, parse_amount(&amount)?)?,
        Commands::Logout { token } => client.logout(&token)?,
    };

    render(response)
}

fn render(response: Response) -> Result<()> {
    match response {
        Response::Enrolled { identifier } => {
            println!("✅ Registered {}", identifier);
        }
        Response::EnrollmentRejected(rejection) => {
            println!("❌ {}", rejection);
        }
        Response::Granted { identifier, token } => {
            println!("✅ Welcome back, {}", identifier);
            println!("Session token: {}", token);
        }
        Response::VerificationDenied(rejection) => {
            println!("❌ {}", rejection);
        }
        Response::Balance { balance } => {
            println!("Balance: {}", balance);
        }
        Response::LoggedOut => {
            println!("✅ Logged out");
        }
        Response::Denied(denial) => {
            println!("❌ {}", denial);
        }
        Response::Error(message) => {
            anyhow::bail!("Service error: {}", message);
        }
    }
    Ok(())
}

fn parse_amount(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim()).with_context(|| format!("Invalid amount: {}", raw))
}

/// Reads an image file into the data URL form the service expects.
fn image_payload(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read image {:?}", path))?;
    let mime = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
    {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "png" => "image/png",
        _ => "application/octet-stream",
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", mime, encoded))
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
