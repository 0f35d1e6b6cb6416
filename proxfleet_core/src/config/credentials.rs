use clap::Args;
use std::fmt;

// Error Handling
use proxfleet_error::{LibError, ProxfleetError};

/// Proxmox credentials, read from flags or the environment.
#[derive(Debug, Clone, Default, Eq, PartialEq, Args)]
pub struct CredentialArgs {
    /// Proxmox user (ex: root@pam).
    #[arg(short, long, env = "PROXMOX_USER")]
    pub user: Option<String>,
    #[arg(short, long, env = "PROXMOX_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// Authenticate with an api token instead of a password.
    #[arg(long, env = "PROXMOX_USE_TOKEN")]
    pub use_token: bool,
    #[arg(long, env = "PROXMOX_TOKEN_NAME")]
    pub token_name: Option<String>,
    #[arg(long, env = "PROXMOX_TOKEN_VALUE", hide_env_values = true)]
    pub token_value: Option<String>,
}

#[derive(Clone, Eq, PartialEq)]
pub enum Credentials {
    Password {
        user: String,
        password: String,
    },
    Token {
        user: String,
        name: String,
        value: String,
    },
}
impl Credentials {
    pub fn user(&self) -> &str {
        match self {
            Credentials::Password { user, .. } => user,
            Credentials::Token { user, .. } => user,
        }
    }
}
// Secrets stay out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Credentials::Password { user, .. } => write!(f, "Password {{ user: {:?} }}", user),
            Credentials::Token { user, name, .. } => {
                write!(f, "Token {{ user: {:?}, name: {:?} }}", user, name)
            }
        }
    }
}

fn filled(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|e| e.trim().to_owned())
        .filter(|e| !e.is_empty())
}

impl TryFrom<&CredentialArgs> for Credentials {
    type Error = ProxfleetError;

    fn try_from(args: &CredentialArgs) -> Result<Self, Self::Error> {
        let user = filled(&args.user).ok_or(
            LibError::builder()
                .msg("Missing Proxmox user.")
                .help("Set --user or the PROXMOX_USER environment variable.")
                .build(),
        )?;
        if args.use_token {
            match (filled(&args.token_name), filled(&args.token_value)) {
                (Some(name), Some(value)) => Ok(Credentials::Token { user, name, value }),
                _ => Err(LibError::builder()
                    .msg("Incomplete Proxmox api token.")
                    .help("Token authentication needs both --token-name and --token-value (PROXMOX_TOKEN_NAME, PROXMOX_TOKEN_VALUE).")
                    .build()
                    .into()),
            }
        } else {
            match args.password.clone().filter(|e| !e.is_empty()) {
                Some(password) => Ok(Credentials::Password { user, password }),
                None => Err(LibError::builder()
                    .msg("Missing Proxmox password.")
                    .help("Set --password or the PROXMOX_PASSWORD environment variable, or use --use-token.")
                    .build()
                    .into()),
            }
        }
    }
}
