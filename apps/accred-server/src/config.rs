//! Server configuration module.
//!
//! Supports configuration via environment variables:
//!
//! ```bash
//! # Core settings
//! ACCRED_JWT_SECRET=change-me          # required for serve
//! ACCRED_PUBLIC_URL=https://accred.example  # base for invite links
//!
//! # Provider: Resend
//! ACCRED_EMAIL_PROVIDER=resend
//! RESEND_API_KEY=re_...
//!
//! # Provider: SMTP
//! ACCRED_EMAIL_PROVIDER=smtp
//! SMTP_HOST=smtp.gmail.com
//! SMTP_PORT=587
//! SMTP_USERNAME=user@example.com
//! SMTP_PASSWORD=app_password
//! SMTP_USE_TLS=true
//!
//! # Sender config
//! ACCRED_EMAIL_FROM=noreply@accred.example
//! ACCRED_EMAIL_FROM_NAME="Accred Platform"
//! ```

use std::env;
use thiserror::Error;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Secret used to sign session tokens.
    pub jwt_secret: String,
    /// Base URL embedded in invite links sent by email.
    pub public_url: String,
    pub email: Option<EmailConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "insecure-dev-secret".to_string(),
            public_url: "http://localhost:8080".to_string(),
            email: None,
        }
    }
}

/// Email configuration for invite delivery
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Email provider configuration
    pub provider: EmailProviderConfig,
    /// From email address
    pub from_address: String,
    /// Optional from name
    pub from_name: Option<String>,
}

/// Email provider configuration
#[derive(Debug, Clone)]
pub enum EmailProviderConfig {
    /// Resend email provider
    Resend {
        #[allow(dead_code)] // Used when email-resend feature is enabled
        api_key: String,
    },
    /// SMTP email provider
    Smtp {
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        use_tls: bool,
    },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ACCRED_JWT_SECRET is required")]
    MissingJwtSecret,

    #[error("Invalid email provider: {0}. Expected 'resend' or 'smtp'")]
    InvalidProvider(String),

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),

    #[error("Missing from address: ACCRED_EMAIL_FROM is required when email is configured")]
    MissingFromAddress,

    #[error("SMTP provider requires SMTP_HOST")]
    SmtpMissingHost,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = env::var("ACCRED_JWT_SECRET").map_err(|_| ConfigError::MissingJwtSecret)?;
        let public_url =
            env::var("ACCRED_PUBLIC_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());

        let provider_type = match env::var("ACCRED_EMAIL_PROVIDER") {
            Ok(v) => v,
            Err(_) => {
                // No provider configured: invites are still issued, the
                // send step just logs instead of delivering.
                return Ok(Self {
                    jwt_secret,
                    public_url,
                    email: None,
                });
            }
        };

        let provider = match provider_type.to_lowercase().as_str() {
            "resend" => {
                let api_key = env::var("RESEND_API_KEY")
                    .map_err(|_| ConfigError::MissingEnvVar("RESEND_API_KEY".to_string()))?;
                EmailProviderConfig::Resend { api_key }
            }
            "smtp" => {
                let host = env::var("SMTP_HOST").map_err(|_| ConfigError::SmtpMissingHost)?;
                let port = env::var("SMTP_PORT")
                    .unwrap_or_else(|_| "587".to_string())
                    .parse::<u16>()
                    .map_err(|_| {
                        ConfigError::InvalidPort(
                            env::var("SMTP_PORT").unwrap_or_else(|_| "invalid".to_string()),
                        )
                    })?;
                let username = env::var("SMTP_USERNAME").ok();
                let password = env::var("SMTP_PASSWORD").ok();
                let use_tls = env::var("SMTP_USE_TLS")
                    .map(|v| v.to_lowercase() == "true" || v == "1")
                    .unwrap_or(true); // TLS by default

                EmailProviderConfig::Smtp {
                    host,
                    port,
                    username,
                    password,
                    use_tls,
                }
            }
            other => return Err(ConfigError::InvalidProvider(other.to_string())),
        };

        let from_address =
            env::var("ACCRED_EMAIL_FROM").map_err(|_| ConfigError::MissingFromAddress)?;
        let from_name = env::var("ACCRED_EMAIL_FROM_NAME").ok();

        Ok(Self {
            jwt_secret,
            public_url,
            email: Some(EmailConfig {
                provider,
                from_address,
                from_name,
            }),
        })
    }
}
