//! # Command Line Interface
//!
//! Operator commands for provisioning and inspecting issuer certificates and
//! for managing the shared database schema.

use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::AppConfig;
use crate::keys::{Certificate, CertificateRecord, CertificateType, KeyManager};
use crate::storage::{
    create_pool, list_applied_migrations, run_migrations, validate_migrations, DbPool,
    MigrationInfo, SqlxCertificateStore,
};

#[derive(Parser, Debug)]
#[command(name = "certkeeper")]
#[command(about = "Token certificate lifecycle for stateless issuer instances")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Database URL override
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Make sure both certificates exist and are current (default)
    Warm,

    /// Resolve one certificate, generating or replacing it if needed
    Issue {
        #[arg(long = "type", value_enum)]
        certificate_type: CertificateTypeArg,

        /// Print the certificate PEM
        #[arg(long)]
        pem: bool,
    },

    /// Show the stored record without changing anything
    Inspect {
        #[arg(long = "type", value_enum)]
        certificate_type: CertificateTypeArg,
    },

    /// Database management commands
    Database {
        #[command(subcommand)]
        command: DatabaseCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum DatabaseCommands {
    /// Run pending migrations
    Migrate,

    /// Exit non-zero if migrations are pending
    Status,

    /// List all applied migrations
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CertificateTypeArg {
    Signing,
    Encryption,
}

impl From<CertificateTypeArg> for CertificateType {
    fn from(arg: CertificateTypeArg) -> Self {
        match arg {
            CertificateTypeArg::Signing => CertificateType::Signing,
            CertificateTypeArg::Encryption => CertificateType::Encryption,
        }
    }
}

impl Cli {
    /// Fold command-line overrides into the loaded configuration.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(url) = &self.database_url {
            config.database.url = url.clone();
        }
        if self.verbose {
            config.observability.log_level = "debug".to_string();
        }
    }
}

/// Run a parsed command against the configured database.
///
/// Returns the process exit code.
pub async fn run(command: Option<Commands>, config: &AppConfig) -> anyhow::Result<i32> {
    let pool = create_pool(&config.database).await?;

    match command.unwrap_or(Commands::Warm) {
        Commands::Database { command } => handle_database_command(command, &pool).await,
        Commands::Warm => {
            let manager = build_manager(config, &pool)?;
            let ready = manager.warm_up().await;
            for certificate_type in CertificateType::ALL {
                let status =
                    if ready.contains(&certificate_type) { "ready" } else { "unavailable" };
                println!("{:<12} {}", certificate_type, status);
            }
            Ok(if ready.len() == CertificateType::ALL.len() { 0 } else { 1 })
        }
        Commands::Issue { certificate_type, pem } => {
            let manager = build_manager(config, &pool)?;
            let certificate = manager.get(certificate_type.into()).await?;
            print_certificate(&certificate);
            if pem {
                println!();
                println!("{}", certificate.certificate_pem());
            }
            Ok(0)
        }
        Commands::Inspect { certificate_type } => {
            let manager = build_manager(config, &pool)?;
            match manager.stored_record(certificate_type.into()).await? {
                Some(record) => {
                    print_record(&record);
                    Ok(0)
                }
                None => {
                    println!(
                        "No {} certificate stored for {}",
                        certificate_type_name(certificate_type),
                        manager.issuer_host()
                    );
                    Ok(1)
                }
            }
        }
    }
}

fn build_manager(config: &AppConfig, pool: &DbPool) -> anyhow::Result<KeyManager> {
    let store = Arc::new(SqlxCertificateStore::new(pool.clone()));
    Ok(KeyManager::from_config(&config.issuer, store)?)
}

async fn handle_database_command(
    command: DatabaseCommands,
    pool: &DbPool,
) -> anyhow::Result<i32> {
    match command {
        DatabaseCommands::Migrate => {
            println!("Running database migrations...");
            run_migrations(pool).await?;
            println!("Migrations completed successfully");
            Ok(0)
        }
        DatabaseCommands::Status => {
            if validate_migrations(pool).await? {
                println!("Database schema is up to date");
                Ok(0)
            } else {
                println!("Database schema has pending migrations");
                Ok(1)
            }
        }
        DatabaseCommands::List => {
            let migrations = list_applied_migrations(pool).await?;
            if migrations.is_empty() {
                println!("No migrations have been applied");
            } else {
                print_migrations_table(&migrations);
            }
            Ok(0)
        }
    }
}

fn certificate_type_name(arg: CertificateTypeArg) -> &'static str {
    CertificateType::from(arg).as_str()
}

fn print_certificate(certificate: &Certificate) {
    println!("{:<14} {}", "Key", certificate.key());
    println!("{:<14} {}", "Subject", certificate.subject());
    println!("{:<14} {}", "Serial", certificate.serial_number());
    println!("{:<14} {}", "Not before", certificate.not_before());
    println!("{:<14} {}", "Not after", certificate.not_after());
    println!("{:<14} {}", "Thumbprint", certificate.thumbprint());
}

fn print_record(record: &CertificateRecord) {
    println!("{:<14} {}", "Key", record.key);
    println!("{:<14} {}", "Expires", record.expiration_date);
    println!("{:<14} {}", "Token", record.concurrency_token);
    match Certificate::from_record(record) {
        Ok(certificate) => {
            println!("{:<14} {}", "Subject", certificate.subject());
            println!("{:<14} {}", "Thumbprint", certificate.thumbprint());
        }
        Err(e) => println!("{:<14} {}", "Unreadable", e),
    }
}

/// Print migrations in a formatted table
fn print_migrations_table(migrations: &[MigrationInfo]) {
    println!("{:<15} {:<50}", "Version", "Description");
    println!("{}", "-".repeat(65));

    for migration in migrations {
        println!("{:<15} {:<50}", migration.version, truncate_string(&migration.description, 48));
    }
}

/// Truncate string to fit in table column
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_warm() {
        let cli = Cli::try_parse_from(["certkeeper"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_issue_parsing() {
        let cli = Cli::try_parse_from(["certkeeper", "issue", "--type", "encryption", "--pem"])
            .unwrap();

        match cli.command {
            Some(Commands::Issue { certificate_type, pem }) => {
                assert_eq!(CertificateType::from(certificate_type), CertificateType::Encryption);
                assert!(pem);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(Cli::try_parse_from(["certkeeper", "inspect", "--type", "tls"]).is_err());
    }

    #[test]
    fn test_overrides_applied() {
        let cli = Cli::try_parse_from([
            "certkeeper",
            "database",
            "status",
            "--database-url",
            "sqlite::memory:",
            "-v",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Database { command: DatabaseCommands::Status })
        ));

        let mut config = AppConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.observability.log_level, "debug");
    }

    #[tokio::test]
    async fn test_warm_and_status_against_memory_database() {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();

        let code = run(Some(Commands::Warm), &config).await.unwrap();
        assert_eq!(code, 0);

        let code = run(
            Some(Commands::Database { command: DatabaseCommands::Status }),
            &config,
        )
        .await
        .unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("this is a very long string", 10), "this is...");
    }
}
