use anyhow::{bail, Context, Result};
use std::fmt;
use tokio::process::Command;
use tracing::{debug, info};

/// Subcommands passed to the goose CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GooseCommand {
    Up,
    Down,
    Status,
}

impl GooseCommand {
    fn as_arg(&self) -> &'static str {
        match self {
            GooseCommand::Up => "up",
            GooseCommand::Down => "down",
            GooseCommand::Status => "status",
        }
    }
}

impl fmt::Display for GooseCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// Applies SQL migrations by shelling out to the goose binary.
///
/// Invocations take the form `goose -dir <migrations_dir> <driver> <dsn> <command>`.
#[derive(Debug, Clone)]
pub struct MigrationRunner {
    goose_binary_path: String,
    migrations_dir: String,
    driver: String,
    dsn: String,
}

impl MigrationRunner {
    pub fn new(
        goose_binary_path: String,
        migrations_dir: String,
        driver: String,
        dsn: String,
    ) -> Self {
        Self {
            goose_binary_path,
            migrations_dir,
            driver,
            dsn,
        }
    }

    /// Runner for the `postgres` driver
    pub fn postgres(goose_binary_path: &str, migrations_dir: &str, dsn: &str) -> Self {
        Self::new(
            goose_binary_path.to_string(),
            migrations_dir.to_string(),
            "postgres".to_string(),
            dsn.to_string(),
        )
    }

    fn args(&self, command: GooseCommand) -> Vec<String> {
        vec![
            "-dir".to_string(),
            self.migrations_dir.clone(),
            self.driver.clone(),
            self.dsn.clone(),
            command.as_arg().to_string(),
        ]
    }

    /// Runs goose and returns its stdout; a non-zero exit becomes an error carrying both streams
    async fn invoke(&self, command: GooseCommand) -> Result<String> {
        let output = Command::new(&self.goose_binary_path)
            .args(self.args(command))
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", self.goose_binary_path))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "goose {} failed ({})\nstdout: {}\nstderr: {}",
                command,
                output.status,
                stdout,
                stderr
            );
        }
        Ok(stdout)
    }

    /// Applies every pending migration
    pub async fn run_migrations(&self) -> Result<()> {
        debug!(migrations_dir = %self.migrations_dir, "applying migrations");
        let stdout = self.invoke(GooseCommand::Up).await?;
        info!(driver = %self.driver, "migrations applied");
        debug!("{}", stdout);
        Ok(())
    }

    /// Reverts the newest applied migration
    pub async fn rollback_migration(&self) -> Result<()> {
        self.invoke(GooseCommand::Down).await?;
        info!(driver = %self.driver, "rolled back one migration");
        Ok(())
    }

    pub async fn migration_status(&self) -> Result<String> {
        self.invoke(GooseCommand::Status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_order() {
        let runner = MigrationRunner::postgres(
            "goose",
            "migrations/",
            "postgres://localhost/fleetrack",
        );
        assert_eq!(
            runner.args(GooseCommand::Up),
            vec![
                "-dir",
                "migrations/",
                "postgres",
                "postgres://localhost/fleetrack",
                "up"
            ]
        );
        assert_eq!(runner.args(GooseCommand::Status).last().unwrap(), "status");
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let runner = MigrationRunner::postgres(
            "/nonexistent/goose-binary",
            "migrations/",
            "postgres://localhost/fleetrack",
        );
        let err = runner.run_migrations().await.unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }
}
