//! Session status listing

use clap::Args;
use perch_core::Config;
use perch_db::Database;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show sessions for this repository (owner/repo)
    repository: Option<String>,

    /// Maximum number of sessions to show
    #[arg(long, default_value_t = 20)]
    limit: i64,
}

impl StatusArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let db_path = match &config.database.path {
            Some(path) => path.clone(),
            None => Database::default_path()?,
        };
        let db = Database::new(&db_path).await?;

        let sessions = db
            .sessions()
            .list_recent(self.repository.as_deref(), self.limit)
            .await?;

        if sessions.is_empty() {
            println!("No review sessions recorded.");
            return Ok(());
        }

        println!(
            "{:<6} {:<30} {:<6} {:<12} {:<16} {:<9} {}",
            "ID", "REPOSITORY", "PR", "STATUS", "DISPOSITION", "FINDINGS", "CREATED"
        );
        for session in sessions {
            println!(
                "{:<6} {:<30} {:<6} {:<12} {:<16} {:<9} {}",
                session.id,
                session.repository,
                session.pr_number,
                session.status,
                session.disposition.as_deref().unwrap_or("-"),
                session.finding_count,
                session.created_at,
            );
            if let Some(error) = &session.error {
                println!("       error: {error}");
            }
        }

        Ok(())
    }
}
