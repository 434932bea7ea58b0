use migration::Migrator;
use sea_orm_migration::cli;

// Standalone runner: `migration up`, `migration status`, `migration down`
#[tokio::main]
async fn main() {
    cli::run_cli(Migrator).await;
}
