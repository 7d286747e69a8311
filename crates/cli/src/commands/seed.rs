use estoque_db::{connect_with_settings, DemoInventory};
use tracing::info;

use crate::commands::{command_runtime, load_config, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match command_runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &creatable_url(&config.database.url),
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let seeded = DemoInventory::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8));
        pool.close().await;
        seeded
    });

    match result {
        Ok(seeded) => {
            info!(
                event_name = "cli.seed.completed",
                correlation_id = "seed",
                inserted = seeded.inserted,
                total = seeded.total,
                "demo inventory seeded"
            );
            let message = format!(
                "demo inventory ready in `{}`: {} new of {} demo products, {} rows in table",
                seeded.table,
                seeded.inserted,
                DemoInventory::product_count(),
                seeded.total
            );
            CommandResult::success("seed", message)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

/// Seeding is the one command allowed to create the database file.
fn creatable_url(url: &str) -> String {
    if !url.starts_with("sqlite://") || url.contains("mode=") {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}mode=rwc")
}

#[cfg(test)]
mod tests {
    use super::creatable_url;

    #[test]
    fn file_urls_gain_create_mode() {
        assert_eq!(creatable_url("sqlite://estoque.db"), "sqlite://estoque.db?mode=rwc");
        assert_eq!(
            creatable_url("sqlite://estoque.db?cache=shared"),
            "sqlite://estoque.db?cache=shared&mode=rwc"
        );
    }

    #[test]
    fn explicit_modes_and_memory_urls_are_untouched() {
        assert_eq!(creatable_url("sqlite://estoque.db?mode=ro"), "sqlite://estoque.db?mode=ro");
        assert_eq!(creatable_url("sqlite::memory:"), "sqlite::memory:");
    }
}
