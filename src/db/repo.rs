use super::model::ShortIdRow;
use anyhow::{anyhow, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, instrument};

pub type Pool = SqlitePool;

const SHORT_ID_LEN: usize = 8;
const MAX_ALIAS_ATTEMPTS: usize = 5;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Expand a leading `~/`, make sure the parent directory exists and ask SQLite
/// to create the file. In-memory URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{}", expanded_path);
    match query_part {
        Some(q) if q.contains("mode=") => {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
            rebuilt.push_str("&mode=rwc");
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn new_alias() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..SHORT_ID_LEN].to_string()
}

/// Return the alias for `native_id`, minting one on first use.
#[instrument(skip_all)]
pub async fn get_or_create_short_id(pool: &Pool, native_id: &str) -> Result<String> {
    if let Some(id) =
        sqlx::query_scalar::<_, String>("SELECT short_id FROM short_ids WHERE native_id = ?")
            .bind(native_id)
            .fetch_optional(pool)
            .await?
    {
        return Ok(id);
    }

    for _ in 0..MAX_ALIAS_ATTEMPTS {
        let alias = new_alias();
        let inserted = sqlx::query(
            "INSERT INTO short_ids (short_id, native_id, created_at) VALUES (?, ?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(&alias)
        .bind(native_id)
        .bind(Utc::now())
        .execute(pool)
        .await?
        .rows_affected();
        if inserted == 1 {
            info!(short_id = %alias, "minted short id");
            return Ok(alias);
        }
        // Either the alias collided or another request registered the same
        // native id in the meantime.
        if let Some(id) =
            sqlx::query_scalar::<_, String>("SELECT short_id FROM short_ids WHERE native_id = ?")
                .bind(native_id)
                .fetch_optional(pool)
                .await?
        {
            return Ok(id);
        }
    }
    Err(anyhow!("could not allocate a short id"))
}

#[instrument(skip_all)]
pub async fn resolve_short_id(pool: &Pool, short_id: &str) -> Result<Option<String>> {
    let native = sqlx::query_scalar::<_, String>("SELECT native_id FROM short_ids WHERE short_id = ?")
        .bind(short_id)
        .fetch_optional(pool)
        .await?;
    Ok(native)
}

pub async fn list_short_ids(pool: &Pool) -> Result<Vec<ShortIdRow>> {
    let rows = sqlx::query_as::<_, ShortIdRow>(
        "SELECT short_id, native_id, created_at FROM short_ids ORDER BY created_at, short_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
