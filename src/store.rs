/*!
Article storage.

One SQLite table holding exactly the latest run's batch: the pipeline clears
it before each collection and bulk-inserts the fresh articles. There is no
history and no upsert; `load_all` returns whatever the last run left behind.
*/

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::article::Article;

pub struct ArticleStore {
    pool: SqlitePool,
}

impl ArticleStore {
    /// Opens (creating if necessary) the database at `path` and ensures the
    /// schema exists. A failure here is reported to the caller; the
    /// orchestrator degrades instead of crashing.
    pub async fn connect(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create DB parent directory: {}", parent.display())
                })?;
            }
        }

        // Creating the file up front surfaces filesystem problems with a
        // clearer error than the connection attempt would.
        tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to create or open DB file: {}", path))?;

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                summary TEXT NOT NULL,
                url TEXT NOT NULL,
                image_url TEXT NOT NULL,
                source TEXT NOT NULL,
                published_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure articles schema")?;
        Ok(())
    }

    /// Deletes every stored article. Returns the number removed.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM articles")
            .execute(&self.pool)
            .await
            .context("failed to clear articles")?;

        let removed = result.rows_affected();
        info!("store cleaned, removed {} old articles", removed);
        Ok(removed)
    }

    /// Bulk-inserts the batch in one transaction. An empty batch logs a
    /// warning and never touches the database.
    pub async fn save(&self, articles: &[Article]) -> Result<u64> {
        if articles.is_empty() {
            warn!("no articles to save");
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin insert transaction")?;

        for article in articles {
            sqlx::query(
                r#"
                INSERT INTO articles (title, summary, url, image_url, source, published_at, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&article.title)
            .bind(&article.summary)
            .bind(&article.url)
            .bind(&article.image_url)
            .bind(&article.source)
            .bind(article.published_at)
            .bind(article.created_at)
            .execute(&mut tx)
            .await
            .context("failed to insert article")?;
        }

        tx.commit()
            .await
            .context("failed to commit article batch")?;

        info!("saved {} articles to storage", articles.len());
        Ok(articles.len() as u64)
    }

    /// Returns every stored article.
    pub async fn load_all(&self) -> Result<Vec<Article>> {
        let articles = sqlx::query_as::<_, Article>(
            "SELECT title, summary, url, image_url, source, published_at, created_at FROM articles",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to read articles")?;

        info!("retrieved {} articles from storage", articles.len());
        Ok(articles)
    }
}
