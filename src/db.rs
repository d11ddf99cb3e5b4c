use std::time::Duration;

use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::AnalysisResult;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn fetch_result(
    pool: &PgPool,
    session_id: Uuid,
    ttl: Duration,
) -> Result<Option<AnalysisResult>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT result FROM testscore.sessions
        WHERE session_id = $1
          AND result IS NOT NULL
          AND updated_at >= now() - make_interval(secs => $2)
        "#,
    )
    .bind(session_id)
    .bind(ttl.as_secs_f64())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let Json(result) = row.try_get::<Json<AnalysisResult>, _>("result")?;
            Ok(Some(result))
        }
        None => Ok(None),
    }
}

pub async fn save_result(
    pool: &PgPool,
    session_id: Uuid,
    result: &AnalysisResult,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO testscore.sessions (session_id, result, updated_at)
        VALUES ($1, $2, now())
        ON CONFLICT (session_id) DO UPDATE
        SET result = EXCLUDED.result, updated_at = now()
        "#,
    )
    .bind(session_id)
    .bind(Json(result))
    .execute(pool)
    .await?;
    Ok(())
}

/// Deletes sessions that have not been written within `ttl`.
pub async fn purge_sessions(pool: &PgPool, ttl: Duration) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM testscore.sessions WHERE updated_at < now() - make_interval(secs => $1)",
    )
    .bind(ttl.as_secs_f64())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn push_flash(pool: &PgPool, session_id: Uuid, message: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO testscore.sessions (session_id, flash, updated_at)
        VALUES ($1, $2, now())
        ON CONFLICT (session_id) DO UPDATE
        SET flash = EXCLUDED.flash, updated_at = now()
        "#,
    )
    .bind(session_id)
    .bind(message)
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns and clears the pending flash message in one statement.
pub async fn take_flash(pool: &PgPool, session_id: Uuid) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE testscore.sessions s
        SET flash = NULL, updated_at = now()
        FROM (SELECT session_id, flash FROM testscore.sessions WHERE session_id = $1 FOR UPDATE) old
        WHERE s.session_id = old.session_id AND old.flash IS NOT NULL
        RETURNING old.flash
        "#,
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(row.try_get("flash")?)),
        None => Ok(None),
    }
}
