use std::collections::HashMap;

use sqlx::PgPool;
use uuid::Uuid;

use crate::db::pool_ext::begin_with_retry;
use crate::error::AppError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredSetting {
    pub setting_key: String,
    pub setting_group: Option<String>,
    pub setting_value: String,
}

/// A legacy key and the grouped key that replaces it.
#[derive(Debug, Clone, Copy)]
pub struct LegacyKey {
    pub old_key: &'static str,
    pub new_key: &'static str,
    pub group: &'static str,
}

pub struct SettingsRepository {
    db_pool: PgPool,
}

impl SettingsRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn get_value(&self, key: &str) -> Result<Option<String>, AppError> {
        sqlx::query_scalar::<_, String>("SELECT setting_value FROM settings WHERE setting_key = $1")
            .bind(key)
            .fetch_optional(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch setting {}: {}", key, e)))
    }

    pub async fn values_for_group(&self, group: &str) -> Result<HashMap<String, String>, AppError> {
        let rows = sqlx::query_as::<_, StoredSetting>(
            "SELECT setting_key, setting_group, setting_value FROM settings WHERE setting_group = $1",
        )
        .bind(group)
        .fetch_all(&self.db_pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch settings for {}: {}", group, e)))?;

        Ok(rows.into_iter().map(|row| (row.setting_key, row.setting_value)).collect())
    }

    /// Upserts every value of one group inside a single transaction.
    pub async fn save_group(
        &self,
        group: &str,
        values: &[(String, String)],
        updated_by: &Uuid,
    ) -> Result<(), AppError> {
        let mut tx = begin_with_retry(&self.db_pool, 3, 50)
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin settings transaction: {}", e)))?;

        for (key, value) in values {
            sqlx::query(
                r#"
                INSERT INTO settings (setting_key, setting_group, setting_value, updated_by, updated_at)
                VALUES ($1, $2, $3, $4, now())
                ON CONFLICT (setting_key) DO UPDATE SET
                    setting_group = EXCLUDED.setting_group,
                    setting_value = EXCLUDED.setting_value,
                    updated_by = EXCLUDED.updated_by,
                    updated_at = now()
                "#,
            )
            .bind(key)
            .bind(group)
            .bind(value)
            .bind(updated_by)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(format!("Failed to save setting {}: {}", key, e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit settings: {}", e)))?;
        Ok(())
    }

    /// Moves legacy keys to their grouped replacements in one transaction.
    /// A replacement that already exists keeps its value. Returns how many
    /// values were copied to a new key.
    pub async fn migrate_legacy(&self, keys: &[LegacyKey]) -> Result<u64, AppError> {
        let mut tx = begin_with_retry(&self.db_pool, 3, 50)
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin migration transaction: {}", e)))?;

        let mut moved = 0;
        for legacy in keys {
            let inserted = sqlx::query(
                r#"
                INSERT INTO settings (setting_key, setting_group, setting_value, updated_at)
                SELECT $1, $2, setting_value, now() FROM settings WHERE setting_key = $3
                ON CONFLICT (setting_key) DO NOTHING
                "#,
            )
            .bind(legacy.new_key)
            .bind(legacy.group)
            .bind(legacy.old_key)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(format!("Failed to migrate setting {}: {}", legacy.old_key, e)))?;
            moved += inserted.rows_affected();

            sqlx::query("DELETE FROM settings WHERE setting_key = $1")
                .bind(legacy.old_key)
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::Database(format!("Failed to remove legacy setting {}: {}", legacy.old_key, e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit settings migration: {}", e)))?;
        Ok(moved)
    }

    pub async fn count_legacy(&self, keys: &[LegacyKey]) -> Result<i64, AppError> {
        let old_keys: Vec<String> = keys.iter().map(|k| k.old_key.to_string()).collect();
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM settings WHERE setting_key = ANY($1)")
            .bind(&old_keys)
            .fetch_one(&self.db_pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to count legacy settings: {}", e)))
    }
}
