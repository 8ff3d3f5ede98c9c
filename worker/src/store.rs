// ==============================================================================
// store.rs - PostgreSQL Catalog and Result Store
// ==============================================================================
// Description: sqlx-backed reference catalog, per-file call/score persistence
//              and file record updates
// Version: 1.0.0
// ==============================================================================
// Tables (schema "reputation", see schema.sql):
//   genes, variants, gene_variants   reference catalog (read-only here)
//   files                            upload records
//   user_variant_calls               UNIQUE (file_id, rsid)
//   gene_scores                      UNIQUE (file_id, gene_id)
// ==============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

use reputation_processor::error::StoreError;
use reputation_processor::models::{
    FileId, FileRecord, FileStatus, Gene, GeneId, GeneReputationScore, GenomeFormat,
    ReferenceVariant, UserVariantCall,
};
use reputation_processor::services::{FileRecords, ReferenceCatalog, ResultStore};

type VariantRow = (String, String, f64, Option<String>, Option<String>, Option<String>);

type FileRow = (
    FileId,
    String,
    String,
    String,
    String,
    i16,
    Option<String>,
    bool,
    Option<DateTime<Utc>>,
);

const VARIANT_COLUMNS: &str = "v.rsid, v.minor_allele, v.importance, v.heterozygous_color, \
                               v.homozygous_minor_color, v.homozygous_major_color";

const NON_TERMINAL_STATUSES: [FileStatus; 4] = [
    FileStatus::Downloading,
    FileStatus::Detecting,
    FileStatus::Processing,
    FileStatus::Aggregating,
];

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Mark files left mid-pipeline by a previous worker instance as FAILED
    ///
    /// Returns the ids of the files that were marked.
    pub async fn fail_interrupted_files(&self) -> Result<Vec<FileId>, StoreError> {
        let statuses: Vec<&str> = NON_TERMINAL_STATUSES.iter().map(FileStatus::as_str).collect();

        let rows: Vec<(FileId,)> = sqlx::query_as(
            "UPDATE reputation.files
             SET status = 'failed', updated_at = NOW()
             WHERE status = ANY($1)
             RETURNING id",
        )
        .bind(&statuses)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn update(&self, sql: &str, file_id: FileId, apply: impl FnOnce(Query<'_>) -> Query<'_>) -> Result<(), StoreError> {
        let result = apply(sqlx::query(sql))
            .bind(file_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::FileNotFound(file_id));
        }
        Ok(())
    }
}

type Query<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn variant_from_row(row: VariantRow) -> ReferenceVariant {
    let (rsid, minor_allele, importance, heterozygous_color, homozygous_minor_color, homozygous_major_color) = row;
    ReferenceVariant {
        rsid,
        minor_allele,
        importance,
        heterozygous_color,
        homozygous_minor_color,
        homozygous_major_color,
    }
}

fn record_from_row(row: FileRow) -> Result<FileRecord, StoreError> {
    let (id, recipient, original_name, status, format, progress, sequenced_at, rescan_available, completed_at) = row;

    Ok(FileRecord {
        id,
        recipient,
        original_name,
        status: status.parse().map_err(StoreError::Backend)?,
        format: format.parse().map_err(StoreError::Backend)?,
        progress: progress.clamp(0, 100) as u8,
        sequenced_at,
        rescan_available,
        completed_at,
    })
}

#[async_trait]
impl ReferenceCatalog for PgStore {
    async fn find_variant(&self, rsid: &str) -> Result<Option<ReferenceVariant>, StoreError> {
        let row: Option<VariantRow> = sqlx::query_as(&format!(
            "SELECT {} FROM reputation.variants v WHERE v.rsid = $1",
            VARIANT_COLUMNS
        ))
        .bind(rsid)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(variant_from_row))
    }

    async fn genes_for_variant_ids(&self, rsids: &[String]) -> Result<Vec<Gene>, StoreError> {
        let rows: Vec<(GeneId, String)> = sqlx::query_as(
            "SELECT DISTINCT g.id, g.name
             FROM reputation.genes g
             JOIN reputation.gene_variants gv ON gv.gene_id = g.id
             WHERE gv.rsid = ANY($1)
             ORDER BY g.id",
        )
        .bind(rsids)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows.into_iter().map(|(id, name)| Gene { id, name }).collect())
    }

    async fn variants_of_gene(&self, gene: &Gene) -> Result<Vec<ReferenceVariant>, StoreError> {
        let rows: Vec<VariantRow> = sqlx::query_as(&format!(
            "SELECT {}
             FROM reputation.variants v
             JOIN reputation.gene_variants gv ON gv.rsid = v.rsid
             WHERE gv.gene_id = $1
             ORDER BY v.rsid",
            VARIANT_COLUMNS
        ))
        .bind(gene.id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows.into_iter().map(variant_from_row).collect())
    }

    async fn gene_count(&self) -> Result<u64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reputation.genes")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl ResultStore for PgStore {
    async fn upsert_call(&self, call: UserVariantCall) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO reputation.user_variant_calls (file_id, rsid, genotype, zygosity)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (file_id, rsid)
             DO UPDATE SET genotype = EXCLUDED.genotype, zygosity = EXCLUDED.zygosity",
        )
        .bind(call.file_id)
        .bind(&call.rsid)
        .bind(&call.genotype)
        .bind(call.zygosity.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn find_call(&self, file_id: FileId, rsid: &str) -> Result<Option<UserVariantCall>, StoreError> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT genotype, zygosity FROM reputation.user_variant_calls
             WHERE file_id = $1 AND rsid = $2",
        )
        .bind(file_id)
        .bind(rsid)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(|(genotype, zygosity)| {
            Ok(UserVariantCall {
                file_id,
                rsid: rsid.to_string(),
                genotype,
                zygosity: zygosity.parse().map_err(StoreError::Backend)?,
            })
        })
        .transpose()
    }

    async fn reported_variant_ids(&self, file_id: FileId) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT rsid FROM reputation.user_variant_calls WHERE file_id = $1 ORDER BY rsid",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows.into_iter().map(|(rsid,)| rsid).collect())
    }

    async fn create_score(&self, score: GeneReputationScore) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO reputation.gene_scores (file_id, gene_id, score) VALUES ($1, $2, $3)",
        )
        .bind(score.file_id)
        .bind(score.gene_id)
        .bind(score.score)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::duplicate_score(score.file_id, score.gene_id))
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn clear_scores(&self, file_id: FileId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM reputation.gene_scores WHERE file_id = $1")
            .bind(file_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl FileRecords for PgStore {
    async fn get(&self, file_id: FileId) -> Result<FileRecord, StoreError> {
        let row: Option<FileRow> = sqlx::query_as(
            "SELECT id, recipient, original_name, status, format, progress,
                    sequenced_at, rescan_available, completed_at
             FROM reputation.files WHERE id = $1",
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(record_from_row).transpose()?.ok_or(StoreError::FileNotFound(file_id))
    }

    async fn set_status(&self, file_id: FileId, status: FileStatus) -> Result<(), StoreError> {
        if status == FileStatus::Complete {
            info!("File {} complete", file_id);
            return self
                .update(
                    "UPDATE reputation.files SET status = $1, completed_at = NOW(), updated_at = NOW() WHERE id = $2",
                    file_id,
                    |q| q.bind(status.as_str()),
                )
                .await;
        }

        self.update(
            "UPDATE reputation.files SET status = $1, updated_at = NOW() WHERE id = $2",
            file_id,
            |q| q.bind(status.as_str()),
        )
        .await
    }

    async fn set_format(&self, file_id: FileId, format: GenomeFormat) -> Result<(), StoreError> {
        self.update(
            "UPDATE reputation.files SET format = $1, updated_at = NOW() WHERE id = $2",
            file_id,
            |q| q.bind(format.as_str()),
        )
        .await
    }

    async fn set_progress(&self, file_id: FileId, percent: u8) -> Result<(), StoreError> {
        self.update(
            "UPDATE reputation.files SET progress = $1, updated_at = NOW() WHERE id = $2",
            file_id,
            |q| q.bind(i16::from(percent.min(100))),
        )
        .await
    }

    async fn set_sequenced_at(&self, file_id: FileId, sequenced_at: &str) -> Result<(), StoreError> {
        let sequenced_at = sequenced_at.to_string();
        self.update(
            "UPDATE reputation.files SET sequenced_at = $1, updated_at = NOW() WHERE id = $2",
            file_id,
            move |q| q.bind(sequenced_at),
        )
        .await
    }

    async fn set_rescan_available(&self, file_id: FileId, available: bool) -> Result<(), StoreError> {
        self.update(
            "UPDATE reputation.files SET rescan_available = $1, updated_at = NOW() WHERE id = $2",
            file_id,
            |q| q.bind(available),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reputation_processor::zygosity::Zygosity;
    use uuid::Uuid;

    fn file_row(status: &str, format: &str, progress: i16) -> FileRow {
        (
            Uuid::new_v4(),
            "user@example.com".to_string(),
            "genome.txt".to_string(),
            status.to_string(),
            format.to_string(),
            progress,
            None,
            false,
            None,
        )
    }

    #[test]
    fn test_record_from_row() {
        let record = record_from_row(file_row("aggregating", "23andme", 42)).unwrap();
        assert_eq!(record.status, FileStatus::Aggregating);
        assert_eq!(record.format, GenomeFormat::TwentyThreeAndMe);
        assert_eq!(record.progress, 42);
    }

    #[test]
    fn test_record_from_row_rejects_unknown_status() {
        assert!(matches!(
            record_from_row(file_row("queued", "vcf", 0)),
            Err(StoreError::Backend(_))
        ));
    }

    #[test]
    fn test_record_from_row_clamps_progress() {
        assert_eq!(record_from_row(file_row("pending", "unknown", 250)).unwrap().progress, 100);
        assert_eq!(record_from_row(file_row("pending", "unknown", -3)).unwrap().progress, 0);
    }

    #[test]
    fn test_variant_from_row() {
        let variant = variant_from_row((
            "rs4680".to_string(),
            "A".to_string(),
            2.5,
            None,
            Some("red".to_string()),
            None,
        ));
        assert_eq!(variant.rsid, "rs4680");
        assert_eq!(variant.homozygous_minor_color.as_deref(), Some("red"));
    }

    #[test]
    fn test_zygosity_column_roundtrip() {
        for zygosity in [Zygosity::Heterozygous, Zygosity::DoubleDeletion, Zygosity::Minor] {
            assert_eq!(zygosity.as_str().parse::<Zygosity>().unwrap(), zygosity);
        }
    }

    #[test]
    fn test_interrupted_statuses_are_non_terminal() {
        assert!(NON_TERMINAL_STATUSES.iter().all(|s| s.can_transition_to(FileStatus::Failed)));
        assert!(!NON_TERMINAL_STATUSES.contains(&FileStatus::Pending));
    }
}
