//! Snapshot save/load: the whole committed graph in one transaction.

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OptionalExtension, Transaction};
use uuid::Uuid;

use crate::engine::incremental::FingerprintKey;
use crate::engine::snapshot::GraphSnapshot;
use crate::types::{
    Fingerprint, JobDetails, JobId, JobStatus, Product, ProductId, ProductOutputFlags, SourceFile,
    SourceId, SourceState,
};

use super::SCHEMA_VERSION;

/// Replace the stored checkpoint with `snap`.
pub fn save_snapshot(conn: &mut Connection, snap: &GraphSnapshot) -> Result<()> {
    let tx = conn.transaction().context("begin transaction")?;
    tx.execute_batch(
        "DELETE FROM sources; DELETE FROM jobs; DELETE FROM products; DELETE FROM fingerprints; DELETE FROM meta;",
    )
    .context("clear checkpoint")?;
    write_sources(&tx, &snap.sources)?;
    write_jobs(&tx, &snap.jobs)?;
    write_products(&tx, &snap.products)?;
    write_fingerprints(&tx, &snap.fingerprints)?;
    {
        let mut stmt = tx
            .prepare("INSERT INTO meta (key, value) VALUES (?1, ?2)")
            .context("prepare meta insert")?;
        for (key, value) in [
            ("schema_version", SCHEMA_VERSION),
            ("last_job", snap.last_job as i64),
            ("last_product", snap.last_product as i64),
            ("pass", snap.pass as i64),
        ] {
            stmt.execute((key, value)).context("insert meta")?;
        }
    }
    tx.commit().context("commit checkpoint")?;
    Ok(())
}

/// Load the stored checkpoint. `None` for a fresh database or one written by another schema version.
pub fn load_snapshot(conn: &Connection) -> Result<Option<GraphSnapshot>> {
    let Some(version) = meta(conn, "schema_version")? else {
        return Ok(None);
    };
    if version != SCHEMA_VERSION {
        log::warn!("Checkpoint schema {version} != {SCHEMA_VERSION}; starting from scratch");
        return Ok(None);
    }
    Ok(Some(GraphSnapshot {
        sources: read_sources(conn)?,
        jobs: read_jobs(conn)?,
        products: read_products(conn)?,
        fingerprints: read_fingerprints(conn)?,
        last_job: meta(conn, "last_job")?.unwrap_or(0).max(0) as u64,
        last_product: meta(conn, "last_product")?.unwrap_or(0).max(0) as u64,
        pass: meta(conn, "pass")?.unwrap_or(0).max(0) as u64,
    }))
}

fn meta(conn: &Connection, key: &str) -> Result<Option<i64>> {
    conn.query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
        row.get(0)
    })
    .optional()
    .with_context(|| format!("read meta {key}"))
}

// ---- enum and id encodings ----

fn state_str(state: SourceState) -> &'static str {
    match state {
        SourceState::Unprocessed => "unprocessed",
        SourceState::Queued => "queued",
        SourceState::Processing => "processing",
        SourceState::Completed => "completed",
        SourceState::Failed => "failed",
    }
}

fn parse_state(s: &str) -> Result<SourceState> {
    Ok(match s {
        "unprocessed" => SourceState::Unprocessed,
        "queued" => SourceState::Queued,
        "processing" => SourceState::Processing,
        "completed" => SourceState::Completed,
        "failed" => SourceState::Failed,
        other => return Err(anyhow!("unknown source state '{other}'")),
    })
}

fn status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "queued",
        JobStatus::Processing => "processing",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
    }
}

fn parse_status(s: &str) -> Result<JobStatus> {
    Ok(match s {
        "queued" => JobStatus::Queued,
        "processing" => JobStatus::Processing,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        other => return Err(anyhow!("unknown job status '{other}'")),
    })
}

fn parse_source_id(s: &str) -> Result<SourceId> {
    Uuid::parse_str(s)
        .map(SourceId)
        .with_context(|| format!("bad source id '{s}'"))
}

fn parse_fingerprint(bytes: &[u8]) -> Result<Fingerprint> {
    Fingerprint::from_slice(bytes).ok_or_else(|| anyhow!("fingerprint must be 32 bytes"))
}

// ---- writers ----

fn write_sources(tx: &Transaction<'_>, sources: &[SourceFile]) -> Result<()> {
    let mut stmt = tx
        .prepare(
            "INSERT INTO sources (id, path, fingerprint, produced_by, produced_by_product, state, dirty, pass)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .context("prepare source insert")?;
    for s in sources {
        stmt.execute((
            s.id.to_string(),
            s.path.as_str(),
            s.fingerprint.as_bytes().as_slice(),
            s.produced_by.map(|j| j.0 as i64),
            s.produced_by_product.map(|p| p.0 as i64),
            state_str(s.state),
            s.dirty,
            s.pass as i64,
        ))
        .with_context(|| format!("insert source {}", s.path))?;
    }
    Ok(())
}

fn write_jobs(tx: &Transaction<'_>, jobs: &[JobDetails]) -> Result<()> {
    let mut stmt = tx
        .prepare(
            "INSERT INTO jobs (id, source_id, source_path, input_path, builder_id, builder_version, platform,
                               intermediate, auto_fail, fail_reason, input_fingerprint, upstream, status, pass, forced)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )
        .context("prepare job insert")?;
    for j in jobs {
        let upstream: Vec<u64> = j.upstream.iter().map(|u| u.0).collect();
        let upstream = serde_json::to_string(&upstream).context("encode upstream jobs")?;
        stmt.execute(rusqlite::params![
            j.id.0 as i64,
            j.source_id.to_string(),
            j.source_path,
            j.input_path,
            j.builder_id,
            j.builder_version,
            j.platform,
            j.intermediate,
            j.auto_fail,
            j.fail_reason,
            j.input_fingerprint.as_bytes().as_slice(),
            upstream,
            status_str(j.status),
            j.pass as i64,
            j.forced,
        ])
        .with_context(|| format!("insert job {}", j.id))?;
    }
    Ok(())
}

fn write_products(tx: &Transaction<'_>, products: &[Product]) -> Result<()> {
    let mut stmt = tx
        .prepare(
            "INSERT INTO products (id, job_id, source_id, builder_id, path, platform, flags, sub_id, fingerprint, intermediate_source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .context("prepare product insert")?;
    for p in products {
        stmt.execute(rusqlite::params![
            p.id.0 as i64,
            p.job_id.0 as i64,
            p.source_id.to_string(),
            p.builder_id,
            p.path,
            p.platform,
            p.flags.bits(),
            p.sub_id,
            p.fingerprint.as_bytes().as_slice(),
            p.intermediate_source.map(|s| s.to_string()),
        ])
        .with_context(|| format!("insert product {}", p.path))?;
    }
    Ok(())
}

fn write_fingerprints(
    tx: &Transaction<'_>,
    entries: &[(FingerprintKey, Fingerprint)],
) -> Result<()> {
    let mut stmt = tx
        .prepare(
            "INSERT OR REPLACE INTO fingerprints (source_id, builder_id, platform, sub_id, fingerprint)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .context("prepare fingerprint insert")?;
    for (k, fp) in entries {
        stmt.execute((
            k.source_id.to_string(),
            k.builder_id.as_str(),
            k.platform.as_str(),
            k.sub_id,
            fp.as_bytes().as_slice(),
        ))
        .context("insert fingerprint")?;
    }
    Ok(())
}

// ---- readers ----

type SourceRow = (String, String, Vec<u8>, Option<i64>, Option<i64>, String, bool, i64);

fn read_sources(conn: &Connection) -> Result<Vec<SourceFile>> {
    let mut stmt = conn.prepare(
        "SELECT id, path, fingerprint, produced_by, produced_by_product, state, dirty, pass FROM sources",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (id, path, fp, produced_by, product, state, dirty, pass): SourceRow = row?;
        out.push(SourceFile {
            id: parse_source_id(&id)?,
            fingerprint: parse_fingerprint(&fp).with_context(|| format!("source {path}"))?,
            path,
            produced_by: produced_by.map(|j| JobId(j as u64)),
            produced_by_product: product.map(|p| ProductId(p as u64)),
            state: parse_state(&state)?,
            dirty,
            pass: pass.max(0) as u64,
        });
    }
    Ok(out)
}

fn read_jobs(conn: &Connection) -> Result<Vec<JobDetails>> {
    let mut stmt = conn.prepare(
        "SELECT id, source_id, source_path, input_path, builder_id, builder_version, platform, intermediate,
                auto_fail, fail_reason, input_fingerprint, upstream, status, pass, forced
         FROM jobs ORDER BY id",
    )?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        let source_id: String = row.get(1)?;
        let fp: Vec<u8> = row.get(10)?;
        let upstream: String = row.get(11)?;
        let status: String = row.get(12)?;
        let pass: i64 = row.get(13)?;
        let upstream: Vec<u64> =
            serde_json::from_str(&upstream).with_context(|| format!("upstream of job #{id}"))?;
        out.push(JobDetails {
            id: JobId(id as u64),
            source_id: parse_source_id(&source_id)?,
            source_path: row.get(2)?,
            input_path: row.get(3)?,
            builder_id: row.get(4)?,
            builder_version: row.get(5)?,
            platform: row.get(6)?,
            intermediate: row.get(7)?,
            auto_fail: row.get(8)?,
            fail_reason: row.get(9)?,
            input_fingerprint: parse_fingerprint(&fp).with_context(|| format!("job #{id}"))?,
            upstream: upstream.into_iter().map(JobId).collect(),
            status: parse_status(&status)?,
            pass: pass.max(0) as u64,
            forced: row.get(14)?,
        });
    }
    Ok(out)
}

fn read_products(conn: &Connection) -> Result<Vec<Product>> {
    let mut stmt = conn.prepare(
        "SELECT id, job_id, source_id, builder_id, path, platform, flags, sub_id, fingerprint, intermediate_source
         FROM products ORDER BY id",
    )?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        let job_id: i64 = row.get(1)?;
        let source_id: String = row.get(2)?;
        let flags: u8 = row.get(6)?;
        let fp: Vec<u8> = row.get(8)?;
        let child: Option<String> = row.get(9)?;
        out.push(Product {
            id: ProductId(id as u64),
            job_id: JobId(job_id as u64),
            source_id: parse_source_id(&source_id)?,
            builder_id: row.get(3)?,
            path: row.get(4)?,
            platform: row.get(5)?,
            flags: ProductOutputFlags::from_bits(flags)
                .ok_or_else(|| anyhow!("bad output flags {flags} on product {id}"))?,
            sub_id: row.get(7)?,
            fingerprint: parse_fingerprint(&fp).with_context(|| format!("product {id}"))?,
            intermediate_source: child.as_deref().map(parse_source_id).transpose()?,
        });
    }
    Ok(out)
}

fn read_fingerprints(conn: &Connection) -> Result<Vec<(FingerprintKey, Fingerprint)>> {
    let mut stmt = conn
        .prepare("SELECT source_id, builder_id, platform, sub_id, fingerprint FROM fingerprints")?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let source_id: String = row.get(0)?;
        let fp: Vec<u8> = row.get(4)?;
        out.push((
            FingerprintKey {
                source_id: parse_source_id(&source_id)?,
                builder_id: row.get(1)?,
                platform: row.get(2)?,
                sub_id: row.get(3)?,
            },
            parse_fingerprint(&fp)?,
        ));
    }
    Ok(out)
}
