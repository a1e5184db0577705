use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::result::ZipError;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::db::DB_FILE;

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/diclass.sqlite3";
const KNOWLEDGE_ENTRY: &str = "assistant.toml";
pub const BUNDLE_FORMAT_V1: &str = "diclass-workspace-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub restored_knowledge: bool,
}

fn sha256_file(path: &Path) -> anyhow::Result<String> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = f.read(&mut buf).context("failed to read for checksum")?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let db_sha256 = sha256_file(&db_path)?;
    let knowledge_path = workspace_path.join(KNOWLEDGE_ENTRY);
    let has_knowledge = knowledge_path.is_file();

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
        "dbSha256": db_sha256,
        "hasKnowledge": has_knowledge,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    let mut db_file = File::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    std::io::copy(&mut db_file, &mut zip).context("failed to write database entry")?;

    let mut entry_count = 2;
    if has_knowledge {
        zip.start_file(KNOWLEDGE_ENTRY, opts)
            .context("failed to start knowledge entry")?;
        let mut kf = File::open(&knowledge_path).with_context(|| {
            format!("failed to open {}", knowledge_path.to_string_lossy())
        })?;
        std::io::copy(&mut kf, &mut zip).context("failed to write knowledge entry")?;
        entry_count += 1;
    }

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count,
        db_sha256,
    })
}

/// Copy the optional `assistant.toml` entry to `tmp`. `Ok(false)` when the
/// bundle has none.
fn stage_knowledge(archive: &mut ZipArchive<File>, tmp: &Path) -> anyhow::Result<bool> {
    let mut entry = match archive.by_name(KNOWLEDGE_ENTRY) {
        Ok(e) => e,
        Err(ZipError::FileNotFound) => return Ok(false),
        Err(e) => return Err(e).context("failed to read assistant.toml entry"),
    };
    let mut out = File::create(tmp)
        .with_context(|| format!("failed to create {}", tmp.to_string_lossy()))?;
    std::io::copy(&mut entry, &mut out).context("failed to extract assistant.toml")?;
    out.flush().context("failed to flush extracted assistant.toml")?;
    Ok(true)
}

/// Restore a bundle into `workspace_path`. The existing database is only
/// replaced once the extracted copy matches the manifest checksum.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;
    let dst = workspace_path.join(DB_FILE);

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    let expected_sha = manifest
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest.json missing dbSha256"))?
        .to_string();

    let tmp_dst = workspace_path.join(format!("{DB_FILE}.importing"));
    if tmp_dst.exists() {
        let _ = std::fs::remove_file(&tmp_dst);
    }

    let mut db_out = File::create(&tmp_dst).with_context(|| {
        format!(
            "failed to create temp database {}",
            tmp_dst.to_string_lossy()
        )
    })?;
    {
        let mut db_entry = archive
            .by_name(DB_ENTRY)
            .context("bundle missing db/diclass.sqlite3")?;
        std::io::copy(&mut db_entry, &mut db_out).context("failed to extract database entry")?;
    }
    db_out
        .flush()
        .context("failed to flush extracted database")?;
    drop(db_out);

    let actual_sha = sha256_file(&tmp_dst)?;
    if actual_sha != expected_sha {
        let _ = std::fs::remove_file(&tmp_dst);
        return Err(anyhow!(
            "database checksum mismatch: expected {}, got {}",
            expected_sha,
            actual_sha
        ));
    }

    // Stage the override next to the database so nothing is swapped until
    // every entry has been read.
    let knowledge_dst = workspace_path.join(KNOWLEDGE_ENTRY);
    let knowledge_tmp = workspace_path.join(format!("{KNOWLEDGE_ENTRY}.importing"));
    let staged_knowledge = match stage_knowledge(&mut archive, &knowledge_tmp) {
        Ok(v) => v,
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_dst);
            let _ = std::fs::remove_file(&knowledge_tmp);
            return Err(e);
        }
    };

    if dst.exists() {
        std::fs::remove_file(&dst).with_context(|| {
            format!(
                "failed to remove existing database {}",
                dst.to_string_lossy()
            )
        })?;
    }
    std::fs::rename(&tmp_dst, &dst).with_context(|| {
        format!(
            "failed to move extracted database to {}",
            dst.to_string_lossy()
        )
    })?;

    if staged_knowledge {
        std::fs::rename(&knowledge_tmp, &knowledge_dst).with_context(|| {
            format!(
                "failed to move extracted knowledge to {}",
                knowledge_dst.to_string_lossy()
            )
        })?;
    } else if knowledge_dst.exists() {
        // The bundle was taken without an override; drop the stale one.
        std::fs::remove_file(&knowledge_dst).with_context(|| {
            format!(
                "failed to remove stale {}",
                knowledge_dst.to_string_lossy()
            )
        })?;
    }
    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
        restored_knowledge: staged_knowledge,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn temp_dir(tag: &str) -> std::path::PathBuf {
        let p = std::env::temp_dir().join(format!("diclass-backup-{}-{}", tag, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&p).expect("temp dir");
        p
    }

    #[test]
    fn export_then_import_restores_database_and_knowledge() {
        let src = temp_dir("src");
        let conn = db::open_db(&src).expect("open");
        db::settings_set_json(&conn, "marker", &json!(42)).expect("marker");
        drop(conn);
        std::fs::write(src.join(KNOWLEDGE_ENTRY), "[fallback]\nstudent = \"s\"\nteacher = \"t\"\n")
            .expect("knowledge");

        let bundle = src.join("out").join("ws.zip");
        let summary = export_workspace_bundle(&src, &bundle).expect("export");
        assert_eq!(summary.entry_count, 3);
        assert_eq!(summary.db_sha256.len(), 64);

        let dst = temp_dir("dst");
        let imported = import_workspace_bundle(&bundle, &dst).expect("import");
        assert!(imported.restored_knowledge);
        assert!(dst.join(KNOWLEDGE_ENTRY).is_file());

        let conn = db::open_db(&dst).expect("reopen");
        let marker: String = conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = 'marker'",
                [],
                |r| r.get(0),
            )
            .expect("marker row");
        assert_eq!(marker, "42");
        drop(conn);
        let _ = std::fs::remove_dir_all(src);
        let _ = std::fs::remove_dir_all(dst);
    }

    #[test]
    fn bundle_without_override_clears_a_stale_one() {
        let src = temp_dir("plain-src");
        drop(db::open_db(&src).expect("open"));
        let bundle = src.join("plain.zip");
        let summary = export_workspace_bundle(&src, &bundle).expect("export");
        assert_eq!(summary.entry_count, 2);

        let dst = temp_dir("plain-dst");
        std::fs::write(dst.join(KNOWLEDGE_ENTRY), "[fallback]\nstudent = \"s\"\nteacher = \"t\"\n")
            .expect("stale override");

        let imported = import_workspace_bundle(&bundle, &dst).expect("import");
        assert!(!imported.restored_knowledge);
        assert!(!dst.join(KNOWLEDGE_ENTRY).exists());
        assert!(!dst.join(format!("{KNOWLEDGE_ENTRY}.importing")).exists());
        assert!(dst.join(DB_FILE).is_file());
        let _ = std::fs::remove_dir_all(src);
        let _ = std::fs::remove_dir_all(dst);
    }

    #[test]
    fn checksum_mismatch_keeps_existing_database() {
        let src = temp_dir("tamper-src");
        drop(db::open_db(&src).expect("open"));

        let bundle = src.join("tampered.zip");
        {
            let f = File::create(&bundle).expect("bundle");
            let mut zip = ZipWriter::new(f);
            let opts = FileOptions::default();
            zip.start_file(MANIFEST_ENTRY, opts).expect("manifest");
            zip.write_all(
                json!({ "format": BUNDLE_FORMAT_V1, "dbSha256": "00" })
                    .to_string()
                    .as_bytes(),
            )
            .expect("manifest body");
            zip.start_file(DB_ENTRY, opts).expect("db");
            zip.write_all(b"not a database").expect("db body");
            zip.finish().expect("finish");
        }

        let dst = temp_dir("tamper-dst");
        drop(db::open_db(&dst).expect("existing"));
        let before = std::fs::read(dst.join(DB_FILE)).expect("read before");

        let e = import_workspace_bundle(&bundle, &dst).expect_err("must fail");
        assert!(e.to_string().contains("checksum mismatch"));
        assert_eq!(std::fs::read(dst.join(DB_FILE)).expect("read after"), before);
        assert!(!dst.join(format!("{DB_FILE}.importing")).exists());
        let _ = std::fs::remove_dir_all(src);
        let _ = std::fs::remove_dir_all(dst);
    }

    #[test]
    fn rejects_unknown_format() {
        let dir = temp_dir("format");
        let bundle = dir.join("other.zip");
        {
            let f = File::create(&bundle).expect("bundle");
            let mut zip = ZipWriter::new(f);
            zip.start_file(MANIFEST_ENTRY, FileOptions::default())
                .expect("manifest");
            zip.write_all(br#"{"format":"acme-workspace-v9"}"#)
                .expect("body");
            zip.finish().expect("finish");
        }
        let e = import_workspace_bundle(&bundle, &dir.join("ws")).expect_err("must fail");
        assert!(e.to_string().contains("unsupported bundle format"));
        let _ = std::fs::remove_dir_all(dir);
    }
}
