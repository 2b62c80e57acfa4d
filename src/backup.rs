use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DATA_PREFIX: &str = "data/";
pub const BUNDLE_FORMAT_V1: &str = "college-data-v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub name: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub format: String,
    pub version: u32,
    pub app_version: String,
    pub exported_at: u64,
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub restored: Vec<String>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// A collection file name: one path segment ending in `.json`.
fn is_collection_name(name: &str) -> bool {
    name.ends_with(".json")
        && name.len() > ".json".len()
        && !name.contains('/')
        && !name.contains('\\')
        && !name.starts_with('.')
}

fn collection_files(data_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for ent in std::fs::read_dir(data_dir)
        .with_context(|| format!("failed to read data directory {}", data_dir.to_string_lossy()))?
    {
        let p = ent?.path();
        if !p.is_file() {
            continue;
        }
        let Some(name) = p.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if is_collection_name(name) {
            out.push(p);
        }
    }
    // Deterministic bundle layout.
    out.sort();
    Ok(out)
}

pub fn export_data_bundle(data_dir: &Path, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let files = collection_files(data_dir)?;

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = Vec::with_capacity(files.len());
    for path in &files {
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
        zip.start_file(format!("{}{}", DATA_PREFIX, name), opts)
            .with_context(|| format!("failed to start entry {}", name))?;
        zip.write_all(&bytes)
            .with_context(|| format!("failed to write entry {}", name))?;
        entries.push(ManifestEntry {
            sha256: sha256_hex(&bytes),
            bytes: bytes.len() as u64,
            name,
        });
    }

    let manifest = Manifest {
        format: BUNDLE_FORMAT_V1.to_string(),
        version: 1,
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
        entries,
    };
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: manifest.entries.len() + 1,
    })
}

/// Every entry is read and checksummed before any collection file is replaced.
pub fn import_data_bundle(in_path: &Path, data_dir: &Path) -> anyhow::Result<ImportSummary> {
    if !is_zip_file(in_path)? {
        return Err(anyhow!(
            "not a data bundle: {}",
            in_path.to_string_lossy()
        ));
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: Manifest =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid")?;
    if manifest.format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", manifest.format));
    }

    let mut staged: Vec<(String, Vec<u8>)> = Vec::with_capacity(manifest.entries.len());
    for entry in &manifest.entries {
        if !is_collection_name(&entry.name) {
            return Err(anyhow!("bundle entry has an invalid name: {}", entry.name));
        }
        let mut bytes = Vec::new();
        archive
            .by_name(&format!("{}{}", DATA_PREFIX, entry.name))
            .with_context(|| format!("bundle missing {}", entry.name))?
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read {}", entry.name))?;
        let actual = sha256_hex(&bytes);
        if actual != entry.sha256 {
            return Err(anyhow!(
                "checksum mismatch for {}: expected {}, got {}",
                entry.name,
                entry.sha256,
                actual
            ));
        }
        serde_json::from_slice::<serde_json::Value>(&bytes)
            .with_context(|| format!("{} is not valid JSON", entry.name))?;
        staged.push((entry.name.clone(), bytes));
    }

    std::fs::create_dir_all(data_dir).with_context(|| {
        format!(
            "failed to create data directory {}",
            data_dir.to_string_lossy()
        )
    })?;
    let mut restored = Vec::with_capacity(staged.len());
    for (name, bytes) in staged {
        let dst = data_dir.join(&name);
        let tmp = data_dir.join(format!("{}.importing", name));
        std::fs::write(&tmp, &bytes)
            .with_context(|| format!("failed to write {}", tmp.to_string_lossy()))?;
        std::fs::rename(&tmp, &dst)
            .with_context(|| format!("failed to move restored file to {}", dst.to_string_lossy()))?;
        restored.push(name);
    }

    Ok(ImportSummary {
        bundle_format_detected: manifest.format,
        restored,
    })
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
