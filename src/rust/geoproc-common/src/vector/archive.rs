//! ZIPアーカイブの展開とシェープファイル一式の検出

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use zip::write::{FileOptions, ZipWriter};
use zip::ZipArchive;

use crate::error::{GeoError, Result};

/// シェープファイルを構成するファイル群
#[derive(Debug, Clone, PartialEq)]
pub struct ShapefileParts {
    pub shp: PathBuf,
    pub shx: PathBuf,
    pub dbf: PathBuf,
    pub prj: Option<PathBuf>,
}

/// リクエスト単位で展開したアーカイブ
///
/// ドロップ時に一時ディレクトリごと削除される。
#[derive(Debug)]
pub struct ExtractedArchive {
    dir: TempDir,
    entries: Vec<String>,
}

impl ExtractedArchive {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// アーカイブ内のエントリ名
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// 展開されたファイル（パス順）
    fn files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        collect_files(self.dir.path(), &mut files)?;
        files.sort();
        Ok(files)
    }

    /// 最初の `.shp`
    pub fn first_shp(&self) -> Result<Option<PathBuf>> {
        Ok(self.files()?.into_iter().find(|p| has_extension(p, "shp")))
    }

    /// 最初に見つかった `.shp` と同名の `.shx` / `.dbf` / `.prj` を探す
    pub fn shapefile_parts(&self) -> Result<ShapefileParts> {
        let files = self.files()?;

        let shp = files
            .iter()
            .find(|p| has_extension(p, "shp"))
            .ok_or(GeoError::MissingShapefileParts)?;

        let stem = shp.file_stem().map(|s| s.to_string_lossy().to_lowercase());
        let parent = shp.parent();

        let sibling = |ext: &str| {
            files
                .iter()
                .find(|p| {
                    p.parent() == parent
                        && has_extension(p, ext)
                        && p.file_stem().map(|s| s.to_string_lossy().to_lowercase()) == stem
                })
                .cloned()
        };

        let shx = sibling("shx").ok_or(GeoError::MissingShapefileParts)?;
        let dbf = sibling("dbf").ok_or(GeoError::MissingShapefileParts)?;
        let prj = sibling("prj");

        debug!("Found shapefile {} (prj: {})", shp.display(), prj.is_some());

        Ok(ShapefileParts { shp: shp.clone(), shx, dbf, prj })
    }
}

/// メモリ上のZIPを一時ディレクトリへ展開
pub fn extract_archive(data: &[u8]) -> Result<ExtractedArchive> {
    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|e| GeoError::InvalidArchive(e.to_string()))?;

    let entries: Vec<String> = archive.file_names().map(str::to_string).collect();

    let dir = tempfile::Builder::new().prefix("geoproc-upload-").tempdir()?;
    archive
        .extract(dir.path())
        .map_err(|e| GeoError::InvalidArchive(e.to_string()))?;

    debug!("Extracted {} zip entries into {}", entries.len(), dir.path().display());

    Ok(ExtractedArchive { dir, entries })
}

/// `<dir>/<stem>.{shp,shx,dbf,prj}` のうち存在するものをZIPにまとめる
pub fn bundle_shapefile(dir: &Path, stem: &str) -> Result<Vec<u8>> {
    let files: Vec<PathBuf> = ["shp", "shx", "dbf", "prj"]
        .iter()
        .map(|ext| dir.join(format!("{}.{}", stem, ext)))
        .filter(|p| p.is_file())
        .collect();

    if files.is_empty() {
        return Err(GeoError::ShapefileWrite(format!("No shapefile named {} was written", stem)));
    }

    bundle_files(&files)
}

/// ファイル群をフラットなZIPにまとめる
pub fn bundle_files(files: &[PathBuf]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| GeoError::Other(format!("Invalid file path: {}", path.display())))?;

        zip.start_file::<_, ()>(name, FileOptions::default())?;
        zip.write_all(&fs::read(path)?)?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// macOS のリソースフォークを除いて再帰的に列挙
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

        if name == "__MACOSX" || name.starts_with("._") {
            continue;
        }

        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
