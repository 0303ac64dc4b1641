//! Collecting the source files referenced by a binary's DWARF line tables into a
//! zstd-compressed tarball.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use gimli::{DebugInfoUnitHeadersIter, Dwarf, EndianArcSlice, Reader as _, RunTimeEndian};
use object::{Object, ObjectSection};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};

/// Where `source` writes the archive unless told otherwise.
pub const DEFAULT_ARCHIVE_PATH: &str = "source.tar.zstd";

/// A source of per-compilation-unit file tables.
pub trait LineTables {
    /// The file table of the next compilation unit, or `None` once every unit has been visited.
    fn next_unit(&mut self) -> Result<Option<Vec<PathBuf>>>;
}

type SectionReader = EndianArcSlice<RunTimeEndian>;

/// Line tables read from the DWARF sections of an object file.
pub struct DwarfLineTables {
    dwarf: Dwarf<SectionReader>,
    headers: DebugInfoUnitHeadersIter<SectionReader>,
}

impl DwarfLineTables {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let file = object::File::parse(data)?;
        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let dwarf = Dwarf::load(|id| -> Result<SectionReader> {
            let data: Arc<[u8]> = match file.section_by_name(id.name()) {
                Some(section) => Arc::from(section.uncompressed_data()?.as_ref()),
                None => Arc::from(Vec::new()),
            };
            Ok(EndianArcSlice::new(data, endian))
        })?;
        let headers = dwarf.units();
        Ok(Self { dwarf, headers })
    }

    pub fn open(path: &Path) -> Result<Self> {
        Self::from_bytes(&std::fs::read(path)?)
    }
}

impl LineTables for DwarfLineTables {
    fn next_unit(&mut self) -> Result<Option<Vec<PathBuf>>> {
        while let Some(header) = self.headers.next()? {
            let unit = self.dwarf.unit(header)?;
            let mut cursor = unit.entries();
            let Some((_, root)) = cursor.next_dfs()? else {
                continue;
            };
            if root.tag() != gimli::DW_TAG_compile_unit {
                continue;
            }
            let Some(program) = &unit.line_program else {
                return Ok(Some(Vec::new()));
            };

            let header = program.header();
            let comp_dir = match &unit.comp_dir {
                Some(dir) => Some(dir.to_string_lossy()?.into_owned()),
                None => None,
            };
            let mut files = Vec::new();
            for entry in header.file_names() {
                // Absolute components replace whatever came before them.
                let mut path = PathBuf::new();
                if let Some(comp_dir) = &comp_dir {
                    path.push(comp_dir);
                }
                if let Some(dir) = entry.directory(header) {
                    let dir = self.dwarf.attr_string(&unit, dir)?;
                    path.push(dir.to_string_lossy()?.as_ref());
                }
                let name = self.dwarf.attr_string(&unit, entry.path_name())?;
                path.push(name.to_string_lossy()?.as_ref());
                files.push(path);
            }
            return Ok(Some(files));
        }
        Ok(None)
    }
}

/// What went into an archive.
#[derive(Debug, Default)]
pub struct SourceManifest {
    /// Every distinct path referenced by the line tables.
    pub seen: HashSet<PathBuf>,
    pub archived: Vec<PathBuf>,
    /// Referenced paths that do not exist locally.
    pub missing: Vec<PathBuf>,
    /// Paths left out because an earlier path maps to the same archive member.
    pub shadowed: Vec<PathBuf>,
}

/// Tar member name for `path`: relative, with `.` and `..` resolved lexically.
fn entry_name(path: &Path) -> PathBuf {
    let mut name = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => name.push(part),
            Component::ParentDir => {
                name.pop();
            }
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
        }
    }
    name
}

/// Tar entries inside a zstd stream.
pub struct SourceArchiveWriter<W: Write> {
    builder: tar::Builder<zstd::Encoder<'static, W>>,
}

impl<W: Write> SourceArchiveWriter<W> {
    pub fn new(out: W) -> io::Result<Self> {
        let encoder = zstd::Encoder::new(out, zstd::DEFAULT_COMPRESSION_LEVEL)?;
        Ok(Self {
            builder: tar::Builder::new(encoder),
        })
    }

    pub fn append(&mut self, path: &Path, file: &mut File) -> io::Result<()> {
        let size = file.metadata()?.len();
        let mut header = tar::Header::new_gnu();
        header.set_size(size);
        header.set_mode(0o644);
        self.builder
            .append_data(&mut header, entry_name(path), file.take(size))
    }

    /// Write the tar trailer and end the zstd frame.
    pub fn finish(self) -> io::Result<W> {
        self.builder.into_inner()?.finish()
    }
}

/// Archive every file the line tables reference, once each. Missing files are reported and left
/// out; any other failure to read a file is fatal.
#[instrument(skip_all)]
pub fn build_source_archive<T, W>(
    tables: &mut T,
    out: W,
    cancel: &CancellationToken,
) -> Result<SourceManifest>
where
    T: LineTables + ?Sized,
    W: Write,
{
    let mut archive = SourceArchiveWriter::new(out)?;
    let mut manifest = SourceManifest::default();
    let mut members = HashSet::new();

    let mut units = 0usize;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let Some(files) = tables.next_unit()? else {
            break;
        };
        units += 1;
        for path in files {
            if !manifest.seen.insert(path.clone()) {
                continue;
            }
            let mut file = match File::open(&path) {
                Ok(file) => file,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    warn!(path = %path.display(), "skipping file: does not exist");
                    manifest.missing.push(path);
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            if !file.metadata()?.is_file() {
                warn!(path = %path.display(), "skipping file: not a regular file");
                manifest.missing.push(path);
                continue;
            }
            if !members.insert(entry_name(&path)) {
                warn!(path = %path.display(), "skipping file: archive member name already taken");
                manifest.shadowed.push(path);
                continue;
            }
            archive.append(&path, &mut file)?;
            manifest.archived.push(path);
        }
    }

    archive.finish()?.flush()?;
    debug!(units, "visited compilation units");
    info!(
        archived = manifest.archived.len(),
        missing = manifest.missing.len(),
        "wrote source archive"
    );
    Ok(manifest)
}

/// Build the source archive for the binary at `debuginfo_path` into a new file at `out_path`.
pub fn write_source_archive(
    debuginfo_path: &Path,
    out_path: &Path,
    cancel: &CancellationToken,
) -> Result<SourceManifest> {
    let mut tables = DwarfLineTables::open(debuginfo_path)?;
    let out = io::BufWriter::new(File::create(out_path)?);
    build_source_archive(&mut tables, out, cancel)
}
