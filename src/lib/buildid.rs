//! Resolution of the build ID used by the store to address a binary's debug information.

use std::path::Path;

use object::{Object, ObjectSection};

use crate::error::{Error, Result};

const GO_BUILD_ID_SECTION: &str = ".note.go.buildid";
const GO_BUILD_ID_NOTE_TYPE: u32 = 4;

/// Resolves the canonical identifier of a binary.
pub trait BuildIdResolver {
    fn build_id(&self, path: &Path) -> Result<String>;
}

/// Reads build IDs from ELF notes, falling back to a hash of the executable code.
#[derive(Debug, Default, Clone, Copy)]
pub struct ElfBuildId;

impl BuildIdResolver for ElfBuildId {
    fn build_id(&self, path: &Path) -> Result<String> {
        let data = std::fs::read(path)?;
        let id = build_id_from_bytes(&data)?;
        id.ok_or_else(|| Error::MissingBuildId {
            path: path.to_path_buf(),
        })
    }
}

/// Resolve the build ID of an in-memory object file. Returns `None` when the file carries neither
/// a build ID note nor a non-empty `.text` section.
pub fn build_id_from_bytes(data: &[u8]) -> Result<Option<String>> {
    let file = object::File::parse(data)?;

    if let Some(gnu) = file.build_id()?
        && !gnu.is_empty()
    {
        return Ok(Some(hex::encode(gnu)));
    }

    if let Some(section) = file.section_by_name(GO_BUILD_ID_SECTION)
        && let Some(go) = go_build_id(section.data()?, file.is_little_endian())
    {
        return Ok(Some(go));
    }

    let text = file
        .section_by_name(".text")
        .or_else(|| file.section_by_name("__text"));
    match text {
        Some(section) => {
            let code = section.data()?;
            if code.is_empty() {
                return Ok(None);
            }
            let digest = xxhash_rust::xxh3::xxh3_128(code);
            Ok(Some(hex::encode(digest.to_be_bytes())))
        }
        None => Ok(None),
    }
}

fn read_u32(bytes: &[u8], little_endian: bool) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    Some(if little_endian {
        u32::from_le_bytes(raw)
    } else {
        u32::from_be_bytes(raw)
    })
}

// Note layout: namesz, descsz, type, then name and desc each padded to 4 bytes.
fn go_build_id(note: &[u8], little_endian: bool) -> Option<String> {
    let name_size = read_u32(note, little_endian)? as usize;
    let desc_size = read_u32(note.get(4..)?, little_endian)? as usize;
    let note_type = read_u32(note.get(8..)?, little_endian)?;
    let name = note.get(12..12 + name_size)?;
    if note_type != GO_BUILD_ID_NOTE_TYPE || name.strip_suffix(b"\0").unwrap_or(name) != b"Go" {
        return None;
    }
    let desc_start = 12 + name_size.next_multiple_of(4);
    let desc = note.get(desc_start..desc_start + desc_size)?;
    let id = String::from_utf8_lossy(desc)
        .trim_end_matches('\0')
        .to_string();
    if id.is_empty() { None } else { Some(id) }
}
