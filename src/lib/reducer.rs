//! Rewriting binaries to keep only, or to drop, their debug sections.

use std::borrow::Cow;
use std::io::{Seek, Write};

use flate2::Compression;
use flate2::write::ZlibEncoder;
use object::build::elf::{Builder, Section, SectionData, SectionId};
use object::{BinaryFormat, Endianness, Object, ObjectSection, elf};

use crate::error::{Error, Result};

const BUILD_ID_NOTES: &[&[u8]] = &[b".note.gnu.build-id", b".note.go.buildid"];

/// Symbolization data that lives outside DWARF.
const SYMBOL_TABLES: &[&[u8]] = &[b".gopclntab", b".gosymtab"];

/// A destination the reducer can write to and seek within, so that headers can be patched once
/// the body has been written.
pub trait WriteSeek: Write + Seek {}

impl<T: Write + Seek + ?Sized> WriteSeek for T {}

/// What to keep when reducing a binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractMode {
    /// Keep only the debug sections, the symbol tables and the notes that identify the binary.
    #[default]
    KeepOnlyDebug,
    /// Keep everything except the debug sections.
    StripDebug,
}

impl std::fmt::Display for ExtractMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeepOnlyDebug => write!(f, "keep-only-debug"),
            Self::StripDebug => write!(f, "strip-debug"),
        }
    }
}

/// Transforms a binary into a debug-only or debug-stripped variant.
pub trait Reducer {
    fn only_keep_debug(&self, dst: &mut dyn WriteSeek, src: &[u8]) -> Result<()>;

    fn strip_debug(&self, dst: &mut dyn WriteSeek, src: &[u8]) -> Result<()>;

    fn reduce(&self, mode: ExtractMode, dst: &mut dyn WriteSeek, src: &[u8]) -> Result<()> {
        match mode {
            ExtractMode::KeepOnlyDebug => self.only_keep_debug(dst, src),
            ExtractMode::StripDebug => self.strip_debug(dst, src),
        }
    }
}

/// Reducer for ELF binaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct ElfReducer {
    /// Emit `.debug_*` sections zlib-compressed behind an ELF compression header.
    pub compress_dwarf_sections: bool,
}

impl ElfReducer {
    pub fn new(compress_dwarf_sections: bool) -> Self {
        Self {
            compress_dwarf_sections,
        }
    }
}

fn is_debug_section(name: &[u8]) -> bool {
    name.starts_with(b".debug_") || name.starts_with(b".zdebug_")
}

/// `.zdebug_foo` holds the same data as `.debug_foo` once decompressed.
fn canonical_debug_name(name: &[u8]) -> Vec<u8> {
    match name.strip_prefix(b".zdebug_") {
        Some(rest) => [b".debug_".as_slice(), rest].concat(),
        None => name.to_vec(),
    }
}

fn compress_section(data: &[u8], align: u64, is_64: bool, little_endian: bool) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(24 + data.len() / 2);
    let ch_type = elf::ELFCOMPRESS_ZLIB;
    let size = data.len() as u64;
    let put_u32 = |out: &mut Vec<u8>, v: u32| {
        out.extend_from_slice(&if little_endian { v.to_le_bytes() } else { v.to_be_bytes() })
    };
    let put_u64 = |out: &mut Vec<u8>, v: u64| {
        out.extend_from_slice(&if little_endian { v.to_le_bytes() } else { v.to_be_bytes() })
    };
    if is_64 {
        put_u32(&mut out, ch_type);
        put_u32(&mut out, 0);
        put_u64(&mut out, size);
        put_u64(&mut out, align);
    } else {
        put_u32(&mut out, ch_type);
        put_u32(&mut out, size as u32);
        put_u32(&mut out, align as u32);
    }
    let mut encoder = ZlibEncoder::new(out, Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompresses a debug section, and recompresses it when asked to, so the output never carries
/// `.zdebug_*` sections.
fn rewrite_debug_section<'data>(
    section: &mut Section<'data>,
    input: &object::File<'data>,
    compress: bool,
    is_64: bool,
    little_endian: bool,
) -> Result<()> {
    let already_compressed = section.sh_flags & u64::from(elf::SHF_COMPRESSED) != 0
        || section.name.starts_with(b".zdebug_");
    if !already_compressed && !compress {
        return Ok(());
    }
    let Some(original) = input.section_by_name_bytes(&section.name) else {
        return Ok(());
    };
    let data = original.uncompressed_data()?;

    section.name = canonical_debug_name(&section.name).into();
    section.sh_flags &= !u64::from(elf::SHF_COMPRESSED);
    if compress && !data.is_empty() {
        let align = section.sh_addralign.max(1);
        let compressed = compress_section(&data, align, is_64, little_endian)?;
        section.data = SectionData::Data(compressed.into());
        section.sh_flags |= u64::from(elf::SHF_COMPRESSED);
        section.sh_addralign = if is_64 { 8 } else { 4 };
    } else {
        section.data = SectionData::Data(match data {
            Cow::Borrowed(bytes) => bytes.into(),
            Cow::Owned(bytes) => bytes.into(),
        });
    }
    Ok(())
}

impl Reducer for ElfReducer {
    /// Keeps DWARF, the symbol tables and the identifying notes. Other allocated sections keep
    /// their headers as `SHT_NOBITS` so addresses still resolve; everything else is dropped.
    fn only_keep_debug(&self, dst: &mut dyn WriteSeek, src: &[u8]) -> Result<()> {
        let input = object::File::parse(src)?;
        if input.format() != BinaryFormat::Elf {
            return Err(Error::UnsupportedFormat(input.format()));
        }
        let mut builder = Builder::read(src)?;
        let is_64 = builder.is_64;
        let little_endian = builder.endian == Endianness::Little;

        let debug_sections: Vec<SectionId> = builder
            .sections
            .iter()
            .filter(|section| is_debug_section(&section.name))
            .map(|section| section.id())
            .collect();

        for section in builder.sections.iter_mut() {
            if is_debug_section(&section.name) {
                if matches!(section.data, SectionData::Data(_)) {
                    rewrite_debug_section(
                        section,
                        &input,
                        self.compress_dwarf_sections,
                        is_64,
                        little_endian,
                    )?;
                }
                continue;
            }
            let keep = match &section.data {
                SectionData::Symbol
                | SectionData::SymbolSectionIndex
                | SectionData::String
                | SectionData::SectionString => true,
                SectionData::Relocation(_) => section
                    .sh_info_section
                    .is_some_and(|target| debug_sections.contains(&target)),
                _ => {
                    let name = section.name.as_slice();
                    BUILD_ID_NOTES
                        .iter()
                        .chain(SYMBOL_TABLES)
                        .any(|kept| *kept == name)
                }
            };
            if keep {
                continue;
            }
            if section.is_alloc() {
                section.sh_type = elf::SHT_NOBITS;
                section.data = SectionData::UninitializedData(section.sh_size);
            } else {
                section.delete = true;
            }
        }

        // Nothing is loadable any more, so the dynamic linking tables go too.
        for segment in builder.segments.iter_mut() {
            segment.delete = true;
        }
        for symbol in builder.dynamic_symbols.iter_mut() {
            symbol.delete = true;
        }
        for version in builder.versions.iter_mut() {
            version.delete = true;
        }
        builder.version_base = None;
        builder.delete_orphans();

        let mut out = Vec::new();
        builder.write(&mut out)?;
        dst.write_all(&out)?;
        dst.flush()?;
        Ok(())
    }

    fn strip_debug(&self, dst: &mut dyn WriteSeek, src: &[u8]) -> Result<()> {
        let mut builder = Builder::read(src)?;

        let mut stripped = Vec::new();
        for section in builder.sections.iter_mut() {
            if is_debug_section(&section.name) {
                section.delete = true;
                stripped.push(section.id());
            }
        }
        // Relocations against removed sections go with them.
        for section in builder.sections.iter_mut() {
            let is_relocation = section.sh_type == elf::SHT_REL || section.sh_type == elf::SHT_RELA;
            if is_relocation
                && let Some(target) = section.sh_info_section
                && stripped.contains(&target)
            {
                section.delete = true;
            }
        }
        builder.delete_orphans();

        let mut out = Vec::new();
        builder.write(&mut out)?;
        dst.write_all(&out)?;
        dst.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod test_reducer {
    use super::*;
    use crate::scratch::ScratchBuffer;
    use object::write::{self as objwrite, SectionKind, SymbolSection};
    use object::{Architecture, ObjectSymbol, SymbolFlags, SymbolKind, SymbolScope};

    fn sample_elf() -> Vec<u8> {
        let mut obj =
            objwrite::Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
        let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
        obj.set_section_data(text, vec![0x90u8; 64], 16);
        for (name, value) in [("main", 0), ("helper", 32)] {
            obj.add_symbol(objwrite::Symbol {
                name: name.as_bytes().to_vec(),
                value,
                size: 32,
                kind: SymbolKind::Text,
                scope: SymbolScope::Linkage,
                weak: false,
                section: SymbolSection::Section(text),
                flags: SymbolFlags::None,
            });
        }
        let info = obj.add_section(Vec::new(), b".debug_info".to_vec(), SectionKind::Debug);
        obj.set_section_data(info, vec![1u8; 256], 1);
        let line = obj.add_section(Vec::new(), b".debug_line".to_vec(), SectionKind::Debug);
        obj.set_section_data(line, vec![2u8; 128], 1);
        obj.write().unwrap()
    }

    fn section_names(data: &[u8]) -> Vec<String> {
        object::File::parse(data)
            .unwrap()
            .sections()
            .map(|s| s.name().unwrap().to_string())
            .collect()
    }

    fn text_symbols(data: &[u8]) -> Vec<String> {
        let file = object::File::parse(data).unwrap();
        let mut names: Vec<String> = file
            .symbols()
            .filter(|symbol| symbol.kind() == SymbolKind::Text)
            .map(|symbol| symbol.name().unwrap().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn only_keep_debug_drops_code() {
        let mut out = ScratchBuffer::new();
        ElfReducer::default()
            .only_keep_debug(&mut out, &sample_elf())
            .unwrap();
        let names = section_names(out.as_slice());
        assert!(names.contains(&".debug_info".to_string()));
        assert!(names.contains(&".debug_line".to_string()));

        let file = object::File::parse(out.as_slice()).unwrap();
        let text = file.section_by_name(".text").unwrap();
        assert_eq!(text.file_range(), None);
        assert_eq!(text.size(), 64);
    }

    #[test]
    fn only_keep_debug_keeps_symbols() {
        let input = sample_elf();
        let mut out = ScratchBuffer::new();
        ElfReducer::default()
            .only_keep_debug(&mut out, &input)
            .unwrap();
        assert_eq!(text_symbols(out.as_slice()), vec!["helper", "main"]);
        assert_eq!(text_symbols(out.as_slice()), text_symbols(&input));
    }

    #[test]
    fn only_keep_debug_keeps_symbols_of_linked_executable() {
        let input = std::fs::read(std::env::current_exe().unwrap()).unwrap();
        let mut out = ScratchBuffer::new();
        ElfReducer::default()
            .only_keep_debug(&mut out, &input)
            .unwrap();

        let before = text_symbols(&input);
        assert!(!before.is_empty());
        assert_eq!(text_symbols(out.as_slice()), before);
        assert!(out.len() < input.len() as u64);
    }

    #[test]
    fn compressed_sections_round_trip() {
        let mut out = ScratchBuffer::new();
        ElfReducer::new(true)
            .only_keep_debug(&mut out, &sample_elf())
            .unwrap();
        let file = object::File::parse(out.as_slice()).unwrap();
        let info = file.section_by_name(".debug_info").unwrap();
        assert_eq!(info.uncompressed_data().unwrap().as_ref(), &[1u8; 256][..]);
        assert!(info.data().unwrap().len() < 256);
    }

    #[test]
    fn non_elf_input_is_rejected() {
        let mut out = ScratchBuffer::new();
        let result = ElfReducer::default().only_keep_debug(&mut out, b"garbage");
        assert!(result.is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn zdebug_names_are_canonicalised() {
        assert_eq!(canonical_debug_name(b".zdebug_info"), b".debug_info".to_vec());
        assert_eq!(canonical_debug_name(b".debug_line"), b".debug_line".to_vec());
    }
}
